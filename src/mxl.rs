//! MXL container: compressed MusicXML (.mxl) archives.
//!
//! An .mxl file is a ZIP archive containing:
//!   - mimetype stored first and uncompressed
//!   - META-INF/container.xml declares the root MusicXML file path
//!   - <rootfile> the MusicXML content itself

use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::ExportError;
use crate::model::Document;
use crate::parser;

pub const MIMETYPE: &str = "application/vnd.recordare.musicxml";

/// Name of the score entry written into new archives.
pub const ROOT_FILE: &str = "score.musicxml";

const CONTAINER_PATH: &str = "META-INF/container.xml";

fn container_xml(root: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<container>
  <rootfiles>
    <rootfile full-path="{root}" media-type="application/vnd.recordare.musicxml+xml"/>
  </rootfiles>
</container>
"#
    )
}

/// Pack MusicXML text into .mxl bytes.
pub fn write_mxl(xml: &str) -> Result<Vec<u8>, ExportError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("mimetype", stored)?;
    zip.write_all(MIMETYPE.as_bytes())?;
    zip.start_file(CONTAINER_PATH, deflated)?;
    zip.write_all(container_xml(ROOT_FILE).as_bytes())?;
    zip.start_file(ROOT_FILE, deflated)?;
    zip.write_all(xml.as_bytes())?;

    Ok(zip.finish()?.into_inner())
}

/// Read a document back from .mxl bytes.
pub fn read_mxl(data: &[u8]) -> Result<Document, ExportError> {
    let xml = extract_musicxml(data)?;
    parser::parse_document(&xml)
}

/// Extract the MusicXML text from .mxl bytes.
pub fn extract_musicxml(data: &[u8]) -> Result<String, ExportError> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let root = root_file_path(&mut archive)?;
    let mut entry = archive.by_name(&root)?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    Ok(xml)
}

/// The root file named by the container, or else the first score-looking
/// entry outside META-INF.
fn root_file_path(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Result<String, ExportError> {
    let container = match archive.by_name(CONTAINER_PATH) {
        Ok(mut file) => {
            let mut xml = String::new();
            file.read_to_string(&mut xml)?;
            Some(xml)
        }
        Err(_) => None,
    };

    if let Some(xml) = container {
        let doc = roxmltree::Document::parse(&xml)
            .map_err(|e| ExportError::Xml(format!("container.xml: {e}")))?;
        return doc
            .descendants()
            .filter(|n| n.has_tag_name("rootfile"))
            .find_map(|n| n.attribute("full-path"))
            .map(String::from)
            .ok_or_else(|| ExportError::Xml("no rootfile in container.xml".to_string()));
    }

    archive
        .file_names()
        .find(|name| {
            !name.starts_with("META-INF/") && (name.ends_with(".xml") || name.ends_with(".musicxml"))
        })
        .map(String::from)
        .ok_or_else(|| ExportError::Xml("no MusicXML file in archive".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mimetype_comes_first_and_uncompressed() {
        let bytes = write_mxl("<score-partwise/>").unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), CompressionMethod::Stored);
    }

    #[test]
    fn root_file_is_found_through_the_container() {
        let bytes = write_mxl("<score-partwise version=\"3.1\"/>").unwrap();
        assert_eq!(
            extract_musicxml(&bytes).unwrap(),
            "<score-partwise version=\"3.1\"/>"
        );
    }

    #[test]
    fn archive_without_container_falls_back_to_a_score_entry() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("notes.txt", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"not a score").unwrap();
        zip.start_file("song.xml", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"<score-partwise/>").unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        assert_eq!(extract_musicxml(&bytes).unwrap(), "<score-partwise/>");
    }

    #[test]
    fn garbage_is_a_zip_error() {
        assert!(matches!(
            extract_musicxml(b"definitely not a zip"),
            Err(ExportError::Zip(_))
        ));
    }
}
