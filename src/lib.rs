//! omrlib, optical music recognition from scanned score images to MusicXML.
//!
//! A page goes through a fixed sequence of stages: deskew, staff-line
//! removal, stem and bar-line removal, patching, connected-component
//! labelling, bounding boxes and finally symbol recognition, which yields a
//! [`Document`] ready to be written as MusicXML.
//!
//! # Example
//! ```no_run
//! use omrlib::{recognize_file, PipelineConfig};
//!
//! let doc = recognize_file("page.png", PipelineConfig::default()).unwrap();
//! println!("Measures: {}", doc.measure_count());
//! println!("{}", omrlib::export::to_musicxml(&doc));
//! ```

pub mod bbox;
pub mod builder;
pub mod cca;
pub mod config;
pub mod deskew;
pub mod error;
pub mod export;
pub mod geometry;
pub mod ingest;
pub mod lines;
pub mod model;
pub mod mxl;
pub mod parser;
pub mod pipeline;
pub mod raster;
pub mod recognizer;
pub mod templates;

use std::path::Path;

pub use config::PipelineConfig;
pub use error::{
    ConfigError, ExportError, IngestError, PipelineError, RecognizeError, TemplateError,
};
pub use export::{to_musicxml, write_file};
pub use model::*;
pub use mxl::read_mxl;
pub use parser::parse_document;
pub use pipeline::{Pipeline, Snapshot, Stage};

/// Load an image and run every stage on it.
pub fn recognize_file<P: AsRef<Path>>(
    path: P,
    config: PipelineConfig,
) -> Result<Document, RecognizeError> {
    let page = ingest::load(path)?;
    let mut pipeline = Pipeline::new(&page, config);
    pipeline.run_to_end()?;
    Ok(pipeline.into_document().unwrap_or_else(|| Document::new("")))
}

/// Convert a recognised document to a JSON string.
/// Useful for passing data across FFI boundaries.
pub fn document_to_json(doc: &Document) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(doc)?)
}

// ═══════════════════════════════════════════════════════════════════════
// C FFI for native hosts (static library or shared library)
// ═══════════════════════════════════════════════════════════════════════

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

/// Recognise an image file and return its MusicXML as a C string.
/// The caller must free the returned string with `omrlib_free_string`.
/// Returns null on any failure.
///
/// # Safety
/// `path` must be a valid null-terminated UTF-8 C string.
#[no_mangle]
pub unsafe extern "C" fn omrlib_recognize_file(path: *const c_char) -> *mut c_char {
    if path.is_null() {
        return std::ptr::null_mut();
    }
    let c_str = unsafe { CStr::from_ptr(path) };
    let Ok(path_str) = c_str.to_str() else {
        return std::ptr::null_mut();
    };

    match recognize_file(path_str, PipelineConfig::default()) {
        Ok(doc) => CString::new(to_musicxml(&doc)).unwrap_or_default().into_raw(),
        Err(e) => {
            tracing::error!("{e}");
            std::ptr::null_mut()
        }
    }
}

/// Free a string previously returned by omrlib functions.
///
/// # Safety
/// `ptr` must be a string previously returned by an omrlib function, or null.
#[no_mangle]
pub unsafe extern "C" fn omrlib_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            let _ = CString::from_raw(ptr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_uses_snake_case_events() {
        let mut doc = Document::new("Music");
        let mut measure = Measure::new(1);
        measure.events.push(MeasureEvent::Backup { duration: 16 });
        doc.measures.push(measure);
        let json = document_to_json(&doc).unwrap();
        assert!(json.contains("\"kind\": \"backup\""));
        assert!(json.contains("\"part_name\": \"Music\""));
    }

    #[test]
    fn ffi_rejects_null_and_missing_files() {
        unsafe {
            assert!(omrlib_recognize_file(std::ptr::null()).is_null());
            let missing = CString::new("/no/such/page.png").unwrap();
            assert!(omrlib_recognize_file(missing.as_ptr()).is_null());
            omrlib_free_string(std::ptr::null_mut());
        }
    }

    #[test]
    fn missing_image_is_an_ingest_error() {
        let err = recognize_file("/no/such/page.png", PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, RecognizeError::Ingest(IngestError::Unreadable { .. })));
    }
}
