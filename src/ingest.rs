//! Image ingestion: a file path in, a canonical RGB page out.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, GrayImage, ImageFormat, RgbImage};
use tracing::{info, warn};

use crate::error::IngestError;
use crate::geometry::intensity_image;

/// A decoded page.
#[derive(Debug, Clone)]
pub struct Page {
    pub image: RgbImage,
    /// Frames in the container; only the first one is decoded
    pub frames: usize,
}

impl Page {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Intensity plane used by deskewing.
    pub fn intensity(&self) -> GrayImage {
        intensity_image(&DynamicImage::ImageRgb8(self.image.clone()))
    }
}

/// Read and decode the image at `path`.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Page, IngestError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| IngestError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    decode(path, &bytes)
}

/// Decode in-memory image bytes; `path` only names the source in errors.
pub fn decode(path: &Path, bytes: &[u8]) -> Result<Page, IngestError> {
    let unsupported = |reason: String| IngestError::Unsupported {
        path: path.to_path_buf(),
        reason,
    };
    let format = image::guess_format(bytes).map_err(|e| unsupported(e.to_string()))?;

    let frames = match format {
        ImageFormat::Gif => gif_frames(bytes).map_err(|e| unsupported(e.to_string()))?,
        _ => 1,
    };
    if frames == 0 {
        return Err(IngestError::NoFrames {
            path: PathBuf::from(path),
        });
    }
    if frames > 1 {
        warn!(frames, path = %path.display(), "multi-frame image, using the first frame");
    }

    let image = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| unsupported(e.to_string()))?
        .to_rgb8();
    info!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        ?format,
        "image loaded"
    );
    Ok(Page { image, frames })
}

fn gif_frames(bytes: &[u8]) -> image::ImageResult<usize> {
    let decoder = GifDecoder::new(Cursor::new(bytes))?;
    let mut count = 0;
    for frame in decoder.into_frames() {
        frame?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn png_bytes(image: &RgbImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = load("/definitely/not/here.png").unwrap_err();
        assert!(matches!(err, IngestError::Unreadable { .. }));
    }

    #[test]
    fn text_is_unsupported() {
        let err = decode(Path::new("notes.txt"), b"just some words").unwrap_err();
        assert!(matches!(err, IngestError::Unsupported { .. }));
    }

    #[test]
    fn png_decodes_to_rgb() {
        let mut image = RgbImage::from_pixel(8, 4, Rgb([255, 255, 255]));
        image.put_pixel(2, 1, Rgb([0, 0, 0]));
        let page = decode(Path::new("page.png"), &png_bytes(&image)).unwrap();
        assert_eq!((page.width(), page.height(), page.frames), (8, 4, 1));
        assert_eq!(page.intensity().get_pixel(2, 1).0, [0]);
        assert_eq!(page.intensity().get_pixel(3, 1).0, [255]);
    }
}
