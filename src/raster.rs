//! The binary raster every processing stage reads and writes.
//!
//! Coordinates are signed so that neighbourhood lookups may step outside the
//! image; anything outside reads as background and writes are dropped.

use image::{GrayImage, Luma, Rgb, RgbImage};

/// A width×height grid of foreground (black) / background (white) samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<bool>,
}

impl Bitmap {
    /// Create an all-background bitmap.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![false; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    /// True if the pixel is foreground. Out-of-range pixels are background.
    pub fn is_black(&self, x: i32, y: i32) -> bool {
        self.index(x, y).map_or(false, |i| self.pixels[i])
    }

    pub fn set(&mut self, x: i32, y: i32, black: bool) {
        if let Some(i) = self.index(x, y) {
            self.pixels[i] = black;
        }
    }

    /// Paint an inclusive rectangle.
    pub fn fill_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, black: bool) {
        for y in y0..=y1 {
            for x in x0..=x1 {
                self.set(x, y, black);
            }
        }
    }

    /// Number of foreground pixels.
    pub fn count_black(&self) -> usize {
        self.pixels.iter().filter(|&&p| p).count()
    }

    /// Copy a `w`×`h` window whose top-left corner is (`x`, `y`).
    pub fn crop(&self, x: i32, y: i32, w: u32, h: u32) -> Bitmap {
        let mut out = Bitmap::new(w, h);
        for j in 0..h as i32 {
            for i in 0..w as i32 {
                if self.is_black(x + i, y + j) {
                    out.set(i, j, true);
                }
            }
        }
        out
    }

    /// Build a bitmap from an intensity image: foreground below `threshold`.
    pub fn from_gray(gray: &GrayImage, threshold: u8) -> Self {
        let (width, height) = gray.dimensions();
        let pixels = gray.pixels().map(|p| p.0[0] < threshold).collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            if self.is_black(x as i32, y as i32) {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    pub fn to_rgb(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            if self.is_black(x as i32, y as i32) {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_reads_background_and_ignores_writes() {
        let mut bitmap = Bitmap::new(4, 3);
        bitmap.set(-1, 0, true);
        bitmap.set(4, 2, true);
        assert_eq!(bitmap.count_black(), 0);
        assert!(!bitmap.is_black(-5, -5));
        assert!(!bitmap.is_black(100, 1));
    }

    #[test]
    fn crop_copies_window() {
        let mut bitmap = Bitmap::new(10, 10);
        bitmap.fill_rect(2, 2, 4, 3, true);
        let sub = bitmap.crop(2, 2, 4, 4);
        assert_eq!(sub.count_black(), 6);
        assert!(sub.is_black(0, 0));
        assert!(!sub.is_black(3, 0));
    }

    #[test]
    fn gray_threshold_is_strict() {
        let gray = GrayImage::from_fn(3, 1, |x, _| Luma([[149, 150, 0][x as usize]]));
        let bitmap = Bitmap::from_gray(&gray, 150);
        assert!(bitmap.is_black(0, 0));
        assert!(!bitmap.is_black(1, 0));
        assert!(bitmap.is_black(2, 0));
    }
}
