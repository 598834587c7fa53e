//! Intensity, binarization, projections and the label colour ramp.

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage, Rgba};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::bbox::BoundingBox;
use crate::raster::Bitmap;

/// Intensity below which a pixel counts as foreground.
pub const FOREGROUND_THRESHOLD: u8 = 150;

/// Projection direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// One value per row: foreground count along that row.
    Rows,
    /// One value per column: foreground count down that column.
    Columns,
}

/// Grayscale intensity of a sample; non-opaque samples read as white.
pub fn intensity(px: Rgba<u8>) -> u8 {
    let [r, g, b, a] = px.0;
    if a != 255 {
        return 255;
    }
    ((r as u32 + g as u32 + b as u32) / 3) as u8
}

/// Reduce a decoded image to its intensity plane.
pub fn intensity_image(image: &DynamicImage) -> GrayImage {
    let rgba = image.to_rgba8();
    GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        Luma([intensity(*rgba.get_pixel(x, y))])
    })
}

/// Binarize a decoded image at `threshold`.
pub fn binarize(image: &DynamicImage, threshold: u8) -> Bitmap {
    Bitmap::from_gray(&intensity_image(image), threshold)
}

/// Count foreground pixels per row or per column.
pub fn project(bitmap: &Bitmap, axis: Axis) -> Vec<u32> {
    let (w, h) = (bitmap.width() as i32, bitmap.height() as i32);
    match axis {
        Axis::Rows => (0..h)
            .map(|y| (0..w).filter(|&x| bitmap.is_black(x, y)).count() as u32)
            .collect(),
        Axis::Columns => (0..w)
            .map(|x| (0..h).filter(|&y| bitmap.is_black(x, y)).count() as u32)
            .collect(),
    }
}

/// Fraction of foreground pixels; zero for an empty bitmap.
pub fn ratio_of_pixels(bitmap: &Bitmap) -> f64 {
    let total = bitmap.width() as usize * bitmap.height() as usize;
    if total == 0 {
        return 0.0;
    }
    bitmap.count_black() as f64 / total as f64
}

/// Visualization colour for a component label: a cyclic 80-step ramp.
pub fn label_color(label: u32) -> Rgb<u8> {
    let l = (label % 80) as i32;
    let c = |v: i32| v.clamp(0, 255) as u8;
    let (r, g, b) = match l {
        0..=10 => (25 * l, 0, 0),
        11..=20 => (25 * (20 - l), 25 * (l - 10), 0),
        21..=30 => (0, 25 * (30 - l), 25 * (l - 20)),
        31..=40 => (25 * (l - 30), 0, 255),
        41..=50 => (25 * (50 - l), 25 * (l - 40), 255),
        51..=60 => (25 * (l - 50), 255, 25 * (60 - l)),
        61..=70 => (255, 255, 25 * (l - 60)),
        _ => (25 * (80 - l), 25 * (80 - l), 25 * (80 - l)),
    };
    Rgb([c(r), c(g), c(b)])
}

/// Draw the outline of a box.
pub fn draw_box(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    if !bbox.is_resolved() {
        return;
    }
    let (w, h) = (bbox.width() as u32, bbox.height() as u32);
    draw_hollow_rect_mut(image, Rect::at(bbox.x_start, bbox.y_start).of_size(w, h), color);
}

/// Render `current` over `previous`, painting every changed pixel red.
pub fn change_layer(previous: &Bitmap, current: &Bitmap) -> RgbImage {
    RgbImage::from_fn(previous.width(), previous.height(), |x, y| {
        let (x, y) = (x as i32, y as i32);
        let before = previous.is_black(x, y);
        if before != current.is_black(x, y) {
            Rgb([255, 0, 0])
        } else if before {
            Rgb([0, 0, 0])
        } else {
            Rgb([255, 255, 255])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transparent_pixels_are_background() {
        assert_eq!(intensity(Rgba([0, 0, 0, 0])), 255);
        assert_eq!(intensity(Rgba([0, 0, 0, 255])), 0);
        assert_eq!(intensity(Rgba([30, 60, 90, 255])), 60);
    }

    #[test]
    fn projection_counts_rows_and_columns() {
        let mut bitmap = Bitmap::new(5, 4);
        bitmap.fill_rect(0, 1, 4, 1, true);
        bitmap.set(2, 3, true);
        assert_eq!(project(&bitmap, Axis::Rows), vec![0, 5, 0, 1]);
        assert_eq!(project(&bitmap, Axis::Columns), vec![1, 1, 2, 1, 1]);
    }

    #[test]
    fn label_ramp_is_cyclic() {
        assert_eq!(label_color(0), Rgb([0, 0, 0]));
        assert_eq!(label_color(10), Rgb([250, 0, 0]));
        assert_eq!(label_color(15), label_color(95));
        assert_eq!(label_color(75), Rgb([125, 125, 125]));
    }
}
