use tracing::{error, info};

use crate::bbox::BoundingBox;
use crate::error::PipelineError;
use crate::raster::Bitmap;

use super::{StaffLayout, Stave};

/// Row bands whose projection stays above `threshold`, as inclusive
/// `(top, bottom)` pairs. The first and last `distortion` rows are skipped.
pub fn find_staff_bands(histogram: &[u32], threshold: u32, distortion: i32) -> Vec<(i32, i32)> {
    let len = histogram.len() as i32;
    let above = |row: i32| row < len && histogram[row as usize] > threshold;
    let mut bands = Vec::new();
    let mut row = distortion.max(0);
    while row < len - distortion {
        if above(row) {
            let mut bottom = row + 1;
            while above(bottom) {
                bottom += 1;
            }
            bottom -= 1;
            bands.push((row, bottom));
            row = bottom + 1;
        } else {
            row += 1;
        }
    }
    bands
}

/// Erase one staff-line band column by column, skipping columns where a
/// symbol crosses the line. Returns the band's box.
fn erase_band(bitmap: &mut Bitmap, top: i32, bottom: i32, distortion: i32) -> BoundingBox {
    let width = bitmap.width() as i32;
    let mut beginning = -1;
    let mut end = -1;
    let mut columns_cleared = 0;

    for x in 0..width {
        let crossed = (bitmap.is_black(x, top - 1) && bitmap.is_black(x, bottom + 1))
            || bitmap.is_black(x, top - distortion)
            || bitmap.is_black(x, bottom + distortion);
        if crossed {
            continue;
        }
        columns_cleared += 1;
        for y in top - distortion..=bottom + distortion {
            if bitmap.is_black(x, y) {
                bitmap.set(x, y, false);
                if beginning < 0 && columns_cleared > 5 {
                    beginning = x;
                }
                end = x;
            }
        }
    }

    if beginning < 0 || end < beginning {
        // Nothing was erased; fall back to the band's own extent.
        let black: Vec<i32> = (0..width)
            .filter(|&x| (top..=bottom).any(|y| bitmap.is_black(x, y)))
            .collect();
        beginning = black.first().copied().unwrap_or(0);
        end = black.last().copied().unwrap_or(width - 1);
    }
    BoundingBox::new(beginning, top, end, bottom)
}

/// Remove staff lines in place and group them into staves.
///
/// `histogram` is the row projection of the image before removal. Fails
/// with [`PipelineError::StaffLineCount`] when the number of lines found is
/// not a multiple of five; the bitmap must then be discarded by the caller.
pub fn remove_staff_lines(
    bitmap: &mut Bitmap,
    histogram: &[u32],
    threshold: u32,
    distortion: i32,
) -> Result<StaffLayout, PipelineError> {
    let lines: Vec<BoundingBox> = find_staff_bands(histogram, threshold, distortion)
        .into_iter()
        .map(|(top, bottom)| erase_band(bitmap, top, bottom, distortion))
        .collect();
    info!(count = lines.len(), "staff lines found");

    if lines.len() % 5 != 0 {
        error!(found = lines.len(), "number of staff lines must be divisible by 5");
        return Err(PipelineError::StaffLineCount { found: lines.len() });
    }
    if lines.is_empty() {
        return Ok(StaffLayout::default());
    }

    let staves_found = (lines.len() / 5) as i32;
    let sum: i32 = lines.chunks(5).map(|c| c[4].y() - c[0].y()).sum();
    let spacing = sum / staves_found / 4;

    let staves: Vec<Stave> = lines
        .chunks(5)
        .map(|chunk| {
            let x_start = chunk.iter().map(|l| l.x_start).max().unwrap_or(0);
            let mut five = [chunk[0], chunk[1], chunk[2], chunk[3], chunk[4]];
            for line in five.iter_mut() {
                line.x_start = x_start;
            }
            Stave { lines: five }
        })
        .collect();

    info!(staves = staves.len(), spacing, "staves grouped");
    Ok(StaffLayout { staves, spacing })
}
