use tracing::debug;

use crate::bbox::BoundingBox;
use crate::raster::Bitmap;

use super::{StaffLayout, VerticalLines};

/// How far a bar line's ends may sit from the outer staff lines.
const BAR_ALIGNMENT: i32 = 3;

/// Share of a neighbouring column that must be black for it to widen a line.
const COLUMN_FILL: f64 = 0.6;

/// A candidate stroke: its core run plus the columns it grew by.
struct Stroke {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
    left: i32,
    right: i32,
}

impl Stroke {
    fn outer_left(&self) -> i32 {
        self.x - self.left
    }

    fn outer_right(&self) -> i32 {
        self.x + self.width + self.right - 1
    }

    fn bounds(&self) -> BoundingBox {
        BoundingBox::new(self.outer_left(), self.y, self.outer_right(), self.y + self.height - 1)
    }

    fn core(&self) -> BoundingBox {
        BoundingBox::new(self.x, self.y, self.x + self.width - 1, self.y + self.height - 1)
    }
}

struct Scanner<'a> {
    bitmap: &'a mut Bitmap,
    layout: &'a StaffLayout,
    spacing: i32,
    distortion: i32,
}

impl Scanner<'_> {
    /// Height of the stroke starting at (`x`, `y`), tolerating pixels that
    /// drift sideways and short gaps.
    fn measure_height(&self, x: i32, y: i32, width: i32) -> i32 {
        let b = &*self.bitmap;
        let mut height = 0;
        let mut off = 0;
        let mut gap = 0;
        while off < self.spacing && gap < self.spacing / 6 {
            height += 1;
            let row = y + height;
            let mut found = false;
            if (x..x + width).any(|k| b.is_black(k, row)) {
                found = true;
                off = 0;
                gap = 0;
            }
            if !found {
                found = (x - self.distortion..x).any(|k| b.is_black(k, row))
                    || (x + width..x + width - 1 + self.distortion).any(|k| b.is_black(k, row));
            }
            if found {
                off += 1;
            } else {
                gap += 1;
            }
        }
        height - 1
    }

    fn column_filled(&self, x: i32, y: i32, height: i32) -> bool {
        let count = (y..y + height).filter(|&k| self.bitmap.is_black(x, k)).count();
        count as f64 > COLUMN_FILL * height as f64
    }

    /// Grow the stroke sideways over nearly full columns.
    fn widen(&self, stroke: &mut Stroke) {
        while self.column_filled(stroke.x - stroke.left - 1, stroke.y, stroke.height) {
            stroke.left += 1;
        }
        while self.column_filled(stroke.x + stroke.width + stroke.right, stroke.y, stroke.height) {
            stroke.right += 1;
        }
    }

    fn is_bar_line(&self, stroke: &Stroke) -> bool {
        let top = stroke.y;
        let bottom = stroke.y + stroke.height - 1;
        let starts = self
            .layout
            .staves
            .iter()
            .any(|s| (top - s.top()).abs() <= BAR_ALIGNMENT);
        let ends = self
            .layout
            .staves
            .iter()
            .any(|s| (bottom - s.bottom()).abs() <= BAR_ALIGNMENT);
        if !(starts && ends) {
            return false;
        }

        // A stem with a note head attached has dense pixels right next to it.
        let b = &*self.bitmap;
        let threshold = self.spacing / 2;
        let dense_rows = (top - self.spacing..bottom + 1 + self.spacing)
            .filter(|&row| {
                let mut pixels = 0;
                let mut gap = 0;
                for m in stroke.outer_left() - 1 - threshold * 2..stroke.outer_left() {
                    if b.is_black(m, row) {
                        pixels += 1;
                    } else {
                        gap += 1;
                    }
                    if gap > self.distortion {
                        break;
                    }
                }
                gap = 0;
                let right = stroke.outer_right() + 1;
                for m in right..right + threshold * 2 {
                    if b.is_black(m, row) {
                        pixels += 1;
                    } else {
                        gap += 1;
                    }
                    if gap > self.distortion {
                        break;
                    }
                }
                pixels > threshold
            })
            .count() as i32;
        dense_rows <= self.spacing / 2
    }

    /// Left edge of the staff line closest to `y`.
    fn staff_start_near(&self, y: i32) -> Option<i32> {
        let mut closest: Option<&BoundingBox> = None;
        for line in self.layout.lines() {
            if closest.map_or(true, |c| (y - line.y()).abs() < (y - c.y()).abs()) {
                closest = Some(line);
            }
        }
        closest.map(|l| l.x_start)
    }

    /// Erase the stroke, keeping rows where a symbol touches it and putting
    /// back short erased runs.
    fn erase(&mut self, stroke: &Stroke) {
        let d = self.distortion;
        let (left, right) = (stroke.outer_left(), stroke.outer_right());
        let mut consecutive = 0;
        for row in stroke.y..stroke.y + stroke.height {
            let b = &*self.bitmap;
            let touched = (b.is_black(left - 1, row) && b.is_black(left - d, row))
                || (b.is_black(right + 1, row) && b.is_black(right + d, row));
            if !touched {
                for k in left - d..=right + d {
                    self.bitmap.set(k, row, false);
                }
                consecutive += 1;
                continue;
            }
            if consecutive < self.spacing / 4
                || (consecutive < self.spacing / 2 && stroke.height < 3 * self.spacing)
            {
                for m in row - consecutive..row {
                    for k in left..=right {
                        self.bitmap.set(k, m, true);
                    }
                }
            }
            consecutive = 0;
        }
    }
}

/// Insert `bar` keeping bars of one system left to right.
fn insert_bar(bars: &mut Vec<BoundingBox>, bar: BoundingBox, spacing: i32) {
    let mut index = bars.len();
    while index > 0 {
        let prev = &bars[index - 1];
        if bar.y_start - prev.y_start > spacing || prev.x_end < bar.x_start {
            break;
        }
        index -= 1;
    }
    bars.insert(index, bar);
}

/// Find and erase stems and bar lines.
///
/// Runs on the bitmap left by staff-line removal. Strokes narrower than a
/// third of the spacing and taller than 2.2 spacings qualify. Strokes that
/// span a stave top to bottom and stand free are bar lines; other strokes
/// left of the clef/key/time area are dropped without being recorded.
pub fn remove_vertical_lines(
    bitmap: &mut Bitmap,
    layout: &StaffLayout,
    distortion: i32,
) -> VerticalLines {
    let mut found = VerticalLines::default();
    let spacing = layout.spacing;
    if layout.is_empty() || spacing <= 0 {
        return found;
    }
    let min_height = (2.2 * spacing as f64) as i32;
    let max_width = spacing / 3;
    let (w, h) = (bitmap.width() as i32, bitmap.height() as i32);
    let mut scanner = Scanner {
        bitmap,
        layout,
        spacing,
        distortion,
    };

    for y in 0..h {
        let mut x = 0;
        while x < w {
            if !scanner.bitmap.is_black(x, y) {
                x += 1;
                continue;
            }
            let mut width = 1;
            while scanner.bitmap.is_black(x + width, y) {
                width += 1;
            }
            if width > max_width {
                x += 1;
                continue;
            }
            let height = scanner.measure_height(x, y, width);
            if height < min_height {
                x += 1;
                continue;
            }
            let mut stroke = Stroke {
                x,
                y,
                width,
                height,
                left: 0,
                right: 0,
            };
            scanner.widen(&mut stroke);
            if width + stroke.left + stroke.right > max_width {
                x += 1;
                continue;
            }

            if scanner.is_bar_line(&stroke) {
                debug!(x, y, height, "bar line");
                insert_bar(&mut found.bar_lines, stroke.core(), spacing);
            } else {
                let staff_start = scanner.staff_start_near(y).unwrap_or(0);
                if x < staff_start + 4 * spacing {
                    x += 1;
                    continue;
                }
            }
            found.lines.push(stroke.bounds());
            scanner.erase(&stroke);
            x += width + stroke.right + 1;
        }
    }

    debug!(
        bar_lines = found.bar_lines.len(),
        vertical_lines = found.lines.len(),
        "vertical line scan done"
    );
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{project, Axis};
    use crate::lines::remove_staff_lines;

    /// One stave at rows 60..108 (spacing 12), two bar lines and a stem.
    fn page() -> (Bitmap, StaffLayout) {
        let mut bitmap = Bitmap::new(600, 200);
        for y in [60, 72, 84, 96, 108] {
            bitmap.fill_rect(20, y, 579, y + 1, true);
        }
        bitmap.fill_rect(300, 60, 301, 109, true);
        bitmap.fill_rect(578, 60, 579, 109, true);
        // quarter note: head plus stem going up
        bitmap.fill_rect(100, 78, 113, 89, true);
        bitmap.fill_rect(112, 42, 113, 89, true);
        let histogram = project(&bitmap, Axis::Rows);
        let layout = remove_staff_lines(&mut bitmap, &histogram, 300, 2).unwrap();
        (bitmap, layout)
    }

    #[test]
    fn bars_and_stems_are_told_apart() {
        let (mut bitmap, layout) = page();
        assert_eq!(layout.spacing, 12);
        let found = remove_vertical_lines(&mut bitmap, &layout, 2);

        assert_eq!(
            found.bar_lines,
            vec![
                BoundingBox::new(300, 60, 301, 109),
                BoundingBox::new(578, 60, 579, 109),
            ]
        );
        assert!(found.lines.contains(&BoundingBox::new(112, 42, 113, 89)));

        // the stem above the head is gone, the head is intact
        assert!(!bitmap.is_black(112, 50));
        assert!(bitmap.is_black(112, 85));
        assert!(bitmap.is_black(100, 78));
        // bar lines are erased
        assert!(!bitmap.is_black(300, 80));
    }

    #[test]
    fn strokes_before_the_clef_area_are_dropped() {
        let (mut bitmap, layout) = page();
        bitmap.fill_rect(30, 30, 31, 70, true);
        let found = remove_vertical_lines(&mut bitmap, &layout, 2);
        assert!(found.lines.iter().all(|l| l.x_start > 40));
        assert!(bitmap.is_black(30, 40));
    }

    #[test]
    fn bars_are_ordered_per_system() {
        let mut bars = Vec::new();
        // scan order: a bar starting one row lower is found after one further right
        insert_bar(&mut bars, BoundingBox::new(300, 60, 301, 109), 12);
        insert_bar(&mut bars, BoundingBox::new(200, 61, 201, 109), 12);
        insert_bar(&mut bars, BoundingBox::new(100, 200, 101, 249), 12);
        let xs: Vec<i32> = bars.iter().map(|b| b.x_start).collect();
        assert_eq!(xs, vec![200, 300, 100]);
    }
}
