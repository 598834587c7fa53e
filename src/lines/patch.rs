use tracing::info;

use crate::bbox::BoundingBox;
use crate::raster::Bitmap;

use super::StaffLayout;

/// Where a traced path between two staff lines ended.
struct Path {
    end_x: i32,
    end_y: i32,
    left_moves: i32,
}

/// Follow foreground pixels in `original` from just below `upper` down to
/// just above `lower`, allowing sideways steps.
fn trace(
    original: &Bitmap,
    x: i32,
    upper: &BoundingBox,
    lower: &BoundingBox,
    spacing: i32,
) -> Option<Path> {
    let target = lower.y_start - 1;
    let (mut x, mut y) = (x, upper.y_end + 1);
    let mut left_moves = 0;

    for _ in 0..spacing * 2 {
        let down = [0, -1, 1].into_iter().find(|&dx| original.is_black(x + dx, y + 1));
        match down {
            Some(dx) => {
                x += dx;
                y += 1;
                if dx == -1 {
                    left_moves += 1;
                }
            }
            None => {
                let side = [-1, 1].into_iter().find(|&dx| original.is_black(x + dx, y))?;
                x += side;
                if side == -1 {
                    left_moves += 1;
                }
            }
        }
        if y == target {
            return Some(Path {
                end_x: x,
                end_y: y,
                left_moves,
            });
        }
    }
    None
}

/// Reconnect symbols cut in two by staff-line removal.
///
/// For each pair of adjacent staff lines, columns where a symbol leaves the
/// upper line are traced through `original` (the deskewed image, lines still
/// present). Two neighbouring paths that drift left and end close together
/// bracket a symbol that crossed both lines; the line bands between them are
/// filled back in. A path ending in a straight vertical run is taken for a
/// flat's stem and skipped, unless a long recorded vertical line confirms a
/// note stem.
pub fn patch(
    bitmap: &mut Bitmap,
    original: &Bitmap,
    layout: &StaffLayout,
    vertical_lines: &[BoundingBox],
) {
    let spacing = layout.spacing;
    let lines: Vec<BoundingBox> = layout.lines().copied().collect();
    let mut patches = 0;

    for pair in lines.windows(2) {
        let (upper, lower) = (&pair[0], &pair[1]);
        let mut last: Option<(i32, i32, i32)> = None;

        for j in upper.x_start + 5..=upper.x_end - 5 {
            if !bitmap.is_black(j, upper.y_end + 1) {
                continue;
            }
            let Some(path) = trace(original, j, upper, lower, spacing) else {
                continue;
            };

            let straight =
                (upper.y_end + 1..=path.end_y).all(|l| bitmap.is_black(path.end_x, l));
            if straight {
                let stem = vertical_lines.iter().any(|vl| {
                    (vl.x() - path.end_x).abs() < spacing / 5
                        && path.end_y >= vl.y_start
                        && path.end_y <= vl.y_end
                        && vl.height() > 3 * spacing
                });
                if !stem {
                    continue;
                }
            }

            if let Some((top, bottom, left_moves)) = last {
                let dx_top = j - top;
                let dx_bottom = path.end_x - bottom;
                if left_moves > spacing / 4
                    && dx_top > 1
                    && (dx_top as f64) < spacing as f64 * 1.5
                    && dx_bottom > 1
                    && (dx_bottom as f64) < spacing as f64 * 1.2
                {
                    bitmap.fill_rect(top, upper.y_start - 1, j, upper.y_end + 1, true);
                    bitmap.fill_rect(bottom, lower.y_start - 1, path.end_x, lower.y_end + 1, true);
                    patches += 1;
                }
            }
            last = Some((j, path.end_x, path.left_moves));
        }
    }

    info!(patches, "patched up");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lines::Stave;

    fn layout() -> StaffLayout {
        let lines = [20, 30, 40, 50, 60].map(|y| BoundingBox::new(10, y, 189, y));
        StaffLayout {
            staves: vec![Stave { lines }],
            spacing: 10,
        }
    }

    #[test]
    fn path_follows_diagonal_stroke() {
        let mut original = Bitmap::new(200, 100);
        for k in 0..9 {
            original.set(60 - k, 21 + k, true);
        }
        let l = layout();
        let path = trace(&original, 60, l.staves[0].line(0), l.staves[0].line(1), 10).unwrap();
        assert_eq!((path.end_x, path.end_y), (52, 29));
        assert_eq!(path.left_moves, 8);
    }

    #[test]
    fn dead_end_gives_no_path() {
        let mut original = Bitmap::new(200, 100);
        original.fill_rect(60, 21, 73, 25, true);
        let l = layout();
        assert!(trace(&original, 60, l.staves[0].line(0), l.staves[0].line(1), 10).is_none());
    }

    #[test]
    fn isolated_columns_are_not_patched() {
        let mut original = Bitmap::new(200, 100);
        original.fill_rect(100, 15, 101, 35, true);
        let mut bitmap = original.clone();
        bitmap.fill_rect(0, 30, 199, 30, false);
        let before = bitmap.clone();
        patch(&mut bitmap, &original, &layout(), &[]);
        assert_eq!(bitmap, before);
    }
}
