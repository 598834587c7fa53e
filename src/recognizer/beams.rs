//! Shape tests on component subimages: straight thick strokes, peak
//! counting, and the search for a second beam next to a stem.

use std::collections::HashMap;

use crate::bbox::BoundingBox;
use crate::geometry::{project, Axis};
use crate::model::BeamRole;
use crate::raster::Bitmap;

/// Share of the orthogonal extent a projection value must exceed to peak.
const PEAK_FILL: f64 = 0.8;

/// True if the symbol contains many parallel, nearly full straight lines.
///
/// Every line from a point on the left edge to a point on the right edge
/// is sampled; lines missing fewer than a quarter spacing of pixels are
/// counted per slope, and a slope that gathers enough of them makes a beam.
pub fn is_beam(symbol: &Bitmap, spacing: i32) -> bool {
    let (w, h) = (symbol.width() as i32, symbol.height() as i32);
    if w == 0 {
        return false;
    }
    let mut per_slope: HashMap<i32, i32> = HashMap::new();
    for i in 0..h {
        for j in 0..h {
            let slope = (j - i) as f64 / w as f64;
            let pixels = (0..w)
                .filter(|&k| symbol.is_black(k, (slope * k as f64 + i as f64) as i32))
                .count() as i32;
            if pixels > w - spacing / 4 {
                *per_slope.entry(j - i).or_insert(0) += 1;
            }
        }
    }
    per_slope
        .values()
        .any(|&lines| lines > h / 3 || lines > spacing / 4)
}

/// Number of distinct peaks in the symbol's projection along `axis`.
///
/// A peak is a value above 80% of the orthogonal extent, either at index 0
/// or rising from below the bar more than `tolerance` after the previous one.
pub fn count_peaks(symbol: &Bitmap, axis: Axis, tolerance: i32) -> usize {
    let projection = project(symbol, axis);
    let extent = match axis {
        Axis::Rows => symbol.width(),
        Axis::Columns => symbol.height(),
    };
    let bar = PEAK_FILL * extent as f64;
    let above = |v: u32| v as f64 > bar;

    let mut peaks = 0;
    let mut last_peak = -tolerance;
    for (x, &value) in projection.iter().enumerate() {
        let x = x as i32;
        if !above(value) {
            continue;
        }
        let rising = x == 0 || (!above(projection[x as usize - 1]) && x - last_peak > tolerance);
        if rising {
            peaks += 1;
            last_peak = x;
        }
    }
    peaks
}

/// Columns of `projection` in a window that exceed `lower`.
///
/// The window starts at `from` and walks by `step` while strictly inside
/// `limit`; indices past the end are clamped to the last column.
fn filled_columns(projection: &[u32], from: i32, limit: f64, step: i32, lower: i32) -> i32 {
    let len = projection.len() as i32;
    let mut filled = 0;
    let mut n = from;
    loop {
        let inside = if step < 0 {
            n as f64 > limit && n >= 0
        } else {
            (n as f64) < limit && n < len
        };
        if !inside {
            break;
        }
        if n >= len {
            n = len - 1;
        }
        if n >= 0 && projection[n as usize] as i32 > lower {
            filled += 1;
        }
        n += step;
    }
    filled
}

/// Look for a second beam level alongside `beam` at `stem`.
///
/// `beam_image` is the beam's own subimage. A thick run just left of the
/// stem means a backward hook, becoming an end if it carries on well past
/// one spacing; a run to the right continues a left run, or else is a
/// forward hook, becoming a begin if it carries on.
pub fn find_second_beam(
    beam_image: &Bitmap,
    beam: &BoundingBox,
    stem: &BoundingBox,
    spacing: i32,
) -> Option<BeamRole> {
    let projection = project(beam_image, Axis::Columns);
    if projection.is_empty() {
        return None;
    }
    let lower = spacing - spacing / 3;
    let needed = 4 * spacing / 5;
    let s = spacing as f64;
    let at = stem.x() - beam.x_start;
    let at_f = at as f64;

    let mut role = None;
    if filled_columns(&projection, at, at_f - 1.5 * s, -1, lower) > needed {
        role = Some(BeamRole::BackwardHook);
        if filled_columns(&projection, at - spacing, at_f - 2.5 * s, -1, lower) > needed {
            role = Some(BeamRole::End);
        }
    }

    if filled_columns(&projection, at, at_f + 1.5 * s, 1, lower) > needed {
        if role.is_some() {
            role = Some(BeamRole::Continue);
        } else {
            role = Some(BeamRole::ForwardHook);
            if filled_columns(&projection, at + spacing, at_f + 2.5 * s, 1, lower) > needed {
                role = Some(BeamRole::Begin);
            }
        }
    }
    role
}

/// Whether `line` could be the stem of `symbol`.
pub fn is_stem_for(symbol: &BoundingBox, line: &BoundingBox, spacing: i32) -> bool {
    let y = symbol.y();
    (line.x() - symbol.x()).abs() < spacing
        && ((y < line.y_end + spacing && y > line.y_start)
            || (y > line.y_start - spacing && y < line.y_end))
}

/// A beam found on the page, or a short hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeamShape {
    pub bbox: BoundingBox,
    pub hook: bool,
}

/// First-level beam roles of a note head, one per beam reached through a
/// stem, plus the last beam and stem that produced a role.
pub fn beam_roles(
    head: &BoundingBox,
    beams: &[BeamShape],
    lines: &[BoundingBox],
    spacing: i32,
) -> (Vec<BeamRole>, Option<(BoundingBox, BoundingBox)>) {
    let mut roles = Vec::new();
    let mut last = None;
    for beam in beams {
        let b = &beam.bbox;
        for line in lines {
            if !is_stem_for(head, line, spacing)
                || b.y_end <= line.y_start - spacing / 2
                || b.y_start >= line.y_end + spacing / 2
            {
                continue;
            }
            let x = line.x();
            let role = if (x - b.x_start).abs() < spacing {
                Some(if beam.hook { BeamRole::ForwardHook } else { BeamRole::Begin })
            } else if (x - b.x_end).abs() < spacing {
                Some(if beam.hook { BeamRole::BackwardHook } else { BeamRole::End })
            } else if b.x_start < x && b.x_end > x {
                Some(BeamRole::Continue)
            } else {
                None
            };
            if let Some(role) = role {
                roles.push(role);
                last = Some((*b, *line));
                break;
            }
        }
    }
    (roles, last)
}
