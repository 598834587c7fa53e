//! Line removal: staff lines, stems and bar lines.
//!
//! Three passes share the metadata defined here:
//!
//! 1. [`remove_staff_lines`] strips the horizontal staff lines and groups
//!    them into [`Stave`]s, deriving the inter-line spacing.
//! 2. [`remove_vertical_lines`] strips stems and bar lines, classifying the
//!    latter.
//! 3. [`patch`] reconnects symbols that the first pass cut in two.

mod patch;
mod staff;
mod vertical;

use serde::Serialize;

use crate::bbox::BoundingBox;

pub use patch::patch;
pub use staff::{find_staff_bands, remove_staff_lines};
pub use vertical::remove_vertical_lines;

/// Five staff lines, top to bottom, sharing one left edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stave {
    pub lines: [BoundingBox; 5],
}

impl Stave {
    /// Staff line `i` (0 = top).
    pub fn line(&self, i: usize) -> &BoundingBox {
        &self.lines[i]
    }

    /// Common left edge of the five lines.
    pub fn x_start(&self) -> i32 {
        self.lines[0].x_start
    }

    /// Vertical centre of the top line.
    pub fn top(&self) -> i32 {
        self.lines[0].y()
    }

    /// Vertical centre of the bottom line.
    pub fn bottom(&self) -> i32 {
        self.lines[4].y()
    }
}

/// Everything staff-line removal learns about the page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StaffLayout {
    pub staves: Vec<Stave>,
    /// Mean distance between adjacent staff lines, in pixels
    pub spacing: i32,
}

impl StaffLayout {
    /// Every staff line on the page, top to bottom.
    pub fn lines(&self) -> impl Iterator<Item = &BoundingBox> {
        self.staves.iter().flat_map(|s| s.lines.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.staves.is_empty()
    }
}

/// Vertical strokes found by [`remove_vertical_lines`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerticalLines {
    /// Bar lines, left to right within each system, systems top to bottom
    pub bar_lines: Vec<BoundingBox>,
    /// Every kept vertical stroke (bar lines included) in scan order
    pub lines: Vec<BoundingBox>,
}
