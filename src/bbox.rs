//! Axis-aligned component boxes and the scoped subimage cache.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cca::ComponentMatrix;
use crate::raster::Bitmap;

/// Inclusive pixel rectangle plus the component label it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_start: i32,
    pub y_start: i32,
    pub x_end: i32,
    pub y_end: i32,
    /// Label assigned by connected-component analysis (0 when not a component)
    pub label: u32,
}

impl BoundingBox {
    pub fn new(x_start: i32, y_start: i32, x_end: i32, y_end: i32) -> Self {
        Self::with_label(x_start, y_start, x_end, y_end, 0)
    }

    pub fn with_label(x_start: i32, y_start: i32, x_end: i32, y_end: i32, label: u32) -> Self {
        Self {
            x_start,
            y_start,
            x_end,
            y_end,
            label,
        }
    }

    pub fn width(&self) -> i32 {
        self.x_end - self.x_start + 1
    }

    pub fn height(&self) -> i32 {
        self.y_end - self.y_start + 1
    }

    /// Horizontal midpoint.
    pub fn x(&self) -> i32 {
        (self.x_start + self.x_end) / 2
    }

    /// Vertical midpoint.
    pub fn y(&self) -> i32 {
        (self.y_start + self.y_end) / 2
    }

    /// A box is publishable once every bound is set and ordered.
    pub fn is_resolved(&self) -> bool {
        self.x_start >= 0
            && self.y_start >= 0
            && self.x_end >= 0
            && self.y_end >= 0
            && self.x_start <= self.x_end
            && self.y_start <= self.y_end
    }

    /// Smallest box covering both; keeps this box's label.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::with_label(
            self.x_start.min(other.x_start),
            self.y_start.min(other.y_start),
            self.x_end.max(other.x_end),
            self.y_end.max(other.y_end),
            self.label,
        )
    }
}

/// Identity of one buffer produced by the stage machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// Per-stage cache of component subimages.
///
/// Entries are keyed by label and rectangle; the whole cache is tied to one
/// buffer and is emptied when asked to serve a different one.
#[derive(Debug)]
pub struct SubimageCache {
    buffer: BufferId,
    entries: HashMap<(u32, BoundingBox), Bitmap>,
}

impl SubimageCache {
    pub fn new(buffer: BufferId) -> Self {
        Self {
            buffer,
            entries: HashMap::new(),
        }
    }

    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    /// Point the cache at another buffer, dropping every entry if it changed.
    pub fn rebind(&mut self, buffer: BufferId) {
        if buffer != self.buffer {
            self.entries.clear();
            self.buffer = buffer;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The box's pixels that carry its label, as a bitmap the size of the box.
    pub fn subimage(&mut self, bbox: &BoundingBox, components: &ComponentMatrix) -> &Bitmap {
        self.entries
            .entry((bbox.label, *bbox))
            .or_insert_with(|| extract(bbox, components))
    }
}

fn extract(bbox: &BoundingBox, components: &ComponentMatrix) -> Bitmap {
    let mut sub = Bitmap::new(bbox.width().max(0) as u32, bbox.height().max(0) as u32);
    for j in 0..bbox.height() {
        for i in 0..bbox.width() {
            if components.label_at(bbox.x_start + i, bbox.y_start + j) == bbox.label {
                sub.set(i, j, true);
            }
        }
    }
    sub
}
