//! Connected-component labeling.
//!
//! Two raster passes over the binary image: the first assigns provisional
//! labels from the causal neighbourhood and records which labels touch, the
//! second rewrites every label to the smallest member of its equivalence set.
//! Bounding boxes are then derived from the resolved matrix.

use std::collections::BTreeMap;

use tracing::debug;

use crate::bbox::BoundingBox;
use crate::raster::Bitmap;

// ─── Equivalences ───────────────────────────────────────────────────

/// Disjoint sets of raw labels, kept as a union-find forest.
///
/// Each root remembers the smallest label in its set, so the representative
/// of a label is independent of the order unions happened in.
#[derive(Debug, Clone, Default)]
pub struct EquivalenceSets {
    parent: Vec<u32>,
    size: Vec<u32>,
    min: Vec<u32>,
}

impl EquivalenceSets {
    pub fn new() -> Self {
        // Slot 0 is the background label and never takes part in a union.
        Self {
            parent: vec![0],
            size: vec![1],
            min: vec![0],
        }
    }

    /// Allocate a fresh label in its own singleton set.
    pub fn make_label(&mut self) -> u32 {
        let label = self.parent.len() as u32;
        self.parent.push(label);
        self.size.push(1);
        self.min.push(label);
        label
    }

    /// Number of labels handed out (background excluded).
    pub fn label_count(&self) -> usize {
        self.parent.len() - 1
    }

    fn root(&mut self, label: u32) -> u32 {
        let mut root = label;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        let mut node = label;
        while self.parent[node as usize] != root {
            let next = self.parent[node as usize];
            self.parent[node as usize] = root;
            node = next;
        }
        root
    }

    /// Record that `a` and `b` belong to the same region.
    pub fn union(&mut self, a: u32, b: u32) {
        let (ra, rb) = (self.root(a), self.root(b));
        if ra == rb {
            return;
        }
        let (big, small) = if self.size[ra as usize] >= self.size[rb as usize] {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[small as usize] = big;
        self.size[big as usize] += self.size[small as usize];
        self.min[big as usize] = self.min[big as usize].min(self.min[small as usize]);
    }

    /// Smallest label in the set containing `label`.
    pub fn representative(&mut self, label: u32) -> u32 {
        if label == 0 || label as usize >= self.parent.len() {
            return label;
        }
        let root = self.root(label);
        self.min[root as usize]
    }

    /// Every set with more than one member, each sorted ascending, ordered by
    /// their smallest member.
    pub fn sets(&mut self) -> Vec<Vec<u32>> {
        let mut by_rep: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for label in 1..self.parent.len() as u32 {
            let rep = self.representative(label);
            by_rep.entry(rep).or_default().push(label);
        }
        by_rep.into_values().filter(|s| s.len() > 1).collect()
    }
}

// ─── Component matrix ───────────────────────────────────────────────

/// Pixel → label grid, 0 for background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentMatrix {
    width: u32,
    height: u32,
    labels: Vec<u32>,
}

impl ComponentMatrix {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            labels: vec![0; width as usize * height as usize],
        }
    }

    #[cfg(test)]
    pub(crate) fn from_labels(width: u32, height: u32, labels: Vec<u32>) -> Self {
        debug_assert_eq!(labels.len(), width as usize * height as usize);
        Self {
            width,
            height,
            labels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Label at a pixel; out-of-range reads as background.
    pub fn label_at(&self, x: i32, y: i32) -> u32 {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return 0;
        }
        self.labels[y as usize * self.width as usize + x as usize]
    }

    fn set(&mut self, x: i32, y: i32, label: u32) {
        let i = y as usize * self.width as usize + x as usize;
        self.labels[i] = label;
    }

    /// Distinct non-zero labels present, ascending.
    pub fn distinct_labels(&self) -> Vec<u32> {
        let mut seen: Vec<u32> = self.labels.iter().copied().filter(|&l| l != 0).collect();
        seen.sort_unstable();
        seen.dedup();
        seen
    }
}

// ─── Passes ─────────────────────────────────────────────────────────

/// Output of the first pass: provisional labels plus discovered equivalences.
#[derive(Debug, Clone)]
pub struct Labeling {
    pub matrix: ComponentMatrix,
    pub equivalences: EquivalenceSets,
}

/// Assign provisional labels looking at the up-left, up, up-right and left
/// neighbours of every foreground pixel.
pub fn label_components(bitmap: &Bitmap) -> Labeling {
    let (w, h) = (bitmap.width() as i32, bitmap.height() as i32);
    let mut matrix = ComponentMatrix::new(bitmap.width(), bitmap.height());
    let mut equivalences = EquivalenceSets::new();

    for y in 0..h {
        for x in 0..w {
            if !bitmap.is_black(x, y) {
                continue;
            }
            let neighbours = [
                matrix.label_at(x - 1, y - 1),
                matrix.label_at(x, y - 1),
                matrix.label_at(x + 1, y - 1),
                matrix.label_at(x - 1, y),
            ];
            let smallest = neighbours.iter().copied().filter(|&l| l != 0).min();
            match smallest {
                None => {
                    let label = equivalences.make_label();
                    matrix.set(x, y, label);
                }
                Some(label) => {
                    matrix.set(x, y, label);
                    for &other in &neighbours {
                        if other != 0 && other != label {
                            equivalences.union(label, other);
                        }
                    }
                }
            }
        }
    }

    debug!(labels = equivalences.label_count(), "first labeling pass done");
    Labeling {
        matrix,
        equivalences,
    }
}

/// Rewrite every label to the representative of its equivalence set.
pub fn resolve_equivalences(labeling: &mut Labeling) {
    let eq = &mut labeling.equivalences;
    for label in labeling.matrix.labels.iter_mut() {
        if *label != 0 {
            *label = eq.representative(*label);
        }
    }
}

/// One box per resolved label, ordered by label, spanning the label's exact
/// min/max row and column.
pub fn bounding_boxes(matrix: &ComponentMatrix) -> Vec<BoundingBox> {
    let mut boxes: BTreeMap<u32, BoundingBox> = BTreeMap::new();
    for y in 0..matrix.height as i32 {
        for x in 0..matrix.width as i32 {
            let label = matrix.label_at(x, y);
            if label == 0 {
                continue;
            }
            let b = boxes
                .entry(label)
                .or_insert_with(|| BoundingBox::with_label(x, y, x, y, label));
            b.x_start = b.x_start.min(x);
            b.y_start = b.y_start.min(y);
            b.x_end = b.x_end.max(x);
            b.y_end = b.y_end.max(y);
        }
    }
    boxes.into_values().filter(BoundingBox::is_resolved).collect()
}
