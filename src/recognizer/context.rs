//! Classification context: what earlier rules found, and the key and
//! accidental state that scopes to a system, a bar or the whole page.

use std::collections::HashMap;

use crate::bbox::BoundingBox;
use crate::model::{Accidental, ClefKind, NoteType, Step, TieType};

use super::beams::BeamShape;

/// Spacing-derived constants shared by every rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metrics {
    /// Staff-line spacing in pixels
    pub spacing: i32,
    /// Positional slack, a fifth of the spacing
    pub tolerance: i32,
}

impl Metrics {
    pub fn new(spacing: i32) -> Self {
        Self {
            spacing,
            tolerance: spacing / 5,
        }
    }

    /// `factor` spacings.
    pub fn of(&self, factor: f64) -> f64 {
        factor * self.spacing as f64
    }
}

/// Shapes found by the page pass. They stay valid for the whole page.
#[derive(Debug, Default)]
pub struct Shapes {
    pub dots: Vec<BoundingBox>,
    pub beams: Vec<BeamShape>,
    pub tails: Vec<BoundingBox>,
    pub ties: Vec<BoundingBox>,
}

/// Accidentals and note fragments found by the bar pass.
#[derive(Debug, Default)]
pub struct Glyphs {
    /// Sharp strokes still waiting for their partner
    pub sharp_strokes: Vec<BoundingBox>,
    pub sharps: Vec<BoundingBox>,
    pub flats: Vec<BoundingBox>,
    pub natural_strokes: Vec<BoundingBox>,
    pub semibreve_halves: Vec<BoundingBox>,
}

/// Everything that outlives a single system.
#[derive(Debug, Default)]
pub struct PageContext {
    pub shapes: Shapes,
    pub glyphs: Glyphs,
    /// Clef per stave index
    pub clefs: HashMap<usize, ClefKind>,
}

/// Key signature of one stave. Rebuilt for every system.
#[derive(Debug, Clone)]
pub struct KeyState {
    pub fifths: i32,
    /// Centre of the last key-signature glyph, -1 before the first
    pub last_x: i32,
    alterations: HashMap<Step, i32>,
}

impl KeyState {
    pub fn new() -> Self {
        Self {
            fifths: 0,
            last_x: -1,
            alterations: HashMap::new(),
        }
    }

    /// Record one more key-signature glyph.
    pub fn push(&mut self, step: Step, accidental: Accidental, x: i32) {
        self.fifths += accidental.alter();
        self.last_x = x;
        self.alterations.insert(step, accidental.alter());
    }

    pub fn alteration(&self, step: Step) -> i32 {
        self.alterations.get(&step).copied().unwrap_or(0)
    }
}

impl Default for KeyState {
    fn default() -> Self {
        Self::new()
    }
}

/// State of one stave within one bar.
#[derive(Debug, Clone)]
pub struct BarState {
    /// Alteration per staff position set by accidentals in this bar
    alterations: HashMap<i32, i32>,
    pub last_x: i32,
    pub last_type: Option<NoteType>,
}

impl BarState {
    pub fn new() -> Self {
        Self {
            alterations: HashMap::new(),
            last_x: -1,
            last_type: None,
        }
    }

    /// Alteration of a note at `position`: the key signature, overridden by
    /// an accidental on this note (which then holds for the rest of the bar)
    /// or by an earlier one at the same position.
    pub fn alter(
        &mut self,
        position: i32,
        step: Step,
        accidental: Option<Accidental>,
        key: &KeyState,
    ) -> i32 {
        match accidental {
            Some(a) => {
                self.alterations.insert(position, a.alter());
                a.alter()
            }
            None => self
                .alterations
                .get(&position)
                .copied()
                .unwrap_or_else(|| key.alteration(step)),
        }
    }

    /// A head close to the previous one but of another duration is a
    /// duplicate reading of the same symbol.
    pub fn conflicts(&self, x: i32, note_type: NoteType, spacing: i32) -> bool {
        (self.last_x - x).abs() < 2 * spacing
            && self.last_type.map_or(false, |t| t != note_type)
    }

    pub fn record(&mut self, x: i32, note_type: NoteType) {
        self.last_x = x;
        self.last_type = Some(note_type);
    }
}

impl Default for BarState {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks around a note or rest taken from neighbouring glyphs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub dotted: bool,
    pub tie: Option<TieType>,
    pub accidental: Option<Accidental>,
}

impl PageContext {
    /// Dot, tie and accidental for the symbol at `b`.
    pub fn modifiers(&self, b: &BoundingBox, m: Metrics) -> Modifiers {
        let s = m.spacing;
        let dotted = self.shapes.dots.iter().any(|dot| {
            dot.x_start > b.x_end
                && dot.x_start - b.x_end < 3 * s / 4
                && (b.y() - dot.y()).abs() < s
        });

        let mut tie = None;
        for t in &self.shapes.ties {
            if (t.y() - b.y()).abs() < 2 * s && (t.x() - b.x()).abs() < 2 * s {
                if t.x_start > b.x_start {
                    tie = Some(TieType::Start);
                    break;
                }
                if b.x_start > t.x_start {
                    tie = Some(TieType::Stop);
                    break;
                }
            }
        }

        let before = |g: &BoundingBox| g.x_end < b.x_start && b.x_start - g.x_end < 2 * s;
        let level = |g: &BoundingBox| (b.y() - g.y()).abs() < m.tolerance;
        let mut accidental = if self.glyphs.sharps.iter().any(|g| before(g) && level(g)) {
            Some(Accidental::Sharp)
        } else if self.glyphs.flats.iter().any(|g| before(g) && level(g)) {
            Some(Accidental::Flat)
        } else {
            None
        };

        let (mut top, mut bottom) = (false, false);
        for stroke in &self.glyphs.natural_strokes {
            if b.x_start > stroke.x_end && b.x_start - stroke.x_end < 2 * s {
                let dy = b.y() - stroke.y();
                if dy > 0 && (dy as f64) < m.of(0.8) {
                    top = true;
                }
                if dy < 0 && (-dy as f64) < m.of(0.8) {
                    bottom = true;
                }
            }
        }
        if top && bottom {
            accidental = Some(Accidental::Natural);
        }

        Modifiers {
            dotted,
            tie,
            accidental,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accidentals_hold_for_the_bar_at_their_position() {
        let mut key = KeyState::new();
        key.push(Step::F, Accidental::Sharp, 70);
        assert_eq!(key.fifths, 1);

        let mut bar = BarState::new();
        // key signature applies by step
        assert_eq!(bar.alter(1, Step::F, None, &key), 1);
        assert_eq!(bar.alter(8, Step::F, None, &key), 1);
        // a natural cancels it at that position only
        assert_eq!(bar.alter(1, Step::F, Some(Accidental::Natural), &key), 0);
        assert_eq!(bar.alter(1, Step::F, None, &key), 0);
        assert_eq!(bar.alter(8, Step::F, None, &key), 1);
        assert_eq!(bar.alter(5, Step::B, Some(Accidental::Flat), &key), -1);
        assert_eq!(bar.alter(5, Step::B, None, &key), -1);

        // a new bar starts over
        let mut bar = BarState::new();
        assert_eq!(bar.alter(5, Step::B, None, &key), 0);
    }

    #[test]
    fn conflicting_durations_nearby() {
        let mut bar = BarState::new();
        assert!(!bar.conflicts(100, NoteType::Quarter, 12));
        bar.record(100, NoteType::Quarter);
        assert!(!bar.conflicts(110, NoteType::Quarter, 12));
        assert!(bar.conflicts(110, NoteType::Half, 12));
        assert!(!bar.conflicts(130, NoteType::Half, 12));
    }

    #[test]
    fn modifiers_from_neighbours() {
        let m = Metrics::new(12);
        let head = BoundingBox::new(100, 78, 113, 89);
        let mut page = PageContext::default();
        page.shapes.dots.push(BoundingBox::new(118, 80, 121, 83));
        page.shapes.ties.push(BoundingBox::new(108, 92, 140, 97));
        page.glyphs.sharps.push(BoundingBox::new(84, 72, 93, 95));
        page.glyphs.flats.push(BoundingBox::new(88, 74, 94, 93));

        let found = page.modifiers(&head, m);
        assert!(found.dotted);
        assert_eq!(found.tie, Some(TieType::Start));
        assert_eq!(found.accidental, Some(Accidental::Sharp));

        page.glyphs.natural_strokes.push(BoundingBox::new(86, 78, 93, 80));
        page.glyphs.natural_strokes.push(BoundingBox::new(86, 87, 93, 89));
        assert_eq!(page.modifiers(&head, m).accidental, Some(Accidental::Natural));
    }
}
