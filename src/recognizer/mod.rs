//! Symbol recognition: components in, a [`Document`] out.
//!
//! Recognition is two ordered rule tables (see [`rules`]):
//!
//! 1. The page pass looks at every component once and sets aside the
//!    shapes notes are related to later: dots, beams and hooks, quaver
//!    tails, ties.
//! 2. The bar pass walks system by system, bar by bar and stave by stave,
//!    left to right over the remaining components, and turns them into
//!    clefs, accidentals, rests and notes appended to the current measure.
//!
//! Key signatures are tracked per stave for the length of a system;
//! accidentals hold per stave for the length of a bar.

mod beams;
mod context;
mod pitch;
mod rules;

use std::collections::HashSet;

use image::Rgb;
use serde::Serialize;
use tracing::{info, warn};

use crate::bbox::{BoundingBox, SubimageCache};
use crate::builder::{DocumentBuilder, MeasureBuilder};
use crate::cca::ComponentMatrix;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::lines::{StaffLayout, VerticalLines};
use crate::model::{Attributes, Clef, Document, Key, NoteType, TimeSignature, DIVISIONS};
use crate::templates::TrainingSet;

pub use beams::{count_peaks, find_second_beam, is_beam};
pub use context::Metrics;
pub use pitch::{staff_position, step_and_octave};

use context::{BarState, KeyState, PageContext};
use rules::{repeat_dots, BarScan, PageScan};

/// What a component was recognised as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbol {
    /// Matched no rule, or was a duplicate reading
    Discarded,
    RepeatDot,
    Dot,
    Beam,
    BeamHook,
    QuaverTail,
    Tie,
    TrebleClef,
    BassClef,
    /// One of the two thick strokes of a sharp
    SharpStroke,
    Sharp,
    Flat,
    /// One of the two short strokes of a natural
    NaturalStroke,
    Natural,
    KeySignature,
    TimeSignature,
    Rest(NoteType),
    Note(NoteType),
    /// A chord component that was cut into one box per head
    ChordSplit,
}

impl Symbol {
    /// Outline colour used when drawing the recognition stage.
    pub fn color(self) -> Rgb<u8> {
        let [r, g, b] = match self {
            Symbol::Discarded => [0, 0, 0],
            Symbol::RepeatDot => [150, 0, 0],
            Symbol::Dot => [255, 0, 255],
            Symbol::Beam | Symbol::BeamHook => [255, 0, 0],
            Symbol::QuaverTail => [255, 150, 150],
            Symbol::Tie => [0, 180, 255],
            Symbol::TrebleClef => [255, 0, 0],
            Symbol::BassClef => [0, 255, 0],
            Symbol::SharpStroke | Symbol::Sharp | Symbol::KeySignature => [0, 0, 255],
            Symbol::Flat => [0, 150, 255],
            Symbol::NaturalStroke | Symbol::Natural => [255, 0, 255],
            Symbol::TimeSignature => [0, 0, 255],
            Symbol::Rest(NoteType::Whole | NoteType::Half) => [255, 150, 150],
            Symbol::Rest(NoteType::Quarter) => [0, 150, 255],
            Symbol::Rest(NoteType::Eighth) => [255, 0, 150],
            Symbol::Rest(NoteType::Sixteenth) => [255, 0, 255],
            Symbol::Note(NoteType::Sixteenth) => [255, 255, 0],
            Symbol::Note(NoteType::Eighth) => [0, 255, 0],
            Symbol::Note(NoteType::Quarter) => [150, 150, 0],
            Symbol::Note(NoteType::Half) => [150, 0, 150],
            Symbol::Note(NoteType::Whole) => [0, 50, 150],
            Symbol::ChordSplit => [255, 255, 255],
        };
        Rgb([r, g, b])
    }
}

/// A component and what it was recognised as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classified {
    pub bbox: BoundingBox,
    pub symbol: Symbol,
}

/// Result of one recognition run.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub document: Document,
    /// Every component (and derived box) in the order it was decided
    pub symbols: Vec<Classified>,
}

/// Number of staves sharing the first bar line.
fn staves_per_system(layout: &StaffLayout, bars: &[BoundingBox], spacing: i32) -> usize {
    let Some(bar) = bars.first() else {
        return 1;
    };
    layout
        .staves
        .iter()
        .position(|s| (bar.y_end - s.line(4).y_end).abs() < spacing / 2)
        .map_or(1, |i| i + 1)
}

/// Everything recognition reads about the page.
pub struct Recognizer<'a> {
    layout: &'a StaffLayout,
    bars: &'a [BoundingBox],
    /// Every vertical stroke, bar lines included
    lines: &'a [BoundingBox],
    components: &'a ComponentMatrix,
    templates: &'a TrainingSet,
    config: &'a PipelineConfig,
    metrics: Metrics,
    staves_in_system: usize,
}

/// Mutable state of one run.
struct Run {
    page: PageContext,
    builder: DocumentBuilder,
    symbols: Vec<Classified>,
    visited: HashSet<BoundingBox>,
}

impl<'a> Recognizer<'a> {
    pub fn new(
        layout: &'a StaffLayout,
        vertical: &'a VerticalLines,
        components: &'a ComponentMatrix,
        templates: &'a TrainingSet,
        config: &'a PipelineConfig,
    ) -> Result<Self, PipelineError> {
        if layout.is_empty() || layout.spacing <= 0 {
            return Err(PipelineError::NoStaves);
        }
        let staves_in_system = staves_per_system(layout, &vertical.bar_lines, layout.spacing);
        info!(staves_in_system, "recognizer ready");
        Ok(Self {
            layout,
            bars: &vertical.bar_lines,
            lines: &vertical.lines,
            components,
            templates,
            config,
            metrics: Metrics::new(layout.spacing),
            staves_in_system,
        })
    }

    pub fn staves_in_system(&self) -> usize {
        self.staves_in_system
    }

    /// Classify `boxes` and assemble the document.
    pub fn recognize(&self, boxes: &[BoundingBox], cache: &mut SubimageCache) -> Recognition {
        let mut run = Run {
            page: PageContext::default(),
            builder: DocumentBuilder::new(self.config.part_name.clone()),
            symbols: Vec::with_capacity(boxes.len()),
            visited: HashSet::new(),
        };

        let mut remaining = Vec::new();
        let mut scan = PageScan {
            rec: self,
            cache: &mut *cache,
            shapes: &mut run.page.shapes,
        };
        for b in boxes {
            match scan.classify(b) {
                Some(symbol) => run.symbols.push(Classified { bbox: *b, symbol }),
                None => remaining.push(*b),
            }
        }
        let repeats = repeat_dots(self, &run.page.shapes.dots, &remaining);
        if !repeats.is_empty() {
            run.page.shapes.dots.retain(|d| !repeats.contains(d));
            for c in run.symbols.iter_mut() {
                if repeats.contains(&c.bbox) {
                    c.symbol = Symbol::RepeatDot;
                }
            }
        }
        let shapes = &run.page.shapes;
        info!(
            repeat_dots = repeats.len(),
            dots = shapes.dots.len(),
            beams = shapes.beams.len(),
            tails = shapes.tails.len(),
            ties = shapes.ties.len(),
            remaining = remaining.len(),
            "page pass done"
        );

        let stave_count = self.layout.staves.len();
        for (system, first) in (0..stave_count).step_by(self.staves_in_system).enumerate() {
            self.recognize_system(system, first, &remaining, cache, &mut run);
        }
        run.builder.mark_last();

        for b in remaining {
            if !run.visited.contains(&b) {
                run.symbols.push(Classified {
                    bbox: b,
                    symbol: Symbol::Discarded,
                });
            }
        }
        let document = run.builder.finish();
        info!(measures = document.measure_count(), "recognition done");
        Recognition {
            document,
            symbols: run.symbols,
        }
    }

    fn recognize_system(
        &self,
        system: usize,
        first: usize,
        remaining: &[BoundingBox],
        cache: &mut SubimageCache,
        run: &mut Run,
    ) {
        let m = self.metrics;
        let s = m.spacing;
        let staves = &self.layout.staves;
        let top = &staves[first];
        let bars: Vec<BoundingBox> = self
            .bars
            .iter()
            .filter(|b| (b.y_start - top.line(0).y_start).abs() < m.tolerance)
            .copied()
            .collect();

        let first_measure = run.builder.len();
        run.builder.start_system();
        let mut keys = vec![KeyState::new(); self.staves_in_system];

        for (j, bar) in bars.iter().enumerate() {
            if (bar.x() - top.x_start()).abs() < 3 * s {
                continue;
            }
            let left = if j > 0 { bars[j - 1].x() } else { top.x_start() };
            let time_signature_open = system == 0 && run.builder.is_empty();
            let mut measure = MeasureBuilder::new(run.builder.next_number());

            for (k, key) in keys.iter_mut().enumerate() {
                let index = first + k;
                let Some(stave) = staves.get(index) else {
                    break;
                };
                let upper = match index {
                    0 => stave.line(0).y_start - 5 * s,
                    _ => (stave.line(0).y_start + staves[index - 1].line(4).y_end) / 2,
                };
                let lower = match staves.get(index + 1) {
                    None => stave.line(4).y_end + 5 * s,
                    Some(next) => (stave.line(4).y_end + next.line(0).y_start) / 2,
                };
                let mut queue: Vec<BoundingBox> = remaining
                    .iter()
                    .filter(|b| {
                        b.y() > upper && b.y() < lower && b.x_start > left && b.x_end < bar.x()
                    })
                    .copied()
                    .collect();
                queue.sort_by_key(|b| b.x_start);

                let mut bar_state = BarState::new();
                let mut time_signature_seen = false;
                let mut scan = BarScan {
                    rec: self,
                    cache: &mut *cache,
                    page: &mut run.page,
                    stave,
                    stave_index: index,
                    staff: k as i32 + 1,
                    key,
                    bar: &mut bar_state,
                    measure: &mut measure,
                    time_signature_open,
                    time_signature_seen: &mut time_signature_seen,
                    splits: Vec::new(),
                    extra: Vec::new(),
                };

                let mut i = 0;
                while i < queue.len() {
                    let b = queue[i];
                    run.visited.insert(b);
                    let symbol = scan.classify(&b);
                    run.symbols.push(Classified { bbox: b, symbol });
                    run.symbols.append(&mut scan.extra);
                    // each split goes right after the chord, so the lowest head comes first
                    for split in scan.splits.drain(..) {
                        queue.insert(i + 1, split);
                    }
                    i += 1;
                }
                measure.add_backup();
            }

            let number = measure.number();
            if !run.builder.push(measure) {
                info!(number, "empty bar skipped");
            }
        }

        let clefs = (0..self.staves_in_system)
            .filter_map(|k| match run.page.clefs.get(&(first + k)) {
                Some(&kind) => Some(Clef {
                    number: k as i32 + 1,
                    kind,
                }),
                None => {
                    warn!(stave = first + k, "no clef recognized");
                    None
                }
            })
            .collect();
        let time = self.config.time_signature;
        let attributes = Attributes {
            divisions: DIVISIONS,
            key: Key {
                fifths: keys[0].fifths,
                mode: "major".to_string(),
            },
            time: TimeSignature {
                beats: time.beats as i32,
                beat_type: time.beat_type as i32,
            },
            staves: self.staves_in_system as i32,
            clefs,
        };
        run.builder.attach_attributes(first_measure, attributes);
        info!(
            system,
            measures = run.builder.len() - first_measure,
            fifths = keys[0].fifths,
            "system recognized"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BufferId;
    use crate::cca::{bounding_boxes, label_components, resolve_equivalences};
    use crate::lines::Stave;
    use crate::model::{MeasureEvent, Pitch, Step};
    use crate::raster::Bitmap;

    fn layout() -> StaffLayout {
        StaffLayout {
            staves: vec![Stave {
                lines: [60, 72, 84, 96, 108].map(|y| BoundingBox::new(20, y, 579, y + 1)),
            }],
            spacing: 12,
        }
    }

    fn vertical(stems: &[BoundingBox]) -> VerticalLines {
        let bar_lines = vec![
            BoundingBox::new(300, 60, 301, 109),
            BoundingBox::new(578, 60, 579, 109),
        ];
        let mut lines = stems.to_vec();
        lines.extend(bar_lines.iter().copied());
        VerticalLines { bar_lines, lines }
    }

    /// Label `bitmap` and recognise it against one stave spaced 12 apart.
    fn recognize(bitmap: &Bitmap, stems: &[BoundingBox]) -> Recognition {
        let mut labeling = label_components(bitmap);
        resolve_equivalences(&mut labeling);
        let boxes = bounding_boxes(&labeling.matrix);
        let (layout, vertical) = (layout(), vertical(stems));
        let templates = TrainingSet::empty();
        let config = PipelineConfig::default();
        let recognizer =
            Recognizer::new(&layout, &vertical, &labeling.matrix, &templates, &config).unwrap();
        let mut cache = SubimageCache::new(BufferId(7));
        recognizer.recognize(&boxes, &mut cache)
    }

    fn pitches(doc: &Document) -> Vec<(Pitch, NoteType, bool)> {
        doc.notes()
            .map(|n| (n.pitch.unwrap(), n.note_type, n.chord))
            .collect()
    }

    #[test]
    fn half_spacing_square_is_a_dot_even_beside_a_stem() {
        let mut bitmap = Bitmap::new(600, 200);
        bitmap.fill_rect(100, 80, 105, 85, true);
        let rec = recognize(&bitmap, &[BoundingBox::new(104, 42, 105, 89)]);
        assert_eq!(rec.symbols.len(), 1);
        assert_eq!(rec.symbols[0].symbol, Symbol::Dot);
        assert!(rec.document.measures.is_empty());
    }

    #[test]
    fn dot_just_before_a_bar_line_still_lengthens_the_note() {
        let mut bitmap = Bitmap::new(600, 200);
        bitmap.fill_rect(270, 78, 283, 89, true);
        bitmap.fill_rect(288, 76, 292, 80, true);
        let rec = recognize(&bitmap, &[BoundingBox::new(282, 42, 283, 89)]);

        assert!(rec.symbols.iter().all(|c| c.symbol != Symbol::RepeatDot));
        let notes: Vec<_> = rec.document.notes().collect();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].note_type, NoteType::Quarter);
        assert!(notes[0].dotted);
        assert_eq!(notes[0].duration(), 6);
    }

    #[test]
    fn stacked_dot_pairs_beside_bar_lines_are_repeat_signs() {
        let mut bitmap = Bitmap::new(600, 200);
        // start repeat after the first bar line, end repeat before the last
        for x in [305, 568] {
            bitmap.fill_rect(x, 76, x + 4, 80, true);
            bitmap.fill_rect(x, 88, x + 4, 92, true);
        }
        // a lone dot beside a bar line stays an ordinary dot
        bitmap.fill_rect(290, 100, 294, 104, true);
        let rec = recognize(&bitmap, &[]);

        let kinds: Vec<_> = rec
            .symbols
            .iter()
            .map(|c| (c.bbox.x_start, c.bbox.y_start, c.symbol))
            .collect();
        assert_eq!(kinds.iter().filter(|k| k.2 == Symbol::RepeatDot).count(), 4);
        assert!(kinds.contains(&(290, 100, Symbol::Dot)));
    }

    #[test]
    fn quarter_notes_in_two_bars() {
        let mut bitmap = Bitmap::new(600, 200);
        bitmap.fill_rect(100, 78, 113, 89, true);
        bitmap.fill_rect(400, 54, 413, 65, true);
        let stems = [
            BoundingBox::new(112, 42, 113, 89),
            BoundingBox::new(412, 18, 413, 65),
        ];
        let doc = recognize(&bitmap, &stems).document;

        assert_eq!(doc.measures.len(), 2);
        let b4 = Pitch {
            step: Step::B,
            alter: 0,
            octave: 4,
        };
        let f5 = Pitch {
            step: Step::F,
            alter: 0,
            octave: 5,
        };
        assert_eq!(doc.measures[0].notes().count(), 1);
        assert_eq!(pitches(&doc), vec![(b4, NoteType::Quarter, false), (f5, NoteType::Quarter, false)]);
        assert!(matches!(
            doc.measures[0].events.last(),
            Some(MeasureEvent::Backup { duration: 16 })
        ));

        let attributes = doc.measures[0].attributes.as_ref().unwrap();
        assert_eq!(attributes.key.fifths, 0);
        assert_eq!(attributes.staves, 1);
        assert!(attributes.clefs.is_empty());
        assert!(doc.measures[1].last);
        assert!(!doc.measures[1].new_system);
    }

    #[test]
    fn tall_head_is_split_into_a_chord() {
        let mut bitmap = Bitmap::new(600, 200);
        bitmap.fill_rect(100, 66, 113, 89, true);
        let rec = recognize(&bitmap, &[BoundingBox::new(112, 30, 113, 89)]);

        assert!(rec
            .symbols
            .iter()
            .any(|c| c.symbol == Symbol::ChordSplit));
        let found: Vec<_> = pitches(&rec.document)
            .into_iter()
            .map(|(p, t, chord)| (p.step, p.octave, t, chord))
            .collect();
        assert_eq!(
            found,
            vec![
                (Step::B, 4, NoteType::Quarter, false),
                (Step::D, 5, NoteType::Quarter, true),
            ]
        );
    }

    #[test]
    fn no_staves_is_an_error() {
        let layout = StaffLayout::default();
        let vertical = VerticalLines::default();
        let matrix = ComponentMatrix::new(1, 1);
        let templates = TrainingSet::empty();
        let config = PipelineConfig::default();
        let err = Recognizer::new(&layout, &vertical, &matrix, &templates, &config).err();
        assert!(matches!(err, Some(PipelineError::NoStaves)));
    }
}
