//! The two ordered rule tables.
//!
//! The page pass runs over every component once and collects the shapes
//! that note heads are later related to. The bar pass runs stave by stave
//! inside each bar over whatever the page pass left. In both tables the
//! first rule returning a symbol decides; a rule whose size window matches
//! but whose finer test fails passes the component on.

use tracing::debug;

use crate::bbox::{BoundingBox, SubimageCache};
use crate::builder::MeasureBuilder;
use crate::geometry::{ratio_of_pixels, Axis};
use crate::lines::Stave;
use crate::model::{Accidental, BeamRole, ClefKind, Note, NoteType, Pitch, Step};
use crate::raster::Bitmap;

use super::beams::{beam_roles, count_peaks, find_second_beam, is_beam, is_stem_for, BeamShape};
use super::context::{BarState, KeyState, Metrics, PageContext, Shapes};
use super::pitch::{
    position_y, staff_position, step_and_octave, treble_position, BASS_SHIFT, FLAT_ORDER,
    SHARP_ORDER,
};
use super::{Classified, Recognizer, Symbol};

/// Foreground share above which a region counts as filled.
const FILLED: f64 = 0.8;

/// Most heads a single chord component is split into.
const MAX_CHORD_HEADS: i32 = 15;

// ─── Page pass ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRule {
    Degenerate,
    OutsideStaves,
    Dot,
    Beam,
    Hook,
    Tail,
    Tie,
}

impl PageRule {
    pub const ORDER: [PageRule; 7] = [
        PageRule::Degenerate,
        PageRule::OutsideStaves,
        PageRule::Dot,
        PageRule::Beam,
        PageRule::Hook,
        PageRule::Tail,
        PageRule::Tie,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PageRule::Degenerate => "degenerate",
            PageRule::OutsideStaves => "outside staves",
            PageRule::Dot => "dot",
            PageRule::Beam => "beam",
            PageRule::Hook => "beam hook",
            PageRule::Tail => "quaver tail",
            PageRule::Tie => "tie",
        }
    }

    pub fn apply(self, scan: &mut PageScan<'_, '_>, b: &BoundingBox) -> Option<Symbol> {
        match self {
            PageRule::Degenerate => scan.degenerate(b),
            PageRule::OutsideStaves => scan.outside_staves(b),
            PageRule::Dot => scan.dot(b),
            PageRule::Beam => scan.beam(b),
            PageRule::Hook => scan.hook(b),
            PageRule::Tail => scan.tail(b),
            PageRule::Tie => scan.tie(b),
        }
    }
}

pub struct PageScan<'p, 'a> {
    pub rec: &'p Recognizer<'a>,
    pub cache: &'p mut SubimageCache,
    pub shapes: &'p mut Shapes,
}

impl PageScan<'_, '_> {
    /// Classify `b`, or leave it for the bar pass.
    pub fn classify(&mut self, b: &BoundingBox) -> Option<Symbol> {
        PageRule::ORDER.iter().find_map(|&rule| {
            let symbol = rule.apply(self, b)?;
            debug!(label = b.label, rule = rule.name(), "page pass");
            Some(symbol)
        })
    }

    fn m(&self) -> Metrics {
        self.rec.metrics
    }

    fn degenerate(&mut self, b: &BoundingBox) -> Option<Symbol> {
        (b.width() <= 1 || b.height() <= 1).then_some(Symbol::Discarded)
    }

    fn outside_staves(&mut self, b: &BoundingBox) -> Option<Symbol> {
        let s = self.m().spacing;
        let first = self.rec.layout.staves.first()?;
        let last = self.rec.layout.staves.last()?;
        (b.y_end < first.top() - 3 * s || b.y_start > last.bottom() + 3 * s)
            .then_some(Symbol::Discarded)
    }

    fn dot(&mut self, b: &BoundingBox) -> Option<Symbol> {
        let m = self.m();
        let (w, h) = (b.width() as f64, b.height() as f64);
        let small = |v: f64| v > m.of(0.2) && v < m.of(0.7);
        if !(small(w) && small(h) && (b.width() - b.height()).abs() < m.tolerance) {
            return None;
        }
        self.shapes.dots.push(*b);
        Some(Symbol::Dot)
    }

    fn beam(&mut self, b: &BoundingBox) -> Option<Symbol> {
        let m = self.m();
        let (w, h) = (b.width(), b.height());
        if !((w as f64) > m.of(2.2) && h > m.spacing / 3 && w as f64 > 1.3 * h as f64) {
            return None;
        }
        if !is_beam(self.cache.subimage(b, self.rec.components), m.spacing) {
            return None;
        }
        self.shapes.beams.push(BeamShape {
            bbox: *b,
            hook: false,
        });
        Some(Symbol::Beam)
    }

    fn hook(&mut self, b: &BoundingBox) -> Option<Symbol> {
        let m = self.m();
        let (w, h) = (b.width(), b.height());
        let s = m.spacing;
        if !(w > s && (w as f64) < m.of(1.5) && h > s / 3 && h < s) {
            return None;
        }
        if ratio_of_pixels(self.cache.subimage(b, self.rec.components)) <= FILLED {
            return None;
        }
        if !self.rec.lines.iter().any(|l| is_stem_for(b, l, s)) {
            return None;
        }
        self.shapes.beams.push(BeamShape {
            bbox: *b,
            hook: true,
        });
        Some(Symbol::BeamHook)
    }

    fn tail(&mut self, b: &BoundingBox) -> Option<Symbol> {
        let m = self.m();
        let (w, h) = (b.width() as f64, b.height() as f64);
        if !(w > m.of(0.5) && w < m.of(1.5) && h > m.of(2.0) && h < m.of(3.2)) {
            return None;
        }
        if !self
            .rec
            .templates
            .is_tail(self.cache.subimage(b, self.rec.components))
        {
            return None;
        }
        self.shapes.tails.push(*b);
        Some(Symbol::QuaverTail)
    }

    fn tie(&mut self, b: &BoundingBox) -> Option<Symbol> {
        let s = self.m().spacing;
        if !(b.width() as f64 > 2.5 * b.height() as f64 && b.height() > s / 4) {
            return None;
        }
        self.shapes.ties.push(*b);
        Some(Symbol::Tie)
    }
}

/// Side of `bar` that `dot` sits on within one spacing: true for right.
fn side_of_bar(dot: &BoundingBox, bar: &BoundingBox, spacing: i32) -> Option<bool> {
    if dot.y() <= bar.y_start || dot.y() >= bar.y_end {
        return None;
    }
    if dot.x_start > bar.x_end && dot.x_start - bar.x_end < spacing {
        Some(true)
    } else if bar.x_start > dot.x_end && bar.x_start - dot.x_end < spacing {
        Some(false)
    } else {
        None
    }
}

/// Dots that belong to a repeat sign rather than to a note.
///
/// A repeat sign is a pair of dots on the same side of a bar line, one in
/// each space around the middle line of a stave the bar crosses, stacked
/// above each other. A pair with a component just to its left that it
/// could lengthen is left alone.
pub fn repeat_dots(
    rec: &Recognizer<'_>,
    dots: &[BoundingBox],
    others: &[BoundingBox],
) -> Vec<BoundingBox> {
    let m = rec.metrics;
    let s = m.spacing;
    let lengthens = |dot: &BoundingBox| {
        others.iter().any(|o| {
            o.x_end < dot.x_start
                && dot.x_start - o.x_end < 3 * s / 4
                && (o.y() - dot.y()).abs() < s
        })
    };

    let mut found = Vec::new();
    for bar in rec.bars {
        let crossed = rec.layout.staves.iter().filter(|st| {
            bar.y_start <= st.top() + m.tolerance && bar.y_end >= st.bottom() - m.tolerance
        });
        for stave in crossed {
            let upper = (stave.line(1).y() + stave.line(2).y()) / 2;
            let lower = (stave.line(2).y() + stave.line(3).y()) / 2;
            for right in [false, true] {
                let beside = |d: &&BoundingBox, y: i32| {
                    side_of_bar(d, bar, s) == Some(right) && (d.y() - y).abs() < s / 4
                };
                let pair = dots.iter().filter(|d| beside(d, upper)).find_map(|up| {
                    dots.iter()
                        .filter(|d| beside(d, lower))
                        .find(|down| (up.x() - down.x()).abs() < m.tolerance.max(1))
                        .map(|down| (*up, *down))
                });
                if let Some((up, down)) = pair {
                    if lengthens(&up) || lengthens(&down) {
                        continue;
                    }
                    found.extend([up, down]);
                }
            }
        }
    }
    found
}

// ─── Bar pass ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarRule {
    Clef,
    SharpStroke,
    Flat,
    NaturalStroke,
    TimeSignature,
    WholeOrHalfRest,
    QuarterRest,
    EighthRest,
    SixteenthRest,
    NoteHead,
}

impl BarRule {
    pub const ORDER: [BarRule; 10] = [
        BarRule::Clef,
        BarRule::SharpStroke,
        BarRule::Flat,
        BarRule::NaturalStroke,
        BarRule::TimeSignature,
        BarRule::WholeOrHalfRest,
        BarRule::QuarterRest,
        BarRule::EighthRest,
        BarRule::SixteenthRest,
        BarRule::NoteHead,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BarRule::Clef => "clef",
            BarRule::SharpStroke => "sharp stroke",
            BarRule::Flat => "flat",
            BarRule::NaturalStroke => "natural stroke",
            BarRule::TimeSignature => "time signature",
            BarRule::WholeOrHalfRest => "whole or half rest",
            BarRule::QuarterRest => "quarter rest",
            BarRule::EighthRest => "eighth rest",
            BarRule::SixteenthRest => "16th rest",
            BarRule::NoteHead => "note head",
        }
    }

    pub fn apply(self, scan: &mut BarScan<'_, '_>, b: &BoundingBox) -> Option<Symbol> {
        match self {
            BarRule::Clef => scan.clef(b),
            BarRule::SharpStroke => scan.sharp_stroke(b),
            BarRule::Flat => scan.flat(b),
            BarRule::NaturalStroke => scan.natural_stroke(b),
            BarRule::TimeSignature => scan.time_signature(b),
            BarRule::WholeOrHalfRest => scan.whole_or_half_rest(b),
            BarRule::QuarterRest => scan.quarter_rest(b),
            BarRule::EighthRest => scan.eighth_rest(b),
            BarRule::SixteenthRest => scan.sixteenth_rest(b),
            BarRule::NoteHead => scan.note_head(b),
        }
    }
}

/// One stave inside one bar, with the state its rules read and update.
pub struct BarScan<'p, 'a> {
    pub rec: &'p Recognizer<'a>,
    pub cache: &'p mut SubimageCache,
    pub page: &'p mut PageContext,
    pub stave: &'p Stave,
    pub stave_index: usize,
    /// 1-based stave number within the system
    pub staff: i32,
    pub key: &'p mut KeyState,
    pub bar: &'p mut BarState,
    pub measure: &'p mut MeasureBuilder,
    /// Whether a time signature may still appear on this stave
    pub time_signature_open: bool,
    pub time_signature_seen: &'p mut bool,
    /// Sub-boxes of a split chord, top first
    pub splits: Vec<BoundingBox>,
    /// Symbols found besides the component itself (merged accidentals)
    pub extra: Vec<Classified>,
}

fn sharp_stroke_size(b: &BoundingBox, m: Metrics) -> bool {
    let w = b.width() as f64;
    w > m.of(0.8) && w < m.of(1.5) && b.height() < m.spacing
}

fn quarter_rest_size(b: &BoundingBox, m: Metrics) -> bool {
    let (w, h) = (b.width(), b.height() as f64);
    w > m.spacing && (w as f64) < m.of(1.3) && h > m.of(2.5) && h < m.of(3.5)
}

impl BarScan<'_, '_> {
    /// Classify `b`. Every component gets a symbol in this pass.
    pub fn classify(&mut self, b: &BoundingBox) -> Symbol {
        for rule in BarRule::ORDER {
            if let Some(symbol) = rule.apply(self, b) {
                debug!(label = b.label, staff = self.staff, rule = rule.name(), "bar pass");
                return symbol;
            }
        }
        Symbol::Discarded
    }

    fn m(&self) -> Metrics {
        self.rec.metrics
    }

    fn subimage(&mut self, b: &BoundingBox) -> &Bitmap {
        self.cache.subimage(b, self.rec.components)
    }

    fn has_stem(&self, b: &BoundingBox) -> bool {
        let s = self.m().spacing;
        self.rec.lines.iter().any(|l| is_stem_for(b, l, s))
    }

    fn clef(&mut self, b: &BoundingBox) -> Option<Symbol> {
        let m = self.m();
        if (b.x_start - self.stave.x_start()) as f64 > m.of(1.5) {
            return None;
        }
        let (kind, symbol) = if b.height() > 6 * m.spacing {
            (ClefKind::Treble, Symbol::TrebleClef)
        } else if b.height() > 3 * m.spacing {
            (ClefKind::Bass, Symbol::BassClef)
        } else {
            return None;
        };
        self.page.clefs.insert(self.stave_index, kind);
        Some(symbol)
    }

    /// Step this accidental adds to the key signature, if it is the next
    /// glyph of one: the first 3.5 to 5.5 spacings from the stave start,
    /// each following one within 1.5 spacings of the last, every glyph at
    /// its conventional position.
    fn key_signature_step(&self, glyph: &BoundingBox, accidental: Accidental) -> Option<Step> {
        let m = self.m();
        let key = &*self.key;
        let order = match accidental {
            Accidental::Sharp if key.fifths >= 0 => &SHARP_ORDER,
            Accidental::Flat if key.fifths <= 0 => &FLAT_ORDER,
            _ => return None,
        };
        let &(step, position) = order.get(key.fifths.unsigned_abs() as usize)?;

        let placed = if key.fifths == 0 {
            let dx = (glyph.x() - self.stave.x_start()) as f64;
            dx > m.of(3.5) && dx < m.of(5.5)
        } else {
            ((glyph.x() - key.last_x) as f64) < m.of(1.5)
        };
        if !placed {
            return None;
        }

        let position = match self.page.clefs.get(&self.stave_index) {
            Some(ClefKind::Bass) => position + BASS_SHIFT,
            _ => position,
        };
        let y = position_y(self.stave, position, m.spacing);
        ((glyph.y() - y).abs() < m.tolerance).then_some(step)
    }

    /// File a complete accidental under the key signature or the loose ones.
    fn place_accidental(&mut self, glyph: BoundingBox, accidental: Accidental) -> Symbol {
        if let Some(step) = self.key_signature_step(&glyph, accidental) {
            self.key.push(step, accidental, glyph.x());
            debug!(fifths = self.key.fifths, step = step.as_str(), "key signature");
            return Symbol::KeySignature;
        }
        if glyph.x() > self.key.last_x + self.m().spacing {
            match accidental {
                Accidental::Sharp => self.page.glyphs.sharps.push(glyph),
                Accidental::Flat => self.page.glyphs.flats.push(glyph),
                Accidental::Natural => {}
            }
        }
        match accidental {
            Accidental::Sharp => Symbol::Sharp,
            Accidental::Flat => Symbol::Flat,
            Accidental::Natural => Symbol::Natural,
        }
    }

    fn sharp_stroke(&mut self, b: &BoundingBox) -> Option<Symbol> {
        let m = self.m();
        if !sharp_stroke_size(b, m) {
            return None;
        }
        let sub = self.subimage(b);
        if !is_beam(sub, m.spacing) || ratio_of_pixels(sub) >= FILLED {
            return None;
        }

        let strokes = &mut self.page.glyphs.sharp_strokes;
        let partner = strokes.iter().position(|o| {
            o != b
                && (b.x() - o.x()).abs() < m.tolerance
                && (((b.y() - o.y()).abs()) as f64) < m.of(1.5)
        });
        match partner {
            Some(i) => {
                let other = strokes.remove(i);
                let sharp = b.union(&other);
                let symbol = self.place_accidental(sharp, Accidental::Sharp);
                self.extra.push(Classified {
                    bbox: sharp,
                    symbol,
                });
            }
            None => strokes.push(*b),
        }
        Some(Symbol::SharpStroke)
    }

    fn flat(&mut self, b: &BoundingBox) -> Option<Symbol> {
        let m = self.m();
        let (w, h) = (b.width(), b.height());
        let size = h as f64 > m.of(0.9)
            && (h as f64) < m.of(1.5)
            && w as f64 > m.of(0.5)
            && (w as f64) < m.of(1.2);
        if !size || sharp_stroke_size(b, m) {
            return None;
        }
        let hole = self.subimage(b).crop(0, h / 3, (w / 2) as u32, (h / 3) as u32);
        if ratio_of_pixels(&hole) >= 1.0 - FILLED {
            return None;
        }
        Some(self.place_accidental(*b, Accidental::Flat))
    }

    fn natural_stroke(&mut self, b: &BoundingBox) -> Option<Symbol> {
        let m = self.m();
        let w = b.width() as f64;
        if !(w > m.of(0.5) && w < m.of(0.9) && (b.height() as f64) < m.of(0.8)) {
            return None;
        }
        if !is_beam(self.subimage(b), m.spacing) {
            return None;
        }
        self.page.glyphs.natural_strokes.push(*b);
        Some(Symbol::NaturalStroke)
    }

    fn time_signature(&mut self, b: &BoundingBox) -> Option<Symbol> {
        let s = self.m().spacing;
        if !self.time_signature_open || *self.time_signature_seen || b.width() <= s {
            return None;
        }
        let near = |a: i32, c: i32| (a - c).abs() < s / 4;
        let line = |i: usize| self.stave.line(i).y();
        let full = near(b.y_start, line(0)) && near(line(4), b.y_end);
        let common = near(b.y_start, line(1)) && near(line(3), b.y_end);
        if !(full || common) {
            return None;
        }
        *self.time_signature_seen = true;
        Some(Symbol::TimeSignature)
    }

    fn rest(&mut self, b: &BoundingBox, note_type: NoteType) -> Symbol {
        let dotted = self.page.modifiers(b, self.m()).dotted;
        self.measure.add_note(Note::rest(note_type, dotted, self.staff));
        Symbol::Rest(note_type)
    }

    fn whole_or_half_rest(&mut self, b: &BoundingBox) -> Option<Symbol> {
        let m = self.m();
        let s = m.spacing;
        let (w, h) = (b.width(), b.height());
        if !(w > s && w < 2 * s && h > s / 2 && h < s) {
            return None;
        }
        let note_type = if (b.y_start - self.stave.line(1).y()).abs() < m.tolerance {
            NoteType::Whole
        } else if (b.y_end - self.stave.line(2).y()).abs() < m.tolerance {
            NoteType::Half
        } else {
            return None;
        };
        if ratio_of_pixels(self.subimage(b)) <= FILLED {
            return None;
        }
        Some(self.rest(b, note_type))
    }

    fn quarter_rest(&mut self, b: &BoundingBox) -> Option<Symbol> {
        let m = self.m();
        if !quarter_rest_size(b, m) {
            return None;
        }
        if (b.y() - self.stave.line(2).y()).abs() >= m.spacing / 2 {
            return None;
        }
        let sub = self.cache.subimage(b, self.rec.components);
        if !self.rec.templates.is_crotchet_rest(sub) {
            return None;
        }
        Some(self.rest(b, NoteType::Quarter))
    }

    fn eighth_rest(&mut self, b: &BoundingBox) -> Option<Symbol> {
        let m = self.m();
        let s = m.spacing;
        let (w, h) = (b.width(), b.height());
        if !(w > 2 * s / 3 && (w as f64) < m.of(1.5) && h as f64 > m.of(1.3) && h < 2 * s) {
            return None;
        }
        if (b.y_start - self.stave.line(1).y()).abs() >= s / 2
            || (b.y_end - self.stave.line(3).y()).abs() >= s / 2
        {
            return None;
        }
        let sub = self.cache.subimage(b, self.rec.components);
        if !self.rec.templates.is_quaver_rest(sub) {
            return None;
        }
        Some(self.rest(b, NoteType::Eighth))
    }

    fn sixteenth_rest(&mut self, b: &BoundingBox) -> Option<Symbol> {
        let m = self.m();
        let s = m.spacing;
        let (w, h) = (b.width(), b.height());
        if !(w > s && w < 2 * s && h as f64 > m.of(2.3) && h < 3 * s) || quarter_rest_size(b, m) {
            return None;
        }
        if (b.y_start - self.stave.line(1).y()).abs() >= s / 2
            || (b.y_end - self.stave.line(4).y()).abs() >= s / 2
        {
            return None;
        }
        let sub = self.cache.subimage(b, self.rec.components);
        if !self.rec.templates.is_semiquaver_rest(sub) {
            return None;
        }
        Some(self.rest(b, NoteType::Sixteenth))
    }

    fn is_tailed(&self, b: &BoundingBox) -> bool {
        let s = self.m().spacing;
        self.page.shapes.tails.iter().any(|t| {
            (b.y_start > t.y_end - s
                && b.y_start - t.y_end < 4 * s
                && (b.x_end - t.x_start).abs() < 3 * s / 4)
                || (t.y_start > b.y_end - s
                    && t.y_start - b.y_end < 4 * s
                    && (b.x_start - t.x_start).abs() < 3 * s / 4)
        })
    }

    /// Add a note for the head `b`, unless it conflicts with the previous
    /// head. `recorded_x` is the position remembered for later heads.
    fn emit(
        &mut self,
        b: &BoundingBox,
        note_type: NoteType,
        beams: Vec<BeamRole>,
        chord: bool,
        recorded_x: i32,
    ) -> Symbol {
        let m = self.m();
        if self.bar.conflicts(b.x(), note_type, m.spacing) {
            return Symbol::Discarded;
        }
        self.bar.record(recorded_x, note_type);

        let modifiers = self.page.modifiers(b, m);
        let clef = self.page.clefs.get(&self.stave_index).copied();
        let position = treble_position(staff_position(b.y(), self.stave, m.spacing), clef);
        let (step, octave) = step_and_octave(position);
        let alter = self.bar.alter(position, step, modifiers.accidental, self.key);

        self.measure.add_note(Note {
            pitch: Some(Pitch {
                step,
                alter,
                octave,
            }),
            note_type,
            dotted: modifiers.dotted,
            tie: modifiers.tie,
            voice: self.staff,
            staff: self.staff,
            beams,
            accidental: modifiers.accidental,
            chord,
        });
        Symbol::Note(note_type)
    }

    /// Notes, chords and the halves of a semibreve cut by a staff line.
    fn note_head(&mut self, b: &BoundingBox) -> Option<Symbol> {
        let m = self.m();
        let s = m.spacing;
        let (w, h) = (b.width(), b.height());

        let heads = (0..MAX_CHORD_HEADS)
            .find(|&l| h > l * s + 4 * s / 5 && ((h as f64) < (l * s) as f64 + m.of(1.4)))
            .map(|l| l + 1);
        let Some(heads) = heads else {
            return Some(Symbol::Discarded);
        };
        if heads > 1 {
            self.splits = (0..heads)
                .map(|l| {
                    BoundingBox::with_label(
                        b.x_start,
                        b.y_start + l * h / heads,
                        b.x_end,
                        b.y_start + (l + 1) * h / heads,
                        b.label,
                    )
                })
                .collect();
            return Some(Symbol::ChordSplit);
        }

        // off the stave a head needs a ledger line through it
        let margin = 3 * s / 4;
        if b.y() < self.stave.top() - margin || b.y() > self.stave.bottom() + margin {
            let ledger_lines = count_peaks(self.subimage(b), Axis::Rows, m.tolerance);
            if ledger_lines != 1 && ledger_lines != 2 {
                return Some(Symbol::Discarded);
            }
        }

        if !(h as f64 > m.of(0.9) && (h as f64) < m.of(1.3)) {
            return Some(Symbol::Discarded);
        }

        let x = b.x();
        let near_last = (self.bar.last_x - x).abs() < s / 2;
        let mut chord = false;

        if w > s && w < 3 * s {
            let middle = self
                .subimage(b)
                .crop(w / 3, h / 3, (w / 3) as u32, (h / 3) as u32);
            if ratio_of_pixels(&middle) > FILLED {
                chord = near_last;
                if self.is_tailed(b) {
                    return Some(self.emit(b, NoteType::Eighth, Vec::new(), chord, x));
                }

                let (mut roles, found) = beam_roles(b, &self.page.shapes.beams, self.rec.lines, s);
                if let (1, Some((beam, stem))) = (roles.len(), found) {
                    let image = self.cache.subimage(&beam, self.rec.components);
                    if let Some(second) = find_second_beam(image, &beam, &stem, s) {
                        roles.push(second);
                    }
                }
                match roles.len() {
                    0 => {}
                    1 => return Some(self.emit(b, NoteType::Eighth, roles, chord, x)),
                    _ => return Some(self.emit(b, NoteType::Sixteenth, roles, chord, x)),
                }

                if self.has_stem(b) {
                    return Some(self.emit(b, NoteType::Quarter, Vec::new(), chord, x));
                }
            }

            match count_peaks(self.subimage(b), Axis::Columns, m.tolerance) {
                0 | 1 if self.has_stem(b) => {
                    return Some(self.emit(b, NoteType::Half, Vec::new(), near_last, x));
                }
                2 => return Some(self.emit(b, NoteType::Whole, Vec::new(), near_last, x)),
                _ => {}
            }
        }

        if w > 2 * s / 3
            && (w as f64) < m.of(1.3)
            && count_peaks(self.subimage(b), Axis::Columns, m.tolerance) == 1
        {
            return Some(self.semibreve_half(b, chord));
        }
        Some(Symbol::Discarded)
    }

    /// One side of a semibreve whose middle was cut away. The head is taken
    /// to lie half a spacing right of this half; the second half is dropped.
    fn semibreve_half(&mut self, b: &BoundingBox, mut chord: bool) -> Symbol {
        let m = self.m();
        let s = m.spacing;
        let other_half_seen = self.page.glyphs.semibreve_halves.iter().any(|half| {
            let gap = (b.x_start - half.x_end).max(half.x_start - b.x_end);
            gap < s && (half.y() - b.y()).abs() < m.tolerance
        });
        if other_half_seen {
            return Symbol::Discarded;
        }

        let actual_x = b.x() + s / 2;
        if (self.bar.last_x - actual_x).abs() < m.tolerance {
            chord = true;
        }
        let symbol = self.emit(b, NoteType::Whole, Vec::new(), chord, actual_x);
        if symbol != Symbol::Discarded {
            self.page.glyphs.semibreve_halves.push(*b);
        }
        symbol
    }
}
