//! Data model for a recognised score.
//!
//! One part, an ordered list of measures, each holding notes, rests and the
//! backup markers that rewind the time cursor between staves. The structures
//! mirror the subset of MusicXML the recogniser emits.

use serde::{Deserialize, Serialize};

/// Divisions per quarter note used throughout.
pub const DIVISIONS: i32 = 4;

/// A complete recognised document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Name written into the part list
    pub part_name: String,
    /// Ordered list of measures
    pub measures: Vec<Measure>,
}

/// A single measure (bar) of music.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    /// Measure number, 1-based
    pub number: i32,
    /// Whether this measure starts a new system (line break)
    pub new_system: bool,
    /// Key, time and clefs; only on the first measure of a system
    pub attributes: Option<Attributes>,
    /// Notes, rests and backups in emission order
    pub events: Vec<MeasureEvent>,
    /// Whether this is the final measure (closed with a heavy bar line)
    pub last: bool,
}

/// One entry in a measure's event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MeasureEvent {
    Note(Note),
    /// Rewind the time cursor before the next stave's notes
    Backup { duration: i32 },
}

/// Musical attributes attached to the first measure of a system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    /// Divisions per quarter note (determines duration resolution)
    pub divisions: i32,
    pub key: Key,
    pub time: TimeSignature,
    /// Number of staves in the system
    pub staves: i32,
    /// One clef per stave that had one recognised
    pub clefs: Vec<Clef>,
}

/// Key signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    /// Number of sharps (positive) or flats (negative)
    pub fifths: i32,
    pub mode: String,
}

/// Time signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub beats: i32,
    pub beat_type: i32,
}

/// Clef of one stave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clef {
    /// Stave number within the system (1-based)
    pub number: i32,
    pub kind: ClefKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClefKind {
    Treble,
    Bass,
}

impl ClefKind {
    /// MusicXML clef sign.
    pub fn sign(self) -> &'static str {
        match self {
            ClefKind::Treble => "G",
            ClefKind::Bass => "F",
        }
    }

    /// Staff line the clef sits on.
    pub fn line(self) -> i32 {
        match self {
            ClefKind::Treble => 2,
            ClefKind::Bass => 4,
        }
    }

    pub fn from_sign(sign: &str) -> Option<Self> {
        match sign {
            "G" => Some(ClefKind::Treble),
            "F" => Some(ClefKind::Bass),
            _ => None,
        }
    }
}

/// A single note or rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Pitch (None if this is a rest)
    pub pitch: Option<Pitch>,
    pub note_type: NoteType,
    pub dotted: bool,
    pub tie: Option<TieType>,
    /// Voice number; equal to the stave number
    pub voice: i32,
    /// Staff number (1-based)
    pub staff: i32,
    /// Beam roles, level 1 first
    pub beams: Vec<BeamRole>,
    pub accidental: Option<Accidental>,
    /// Whether this note sounds together with the previous one
    pub chord: bool,
}

impl Note {
    pub fn rest(note_type: NoteType, dotted: bool, staff: i32) -> Self {
        Self {
            pitch: None,
            note_type,
            dotted,
            tie: None,
            voice: staff,
            staff,
            beams: Vec::new(),
            accidental: None,
            chord: false,
        }
    }

    pub fn is_rest(&self) -> bool {
        self.pitch.is_none()
    }

    /// Duration in divisions; a dot adds half (integer arithmetic).
    pub fn duration(&self) -> i32 {
        let base = self.note_type.divisions();
        if self.dotted {
            base * 3 / 2
        } else {
            base
        }
    }
}

/// Pitch of a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pitch {
    pub step: Step,
    /// Chromatic alteration: -1 = flat, 1 = sharp, 0 = natural
    pub alter: i32,
    /// Octave number (middle C = C4)
    pub octave: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Step {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::C => "C",
            Step::D => "D",
            Step::E => "E",
            Step::F => "F",
            Step::G => "G",
            Step::A => "A",
            Step::B => "B",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "C" => Some(Step::C),
            "D" => Some(Step::D),
            "E" => Some(Step::E),
            "F" => Some(Step::F),
            "G" => Some(Step::G),
            "A" => Some(Step::A),
            "B" => Some(Step::B),
            _ => None,
        }
    }
}

/// Duration class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteType {
    #[serde(rename = "16th")]
    Sixteenth,
    #[serde(rename = "eighth")]
    Eighth,
    #[serde(rename = "quarter")]
    Quarter,
    #[serde(rename = "half")]
    Half,
    #[serde(rename = "whole")]
    Whole,
}

impl NoteType {
    /// Length in divisions (16th = 1).
    pub fn divisions(self) -> i32 {
        match self {
            NoteType::Sixteenth => 1,
            NoteType::Eighth => 2,
            NoteType::Quarter => 4,
            NoteType::Half => 8,
            NoteType::Whole => 16,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NoteType::Sixteenth => "16th",
            NoteType::Eighth => "eighth",
            NoteType::Quarter => "quarter",
            NoteType::Half => "half",
            NoteType::Whole => "whole",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "16th" => Some(NoteType::Sixteenth),
            "eighth" => Some(NoteType::Eighth),
            "quarter" => Some(NoteType::Quarter),
            "half" => Some(NoteType::Half),
            "whole" => Some(NoteType::Whole),
            _ => None,
        }
    }
}

/// Role of a note within one beam level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BeamRole {
    Begin,
    Continue,
    End,
    ForwardHook,
    BackwardHook,
}

impl BeamRole {
    pub fn as_str(self) -> &'static str {
        match self {
            BeamRole::Begin => "begin",
            BeamRole::Continue => "continue",
            BeamRole::End => "end",
            BeamRole::ForwardHook => "forward hook",
            BeamRole::BackwardHook => "backward hook",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "begin" => Some(BeamRole::Begin),
            "continue" => Some(BeamRole::Continue),
            "end" => Some(BeamRole::End),
            "forward hook" => Some(BeamRole::ForwardHook),
            "backward hook" => Some(BeamRole::BackwardHook),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieType {
    Start,
    Stop,
}

impl TieType {
    pub fn as_str(self) -> &'static str {
        match self {
            TieType::Start => "start",
            TieType::Stop => "stop",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(TieType::Start),
            "stop" => Some(TieType::Stop),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accidental {
    Sharp,
    Flat,
    Natural,
}

impl Accidental {
    /// Alteration the accidental imposes.
    pub fn alter(self) -> i32 {
        match self {
            Accidental::Sharp => 1,
            Accidental::Flat => -1,
            Accidental::Natural => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Accidental::Sharp => "sharp",
            Accidental::Flat => "flat",
            Accidental::Natural => "natural",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sharp" => Some(Accidental::Sharp),
            "flat" => Some(Accidental::Flat),
            "natural" => Some(Accidental::Natural),
            _ => None,
        }
    }
}

impl Document {
    pub fn new(part_name: impl Into<String>) -> Self {
        Self {
            part_name: part_name.into(),
            measures: Vec::new(),
        }
    }

    pub fn measure_count(&self) -> usize {
        self.measures.len()
    }

    /// Every note and rest, in document order.
    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.measures.iter().flat_map(|m| m.notes())
    }
}

impl Measure {
    pub fn new(number: i32) -> Self {
        Self {
            number,
            new_system: false,
            attributes: None,
            events: Vec::new(),
            last: false,
        }
    }

    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.events.iter().filter_map(|e| match e {
            MeasureEvent::Note(n) => Some(n),
            MeasureEvent::Backup { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_durations_use_integer_arithmetic() {
        let mut note = Note::rest(NoteType::Quarter, true, 1);
        assert_eq!(note.duration(), 6);
        note.note_type = NoteType::Sixteenth;
        assert_eq!(note.duration(), 1);
        note.note_type = NoteType::Whole;
        assert_eq!(note.duration(), 24);
        note.dotted = false;
        assert_eq!(note.duration(), 16);
    }

    #[test]
    fn names_parse_back() {
        for role in [
            BeamRole::Begin,
            BeamRole::Continue,
            BeamRole::End,
            BeamRole::ForwardHook,
            BeamRole::BackwardHook,
        ] {
            assert_eq!(BeamRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(NoteType::parse("16th"), Some(NoteType::Sixteenth));
        assert_eq!(ClefKind::from_sign("F"), Some(ClefKind::Bass));
        assert_eq!(ClefKind::Bass.line(), 4);
        assert_eq!(Step::parse("H"), None);
    }

    #[test]
    fn serde_names_follow_musicxml() {
        let json = serde_json::to_string(&NoteType::Sixteenth).unwrap();
        assert_eq!(json, "\"16th\"");
        let json = serde_json::to_string(&BeamRole::ForwardHook).unwrap();
        assert_eq!(json, "\"forward-hook\"");
        let event = MeasureEvent::Backup { duration: 16 };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"kind":"backup","duration":16}"#);
    }
}
