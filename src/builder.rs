//! Accumulates recognised events into measures and measures into a document.

use tracing::warn;

use crate::model::{Attributes, Document, Measure, MeasureEvent, Note};

/// Backup length that rewinds a full 4/4 bar.
pub const BACKUP_DURATION: i32 = 16;

/// One measure under construction.
///
/// A measure is empty until a note or rest is added; backups alone do not
/// count, and an empty measure is never appended to the document.
#[derive(Debug)]
pub struct MeasureBuilder {
    measure: Measure,
    empty: bool,
}

impl MeasureBuilder {
    pub fn new(number: i32) -> Self {
        Self {
            measure: Measure::new(number),
            empty: true,
        }
    }

    pub fn add_note(&mut self, note: Note) {
        self.empty = false;
        self.measure.events.push(MeasureEvent::Note(note));
    }

    /// Rewind the time cursor so the next stave starts at the bar line.
    pub fn add_backup(&mut self) {
        self.measure.events.push(MeasureEvent::Backup {
            duration: BACKUP_DURATION,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn number(&self) -> i32 {
        self.measure.number
    }
}

/// Builds one [`Document`] per recognition run.
#[derive(Debug)]
pub struct DocumentBuilder {
    document: Document,
    new_system: bool,
}

impl DocumentBuilder {
    pub fn new(part_name: impl Into<String>) -> Self {
        Self {
            document: Document::new(part_name),
            new_system: false,
        }
    }

    /// Number the next measure will carry.
    pub fn next_number(&self) -> i32 {
        self.document.measures.len() as i32 + 1
    }

    pub fn len(&self) -> usize {
        self.document.measures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document.measures.is_empty()
    }

    /// Start a new system. Unless it is the first one, the next measure
    /// actually appended is flagged as beginning a new line.
    pub fn start_system(&mut self) {
        self.new_system = !self.document.measures.is_empty();
    }

    /// Append `measure` unless it is empty. Returns whether it was kept.
    pub fn push(&mut self, measure: MeasureBuilder) -> bool {
        if measure.is_empty() {
            return false;
        }
        let mut measure = measure.measure;
        measure.new_system = std::mem::take(&mut self.new_system);
        self.document.measures.push(measure);
        true
    }

    /// Attach system attributes to the measure at `index` (the first one the
    /// system appended). A system that appended nothing only gets a warning.
    pub fn attach_attributes(&mut self, index: usize, attributes: Attributes) -> bool {
        match self.document.measures.get_mut(index) {
            Some(measure) => {
                measure.attributes = Some(attributes);
                true
            }
            None => {
                warn!(index, "system produced no measures; attributes dropped");
                false
            }
        }
    }

    /// Flag the final measure so it closes with a heavy bar line.
    pub fn mark_last(&mut self) {
        if let Some(measure) = self.document.measures.last_mut() {
            measure.last = true;
        }
    }

    pub fn finish(self) -> Document {
        self.document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Key, NoteType, TimeSignature};

    fn attributes() -> Attributes {
        Attributes {
            divisions: 4,
            key: Key {
                fifths: 0,
                mode: "major".to_string(),
            },
            time: TimeSignature {
                beats: 4,
                beat_type: 4,
            },
            staves: 1,
            clefs: Vec::new(),
        }
    }

    #[test]
    fn backups_alone_leave_a_measure_empty() {
        let mut builder = DocumentBuilder::new("Music");
        let mut measure = MeasureBuilder::new(builder.next_number());
        measure.add_backup();
        assert!(measure.is_empty());
        assert!(!builder.push(measure));
        assert!(builder.is_empty());

        let mut measure = MeasureBuilder::new(builder.next_number());
        measure.add_note(Note::rest(NoteType::Whole, false, 1));
        measure.add_backup();
        assert!(builder.push(measure));
        let doc = builder.finish();
        assert_eq!(doc.measures.len(), 1);
        assert_eq!(doc.measures[0].number, 1);
        assert_eq!(doc.measures[0].events.len(), 2);
    }

    #[test]
    fn new_system_flag_waits_for_a_kept_measure() {
        let mut builder = DocumentBuilder::new("Music");
        builder.start_system();
        let mut m = MeasureBuilder::new(1);
        m.add_note(Note::rest(NoteType::Half, false, 1));
        builder.push(m);

        builder.start_system();
        assert!(!builder.push(MeasureBuilder::new(2)));
        let mut m = MeasureBuilder::new(2);
        m.add_note(Note::rest(NoteType::Half, false, 1));
        builder.push(m);
        builder.mark_last();

        let doc = builder.finish();
        assert!(!doc.measures[0].new_system);
        assert!(doc.measures[1].new_system);
        assert!(doc.measures[1].last);
        assert!(!doc.measures[0].last);
    }

    #[test]
    fn attributes_need_a_measure() {
        let mut builder = DocumentBuilder::new("Music");
        assert!(!builder.attach_attributes(0, attributes()));
        let mut m = MeasureBuilder::new(1);
        m.add_note(Note::rest(NoteType::Quarter, false, 1));
        builder.push(m);
        assert!(builder.attach_attributes(0, attributes()));
        assert!(builder.finish().measures[0].attributes.is_some());
    }
}
