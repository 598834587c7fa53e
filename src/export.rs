//! MusicXML writer: turns a recognised [`Document`] into partwise text.
//!
//! Only the subset the recogniser produces is written: one part, attributes
//! at system starts, notes with pitch, duration, ties, beams and accidentals,
//! backups between staves and a final heavy bar line.

use std::fmt::Write as _;
use std::path::Path;

use tracing::info;

use crate::error::ExportError;
use crate::model::{Attributes, Document, Measure, MeasureEvent, Note};
use crate::mxl;

/// Part identifier used in the part list and on the part element.
pub const PART_ID: &str = "P1";

const HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>
<!DOCTYPE score-partwise PUBLIC "-//Recordare//DTD MusicXML 3.1 Partwise//EN" "http://www.musicxml.org/dtds/partwise.dtd">
"#;

/// Serialize a document to MusicXML text.
pub fn to_musicxml(doc: &Document) -> String {
    let mut out = String::with_capacity(4096 + doc.measures.len() * 1024);
    out.push_str(HEADER);
    out.push_str("<score-partwise version=\"3.1\">\n");
    out.push_str("  <part-list>\n");
    let _ = writeln!(out, "    <score-part id=\"{PART_ID}\">");
    let _ = writeln!(out, "      <part-name>{}</part-name>", escape(&doc.part_name));
    out.push_str("    </score-part>\n");
    out.push_str("  </part-list>\n");
    let _ = writeln!(out, "  <part id=\"{PART_ID}\">");
    for measure in &doc.measures {
        write_measure(&mut out, measure);
    }
    out.push_str("  </part>\n");
    out.push_str("</score-partwise>\n");
    out
}

/// Write a document to `path`: compressed when the extension is `mxl`,
/// plain MusicXML text otherwise.
pub fn write_file<P: AsRef<Path>>(path: P, doc: &Document) -> Result<(), ExportError> {
    let path = path.as_ref();
    let xml = to_musicxml(doc);
    let compressed = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mxl"));
    if compressed {
        let bytes = mxl::write_mxl(&xml)?;
        std::fs::write(path, bytes)?;
    } else {
        std::fs::write(path, xml)?;
    }
    info!(path = %path.display(), measures = doc.measure_count(), compressed, "document written");
    Ok(())
}

// ─── Measures ────────────────────────────────────────────────────────

fn write_measure(out: &mut String, measure: &Measure) {
    let _ = writeln!(out, "    <measure number=\"{}\">", measure.number);
    if measure.new_system {
        out.push_str("      <print new-system=\"yes\"/>\n");
    }
    if let Some(attributes) = &measure.attributes {
        write_attributes(out, attributes);
    }
    for event in &measure.events {
        match event {
            MeasureEvent::Note(note) => write_note(out, note),
            MeasureEvent::Backup { duration } => {
                out.push_str("      <backup>\n");
                let _ = writeln!(out, "        <duration>{duration}</duration>");
                out.push_str("      </backup>\n");
            }
        }
    }
    if measure.last {
        out.push_str("      <barline location=\"right\">\n");
        out.push_str("        <bar-style>light-heavy</bar-style>\n");
        out.push_str("      </barline>\n");
    }
    out.push_str("    </measure>\n");
}

fn write_attributes(out: &mut String, a: &Attributes) {
    out.push_str("      <attributes>\n");
    let _ = writeln!(out, "        <divisions>{}</divisions>", a.divisions);
    out.push_str("        <key>\n");
    let _ = writeln!(out, "          <fifths>{}</fifths>", a.key.fifths);
    let _ = writeln!(out, "          <mode>{}</mode>", escape(&a.key.mode));
    out.push_str("        </key>\n");
    out.push_str("        <time>\n");
    let _ = writeln!(out, "          <beats>{}</beats>", a.time.beats);
    let _ = writeln!(out, "          <beat-type>{}</beat-type>", a.time.beat_type);
    out.push_str("        </time>\n");
    let _ = writeln!(out, "        <staves>{}</staves>", a.staves);
    for clef in &a.clefs {
        let _ = writeln!(out, "        <clef number=\"{}\">", clef.number);
        let _ = writeln!(out, "          <sign>{}</sign>", clef.kind.sign());
        let _ = writeln!(out, "          <line>{}</line>", clef.kind.line());
        out.push_str("        </clef>\n");
    }
    out.push_str("      </attributes>\n");
}

// ─── Notes ───────────────────────────────────────────────────────────

fn write_note(out: &mut String, note: &Note) {
    out.push_str("      <note>\n");
    if note.chord {
        out.push_str("        <chord/>\n");
    }
    match &note.pitch {
        Some(pitch) => {
            out.push_str("        <pitch>\n");
            let _ = writeln!(out, "          <step>{}</step>", pitch.step.as_str());
            if pitch.alter != 0 {
                let _ = writeln!(out, "          <alter>{}</alter>", pitch.alter);
            }
            let _ = writeln!(out, "          <octave>{}</octave>", pitch.octave);
            out.push_str("        </pitch>\n");
        }
        None => out.push_str("        <rest/>\n"),
    }
    let _ = writeln!(out, "        <duration>{}</duration>", note.duration());
    if let Some(tie) = note.tie {
        let _ = writeln!(out, "        <tie type=\"{}\"/>", tie.as_str());
    }
    let _ = writeln!(out, "        <voice>{}</voice>", note.voice);
    let _ = writeln!(out, "        <type>{}</type>", note.note_type.as_str());
    if note.dotted {
        out.push_str("        <dot/>\n");
    }
    if let Some(accidental) = note.accidental {
        let _ = writeln!(out, "        <accidental>{}</accidental>", accidental.as_str());
    }
    let _ = writeln!(out, "        <staff>{}</staff>", note.staff);
    for (level, role) in note.beams.iter().take(2).enumerate() {
        let _ = writeln!(
            out,
            "        <beam number=\"{}\">{}</beam>",
            level + 1,
            role.as_str()
        );
    }
    if let Some(tie) = note.tie {
        out.push_str("        <notations>\n");
        let _ = writeln!(out, "          <tied type=\"{}\"/>", tie.as_str());
        out.push_str("        </notations>\n");
    }
    out.push_str("      </note>\n");
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Accidental, BeamRole, Clef, ClefKind, Key, NoteType, Pitch, Step, TieType, TimeSignature,
        DIVISIONS,
    };

    fn eighth(step: Step, alter: i32, beam: BeamRole) -> Note {
        Note {
            pitch: Some(Pitch {
                step,
                alter,
                octave: 4,
            }),
            note_type: NoteType::Eighth,
            dotted: false,
            tie: None,
            voice: 1,
            staff: 1,
            beams: vec![beam],
            accidental: None,
            chord: false,
        }
    }

    #[test]
    fn note_elements_in_order() {
        let mut note = eighth(Step::F, 1, BeamRole::Begin);
        note.accidental = Some(Accidental::Sharp);
        note.tie = Some(TieType::Start);
        note.dotted = true;
        note.chord = true;
        let mut out = String::new();
        write_note(&mut out, &note);

        let order = [
            "<chord/>",
            "<step>F</step>",
            "<alter>1</alter>",
            "<octave>4</octave>",
            "<duration>3</duration>",
            "<tie type=\"start\"/>",
            "<voice>1</voice>",
            "<type>eighth</type>",
            "<dot/>",
            "<accidental>sharp</accidental>",
            "<staff>1</staff>",
            "<beam number=\"1\">begin</beam>",
            "<tied type=\"start\"/>",
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|needle| out.find(needle).unwrap_or_else(|| panic!("missing {needle}")))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{out}");
    }

    #[test]
    fn natural_pitch_has_no_alter_and_rests_have_no_pitch() {
        let mut out = String::new();
        write_note(&mut out, &eighth(Step::C, 0, BeamRole::End));
        assert!(!out.contains("<alter>"));
        assert!(out.contains("<beam number=\"1\">end</beam>"));

        let mut out = String::new();
        write_note(&mut out, &Note::rest(NoteType::Whole, false, 2));
        assert!(out.contains("<rest/>"));
        assert!(out.contains("<duration>16</duration>"));
        assert!(out.contains("<voice>2</voice>"));
        assert!(!out.contains("<pitch>"));
    }

    #[test]
    fn measures_carry_system_breaks_attributes_and_final_bar() {
        let mut doc = Document::new("Piano & Voice");
        let mut first = Measure::new(1);
        first.attributes = Some(Attributes {
            divisions: DIVISIONS,
            key: Key {
                fifths: -2,
                mode: "major".into(),
            },
            time: TimeSignature {
                beats: 3,
                beat_type: 4,
            },
            staves: 2,
            clefs: vec![
                Clef {
                    number: 1,
                    kind: ClefKind::Treble,
                },
                Clef {
                    number: 2,
                    kind: ClefKind::Bass,
                },
            ],
        });
        first.events.push(MeasureEvent::Backup { duration: 16 });
        let mut second = Measure::new(2);
        second.new_system = true;
        second.last = true;
        doc.measures = vec![first, second];

        let xml = to_musicxml(&doc);
        assert!(xml.contains("<part-name>Piano &amp; Voice</part-name>"));
        assert!(xml.contains("<fifths>-2</fifths>"));
        assert!(xml.contains("<beat-type>4</beat-type>"));
        assert!(xml.contains("<clef number=\"2\">\n          <sign>F</sign>\n          <line>4</line>"));
        assert!(xml.contains("<backup>\n        <duration>16</duration>"));
        assert_eq!(xml.matches("<print new-system=\"yes\"/>").count(), 1);
        assert_eq!(xml.matches("<bar-style>light-heavy</bar-style>").count(), 1);
        assert!(xml.trim_end().ends_with("</part>\n</score-partwise>"));
    }
}
