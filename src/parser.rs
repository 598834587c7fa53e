//! MusicXML reader: converts exported MusicXML back into a [`Document`].
//!
//! Reads the subset the writer produces. Elements outside it are skipped,
//! values that fail to parse fall back to the writer's defaults.

use roxmltree::{Document as XmlDocument, Node};

use crate::error::ExportError;
use crate::model::*;

/// Parse MusicXML text into a Document.
pub fn parse_document(xml: &str) -> Result<Document, ExportError> {
    // exported files carry a DOCTYPE declaration
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let xml_doc = XmlDocument::parse_with_options(xml, options)
        .map_err(|e| ExportError::Xml(e.to_string()))?;
    let root = xml_doc.root_element();

    if root.tag_name().name() != "score-partwise" {
        return Err(ExportError::Xml(format!(
            "Unsupported root element: '{}'. Only 'score-partwise' is supported.",
            root.tag_name().name()
        )));
    }

    let mut doc = Document::new(String::new());
    let mut part_seen = false;
    for child in root.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "part-list" => parse_part_list(&child, &mut doc),
            // a document holds one part
            "part" if !part_seen => {
                part_seen = true;
                parse_part(&child, &mut doc);
            }
            _ => {}
        }
    }

    Ok(doc)
}

// ─── Part list ───────────────────────────────────────────────────────

fn parse_part_list(node: &Node, doc: &mut Document) {
    let name = node
        .descendants()
        .find(|n| n.has_tag_name("part-name"))
        .and_then(|n| n.text());
    if let Some(name) = name {
        doc.part_name = name.trim().to_string();
    }
}

// ─── Part / Measure ──────────────────────────────────────────────────

fn parse_part(node: &Node, doc: &mut Document) {
    for child in node.children().filter(|n| n.has_tag_name("measure")) {
        doc.measures.push(parse_measure(&child, doc.measures.len()));
    }
}

fn parse_measure(node: &Node, index: usize) -> Measure {
    let number = node
        .attribute("number")
        .and_then(|n| n.parse().ok())
        .unwrap_or(index as i32 + 1);
    let mut measure = Measure::new(number);

    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "print" => {
                if child.attribute("new-system") == Some("yes") {
                    measure.new_system = true;
                }
            }
            "attributes" => measure.attributes = Some(parse_attributes(&child)),
            "note" => measure.events.push(MeasureEvent::Note(parse_note(&child))),
            "backup" => {
                let duration = child_i32(&child, "duration").unwrap_or(0);
                measure.events.push(MeasureEvent::Backup { duration });
            }
            "barline" => {
                let heavy = child
                    .children()
                    .find(|n| n.has_tag_name("bar-style"))
                    .and_then(|n| n.text())
                    .is_some_and(|t| t.trim() == "light-heavy");
                if heavy {
                    measure.last = true;
                }
            }
            _ => {}
        }
    }

    measure
}

// ─── Attributes ──────────────────────────────────────────────────────

fn parse_attributes(node: &Node) -> Attributes {
    let mut attrs = Attributes {
        divisions: DIVISIONS,
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
    };

    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "divisions" => attrs.divisions = parse_i32(&child).unwrap_or(DIVISIONS),
            "key" => {
                attrs.key.fifths = child_i32(&child, "fifths").unwrap_or(0);
                if let Some(mode) = child_text(&child, "mode") {
                    attrs.key.mode = mode.to_string();
                }
            }
            "time" => {
                attrs.time.beats = child_i32(&child, "beats").unwrap_or(4);
                attrs.time.beat_type = child_i32(&child, "beat-type").unwrap_or(4);
            }
            "staves" => attrs.staves = parse_i32(&child).unwrap_or(1),
            "clef" => {
                if let Some(clef) = parse_clef(&child) {
                    attrs.clefs.push(clef);
                }
            }
            _ => {}
        }
    }

    attrs
}

/// Only treble and bass clefs are representable; others are skipped.
fn parse_clef(node: &Node) -> Option<Clef> {
    let number = node
        .attribute("number")
        .and_then(|n| n.parse::<i32>().ok())
        .unwrap_or(1);
    let kind = ClefKind::from_sign(child_text(node, "sign")?)?;
    Some(Clef { number, kind })
}

// ─── Note ────────────────────────────────────────────────────────────

fn parse_note(node: &Node) -> Note {
    let mut note = Note::rest(NoteType::Quarter, false, 1);
    let mut voice = None;

    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "pitch" => note.pitch = Some(parse_pitch(&child)),
            "rest" => note.pitch = None,
            "chord" => note.chord = true,
            "voice" => voice = parse_i32(&child),
            "staff" => note.staff = parse_i32(&child).unwrap_or(1),
            "type" => {
                if let Some(t) = child.text().and_then(|t| NoteType::parse(t.trim())) {
                    note.note_type = t;
                }
            }
            "dot" => note.dotted = true,
            "accidental" => note.accidental = child.text().and_then(|t| Accidental::parse(t.trim())),
            "tie" => {
                // a tie element wins over the tied notation
                note.tie = child.attribute("type").and_then(TieType::parse).or(note.tie);
            }
            "beam" => {
                if let Some(role) = child.text().and_then(|t| BeamRole::parse(t.trim())) {
                    note.beams.push(role);
                }
            }
            "notations" => {
                if note.tie.is_none() {
                    note.tie = child
                        .children()
                        .find(|n| n.has_tag_name("tied"))
                        .and_then(|n| n.attribute("type"))
                        .and_then(TieType::parse);
                }
            }
            _ => {}
        }
    }

    note.voice = voice.unwrap_or(note.staff);
    note
}

fn parse_pitch(node: &Node) -> Pitch {
    Pitch {
        step: child_text(node, "step")
            .and_then(Step::parse)
            .unwrap_or(Step::C),
        alter: child_i32(node, "alter").unwrap_or(0),
        octave: child_i32(node, "octave").unwrap_or(4),
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────

fn child_text<'a>(node: &Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|n| n.has_tag_name(name))
        .and_then(|n| n.text())
        .map(str::trim)
}

fn child_i32(node: &Node, name: &str) -> Option<i32> {
    child_text(node, name)?.parse().ok()
}

fn parse_i32(node: &Node) -> Option<i32> {
    node.text()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE score-partwise PUBLIC "-//Recordare//DTD MusicXML 3.1 Partwise//EN" "http://www.musicxml.org/dtds/partwise.dtd">
<score-partwise version="3.1">
  <part-list>
    <score-part id="P1"><part-name> Flute </part-name></score-part>
  </part-list>
  <part id="P1">
    <measure number="1">
      <attributes>
        <divisions>4</divisions>
        <key><fifths>1</fifths><mode>major</mode></key>
        <time><beats>2</beats><beat-type>4</beat-type></time>
        <staves>1</staves>
        <clef number="1"><sign>G</sign><line>2</line></clef>
        <clef number="2"><sign>C</sign><line>3</line></clef>
      </attributes>
      <note>
        <pitch><step>F</step><alter>1</alter><octave>5</octave></pitch>
        <duration>2</duration>
        <tie type="start"/>
        <voice>1</voice>
        <type>eighth</type>
        <staff>1</staff>
        <beam number="1">forward hook</beam>
        <notations><tied type="start"/></notations>
      </note>
      <note>
        <chord/>
        <pitch><step>A</step><octave>4</octave></pitch>
        <duration>2</duration>
        <voice>1</voice>
        <type>eighth</type>
        <staff>1</staff>
      </note>
      <note>
        <rest/>
        <duration>6</duration>
        <voice>1</voice>
        <type>quarter</type>
        <dot/>
        <staff>1</staff>
      </note>
      <backup><duration>16</duration></backup>
      <barline location="right"><bar-style>light-heavy</bar-style></barline>
    </measure>
  </part>
</score-partwise>
"#;

    #[test]
    fn reads_attributes_and_notes() {
        let doc = parse_document(SAMPLE).unwrap();
        assert_eq!(doc.part_name, "Flute");
        assert_eq!(doc.measures.len(), 1);

        let m = &doc.measures[0];
        assert!(m.last);
        assert!(!m.new_system);
        let attrs = m.attributes.as_ref().unwrap();
        assert_eq!(attrs.key.fifths, 1);
        assert_eq!(attrs.time.beats, 2);
        // the C clef has no counterpart
        assert_eq!(attrs.clefs.len(), 1);
        assert_eq!(attrs.clefs[0].kind, ClefKind::Treble);

        let notes: Vec<&Note> = m.notes().collect();
        assert_eq!(notes.len(), 3);
        let f = notes[0].pitch.unwrap();
        assert_eq!((f.step, f.alter, f.octave), (Step::F, 1, 5));
        assert_eq!(notes[0].tie, Some(TieType::Start));
        assert_eq!(notes[0].beams, vec![BeamRole::ForwardHook]);
        assert!(notes[1].chord);
        assert!(notes[2].is_rest());
        assert!(notes[2].dotted);
        assert_eq!(notes[2].duration(), 6);
        assert_eq!(m.events.last(), Some(&MeasureEvent::Backup { duration: 16 }));
    }

    #[test]
    fn rejects_other_roots() {
        let err = parse_document("<score-timewise/>").unwrap_err();
        assert!(matches!(err, ExportError::Xml(msg) if msg.contains("score-timewise")));
        assert!(parse_document("<unclosed").is_err());
    }
}
