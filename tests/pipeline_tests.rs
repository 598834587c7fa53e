//! Integration tests: run synthetic score pages through every stage.

use image::{GrayImage, Luma};
use omrlib::deskew::{rotate, Deskewer};
use omrlib::raster::Bitmap;
use omrlib::recognizer::Symbol;
use omrlib::templates::TrainingSet;
use omrlib::{
    parse_document, to_musicxml, NoteType, Pipeline, PipelineConfig, PipelineError, Stage, Step,
};

/// One stave at rows 60..108 (spacing 12), bar lines at x 300 and 578 and
/// a quarter note on the middle line with its stem going up.
fn quarter_note_page() -> GrayImage {
    let mut bitmap = Bitmap::new(600, 200);
    for y in [60, 72, 84, 96, 108] {
        bitmap.fill_rect(20, y, 579, y + 1, true);
    }
    bitmap.fill_rect(300, 60, 301, 109, true);
    bitmap.fill_rect(578, 60, 579, 109, true);
    bitmap.fill_rect(100, 78, 113, 89, true);
    bitmap.fill_rect(112, 42, 113, 89, true);
    bitmap.to_gray()
}

fn straight_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.deskew.max_degrees = 0.0;
    config
}

fn pipeline(gray: GrayImage) -> Pipeline {
    Pipeline::with_templates(gray, straight_config(), TrainingSet::empty())
}

// ─── Stage machine ──────────────────────────────────────────────────

#[test]
fn every_stage_runs_once_in_order() {
    let mut p = pipeline(quarter_note_page());
    let mut seen = Vec::new();
    while !p.is_finished() {
        seen.push(p.advance().expect("stage failed"));
    }
    assert_eq!(seen, Stage::ALL.to_vec());
    assert!(matches!(p.advance(), Err(PipelineError::Finished)));

    let labels: Vec<&str> = p.snapshots().iter().map(|s| s.stage.describe()).collect();
    assert_eq!(labels[0], "Image straightened");
    assert_eq!(labels[7], "Symbols recognized");
    for snapshot in p.snapshots() {
        assert_eq!(snapshot.rendering.dimensions(), (600, 200));
    }
    println!("✓ {} stages: {}", seen.len(), labels.join(" → "));
}

#[test]
fn line_metadata_is_collected() {
    let mut p = pipeline(quarter_note_page());
    for _ in 0..3 {
        p.advance().unwrap();
    }
    let layout = p.layout().unwrap();
    assert_eq!(layout.staves.len(), 1);
    assert_eq!(layout.spacing, 12);
    assert_eq!(p.vertical_lines().bar_lines.len(), 2);

    // removing the stem changed pixels, so the layer shows red
    let layer = p.layer(Stage::VerticalRemoval).unwrap();
    assert_eq!(*layer.get_pixel(112, 50), image::Rgb([255, 0, 0]));
    // bar lines are painted blue over the erased bitmap
    let rendering = &p.snapshot(Stage::VerticalRemoval).unwrap().rendering;
    assert_eq!(*rendering.get_pixel(300, 80), image::Rgb([0, 0, 255]));
    assert_eq!(*rendering.get_pixel(200, 30), image::Rgb([255, 255, 255]));
    println!("✓ spacing {}, {} bar lines", layout.spacing, 2);
}

#[test]
fn snapshots_are_reread_not_recomputed() {
    let mut p = pipeline(quarter_note_page());
    p.run_to_end().unwrap();
    let first = p.snapshot(Stage::Label).unwrap().rendering.clone();
    let again = p.snapshot(Stage::Label).unwrap().rendering.clone();
    assert_eq!(first, again);
    assert_eq!(p.snapshots().len(), 8);
}

// ─── Recognition ────────────────────────────────────────────────────

#[test]
fn quarter_note_page_gives_one_measure() {
    let mut p = pipeline(quarter_note_page());
    let doc = p.run_to_end().unwrap().clone();

    assert_eq!(p.boxes().len(), 1);
    let recognition = p.recognition().unwrap();
    assert_eq!(
        recognition.symbols[0].symbol,
        Symbol::Note(NoteType::Quarter)
    );

    // the second bar holds nothing and is dropped
    assert_eq!(doc.measure_count(), 1);
    let measure = &doc.measures[0];
    assert!(measure.last);
    assert!(measure.attributes.is_some());

    let notes: Vec<_> = doc.notes().collect();
    assert_eq!(notes.len(), 1);
    let pitch = notes[0].pitch.unwrap();
    assert_eq!((pitch.step, pitch.alter, pitch.octave), (Step::B, 0, 4));
    assert_eq!(notes[0].note_type, NoteType::Quarter);
    assert_eq!(notes[0].duration(), 4);

    let xml = to_musicxml(&doc);
    assert_eq!(parse_document(&xml).unwrap(), doc);
    println!("✓ recognised B4 quarter, {} bytes of MusicXML", xml.len());
}

#[test]
fn page_without_staves_stops_before_recognition() {
    let mut p = pipeline(GrayImage::from_pixel(120, 80, Luma([255])));
    let err = p.run_to_end().unwrap_err();
    assert!(matches!(err, PipelineError::NoStaves));
    assert_eq!(p.next_stage(), Some(Stage::Recognize));
    assert!(p.document().is_none());
}

// ─── Deskew ─────────────────────────────────────────────────────────

#[test]
fn skewed_stave_is_straightened() {
    let mut gray = GrayImage::from_pixel(400, 120, Luma([255]));
    for y in [30u32, 42, 54, 66, 78] {
        for x in 20..380 {
            gray.put_pixel(x, y, Luma([0]));
            gray.put_pixel(x, y + 1, Luma([0]));
        }
    }
    let skewed = rotate(&gray, 0.3);
    let config = PipelineConfig::default();
    let angle = Deskewer::new(&config.deskew, config.binarize_threshold).estimate(&skewed);

    assert!(angle < 0.0, "expected a negative correction, got {angle}");
    assert!((angle + 0.3).abs() <= 0.15, "expected about -0.3, got {angle}");
    println!("✓ estimated correction {angle:.2}°");
}
