//! The stage machine: deskew through recognition, one stage per advance.
//!
//! Every completed stage leaves a [`Snapshot`] behind: its binary buffer
//! where it has one, and an RGB rendering for display. Reading a snapshot
//! never re-runs anything. A stage that fails leaves the machine exactly as
//! it was before the attempt.

use std::fmt;

use image::{GrayImage, Rgb, RgbImage};
use serde::Serialize;
use tracing::info;

use crate::bbox::{BoundingBox, BufferId, SubimageCache};
use crate::cca::{bounding_boxes, label_components, resolve_equivalences, ComponentMatrix, Labeling};
use crate::config::PipelineConfig;
use crate::deskew::Deskewer;
use crate::error::PipelineError;
use crate::geometry::{change_layer, draw_box, label_color, project, Axis};
use crate::ingest::Page;
use crate::lines::{patch, remove_staff_lines, remove_vertical_lines, StaffLayout, VerticalLines};
use crate::model::Document;
use crate::raster::Bitmap;
use crate::recognizer::{Recognition, Recognizer};
use crate::templates::TrainingSet;

const BAR_LINE_TINT: Rgb<u8> = Rgb([0, 0, 255]);
const BOX_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    Deskew,
    StaffRemoval,
    VerticalRemoval,
    Patch,
    Label,
    ResolveEquivalences,
    BoundingBoxes,
    Recognize,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Deskew,
        Stage::StaffRemoval,
        Stage::VerticalRemoval,
        Stage::Patch,
        Stage::Label,
        Stage::ResolveEquivalences,
        Stage::BoundingBoxes,
        Stage::Recognize,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Human-readable label of the completed stage.
    pub fn describe(self) -> &'static str {
        match self {
            Stage::Deskew => "Image straightened",
            Stage::StaffRemoval => "Stave lines removed",
            Stage::VerticalRemoval => "Vertical lines removed",
            Stage::Patch => "Patched up",
            Stage::Label => "Components collected",
            Stage::ResolveEquivalences => "Label equivalences resolved",
            Stage::BoundingBoxes => "Bounding boxes drawn",
            Stage::Recognize => "Symbols recognized",
        }
    }

    /// Short name, used for file names.
    pub fn slug(self) -> &'static str {
        match self {
            Stage::Deskew => "deskew",
            Stage::StaffRemoval => "staff-removal",
            Stage::VerticalRemoval => "vertical-removal",
            Stage::Patch => "patch",
            Stage::Label => "label",
            Stage::ResolveEquivalences => "resolve-equivalences",
            Stage::BoundingBoxes => "bounding-boxes",
            Stage::Recognize => "recognize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// What a completed stage left behind.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub stage: Stage,
    pub buffer: BufferId,
    /// Binary buffer for the stages that produce one
    pub bitmap: Option<Bitmap>,
    pub rendering: RgbImage,
}

/// Drives a page through every stage.
pub struct Pipeline {
    config: PipelineConfig,
    templates: TrainingSet,
    source: GrayImage,
    snapshots: Vec<Snapshot>,
    /// Straightened bitmap, staff lines still present
    deskewed: Option<Bitmap>,
    /// Bitmap of the last binary stage
    working: Option<Bitmap>,
    layout: Option<StaffLayout>,
    vertical: VerticalLines,
    labeling: Option<Labeling>,
    boxes: Vec<BoundingBox>,
    recognition: Option<Recognition>,
    cache: SubimageCache,
}

impl Pipeline {
    /// Start a pipeline for a decoded page, loading templates as configured.
    pub fn new(page: &Page, config: PipelineConfig) -> Self {
        let templates = TrainingSet::load_available(&config.template_dir, config.binarize_threshold);
        Self::with_templates(page.intensity(), config, templates)
    }

    /// Start from an intensity image and an explicit template set.
    pub fn with_templates(source: GrayImage, config: PipelineConfig, templates: TrainingSet) -> Self {
        Self {
            config,
            templates,
            source,
            snapshots: Vec::with_capacity(Stage::ALL.len()),
            deskewed: None,
            working: None,
            layout: None,
            vertical: VerticalLines::default(),
            labeling: None,
            boxes: Vec::new(),
            recognition: None,
            cache: SubimageCache::new(BufferId(0)),
        }
    }

    /// Stage the next advance would run, or None once finished.
    pub fn next_stage(&self) -> Option<Stage> {
        Stage::ALL.get(self.snapshots.len()).copied()
    }

    pub fn is_finished(&self) -> bool {
        self.next_stage().is_none()
    }

    /// Run the next stage.
    pub fn advance(&mut self) -> Result<Stage, PipelineError> {
        let stage = self.next_stage().ok_or(PipelineError::Finished)?;
        let buffer = BufferId(stage.index() as u64 + 1);
        let (bitmap, rendering) = match stage {
            Stage::Deskew => self.deskew(),
            Stage::StaffRemoval => self.remove_staff()?,
            Stage::VerticalRemoval => self.remove_vertical(),
            Stage::Patch => self.patch(),
            Stage::Label => self.label(),
            Stage::ResolveEquivalences => self.resolve(),
            Stage::BoundingBoxes => self.derive_boxes(),
            Stage::Recognize => self.recognize(buffer)?,
        };
        self.cache.rebind(buffer);
        self.snapshots.push(Snapshot {
            stage,
            buffer,
            bitmap,
            rendering,
        });
        info!(stage = stage.slug(), "{}", stage.describe());
        Ok(stage)
    }

    /// Advance until the recognition stage has run.
    pub fn run_to_end(&mut self) -> Result<&Document, PipelineError> {
        while !self.is_finished() {
            self.advance()?;
        }
        self.document().ok_or(PipelineError::NoStaves)
    }

    pub fn describe(&self, stage: Stage) -> &'static str {
        stage.describe()
    }

    pub fn snapshot(&self, stage: Stage) -> Option<&Snapshot> {
        self.snapshots.get(stage.index())
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// For the three line-removal stages, the previous stage's bitmap with
    /// every pixel the stage changed painted red.
    pub fn layer(&self, stage: Stage) -> Option<RgbImage> {
        if !matches!(stage, Stage::StaffRemoval | Stage::VerticalRemoval | Stage::Patch) {
            return None;
        }
        let previous = self.snapshots.get(stage.index() - 1)?.bitmap.as_ref()?;
        let current = self.snapshot(stage)?.bitmap.as_ref()?;
        Some(change_layer(previous, current))
    }

    pub fn layout(&self) -> Option<&StaffLayout> {
        self.layout.as_ref()
    }

    pub fn vertical_lines(&self) -> &VerticalLines {
        &self.vertical
    }

    pub fn components(&self) -> Option<&ComponentMatrix> {
        self.labeling.as_ref().map(|l| &l.matrix)
    }

    pub fn boxes(&self) -> &[BoundingBox] {
        &self.boxes
    }

    pub fn recognition(&self) -> Option<&Recognition> {
        self.recognition.as_ref()
    }

    /// The recognised document, once the last stage has run.
    pub fn document(&self) -> Option<&Document> {
        self.recognition.as_ref().map(|r| &r.document)
    }

    pub fn into_document(self) -> Option<Document> {
        self.recognition.map(|r| r.document)
    }

    // ─── Stages ──────────────────────────────────────────────────────

    fn deskew(&mut self) -> (Option<Bitmap>, RgbImage) {
        let deskewer = Deskewer::new(&self.config.deskew, self.config.binarize_threshold);
        let deskewed = deskewer.deskew(&self.source);
        let rendering = deskewed.bitmap.to_rgb();
        self.deskewed = Some(deskewed.bitmap.clone());
        self.working = Some(deskewed.bitmap.clone());
        (Some(deskewed.bitmap), rendering)
    }

    fn current(&self) -> Bitmap {
        self.working
            .clone()
            .unwrap_or_else(|| Bitmap::new(self.source.width(), self.source.height()))
    }

    fn remove_staff(&mut self) -> Result<(Option<Bitmap>, RgbImage), PipelineError> {
        let mut bitmap = self.current();
        let histogram = project(&bitmap, Axis::Rows);
        let threshold = self.config.line_threshold(bitmap.width());
        let layout =
            remove_staff_lines(&mut bitmap, &histogram, threshold, self.config.line_distortion)?;
        info!(
            staves = layout.staves.len(),
            spacing = layout.spacing,
            "staff layout"
        );
        self.layout = Some(layout);
        Ok(self.keep(bitmap))
    }

    fn remove_vertical(&mut self) -> (Option<Bitmap>, RgbImage) {
        let mut bitmap = self.current();
        let layout = self.layout.clone().unwrap_or_default();
        self.vertical = remove_vertical_lines(&mut bitmap, &layout, self.config.line_distortion);
        info!(
            bar_lines = self.vertical.bar_lines.len(),
            lines = self.vertical.lines.len(),
            "vertical lines removed"
        );
        let mut rendering = bitmap.to_rgb();
        for bar in &self.vertical.bar_lines {
            tint(&mut rendering, bar, BAR_LINE_TINT);
        }
        self.working = Some(bitmap.clone());
        (Some(bitmap), rendering)
    }

    fn patch(&mut self) -> (Option<Bitmap>, RgbImage) {
        let mut bitmap = self.current();
        if let (Some(original), Some(layout)) = (&self.deskewed, &self.layout) {
            patch(&mut bitmap, original, layout, &self.vertical.lines);
        }
        self.keep(bitmap)
    }

    fn label(&mut self) -> (Option<Bitmap>, RgbImage) {
        let labeling = label_components(&self.current());
        info!(
            provisional = labeling.equivalences.label_count(),
            "components labelled"
        );
        let rendering = render_labels(&labeling.matrix);
        self.labeling = Some(labeling);
        (None, rendering)
    }

    fn resolve(&mut self) -> (Option<Bitmap>, RgbImage) {
        let Some(labeling) = self.labeling.as_mut() else {
            return (None, self.blank());
        };
        resolve_equivalences(labeling);
        info!(
            components = labeling.matrix.distinct_labels().len(),
            "equivalences resolved"
        );
        (None, render_labels(&labeling.matrix))
    }

    fn derive_boxes(&mut self) -> (Option<Bitmap>, RgbImage) {
        let Some(labeling) = &self.labeling else {
            return (None, self.blank());
        };
        self.boxes = bounding_boxes(&labeling.matrix);
        info!(boxes = self.boxes.len(), "bounding boxes derived");
        let mut rendering = render_labels(&labeling.matrix);
        for b in &self.boxes {
            draw_box(&mut rendering, b, BOX_COLOR);
        }
        (None, rendering)
    }

    fn recognize(&mut self, buffer: BufferId) -> Result<(Option<Bitmap>, RgbImage), PipelineError> {
        let layout = self.layout.as_ref().ok_or(PipelineError::NoStaves)?;
        let labeling = self.labeling.as_ref().ok_or(PipelineError::NoStaves)?;
        let recognizer = Recognizer::new(
            layout,
            &self.vertical,
            &labeling.matrix,
            &self.templates,
            &self.config,
        )?;
        self.cache.rebind(buffer);
        let recognition = recognizer.recognize(&self.boxes, &mut self.cache);

        let mut rendering = self.current().to_rgb();
        for classified in &recognition.symbols {
            draw_box(&mut rendering, &classified.bbox, classified.symbol.color());
        }
        self.recognition = Some(recognition);
        Ok((None, rendering))
    }

    fn blank(&self) -> RgbImage {
        RgbImage::from_pixel(self.source.width(), self.source.height(), BACKGROUND)
    }

    fn keep(&mut self, bitmap: Bitmap) -> (Option<Bitmap>, RgbImage) {
        let rendering = bitmap.to_rgb();
        self.working = Some(bitmap.clone());
        (Some(bitmap), rendering)
    }
}

/// One colour per label, background white.
fn render_labels(matrix: &ComponentMatrix) -> RgbImage {
    RgbImage::from_fn(matrix.width(), matrix.height(), |x, y| {
        match matrix.label_at(x as i32, y as i32) {
            0 => BACKGROUND,
            label => label_color(label),
        }
    })
}

/// Paint `bbox` solid, clipped to the image.
fn tint(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    for y in bbox.y_start.max(0)..=bbox.y_end.min(h - 1) {
        for x in bbox.x_start.max(0)..=bbox.x_end.min(w - 1) {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn blank(width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([255]))
    }

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.deskew.max_degrees = 0.0;
        config
    }

    #[test]
    fn stages_run_in_order_and_then_stop() {
        assert_eq!(Stage::ALL[3].describe(), "Patched up");
        let mut pipeline = Pipeline::with_templates(blank(40, 30), config(), TrainingSet::empty());
        assert_eq!(pipeline.next_stage(), Some(Stage::Deskew));
        assert_eq!(pipeline.advance().unwrap(), Stage::Deskew);
        assert_eq!(pipeline.advance().unwrap(), Stage::StaffRemoval);
        assert!(pipeline.layout().unwrap().is_empty());
        for _ in 0..5 {
            pipeline.advance().unwrap();
        }
        // nothing to recognise on an empty page
        assert!(matches!(pipeline.advance(), Err(PipelineError::NoStaves)));
        assert_eq!(pipeline.next_stage(), Some(Stage::Recognize));
        assert_eq!(pipeline.snapshots().len(), 7);
    }

    #[test]
    fn bad_line_count_leaves_the_machine_where_it_was() {
        let mut gray = blank(60, 40);
        for y in [10u32, 20] {
            for x in 0..60 {
                gray.put_pixel(x, y, Luma([0]));
            }
        }
        let mut pipeline = Pipeline::with_templates(gray, config(), TrainingSet::empty());
        pipeline.advance().unwrap();
        let err = pipeline.advance().unwrap_err();
        assert!(matches!(err, PipelineError::StaffLineCount { found: 2 }));
        assert_eq!(pipeline.next_stage(), Some(Stage::StaffRemoval));
        assert_eq!(pipeline.snapshots().len(), 1);
        assert_eq!(pipeline.current().count_black(), 120);
    }

    #[test]
    fn layers_only_for_line_removal_stages() {
        let mut pipeline = Pipeline::with_templates(blank(20, 20), config(), TrainingSet::empty());
        pipeline.advance().unwrap();
        pipeline.advance().unwrap();
        assert!(pipeline.layer(Stage::Deskew).is_none());
        let layer = pipeline.layer(Stage::StaffRemoval).unwrap();
        assert_eq!(layer.dimensions(), (20, 20));
        assert!(pipeline.layer(Stage::Patch).is_none());
    }

    #[test]
    fn labels_render_on_white() {
        let mut bitmap = Bitmap::new(3, 1);
        bitmap.set(1, 0, true);
        let labeling = label_components(&bitmap);
        let image = render_labels(&labeling.matrix);
        assert_eq!(*image.get_pixel(0, 0), BACKGROUND);
        assert_eq!(*image.get_pixel(1, 0), label_color(1));
    }
}
