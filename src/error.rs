//! Error types for ingestion, the stage machine, templates and export.

use std::path::PathBuf;

use thiserror::Error;

/// Failures while turning a file into a pixel buffer.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("File \"{}\" does not exist or is unreadable: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Image file \"{}\" contains no images", path.display())]
    NoFrames { path: PathBuf },

    #[error("File \"{}\" does not contain an image format that can be handled: {reason}", path.display())]
    Unsupported { path: PathBuf, reason: String },
}

/// Structural failures raised while advancing the stage machine.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Number of stave lines must be divisible by 5, found {found}")]
    StaffLineCount { found: usize },

    #[error("No staves available for recognition")]
    NoStaves,

    #[error("Pipeline already finished")]
    Finished,
}

/// Anything that can stop a page on its way to a document.
#[derive(Error, Debug)]
pub enum RecognizeError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// A reference glyph could not be loaded.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Template \"{name}\" could not be loaded from {}: {reason}", path.display())]
    Missing {
        name: &'static str,
        path: PathBuf,
        reason: String,
    },
}

/// Failures while persisting or reading back a document.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MXL archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parse error: {0}")]
    Xml(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures while reading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
