//! Command-line front end: recognise a score image and write MusicXML.
//!
//! # Usage
//!
//! ```bash
//! # Print MusicXML to stdout
//! omr page.png
//!
//! # Write a compressed score and dump every stage as PNG
//! omr page.png -o page.mxl --stages-dir ./stages
//!
//! # Recognised document as JSON, with classification logs
//! omr page.png --json --verbose
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use omrlib::ingest;
use omrlib::{document_to_json, to_musicxml, write_file, Pipeline, PipelineConfig};

/// Recognise a scanned score and export it as MusicXML
#[derive(Parser, Debug)]
#[command(name = "omr")]
#[command(version, about, long_about = None)]
struct Args {
    /// Score image (PNG, JPEG, GIF, BMP, TIFF)
    image: PathBuf,

    /// Output file (.musicxml, or .mxl for a compressed archive); stdout if omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory to write every stage rendering into
    #[arg(long)]
    stages_dir: Option<PathBuf>,

    /// Print the document as JSON instead of MusicXML
    #[arg(long)]
    json: bool,

    /// Log classification decisions
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default = if args.verbose { "omrlib=debug,omr=debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let page = ingest::load(&args.image)?;
    let mut pipeline = Pipeline::new(&page, config);
    while let Some(stage) = pipeline.next_stage() {
        pipeline
            .advance()
            .with_context(|| format!("Stage \"{}\" failed", stage.describe()))?;
    }

    if let Some(dir) = &args.stages_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        for (i, snapshot) in pipeline.snapshots().iter().enumerate() {
            let path = dir.join(format!("{:02}-{}.png", i + 1, snapshot.stage.slug()));
            snapshot
                .rendering
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        info!(dir = %dir.display(), "stage renderings written");
    }

    let doc = pipeline
        .into_document()
        .context("Recognition produced no document")?;

    match (&args.output, args.json) {
        (Some(path), false) => write_file(path, &doc)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        (Some(path), true) => std::fs::write(path, document_to_json(&doc)?)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        (None, true) => println!("{}", document_to_json(&doc)?),
        (None, false) => print!("{}", to_musicxml(&doc)),
    }
    Ok(())
}
