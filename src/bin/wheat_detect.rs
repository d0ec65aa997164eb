//! wheat_detect - one-shot wheat head detection on a local JPEG
//!
//! This tool:
//! 1. Fetches the checkpoint if it is not on disk yet
//! 2. Loads the model
//! 3. Detects wheat heads in one image and prints the results table
//! 4. Optionally writes the annotated image

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use image::ImageFormat;
use std::path::PathBuf;

use wheat_detector::pipeline::load_backend;
use wheat_detector::render::encode;
use wheat_detector::ui::Ui;
use wheat_detector::{CheckpointSource, DemoConfig, ModelCache, WheatDetector};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JPEG image to run detection on.
    #[arg(long, value_name = "FILE")]
    image: PathBuf,
    /// Confidence threshold (0-1). 0 or unset uses the configured default.
    #[arg(long, value_name = "THRESHOLD")]
    confidence: Option<f32>,
    /// Write the annotated image here (format from extension, e.g. .png or .jpg).
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,
    /// Results output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
    /// Detector backend (tract or fixed). Overrides config.
    #[arg(long)]
    backend: Option<String>,
    /// Local checkpoint path. Overrides config.
    #[arg(long, value_name = "FILE")]
    checkpoint: Option<PathBuf>,
    /// Checkpoint download URL used when the local file is missing.
    #[arg(long, value_name = "URL")]
    checkpoint_url: Option<String>,
    /// Progress output: auto, plain or pretty.
    #[arg(long)]
    ui: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let ui = Ui::from_flag(args.ui.as_deref());

    let mut cfg = DemoConfig::load()?;
    if let Some(backend) = args.backend {
        cfg.model.backend = backend;
    }
    if let Some(path) = args.checkpoint {
        cfg.checkpoint.path = path;
    }
    if let Some(url) = args.checkpoint_url {
        cfg.checkpoint.url = Some(url);
    }
    cfg.validate()?;

    let bytes = std::fs::read(&args.image)
        .with_context(|| format!("read image {}", args.image.display()))?;
    let file_name = args
        .image
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());

    let cache = ModelCache::new(cfg.model.cache_ttl, cfg.model.cache_capacity);
    if cfg.model.backend == "tract" {
        // Download outside a spinner stage so the progress bar draws cleanly.
        CheckpointSource::from_settings(&cfg.checkpoint)
            .with_progress(ui.is_pretty())
            .ensure_local()?;
    }
    let backend = {
        let _stage = ui.stage("load model");
        load_backend(&cfg, &cache, false)?
    };
    let detector = WheatDetector::new(backend, cfg.confidence_threshold)?;

    let outcome = {
        let _stage = ui.stage("detect wheat heads");
        detector.detect_upload(file_name.as_deref(), &bytes, args.confidence)?
    };

    if let Some(out) = &args.out {
        let _stage = ui.stage("write annotated image");
        let format = ImageFormat::from_path(out).unwrap_or(ImageFormat::Png);
        let encoded = encode(&outcome.annotated, format)?;
        std::fs::write(out, encoded).with_context(|| format!("write {}", out.display()))?;
    }

    match args.format {
        OutputFormat::Table => print!("{}", outcome.table.to_text()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome.report())?),
    }
    Ok(())
}
