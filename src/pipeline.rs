//! Upload-to-result pipeline.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::sync::{Arc, Mutex};

use crate::config::{validate_threshold, DemoConfig};
use crate::detect::{DetectorBackend, FixedBackend};
use crate::filter::{filter_detections, Detection};
use crate::ingest::{self, InputTensor};
use crate::render::draw_detections;
use crate::report::{DetectionReport, ResultsTable};
use crate::ModelCache;

pub type SharedBackend = Arc<Mutex<dyn DetectorBackend>>;

/// Outcome of one detection request.
#[derive(Clone, Debug)]
pub struct DetectionOutcome {
    /// The pre-processed image, with boxes drawn when there are any.
    pub annotated: RgbImage,
    pub detections: Vec<Detection>,
    pub table: ResultsTable,
    pub threshold: f32,
}

impl DetectionOutcome {
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn report(&self) -> DetectionReport {
        DetectionReport::new(
            self.threshold,
            self.annotated.width(),
            self.annotated.height(),
            self.table.clone(),
        )
    }
}

/// Context attached to errors caused by the request itself: a bad upload or
/// an out-of-range threshold. Everything else is a server-side failure.
#[derive(Debug, Clone, Copy)]
pub struct RejectedInput {
    pub what: &'static str,
}

impl std::fmt::Display for RejectedInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {}", self.what)
    }
}

/// Whether `err` was caused by the caller's input.
pub fn is_rejected_input(err: &anyhow::Error) -> bool {
    err.downcast_ref::<RejectedInput>().is_some()
}

/// Context attached when the backend itself fails.
#[derive(Debug, Clone, Copy)]
pub struct InferenceFailed {
    pub backend: &'static str,
}

impl std::fmt::Display for InferenceFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} backend inference failed", self.backend)
    }
}

/// Runs uploads through a shared backend.
#[derive(Clone)]
pub struct WheatDetector {
    backend: SharedBackend,
    default_threshold: f32,
    input_size: u32,
}

impl WheatDetector {
    pub fn new(backend: SharedBackend, default_threshold: f32) -> Result<Self> {
        validate_threshold(default_threshold)?;
        Ok(Self {
            backend,
            default_threshold,
            input_size: crate::MODEL_INPUT_SIZE,
        })
    }

    /// Override the model input size (the checkpoint is trained at 1024).
    pub fn with_input_size(mut self, size: u32) -> Self {
        self.input_size = size;
        self
    }

    pub fn default_threshold(&self) -> f32 {
        self.default_threshold
    }

    /// Validate, decode, preprocess and detect on one uploaded image.
    ///
    /// `threshold` follows the upload form: unset or zero means the configured
    /// default.
    pub fn detect_upload(
        &self,
        file_name: Option<&str>,
        bytes: &[u8],
        threshold: Option<f32>,
    ) -> Result<DetectionOutcome> {
        ingest::validate_upload(file_name, bytes).context(RejectedInput { what: "upload" })?;
        let image = ingest::decode_upload(bytes).context(RejectedInput { what: "upload" })?;
        self.detect_image(&image, threshold)
    }

    pub fn detect_image(&self, image: &RgbImage, threshold: Option<f32>) -> Result<DetectionOutcome> {
        let threshold = threshold
            .filter(|value| *value != 0.0)
            .unwrap_or(self.default_threshold);
        validate_threshold(threshold).context(RejectedInput {
            what: "confidence threshold",
        })?;

        let input = ingest::preprocess_to(image, self.input_size)?;
        let raw = {
            let mut backend = self
                .backend
                .lock()
                .map_err(|_| anyhow!("detector backend lock poisoned"))?;
            backend.detect(&input).context(InferenceFailed {
                backend: backend.name(),
            })?
        };

        let detections = filter_detections(&raw, threshold);
        log::info!(
            "detected {} wheat heads ({} candidates, threshold {})",
            detections.len(),
            raw.len(),
            threshold
        );
        Ok(Self::finish(input, detections, threshold))
    }

    fn finish(input: InputTensor, detections: Vec<Detection>, threshold: f32) -> DetectionOutcome {
        let mut annotated = input.into_image();
        if !detections.is_empty() {
            draw_detections(&mut annotated, &detections);
        }
        let table = ResultsTable::from_detections(&detections);
        DetectionOutcome {
            annotated,
            detections,
            table,
            threshold,
        }
    }
}

/// Build (or fetch from `cache`) the backend selected in `cfg`.
///
/// The `tract` backend downloads the checkpoint first when it is missing.
pub fn load_backend(
    cfg: &DemoConfig,
    cache: &ModelCache<dyn DetectorBackend>,
    progress: bool,
) -> Result<SharedBackend> {
    let key = format!("{}:{}", cfg.model.backend, cfg.checkpoint.path.display());
    cache.get_or_load(&key, || match cfg.model.backend.as_str() {
        "fixed" => {
            let backend: SharedBackend = Arc::new(Mutex::new(FixedBackend::sample()));
            Ok(backend)
        }
        "tract" => load_tract(cfg, progress),
        other => Err(anyhow!("unknown backend '{}'", other)),
    })
}

#[cfg(feature = "backend-tract")]
fn load_tract(cfg: &DemoConfig, progress: bool) -> Result<SharedBackend> {
    let path = crate::checkpoint::CheckpointSource::from_settings(&cfg.checkpoint)
        .with_progress(progress)
        .ensure_local()?;
    let mut backend =
        crate::detect::TractBackend::new(&path, crate::MODEL_INPUT_SIZE, cfg.model.input_layout)?;
    backend.warm_up()?;
    let backend: SharedBackend = Arc::new(Mutex::new(backend));
    Ok(backend)
}

#[cfg(not(feature = "backend-tract"))]
fn load_tract(_cfg: &DemoConfig, _progress: bool) -> Result<SharedBackend> {
    Err(anyhow!("the tract backend requires the backend-tract feature"))
}

/// Threshold from a form or query string value; blank means unset.
pub fn parse_threshold(raw: Option<&str>) -> Result<Option<f32>> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => {
            let parsed: f32 = value
                .parse()
                .map_err(|_| anyhow!("confidence must be a number, got '{}'", value))?;
            Ok((parsed != 0.0).then_some(parsed))
        }
    }
}
