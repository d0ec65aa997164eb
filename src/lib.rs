//! Wheat Head Detector
//!
//! Runs a frozen Faster R-CNN checkpoint over a single uploaded JPEG and
//! reports the wheat heads it finds: an annotated image plus a confidence
//! table.
//!
//! # Pipeline
//!
//! 1. **Checkpoint**: fetch the model file to a local path if absent.
//! 2. **Model cache**: load the model once, reuse it until its TTL lapses.
//! 3. **Ingest**: validate the upload, decode, resize to 1024x1024, normalize to [0,1].
//! 4. **Detect**: run the backend, yielding parallel box/score arrays.
//! 5. **Filter**: keep scores at or above the threshold, convert boxes to x,y,w,h.
//! 6. **Present**: draw boxes and build the results table (or the no-detection message).
//!
//! # Module Structure
//!
//! - `config`: layered configuration (file, env)
//! - `checkpoint`: checkpoint download with retry and digest verification
//! - `ingest`: upload validation and pre-processing
//! - `detect`: detector backends
//! - `cache`: memoizing model cache
//! - `filter`, `report`, `render`: post-processing and presentation
//! - `pipeline`: one call from upload bytes to outcome
//! - `web`: single-page HTTP demo
//! - `ui`: CLI stage spinners

pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod detect;
pub mod filter;
pub mod ingest;
pub mod pipeline;
pub mod render;
pub mod report;
pub mod ui;
pub mod web;

pub use cache::ModelCache;
pub use checkpoint::CheckpointSource;
pub use config::DemoConfig;
pub use detect::{DetectorBackend, FixedBackend, RawDetections};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use filter::{filter_detections, resolve_threshold, Detection};
pub use ingest::{preprocess, InputTensor};
pub use pipeline::{DetectionOutcome, WheatDetector};
pub use report::{DetectionReport, ResultsTable, NO_DETECTIONS_MESSAGE};

/// Side length of the square model input, in pixels.
pub const MODEL_INPUT_SIZE: u32 = 1024;

/// Threshold used when the caller leaves it unset (or zero).
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
