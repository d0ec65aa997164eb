use anyhow::Result;

use crate::detect::result::RawDetections;
use crate::ingest::InputTensor;

/// Detector backend trait.
///
/// A backend wraps one frozen detection model. It receives the pre-processed
/// model input and returns the raw, unfiltered boxes and scores in input-pixel
/// coordinates. Thresholding happens downstream.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on one image.
    fn detect(&mut self, input: &InputTensor) -> Result<RawDetections>;

    /// Optional warm-up hook, run once after loading.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
