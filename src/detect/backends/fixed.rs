use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetections;
use crate::ingest::InputTensor;

/// Backend that returns the same detections for every image.
///
/// Used for tests and for exercising the CLI and web page without a checkpoint.
#[derive(Clone, Debug, Default)]
pub struct FixedBackend {
    detections: RawDetections,
    calls: u64,
}

impl FixedBackend {
    pub fn new(detections: RawDetections) -> Self {
        Self {
            detections,
            calls: 0,
        }
    }

    /// A small set of plausible wheat-head boxes for dry runs.
    pub fn sample() -> Self {
        let boxes = vec![
            [120.4, 88.9, 190.7, 151.2],
            [402.0, 330.5, 471.8, 402.3],
            [700.2, 610.0, 759.9, 688.6],
            [55.0, 900.0, 98.5, 948.0],
        ];
        let scores = vec![0.97, 0.84, 0.61, 0.32];
        // Lengths match by construction.
        let detections = RawDetections::new(boxes, scores).unwrap_or_default();
        Self::new(detections)
    }

    /// Number of `detect` calls served.
    #[cfg(test)]
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for FixedBackend {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn detect(&mut self, _input: &InputTensor) -> Result<RawDetections> {
        self.calls += 1;
        log::debug!("fixed backend call {}: {} detections", self.calls, self.detections.len());
        Ok(self.detections.clone())
    }
}
