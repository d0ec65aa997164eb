//! Threshold filtering and box conversion.

use serde::Serialize;

use crate::detect::RawDetections;
use crate::DEFAULT_CONFIDENCE_THRESHOLD;

/// A retained detection: integer box as `(x, y, width, height)` plus its score.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub confidence: f32,
}

impl Detection {
    /// Convert an `[x1, y1, x2, y2]` box.
    ///
    /// Corners are truncated toward zero before width and height are taken,
    /// so `width = trunc(x2) - trunc(x1)`.
    pub fn from_corners(corners: &[f32; 4], confidence: f32) -> Self {
        let [x1, y1, x2, y2] = corners.map(|v| v as i32);
        Self {
            x: x1,
            y: y1,
            width: x2.saturating_sub(x1),
            height: y2.saturating_sub(y1),
            confidence,
        }
    }

    /// Back to `(x1, y1, x2, y2)`.
    #[cfg(test)]
    pub fn corners(&self) -> (i32, i32, i32, i32) {
        (
            self.x,
            self.y,
            self.x.saturating_add(self.width),
            self.y.saturating_add(self.height),
        )
    }
}

/// Resolve a user-supplied threshold; unset or zero means the default.
pub fn resolve_threshold(requested: Option<f32>) -> f32 {
    match requested {
        Some(value) if value != 0.0 => value,
        _ => DEFAULT_CONFIDENCE_THRESHOLD,
    }
}

/// Keep exactly the entries whose score is at or above `threshold`, in model order.
pub fn filter_detections(raw: &RawDetections, threshold: f32) -> Vec<Detection> {
    let kept: Vec<Detection> = raw
        .iter()
        .filter(|(_, score)| *score >= threshold)
        .map(|(corners, score)| Detection::from_corners(corners, score))
        .collect();
    log::debug!(
        "kept {} of {} detections at threshold {}",
        kept.len(),
        raw.len(),
        threshold
    );
    kept
}
