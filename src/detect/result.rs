use anyhow::{anyhow, Result};

/// Unfiltered model output for one image.
///
/// `boxes` are `[x1, y1, x2, y2]` in model-input pixels and are parallel to
/// `scores`. Construction rejects arrays of different length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawDetections {
    boxes: Vec<[f32; 4]>,
    scores: Vec<f32>,
}

impl RawDetections {
    pub fn new(boxes: Vec<[f32; 4]>, scores: Vec<f32>) -> Result<Self> {
        if boxes.len() != scores.len() {
            return Err(anyhow!(
                "model returned {} boxes but {} scores",
                boxes.len(),
                scores.len()
            ));
        }
        Ok(Self { boxes, scores })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn boxes(&self) -> &[[f32; 4]] {
        &self.boxes
    }

    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// `(box, score)` pairs in model order.
    pub fn iter(&self) -> impl Iterator<Item = (&[f32; 4], f32)> + '_ {
        self.boxes.iter().zip(self.scores.iter().copied())
    }
}
