#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::config::InputLayout;
use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetections;
use crate::ingest::InputTensor;

/// Tract-based backend for an ONNX export of the Faster R-CNN checkpoint.
///
/// The export takes one image tensor and yields `boxes [N, 4]`,
/// `labels [N]` and `scores [N]`. Outputs are matched by shape rather than by
/// position since exporters do not agree on ordering; labels are ignored as
/// the model has a single foreground class.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>,
    size: u32,
    layout: InputLayout,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, size: u32, layout: InputLayout) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = size as usize;
        let shape = match layout {
            InputLayout::Chw => tvec!(3, side, side),
            InputLayout::Nchw => tvec!(1, 3, side, side),
        };
        log::info!(
            "loading ONNX model {} ({:?} input, {}x{})",
            model_path.display(),
            layout,
            size,
            size
        );
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), shape))
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            size,
            layout,
        })
    }

    fn build_input(&self, input: &InputTensor) -> Result<Tensor> {
        if input.size() != self.size {
            return Err(anyhow!(
                "input size {}x{} does not match model input {}x{}",
                input.size(),
                input.size(),
                self.size,
                self.size
            ));
        }
        let side = self.size as usize;
        let data = input.as_slice().to_vec();
        let tensor = match self.layout {
            InputLayout::Chw => tract_ndarray::Array3::from_shape_vec((3, side, side), data)
                .context("build CHW input tensor")?
                .into_tensor(),
            InputLayout::Nchw => tract_ndarray::Array4::from_shape_vec((1, 3, side, side), data)
                .context("build NCHW input tensor")?
                .into_tensor(),
        };
        Ok(tensor)
    }
}

/// Pick the box and score tensors out of the model outputs.
fn extract_detections(outputs: &[Tensor]) -> Result<RawDetections> {
    let boxes_idx = outputs
        .iter()
        .position(|t| {
            t.datum_type() == f32::datum_type()
                && t.rank() >= 2
                && t.shape().last() == Some(&4)
        })
        .ok_or_else(|| anyhow!("model produced no [N, 4] box output"))?;
    let boxes_view = outputs[boxes_idx]
        .to_array_view::<f32>()
        .context("box output tensor was not f32")?;
    let count = boxes_view.len() / 4;
    let flat: Vec<f32> = boxes_view.iter().copied().collect();
    let boxes: Vec<[f32; 4]> = flat
        .chunks_exact(4)
        .map(|c| [c[0], c[1], c[2], c[3]])
        .collect();

    let scores_idx = outputs
        .iter()
        .enumerate()
        .position(|(idx, t)| {
            idx != boxes_idx
                && t.datum_type() == f32::datum_type()
                && t.len() == count
                && (t.rank() == 1 || (t.rank() == 2 && t.shape()[0] == 1))
        })
        .ok_or_else(|| anyhow!("model produced no score output matching {} boxes", count))?;
    let scores: Vec<f32> = outputs[scores_idx]
        .to_array_view::<f32>()
        .context("score output tensor was not f32")?
        .iter()
        .copied()
        .collect();

    RawDetections::new(boxes, scores)
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, input: &InputTensor) -> Result<RawDetections> {
        let tensor = self.build_input(input)?;
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;
        let outputs: Vec<Tensor> = outputs
            .into_iter()
            .map(|value| value.into_tensor())
            .collect();
        let detections = extract_detections(&outputs)?;
        log::debug!("model returned {} candidate boxes", detections.len());
        Ok(detections)
    }
}
