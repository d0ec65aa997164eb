use anyhow::{anyhow, Result};
use image::{imageops::FilterType, RgbImage};

use crate::MODEL_INPUT_SIZE;

/// Model input: a square RGB image as channel-major `f32` in [0, 1].
///
/// The 8-bit image the tensor was built from is kept alongside so boxes can
/// be drawn in the same coordinate space the model saw.
#[derive(Clone, Debug)]
pub struct InputTensor {
    data: Vec<f32>,
    size: u32,
    image: RgbImage,
}

impl InputTensor {
    /// Side length in pixels.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// `[3, size, size]` values, channel-major.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[cfg(test)]
    pub fn value(&self, channel: usize, y: usize, x: usize) -> f32 {
        let side = self.size as usize;
        self.data[channel * side * side + y * side + x]
    }

    #[cfg(test)]
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

/// Resize to the model input size when needed and normalize to [0, 1].
pub fn preprocess(image: &RgbImage) -> Result<InputTensor> {
    preprocess_to(image, MODEL_INPUT_SIZE)
}

pub(crate) fn preprocess_to(image: &RgbImage, size: u32) -> Result<InputTensor> {
    if image.width() == 0 || image.height() == 0 {
        return Err(anyhow!("cannot preprocess an empty image"));
    }
    if size == 0 {
        return Err(anyhow!("model input size must be non-zero"));
    }

    let resized = if image.dimensions() == (size, size) {
        image.clone()
    } else {
        log::debug!(
            "resizing {}x{} upload to {}x{}",
            image.width(),
            image.height(),
            size,
            size
        );
        image::imageops::resize(image, size, size, FilterType::Triangle)
    };

    let side = size as usize;
    let plane = side
        .checked_mul(side)
        .ok_or_else(|| anyhow!("model input dimensions overflow"))?;
    let len = plane
        .checked_mul(3)
        .ok_or_else(|| anyhow!("model input dimensions overflow"))?;

    let mut data = vec![0f32; len];
    for (x, y, pixel) in resized.enumerate_pixels() {
        let offset = y as usize * side + x as usize;
        for channel in 0..3 {
            data[channel * plane + offset] = pixel.0[channel] as f32 / 255.0;
        }
    }

    Ok(InputTensor {
        data,
        size,
        image: resized,
    })
}
