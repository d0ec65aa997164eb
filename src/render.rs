//! Box drawing and image encoding.

use anyhow::{Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::io::Cursor;

use crate::filter::Detection;

pub const BOX_COLOR: Rgb<u8> = Rgb([220, 0, 0]);
pub const BOX_THICKNESS: u32 = 2;

/// Outline every detection on `image`.
///
/// Boxes are in the image's own pixel space. Parts falling outside the image
/// are clipped.
pub fn draw_detections(image: &mut RgbImage, detections: &[Detection]) {
    for detection in detections {
        for inset in 0..BOX_THICKNESS as i32 {
            let width = detection.width - 2 * inset;
            let height = detection.height - 2 * inset;
            if width <= 0 || height <= 0 {
                if inset == 0 {
                    // Degenerate box: mark a single pixel so it is still visible.
                    let rect = Rect::at(detection.x, detection.y).of_size(1, 1);
                    draw_hollow_rect_mut(image, rect, BOX_COLOR);
                }
                break;
            }
            let rect = Rect::at(detection.x + inset, detection.y + inset)
                .of_size(width as u32, height as u32);
            draw_hollow_rect_mut(image, rect, BOX_COLOR);
        }
    }
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    encode(image, ImageFormat::Png)
}

pub fn encode(image: &RgbImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, format)
        .with_context(|| format!("encode {:?}", format))?;
    Ok(out.into_inner())
}
