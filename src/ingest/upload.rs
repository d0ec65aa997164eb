use anyhow::{anyhow, Context, Result};
use image::RgbImage;

/// JPEG start-of-image marker followed by the first segment marker byte.
const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];
const ACCEPTED_EXTENSIONS: [&str; 2] = ["jpg", "jpeg"];

/// Check that an upload is a non-empty JPEG.
///
/// `file_name` is optional because raw API uploads carry no name; when present
/// its extension must be `.jpg` or `.jpeg`.
pub fn validate_upload(file_name: Option<&str>, bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        return Err(anyhow!("upload is empty"));
    }
    if let Some(name) = file_name.map(str::trim).filter(|name| !name.is_empty()) {
        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if !ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(anyhow!("only .jpg images are accepted, got '{}'", name));
        }
    }
    if !bytes.starts_with(&JPEG_MAGIC) {
        return Err(anyhow!("upload is not a JPEG image"));
    }
    Ok(())
}

/// Decode JPEG bytes into an RGB image.
pub fn decode_upload(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory_with_format(bytes, image::ImageFormat::Jpeg)
        .context("decode jpeg")?;
    let rgb = image.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(anyhow!("decoded image has zero size"));
    }
    Ok(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{codecs::jpeg::JpegEncoder, Rgb};

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([10, 200, 30]));
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 90)
            .encode_image(&img)
            .expect("encode jpeg");
        out
    }

    #[test]
    fn accepts_jpeg_with_jpg_name() -> Result<()> {
        let bytes = jpeg_bytes(8, 8);
        validate_upload(Some("field.JPG"), &bytes)?;
        validate_upload(Some("field.jpeg"), &bytes)?;
        validate_upload(None, &bytes)?;
        Ok(())
    }

    #[test]
    fn rejects_other_extensions_and_content() {
        let bytes = jpeg_bytes(8, 8);
        assert!(validate_upload(Some("field.png"), &bytes).is_err());
        assert!(validate_upload(Some("field"), &bytes).is_err());
        assert!(validate_upload(Some("field.jpg"), b"\x89PNG\r\n").is_err());
        assert!(validate_upload(Some("field.jpg"), b"").is_err());
    }

    #[test]
    fn decodes_to_rgb() -> Result<()> {
        let decoded = decode_upload(&jpeg_bytes(16, 12))?;
        assert_eq!(decoded.dimensions(), (16, 12));
        Ok(())
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_upload(&[0xFF, 0xD8, 0xFF, 0x00, 0x01]).is_err());
    }
}
