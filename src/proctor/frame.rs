use std::io::Cursor;

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, ImageResult, RgbaImage};

/// Encodes a frame as JPEG. Alpha is dropped first since JPEG has none.
pub fn encode_jpeg(frame: &RgbaImage, quality: u8) -> ImageResult<Vec<u8>> {
    let rgb = DynamicImage::ImageRgba8(frame.clone()).to_rgb8();
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
        encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)?;
    }
    Ok(buffer.into_inner())
}

pub fn jpeg_data_url(frame: &RgbaImage, quality: u8) -> ImageResult<String> {
    let bytes = encode_jpeg(frame, quality)?;
    Ok(format!(
        "data:image/jpeg;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    ))
}

/// Accepts a `data:` URL or bare base64 of any format `image` can sniff.
pub fn decode_data_url(data: &str) -> Result<RgbaImage, String> {
    let payload = match data.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, b64)| b64)
            .ok_or_else(|| "Malformed data URL".to_string())?,
        None => data,
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| format!("Invalid base64 frame: {}", e))?;

    let image = image::load_from_memory(&bytes).map_err(|e| format!("Undecodable frame: {}", e))?;
    Ok(image.to_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_jpeg_data_url_decodes_back_to_same_size() {
        let frame = RgbaImage::from_pixel(8, 6, Rgba([200, 40, 40, 255]));
        let url = jpeg_data_url(&frame, 80).unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));

        let decoded = decode_data_url(&url).unwrap();
        assert_eq!(decoded.dimensions(), (8, 6));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_data_url("data:image/png;base64").is_err());
        assert!(decode_data_url("not base64 at all!").is_err());
        assert!(decode_data_url("aGVsbG8=").is_err());
    }
}
