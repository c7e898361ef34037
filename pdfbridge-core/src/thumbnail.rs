use anyhow::{ensure, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use png::{BitDepth, ColorType, Encoder};

use crate::backend::RenderImage;

/// Encodes an RGBA render as a base64 PNG, the form thumbnails are
/// delivered to the host in.
pub fn encode_png_base64(image: &RenderImage) -> Result<String> {
    let expected = image.width as usize * image.height as usize * 4;
    ensure!(
        image.pixels.len() == expected,
        "thumbnail buffer holds {} bytes, expected {} for {}x{}",
        image.pixels.len(),
        expected,
        image.width,
        image.height
    );

    let mut buffer = Vec::new();
    let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
    encoder.set_color(ColorType::Rgba);
    encoder.set_depth(BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&image.pixels)?;
    writer.finish()?;

    Ok(BASE64.encode(&buffer))
}

/// Image formats accepted for appended pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_SIGNATURE: &[u8] = b"\xff\xd8\xff";

pub fn sniff_image_format(bytes: &[u8]) -> Option<ImageFormat> {
    if bytes.starts_with(PNG_SIGNATURE) {
        Some(ImageFormat::Png)
    } else if bytes.starts_with(JPEG_SIGNATURE) {
        Some(ImageFormat::Jpeg)
    } else {
        None
    }
}

/// Decodes a base64 payload supplied by the host, tolerating the
/// `data:image/...;base64,` prefix web views produce.
pub fn decode_base64_image(payload: &str) -> Result<(Vec<u8>, ImageFormat), String> {
    let trimmed = payload.trim();
    let data = match trimmed.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => trimmed,
    };
    let bytes = BASE64
        .decode(data)
        .map_err(|err| format!("not valid base64: {err}"))?;
    let format = sniff_image_format(&bytes).ok_or_else(|| "not a PNG or JPEG image".to_string())?;
    Ok((bytes, format))
}
