//! Data-URL transport for probe and record photos.
//!
//! Photos travel between client, proxy and backend as
//! `data:image/<subtype>;base64,<payload>` strings. Decoding also accepts a
//! bare base64 payload without the prefix.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

const IMAGE_PREFIX: &str = "data:image/";
const BASE64_MARKER: &str = ";base64,";
const FALLBACK_MIME: &str = "image/png";

#[derive(Error, Debug)]
pub enum DataUrlError {
    #[error("empty image payload")]
    Empty,
    #[error("malformed data URL: {0}")]
    Malformed(String),
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// A decoded data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    /// MIME type from the prefix, `None` for a bare base64 payload.
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

/// Decode a data URL (or bare base64) into raw bytes.
pub fn decode(input: &str) -> Result<DataUrl, DataUrlError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DataUrlError::Empty);
    }

    let (mime, payload) = if let Some(rest) = input.strip_prefix(IMAGE_PREFIX) {
        let marker = rest.rfind(BASE64_MARKER).ok_or_else(|| {
            DataUrlError::Malformed("missing ';base64,' marker".to_string())
        })?;
        let subtype = &rest[..marker];
        if subtype.is_empty() {
            return Err(DataUrlError::Malformed("empty image subtype".to_string()));
        }
        (
            Some(format!("image/{subtype}")),
            &rest[marker + BASE64_MARKER.len()..],
        )
    } else if input.starts_with("data:") {
        let head: String = input.chars().take(32).collect();
        return Err(DataUrlError::Malformed(format!("not an image data URL: {head}")));
    } else {
        (None, input)
    };

    let bytes = STANDARD.decode(payload)?;
    if bytes.is_empty() {
        return Err(DataUrlError::Empty);
    }
    Ok(DataUrl { mime, bytes })
}

/// Decode a data URL all the way to an RGB image.
pub fn decode_image(input: &str) -> Result<RgbImage, DataUrlError> {
    let data = decode(input)?;
    Ok(image::load_from_memory(&data.bytes)?.to_rgb8())
}

/// Encode raw bytes as a data URL.
pub fn encode(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Encode an RGB image as a PNG data URL.
pub fn encode_png(image: &RgbImage) -> Result<String, DataUrlError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(encode("image/png", buf.get_ref()))
}

/// MIME type for an image file: sniffed from its bytes, then its extension.
pub fn mime_for_file(path: &Path, bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .or_else(|_| ImageFormat::from_path(path))
        .map(|f| f.to_mime_type())
        .unwrap_or(FALLBACK_MIME)
}

/// Read a local image file as a data URL.
pub fn read_file(path: &Path) -> Result<String, DataUrlError> {
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        return Err(DataUrlError::Empty);
    }
    Ok(encode(mime_for_file(path, &bytes), &bytes))
}
