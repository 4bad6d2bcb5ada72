//! Frame type and pixel conversion (YUYV/GREY to RGB, dark detection, stills).

use identikit_core::dataurl::{self, DataUrlError};
use identikit_core::preprocess;
use image::{Rgb, RgbImage};

/// A captured camera frame in RGB.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Centre-crop to a square and scale to `size`×`size`.
    pub fn to_still(&self, size: u32) -> RgbImage {
        preprocess::square_crop(&self.image, size)
    }

    /// The square still encoded as a PNG data URL.
    pub fn to_still_data_url(&self, size: u32) -> Result<String, DataUrlError> {
        dataurl::encode_png(&self.to_still(size))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("MJPEG decode failed: {0}")]
    Mjpeg(#[from] image::ImageError),
}

fn clip(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// BT.601 limited-range YUV → RGB.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> Rgb<u8> {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    Rgb([
        clip((298 * c + 409 * e + 128) >> 8),
        clip((298 * c - 100 * d - 208 * e + 128) >> 8),
        clip((298 * c + 516 * d + 128) >> 8),
    ])
}

/// Convert packed YUYV (4:2:2) to RGB.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength { expected, actual: yuyv.len() });
    }

    let mut out = RgbImage::new(width, height);
    for (i, chunk) in yuyv[..expected].chunks_exact(4).enumerate() {
        let [y0, u, y1, v] = [chunk[0], chunk[1], chunk[2], chunk[3]];
        let px = (i * 2) as u32;
        out.put_pixel(px % width, px / width, yuv_to_rgb(y0, u, v));
        out.put_pixel((px + 1) % width, (px + 1) / width, yuv_to_rgb(y1, u, v));
    }
    Ok(out)
}

/// Replicate an 8-bit grayscale buffer into RGB.
pub fn grey_to_rgb(grey: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height) as usize;
    if grey.len() < expected {
        return Err(FrameError::InvalidLength { expected, actual: grey.len() });
    }
    Ok(RgbImage::from_fn(width, height, |x, y| {
        let g = grey[(y * width + x) as usize];
        Rgb([g, g, g])
    }))
}

/// Decode an MJPEG buffer.
pub fn mjpeg_to_rgb(buf: &[u8]) -> Result<RgbImage, FrameError> {
    Ok(image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)?.to_rgb8())
}

/// True if more than `threshold_pct` of pixels have luma below 32.
pub fn is_dark_frame(image: &RgbImage, threshold_pct: f32) -> bool {
    let total = image.width() as usize * image.height() as usize;
    if total == 0 {
        return true;
    }
    let dark = image
        .pixels()
        .filter(|Rgb([r, g, b])| {
            let luma = (299 * *r as u32 + 587 * *g as u32 + 114 * *b as u32) / 1000;
            luma < 32
        })
        .count();
    (dark as f32 / total as f32) > threshold_pct
}
