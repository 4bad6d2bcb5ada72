//! Probe normalization: square letterbox, luma tone correction, sharpening.
//!
//! Every photo (captured, uploaded or enrolled) goes through the same steps
//! before detection so that gallery and probe embeddings are comparable.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

/// Side of the square probe canvas.
pub const PROBE_SIZE: u32 = 320;

/// Canvas fill for the letterbox border.
pub const LETTERBOX_FILL: Rgb<u8> = Rgb([255, 255, 255]);

const ALPHA_MIN: f32 = 0.9;
const ALPHA_MAX: f32 = 1.3;
const BETA_LIMIT: f32 = 25.0;
const STD_EPSILON: f32 = 1e-5;

/// 3×3 sharpening kernel applied to the luma plane.
const SHARPEN_KERNEL: [[f32; 3]; 3] = [[0.0, -1.0, 0.0], [-1.0, 5.0, -1.0], [0.0, -1.0, 0.0]];

/// Target luma statistics for tone normalization.
#[derive(Debug, Clone, Copy)]
pub struct ToneTarget {
    /// Target mean of Y (0–255).
    pub brightness: f32,
    /// Target standard deviation of Y.
    pub contrast: f32,
}

impl Default for ToneTarget {
    fn default() -> Self {
        Self { brightness: 140.0, contrast: 55.0 }
    }
}

/// Scale `image` to fit a `size`×`size` canvas, preserving aspect ratio,
/// centred on a `fill`-coloured background.
pub fn letterbox_square(image: &RgbImage, size: u32, fill: Rgb<u8>) -> RgbImage {
    let (w, h) = image.dimensions();
    let mut canvas = RgbImage::from_pixel(size, size, fill);
    if w == 0 || h == 0 || size == 0 {
        return canvas;
    }

    let scale = size as f32 / w.max(h) as f32;
    let new_w = ((w as f32 * scale) as u32).clamp(1, size);
    let new_h = ((h as f32 * scale) as u32).clamp(1, size);
    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let x_off = (size - new_w) / 2;
    let y_off = (size - new_h) / 2;
    imageops::replace(&mut canvas, &resized, x_off as i64, y_off as i64);
    canvas
}

/// Crop the centred square of side `min(w, h)` and resize it to `size`×`size`.
pub fn square_crop(image: &RgbImage, size: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    let side = w.min(h);
    if side == 0 {
        return RgbImage::new(size, size);
    }
    let sx = (w - side) / 2;
    let sy = (h - side) / 2;
    let cropped = imageops::crop_imm(image, sx, sy, side, side).to_image();
    if side == size {
        cropped
    } else {
        imageops::resize(&cropped, size, size, FilterType::Triangle)
    }
}

/// Luma mean and standard deviation of an RGB image.
pub fn luma_stats(image: &RgbImage) -> (f32, f32) {
    let planes = YCrCbPlanes::from_rgb(image);
    stats(&planes.y)
}

/// Normalize brightness and contrast on the luma channel, then sharpen it.
///
/// The gain is clamped to [0.9, 1.3] and the offset to [-25, 25] so that a
/// badly exposed photo is nudged, not rebuilt. Chroma is left untouched.
pub fn normalize_tone(image: &RgbImage, target: ToneTarget) -> RgbImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return image.clone();
    }

    let mut planes = YCrCbPlanes::from_rgb(image);
    let (mean, std) = stats(&planes.y);

    let alpha = (target.contrast / (std + STD_EPSILON)).clamp(ALPHA_MIN, ALPHA_MAX);
    let beta = (target.brightness - alpha * mean).clamp(-BETA_LIMIT, BETA_LIMIT);

    tracing::trace!(mean, std, alpha, beta, "tone normalization");

    for y in planes.y.iter_mut() {
        *y = saturate((alpha * *y as f32 + beta).abs());
    }
    planes.y = sharpen(&planes.y, w as usize, h as usize);
    planes.to_rgb(w, h)
}

/// Full probe preparation: white letterbox to `size`, then tone normalization.
pub fn prepare_probe(image: &RgbImage, size: u32, target: ToneTarget) -> RgbImage {
    let boxed = letterbox_square(image, size, LETTERBOX_FILL);
    normalize_tone(&boxed, target)
}

fn stats(plane: &[u8]) -> (f32, f32) {
    if plane.is_empty() {
        return (0.0, 0.0);
    }
    let n = plane.len() as f32;
    let mean = plane.iter().map(|&v| v as f32).sum::<f32>() / n;
    let variance = plane.iter().map(|&v| (v as f32 - mean).powi(2)).sum::<f32>() / n;
    (mean, variance.sqrt())
}

fn saturate(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Reflect-101 border: `-1 → 1`, `n → n - 2`.
fn reflect101(i: isize, n: usize) -> usize {
    let n = n as isize;
    if n == 1 {
        return 0;
    }
    let mut i = i;
    while i < 0 || i >= n {
        i = if i < 0 { -i } else { 2 * (n - 1) - i };
    }
    i as usize
}

fn sharpen(plane: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = vec![0u8; plane.len()];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0f32;
            for (ky, row) in SHARPEN_KERNEL.iter().enumerate() {
                for (kx, &k) in row.iter().enumerate() {
                    if k == 0.0 {
                        continue;
                    }
                    let sy = reflect101(y as isize + ky as isize - 1, height);
                    let sx = reflect101(x as isize + kx as isize - 1, width);
                    acc += k * plane[sy * width + sx] as f32;
                }
            }
            out[y * width + x] = saturate(acc);
        }
    }
    out
}

/// Planar YCrCb with the BT.601 full-range coefficients.
struct YCrCbPlanes {
    y: Vec<u8>,
    cr: Vec<u8>,
    cb: Vec<u8>,
}

impl YCrCbPlanes {
    fn from_rgb(image: &RgbImage) -> Self {
        let n = (image.width() * image.height()) as usize;
        let mut planes = Self {
            y: Vec::with_capacity(n),
            cr: Vec::with_capacity(n),
            cb: Vec::with_capacity(n),
        };
        for Rgb([r, g, b]) in image.pixels() {
            let (r, g, b) = (*r as f32, *g as f32, *b as f32);
            let y = 0.299 * r + 0.587 * g + 0.114 * b;
            planes.y.push(saturate(y));
            planes.cr.push(saturate((r - y) * 0.713 + 128.0));
            planes.cb.push(saturate((b - y) * 0.564 + 128.0));
        }
        planes
    }

    fn to_rgb(&self, width: u32, height: u32) -> RgbImage {
        let mut out = RgbImage::new(width, height);
        for (i, px) in out.pixels_mut().enumerate() {
            let y = self.y[i] as f32;
            let cr = self.cr[i] as f32 - 128.0;
            let cb = self.cb[i] as f32 - 128.0;
            *px = Rgb([
                saturate(y + 1.403 * cr),
                saturate(y - 0.714 * cr - 0.344 * cb),
                saturate(y + 1.773 * cb),
            ]);
        }
        out
    }
}
