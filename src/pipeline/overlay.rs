//! Heatmap compositing and base64 PNG encoding.
//!
//! The saliency map is quantised to 8 bits, upsampled to the original image
//! size, coloured with [`Gnuplot2`] and alpha-blended over the original.
//! Diagnosis label and colour are returned alongside, never drawn.

use std::io::Cursor;

use base64::Engine as _;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageOutputFormat, Luma, RgbImage, RgbaImage};

use super::colormap::Gnuplot2;
use super::saliency::SaliencyMap;
use super::InferenceError;
use crate::config::OVERLAY_ALPHA;

/// Original and overlay as base64-encoded PNG.
#[derive(Debug, Clone)]
pub struct EncodedImages {
    pub original_png_b64: String,
    pub overlay_png_b64: String,
}

/// Composite `saliency` over `original` and encode both images.
pub fn visualize(original: &RgbImage, saliency: &SaliencyMap) -> Result<EncodedImages, InferenceError> {
    let overlay = render_overlay(original, saliency);
    Ok(EncodedImages {
        original_png_b64: encode_png_base64(original)?,
        overlay_png_b64: encode_png_base64(&overlay)?,
    })
}

/// Heatmap blended over `original`, same dimensions as `original`.
pub fn render_overlay(original: &RgbImage, saliency: &SaliencyMap) -> RgbImage {
    let (width, height) = original.dimensions();
    let gray = quantize(saliency);
    let gray = image::imageops::resize(&gray, width, height, FilterType::Triangle);
    let heatmap = Gnuplot2::new().apply(&gray);
    blend(original, &heatmap, OVERLAY_ALPHA)
}

/// Saliency in [0, 1] → 8-bit grey, truncating.
fn quantize(saliency: &SaliencyMap) -> GrayImage {
    GrayImage::from_fn(saliency.width() as u32, saliency.height() as u32, |x, y| {
        let v = saliency.get(x as usize, y as usize).clamp(0.0, 1.0);
        Luma([(255.0 * v) as u8])
    })
}

/// `base + alpha · (top - base)` per channel on the RGBA forms of both
/// images, truncated to 8 bits, returned as RGB. Dimensions must match.
pub fn blend(base: &RgbImage, top: &RgbImage, alpha: f32) -> RgbImage {
    let base = DynamicImage::ImageRgb8(base.clone()).to_rgba8();
    let top = DynamicImage::ImageRgb8(top.clone()).to_rgba8();

    let (width, height) = base.dimensions();
    let blended = RgbaImage::from_fn(width, height, |x, y| {
        let a = base.get_pixel(x, y);
        let b = top.get_pixel(x, y);
        let mut out = *a;
        for c in 0..4 {
            let mixed = f32::from(a[c]) + alpha * (f32::from(b[c]) - f32::from(a[c]));
            out[c] = mixed.clamp(0.0, 255.0) as u8;
        }
        out
    });

    DynamicImage::ImageRgba8(blended).to_rgb8()
}

/// Encode as lossless PNG, then standard base64.
pub fn encode_png_base64(image: &RgbImage) -> Result<String, InferenceError> {
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| InferenceError::Runtime(format!("PNG encoding failed: {e}")))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(cursor.into_inner()))
}

/// Inverse of [`encode_png_base64`].
pub fn decode_png_base64(text: &str) -> Result<RgbImage, InferenceError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(text)
        .map_err(|e| InferenceError::Decode(format!("invalid base64: {e}")))?;
    let img = image::load_from_memory_with_format(&bytes, image::ImageFormat::Png)
        .map_err(|e| InferenceError::Decode(format!("invalid PNG: {e}")))?;
    Ok(img.to_rgb8())
}
