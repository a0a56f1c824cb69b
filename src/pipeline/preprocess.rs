//! Image decoding and tensor preparation for the classifier.
//!
//! Fixed order: resize to 224×224 (bilinear) → scale to [0, 1] →
//! per-channel normalisation with the ImageNet statistics the backbone was
//! trained with.

use burn::prelude::*;
use burn::tensor::TensorData;
use image::imageops::FilterType;
use image::RgbImage;

use super::InferenceError;
use crate::config::{IMAGENET_MEAN, IMAGENET_STD, INPUT_SIZE};

/// Decode uploaded bytes into an RGB raster. Any colour mode (grey,
/// palette, RGBA, 16-bit) is converted to 8-bit RGB.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, InferenceError> {
    if bytes.is_empty() {
        return Err(InferenceError::Decode("empty upload".into()));
    }

    let img = image::load_from_memory(bytes)
        .map_err(|e| InferenceError::Decode(format!("unsupported or corrupt image: {e}")))?;
    Ok(img.to_rgb8())
}

/// Build the `(1, 3, 224, 224)` normalised input tensor.
pub fn preprocess<B: Backend>(image: &RgbImage, device: &B::Device) -> Tensor<B, 4> {
    let size = INPUT_SIZE as usize;
    let resized = image::imageops::resize(image, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);

    // HWC interleaved → CHW planar.
    let mut planar = vec![0.0f32; 3 * size * size];
    for (x, y, pixel) in resized.enumerate_pixels() {
        let offset = y as usize * size + x as usize;
        for c in 0..3 {
            let value = f32::from(pixel[c]) / 255.0;
            planar[c * size * size + offset] = (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    Tensor::from_data(TensorData::new(planar, [1, 3, size, size]), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use image::{DynamicImage, ImageOutputFormat, Luma, Rgb};
    use std::io::Cursor;

    type TestBackend = NdArray<f32>;

    fn encode(img: DynamicImage) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, ImageOutputFormat::Png).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn decode_rejects_empty_bytes() {
        assert!(matches!(decode_image(&[]), Err(InferenceError::Decode(_))));
    }

    #[test]
    fn decode_rejects_non_image_bytes() {
        let err = decode_image(b"this is a text file, not a fundus photo").unwrap_err();
        assert!(matches!(err, InferenceError::Decode(_)));
        assert!(err.to_string().contains("Cannot decode image"));
    }

    #[test]
    fn decode_converts_grayscale_to_rgb() {
        let gray = image::GrayImage::from_pixel(5, 3, Luma([90]));
        let rgb = decode_image(&encode(DynamicImage::ImageLuma8(gray))).unwrap();
        assert_eq!(rgb.dimensions(), (5, 3));
        assert_eq!(rgb.get_pixel(2, 1), &Rgb([90, 90, 90]));
    }

    #[test]
    fn decode_drops_alpha() {
        let rgba = image::RgbaImage::from_pixel(4, 4, image::Rgba([10, 20, 30, 0]));
        let rgb = decode_image(&encode(DynamicImage::ImageRgba8(rgba))).unwrap();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn preprocess_shape_and_normalisation() {
        let device = Default::default();
        let img = RgbImage::from_pixel(512, 300, Rgb([255, 0, 128]));
        let tensor = preprocess::<TestBackend>(&img, &device);
        assert_eq!(tensor.dims(), [1, 3, 224, 224]);

        let values: Vec<f32> = tensor.into_data().to_vec().unwrap();
        let plane = 224 * 224;
        let expected = [
            (1.0 - 0.485) / 0.229,
            (0.0 - 0.456) / 0.224,
            (128.0 / 255.0 - 0.406) / 0.225,
        ];
        for (c, want) in expected.iter().enumerate() {
            for &v in &values[c * plane..(c + 1) * plane] {
                assert!((v - want).abs() < 1e-4, "channel {c}: {v} vs {want}");
            }
        }
    }

    #[test]
    fn preprocess_is_deterministic() {
        let device = Default::default();
        let img = RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 3) as u8, (y * 5) as u8, 7]));
        let a: Vec<f32> = preprocess::<TestBackend>(&img, &device)
            .into_data()
            .to_vec()
            .unwrap();
        let b: Vec<f32> = preprocess::<TestBackend>(&img, &device)
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(a, b);
    }
}
