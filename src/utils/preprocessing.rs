//! Tensor conversion around model inference
//!
//! U2-Net family models take a fixed-size RGB tensor scaled by the image
//! maximum and normalised per channel, and return a saliency map that is
//! min-max normalised before being turned back into an 8-bit mask.

use crate::{
    error::{BgTrimError, Result},
    models::PreprocessingConfig,
};
use image::{imageops::FilterType, DynamicImage, GrayImage, Luma};
use ndarray::Array4;

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Build the NCHW input tensor for a model
    ///
    /// The image is resized to the model input without preserving aspect ratio;
    /// the mask is resized back the same way so the distortion cancels out.
    ///
    /// # Errors
    /// - Zero target size in the preprocessing config
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        let [target_width, target_height] = preprocessing_config.target_size;
        if target_width == 0 || target_height == 0 {
            return Err(BgTrimError::processing_stage_error(
                "preprocess",
                "model input size is zero",
                Some(&format!("{target_width}x{target_height}")),
            ));
        }

        let resized = image.resize_exact(target_width, target_height, FilterType::Lanczos3);
        let rgb = resized.to_rgb8();

        let max_value = rgb.as_raw().iter().copied().max().unwrap_or(0);
        let scale = if max_value == 0 {
            1.0
        } else {
            f32::from(max_value)
        };

        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;

        let tensor = Array4::from_shape_fn(
            (1, 3, target_height as usize, target_width as usize),
            |(_, c, y, x)| {
                let pixel = rgb.get_pixel(x as u32, y as u32);
                let channel = c.min(2);
                let value = f32::from(pixel.0.get(channel).copied().unwrap_or(0)) / scale;
                let m = mean.get(channel).copied().unwrap_or(0.0);
                let s = std.get(channel).copied().unwrap_or(1.0);
                (value - m) / s
            },
        );

        Ok(tensor)
    }

    /// Turn the first output channel into an 8-bit mask of `width` x `height`
    ///
    /// # Errors
    /// - Empty output tensor
    /// - Zero target dimensions
    pub fn tensor_to_mask(output: &Array4<f32>, width: u32, height: u32) -> Result<GrayImage> {
        let (batch, channels, mask_height, mask_width) = output.dim();
        if batch == 0 || channels == 0 || mask_height == 0 || mask_width == 0 {
            return Err(BgTrimError::processing_stage_error(
                "postprocess",
                "model output is empty",
                Some(&format!("{:?}", output.dim())),
            ));
        }
        if width == 0 || height == 0 {
            return Err(BgTrimError::processing_stage_error(
                "postprocess",
                "target mask size is zero",
                Some(&format!("{width}x{height}")),
            ));
        }

        let saliency = output.slice(ndarray::s![0, 0, .., ..]);
        let (min, max) = saliency
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;

        let mask = GrayImage::from_fn(mask_width as u32, mask_height as u32, |x, y| {
            let raw = saliency
                .get((y as usize, x as usize))
                .copied()
                .unwrap_or(0.0);
            // A flat map carries no contrast to stretch
            let normalized = if range > f32::EPSILON {
                (raw - min) / range
            } else {
                raw.clamp(0.0, 1.0)
            };
            Luma([(normalized * 255.0).round().clamp(0.0, 255.0) as u8])
        });

        if (mask.width(), mask.height()) == (width, height) {
            Ok(mask)
        } else {
            Ok(image::imageops::resize(
                &mask,
                width,
                height,
                FilterType::Lanczos3,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn u2net_config() -> PreprocessingConfig {
        PreprocessingConfig {
            target_size: [320, 320],
            normalization_mean: [0.485, 0.456, 0.406],
            normalization_std: [0.229, 0.224, 0.225],
        }
    }

    #[test]
    fn test_preprocess_shape_and_normalisation() {
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(100, 60, Rgb([200, 100, 0])));
        let tensor = ImagePreprocessor::preprocess_for_inference(&image, &u2net_config()).unwrap();

        assert_eq!(tensor.shape(), &[1, 3, 320, 320]);
        // Red is the image maximum, so it scales to exactly 1.0
        let expected_r = (1.0 - 0.485) / 0.229;
        assert!((tensor[[0, 0, 10, 10]] - expected_r).abs() < 1e-3);
        let expected_b = (0.0 - 0.406) / 0.225;
        assert!((tensor[[0, 2, 10, 10]] - expected_b).abs() < 1e-3);
    }

    #[test]
    fn test_preprocess_black_image() {
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(8, 8, Rgb([0, 0, 0])));
        let tensor = ImagePreprocessor::preprocess_for_inference(&image, &u2net_config()).unwrap();
        assert!(tensor.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_preprocess_rejects_zero_target() {
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(8, 8, Rgb([1, 2, 3])));
        let config = PreprocessingConfig {
            target_size: [0, 320],
            ..u2net_config()
        };
        assert!(ImagePreprocessor::preprocess_for_inference(&image, &config).is_err());
    }

    #[test]
    fn test_tensor_to_mask_min_max() {
        let output = Array4::from_shape_fn((1, 1, 4, 4), |(_, _, y, x)| {
            if x >= 2 {
                0.8
            } else if y == 0 {
                0.4
            } else {
                0.2
            }
        });

        let mask = ImagePreprocessor::tensor_to_mask(&output, 4, 4).unwrap();
        assert_eq!(mask.get_pixel(3, 3)[0], 255);
        assert_eq!(mask.get_pixel(0, 3)[0], 0);
        // (0.4 - 0.2) / 0.6 of full scale
        assert_eq!(mask.get_pixel(0, 0)[0], 85);
    }

    #[test]
    fn test_tensor_to_mask_resizes() {
        let output = Array4::from_elem((1, 1, 320, 320), 0.5);
        let mask = ImagePreprocessor::tensor_to_mask(&output, 640, 480).unwrap();
        assert_eq!(mask.dimensions(), (640, 480));
        assert!(mask.pixels().all(|p| (127..=128).contains(&p[0])));
    }

    #[test]
    fn test_tensor_to_mask_rejects_empty() {
        let output = Array4::<f32>::zeros((1, 0, 4, 4));
        assert!(ImagePreprocessor::tensor_to_mask(&output, 4, 4).is_err());
    }
}
