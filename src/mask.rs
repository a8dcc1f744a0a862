//! Mask post-processing between the remover and the trimmer

use image::{imageops::FilterType, DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
use imageproc::morphology::{grayscale_dilate, Mask};

/// Alpha channel of `image`, or `None` when it has no alpha
#[must_use]
pub fn extract_alpha(image: &DynamicImage) -> Option<GrayImage> {
    if !image.color().has_alpha() {
        return None;
    }
    let rgba = image.to_rgba8();
    Some(GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        Luma([rgba.get_pixel(x, y)[3]])
    }))
}

/// Grayscale dilation with a `kernel` x `kernel` square window, one pass
///
/// Each output pixel is the maximum of its neighbourhood, so soft alpha values
/// survive instead of being binarised. The window is clipped at the borders.
#[must_use]
pub fn dilate(mask: &GrayImage, kernel: u32) -> GrayImage {
    let radius = u8::try_from(kernel / 2).unwrap_or(u8::MAX);
    if radius == 0 {
        return mask.clone();
    }
    grayscale_dilate(mask, &Mask::square(radius))
}

/// Recombine colour data with an alpha mask
///
/// The colour source is resized to the mask when their dimensions differ.
#[must_use]
pub fn composite(color: &DynamicImage, alpha: &GrayImage) -> RgbaImage {
    let (width, height) = alpha.dimensions();
    let rgb = if (color.width(), color.height()) == (width, height) {
        color.to_rgb8()
    } else {
        tracing::debug!(
            from_width = color.width(),
            from_height = color.height(),
            to_width = width,
            to_height = height,
            "Resizing colour data to mask size"
        );
        color.resize_exact(width, height, FilterType::Lanczos3).to_rgb8()
    };

    RgbaImage::from_fn(width, height, |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        Rgba([r, g, b, alpha.get_pixel(x, y)[0]])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_extract_alpha() {
        let rgba = RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 77]));
        let alpha = extract_alpha(&DynamicImage::ImageRgba8(rgba)).unwrap();
        assert!(alpha.pixels().all(|p| p[0] == 77));

        let rgb = DynamicImage::ImageRgb8(RgbImage::new(3, 2));
        assert!(extract_alpha(&rgb).is_none());
    }

    #[test]
    fn test_dilate_single_pixel_to_square() {
        let mut mask = GrayImage::new(20, 20);
        mask.put_pixel(10, 10, Luma([200]));

        let dilated = dilate(&mask, 7);

        let lit: Vec<_> = dilated
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] > 0)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert_eq!(lit.len(), 49);
        assert!(lit.iter().all(|&(x, y)| (7..=13).contains(&x) && (7..=13).contains(&y)));
        // Soft values are carried, not binarised
        assert!(dilated.pixels().all(|p| p[0] == 0 || p[0] == 200));
    }

    #[test]
    fn test_dilate_takes_neighbourhood_max() {
        let mut mask = GrayImage::from_pixel(9, 9, Luma([40]));
        mask.put_pixel(0, 0, Luma([90]));
        mask.put_pixel(8, 8, Luma([120]));

        let dilated = dilate(&mask, 7);

        assert_eq!(dilated.get_pixel(3, 3)[0], 90);
        assert_eq!(dilated.get_pixel(5, 5)[0], 120);
        assert_eq!(dilated.get_pixel(4, 4)[0], 40);
        assert_eq!(dilated.get_pixel(8, 0)[0], 40);
    }

    #[test]
    fn test_dilate_kernel_one_is_identity() {
        let mask = GrayImage::from_fn(5, 5, |x, y| Luma([(x * 10 + y) as u8]));
        assert_eq!(dilate(&mask, 1), mask);
    }

    #[test]
    fn test_composite_resizes_color() {
        let color = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 100, Rgb([10, 20, 30])));
        let alpha = GrayImage::from_pixel(100, 50, Luma([128]));

        let result = composite(&color, &alpha);

        assert_eq!(result.dimensions(), (100, 50));
        let pixel = result.get_pixel(50, 25);
        assert_eq!(pixel[3], 128);
        assert!((i16::from(pixel[0]) - 10).abs() <= 1);
        assert!((i16::from(pixel[2]) - 30).abs() <= 1);
    }
}
