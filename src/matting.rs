//! Trimap refinement of the model mask
//!
//! Confident regions are snapped to fully opaque or fully transparent; a band
//! of `erode_size / 2` pixels along every boundary keeps the model's soft
//! values so hair and fuzzy edges are not cut hard.

use crate::config::AlphaMattingConfig;
use image::{GrayImage, Luma};
use imageproc::{distance_transform::Norm, map::map_colors, morphology::erode};

/// Apply trimap refinement, or return the mask unchanged when matting is off
#[must_use]
pub fn refine_alpha(mask: &GrayImage, config: &AlphaMattingConfig) -> GrayImage {
    if !config.enabled {
        return mask.clone();
    }

    let radius = u8::try_from(config.erode_size / 2).unwrap_or(u8::MAX);
    let fg_threshold = config.foreground_threshold;
    let bg_threshold = config.background_threshold;

    let sure_foreground = erode(
        &map_colors(mask, |p| Luma([if p[0] > fg_threshold { 255 } else { 0 }])),
        Norm::LInf,
        radius,
    );
    let sure_background = erode(
        &map_colors(mask, |p| Luma([if p[0] < bg_threshold { 255 } else { 0 }])),
        Norm::LInf,
        radius,
    );

    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        if sure_foreground.get_pixel(x, y)[0] > 0 {
            Luma([255])
        } else if sure_background.get_pixel(x, y)[0] > 0 {
            Luma([0])
        } else {
            *mask.get_pixel(x, y)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_mask(inside: u8, outside: u8) -> GrayImage {
        GrayImage::from_fn(100, 100, |x, y| {
            if (30..70).contains(&x) && (30..70).contains(&y) {
                Luma([inside])
            } else {
                Luma([outside])
            }
        })
    }

    #[test]
    fn test_confident_regions_snap() {
        let mask = square_mask(250, 5);
        let refined = refine_alpha(&mask, &AlphaMattingConfig::default());

        assert_eq!(refined.get_pixel(50, 50)[0], 255);
        assert_eq!(refined.get_pixel(5, 5)[0], 0);
    }

    #[test]
    fn test_boundary_band_keeps_model_values() {
        let mask = square_mask(250, 5);
        let refined = refine_alpha(&mask, &AlphaMattingConfig::default());

        // Just inside and just outside the edge are within the erosion radius
        assert_eq!(refined.get_pixel(31, 50)[0], 250);
        assert_eq!(refined.get_pixel(28, 50)[0], 5);
    }

    #[test]
    fn test_unknown_values_untouched() {
        let mask = square_mask(128, 128);
        let refined = refine_alpha(&mask, &AlphaMattingConfig::default());
        assert_eq!(refined, mask);
    }

    #[test]
    fn test_disabled_is_identity() {
        let mask = square_mask(250, 5);
        let config = AlphaMattingConfig {
            enabled: false,
            ..AlphaMattingConfig::default()
        };
        assert_eq!(refine_alpha(&mask, &config), mask);
    }
}
