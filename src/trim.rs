//! Edge trimming
//!
//! Crops an image to the padded bounding box of its largest foreground region.
//! The foreground is read from the alpha channel when the image has one and from
//! the luma channel otherwise. Any non-zero sample counts as foreground.
//!
//! Trimming never aborts the pipeline: an all-background image or a failure while
//! tracing the mask hands back the untouched input together with a
//! [`TrimOutcome`] that says why.

use crate::{
    error::{BgTrimError, Result},
    types::{BoundingBox, TrimOutcome},
};
use image::{imageops::replace, DynamicImage, GrayImage, Luma};
use imageproc::{
    contours::{find_contours, BorderType, Contour},
    map::map_colors,
    point::Point,
};
use tracing::{debug, warn};

/// Margin added around the detected region so anti-aliased edges survive the crop
pub const DEFAULT_PADDING: u32 = 10;

/// Smallest mask value treated as foreground
pub const FOREGROUND_THRESHOLD: u8 = 1;

/// Output of [`trim_edges`]
#[derive(Debug, Clone)]
pub struct TrimResult {
    /// The cropped image, or the input when nothing was cropped
    pub image: DynamicImage,
    pub outcome: TrimOutcome,
}

/// Crop `image` to its largest foreground region expanded by `padding` pixels
#[must_use]
pub fn trim_edges(image: DynamicImage, padding: u32) -> TrimResult {
    match locate_foreground(&image, padding) {
        Ok(Some(bbox)) => {
            debug!(
                bbox = %bbox,
                original_width = image.width(),
                original_height = image.height(),
                "Cropping to foreground"
            );
            let cropped = image.crop_imm(bbox.x, bbox.y, bbox.width, bbox.height);
            TrimResult {
                image: cropped,
                outcome: TrimOutcome::Trimmed(bbox),
            }
        },
        Ok(None) => {
            warn!("No contours found in the image, keeping it untrimmed");
            TrimResult {
                image,
                outcome: TrimOutcome::NoForeground,
            }
        },
        Err(e) => {
            warn!(error = %e, "Edge trimming failed, keeping the image untrimmed");
            TrimResult {
                image,
                outcome: TrimOutcome::Failed(e.to_string()),
            }
        },
    }
}

/// Find the padded crop rectangle, or `None` when the image is all background
///
/// # Errors
/// - The image has no pixels
/// - A traced contour is empty or lies outside the image
pub fn locate_foreground(image: &DynamicImage, padding: u32) -> Result<Option<BoundingBox>> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(BgTrimError::processing_stage_error(
            "trim",
            "image has no pixels",
            Some(&format!("{width}x{height}")),
        ));
    }

    let contours = trace_external_contours(&foreground_mask(image));

    let Some(largest) = largest_external_contour(&contours) else {
        return Ok(None);
    };

    let bbox = bounding_rect(&largest.points).ok_or_else(|| {
        BgTrimError::processing_stage_error("trim", "contour has no valid points", None)
    })?;
    let padded = bbox.expand_clamped(padding, width, height);

    if padded.width == 0 || padded.height == 0 || padded.right() > width || padded.bottom() > height
    {
        return Err(BgTrimError::processing_stage_error(
            "trim",
            &format!("degenerate crop rectangle {padded}"),
            Some(&format!("{width}x{height}")),
        ));
    }

    Ok(Some(padded))
}

/// Binary foreground mask: 255 where the gating channel is at least [`FOREGROUND_THRESHOLD`]
#[must_use]
pub fn foreground_mask(image: &DynamicImage) -> GrayImage {
    let binarize = |value: u8| {
        if value >= FOREGROUND_THRESHOLD {
            255
        } else {
            0
        }
    };

    if image.color().has_alpha() {
        map_colors(&image.to_rgba8(), |p| Luma([binarize(p[3])]))
    } else {
        map_colors(&image.to_luma8(), |p| Luma([binarize(p[0])]))
    }
}

/// Trace contours of `mask` in its own pixel coordinates
///
/// The mask is framed by a one pixel background border first. Without it the
/// tracer never starts a border on column 0, so regions touching the left edge
/// would be lost.
fn trace_external_contours(mask: &GrayImage) -> Vec<Contour<i32>> {
    let mut framed = GrayImage::new(mask.width() + 2, mask.height() + 2);
    replace(&mut framed, mask, 1, 1);

    find_contours::<i32>(&framed)
        .into_iter()
        .map(|mut contour| {
            for point in &mut contour.points {
                *point = Point::new(point.x - 1, point.y - 1);
            }
            contour
        })
        .collect()
}

/// Outermost contour with the largest enclosed area; ties keep the first one traced
fn largest_external_contour(contours: &[Contour<i32>]) -> Option<&Contour<i32>> {
    let mut best: Option<(&Contour<i32>, f64)> = None;

    for contour in contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
    {
        let area = contour_area(&contour.points);
        match best {
            Some((_, best_area)) if area <= best_area => {},
            _ => best = Some((contour, area)),
        }
    }

    best.map(|(contour, _)| contour)
}

/// Area enclosed by a closed polygon (shoelace formula)
#[must_use]
pub fn contour_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }

    let twice_area: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y))
        .sum();

    (twice_area as f64).abs() / 2.0
}

/// Smallest rectangle containing every point (inclusive pixel coordinates)
#[must_use]
pub fn bounding_rect(points: &[Point<i32>]) -> Option<BoundingBox> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);

    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    let x = u32::try_from(min_x).ok()?;
    let y = u32::try_from(min_y).ok()?;
    let width = u32::try_from(max_x - min_x + 1).ok()?;
    let height = u32::try_from(max_y - min_y + 1).ok()?;

    Some(BoundingBox::new(x, y, width, height))
}
