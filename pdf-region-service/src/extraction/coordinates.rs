//! Conversion of normalized region descriptors into page pixel rectangles.
//!
//! Descriptors are `[y1, x1, y2, x2]` in a fixed 0..=1000 space on both axes.
//! Corners may arrive in either orientation and values may stray outside the
//! range; both are tolerated. A region that collapses to a line or a point
//! after clamping is rejected.

use thiserror::Error;

use super::types::{NORMALIZED_MAX, PixelRect};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinateError {
    #[error("Invalid crop region: non-finite coordinate in {region:?}")]
    NonFiniteRegion { region: [f64; 4] },

    #[error("Invalid page dimensions: {width}x{height}")]
    InvalidPageDimensions { width: f64, height: f64 },

    #[error("Invalid crop region after conversion: {rect} for {width}x{height}")]
    DegenerateCropRegion {
        rect: String,
        width: f64,
        height: f64,
    },
}

fn clamp_normalized(value: f64) -> f64 {
    value.clamp(0.0, NORMALIZED_MAX)
}

fn clamp_pixel(value: f64, max: f64) -> f64 {
    value.clamp(0.0, max)
}

/// Clamp into the normalized range and order as `[min_y, min_x, max_y, max_x]`.
///
/// Only meaningful for finite input; NaN survives clamping.
pub fn normalize(region: [f64; 4]) -> [f64; 4] {
    let [y1, x1, y2, x2] = region.map(clamp_normalized);

    [y1.min(y2), x1.min(x2), y1.max(y2), x1.max(x2)]
}

/// Scale a normalized region onto a page of the given pixel size.
///
/// Minimum edges floor and maximum edges ceil so the requested area is never
/// under-covered.
pub fn to_pixel_rect(
    region: [f64; 4],
    page_width: f64,
    page_height: f64,
) -> Result<PixelRect, CoordinateError> {
    if !page_width.is_finite() || !page_height.is_finite() || page_width <= 0.0 || page_height <= 0.0
    {
        return Err(CoordinateError::InvalidPageDimensions {
            width: page_width,
            height: page_height,
        });
    }

    if region.iter().any(|value| !value.is_finite()) {
        return Err(CoordinateError::NonFiniteRegion { region });
    }

    let [min_y, min_x, max_y, max_x] = normalize(region);

    let min_y = clamp_pixel((min_y / NORMALIZED_MAX * page_height).floor(), page_height);
    let min_x = clamp_pixel((min_x / NORMALIZED_MAX * page_width).floor(), page_width);
    let max_y = clamp_pixel((max_y / NORMALIZED_MAX * page_height).ceil(), page_height);
    let max_x = clamp_pixel((max_x / NORMALIZED_MAX * page_width).ceil(), page_width);

    if min_y >= max_y || min_x >= max_x {
        return Err(CoordinateError::DegenerateCropRegion {
            rect: format!("[{}, {}, {}, {}]", min_y, min_x, max_y, max_x),
            width: page_width,
            height: page_height,
        });
    }

    // All four are whole numbers in [0, dimension] at this point.
    Ok(PixelRect {
        min_y: min_y as u32,
        min_x: min_x as u32,
        max_y: max_y as u32,
        max_x: max_x as u32,
    })
}
