//! # Detection geometry
//!
//! Pixel-space quantities derived from a detection: centres, alignment errors and coverage.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::eqpt::detect::{BoundingBox, Detection, NormBox};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Alignment errors of the object relative to the frame centre, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignError {
    /// Positive when the object is to the right of centre
    pub horizontal_px: f64,

    /// Positive when the object is above centre
    pub vertical_px: f64,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Centre of the bounding box.
pub fn box_centre(bbox: &BoundingBox) -> (f64, f64) {
    (
        (bbox.x_min + bbox.x_max) / 2.0,
        (bbox.y_min + bbox.y_max) / 2.0,
    )
}

/// Centre of a frame of the given size.
pub fn frame_centre(frame_width: u32, frame_height: u32) -> (f64, f64) {
    (frame_width as f64 / 2.0, frame_height as f64 / 2.0)
}

/// Alignment error of a box in a frame of the given size.
///
/// The vertical error is inverted relative to pixel rows, so that for both axes a positive error
/// means the vehicle should rotate right or ascend to correct it.
pub fn align_error(bbox: &BoundingBox, frame_width: u32, frame_height: u32) -> AlignError {
    let (obj_x, obj_y) = box_centre(bbox);
    let (frame_x, frame_y) = frame_centre(frame_width, frame_height);

    AlignError {
        horizontal_px: obj_x - frame_x,
        vertical_px: frame_y - obj_y,
    }
}

/// Percentage of the frame covered by the box, rounded to the nearest integer and limited to
/// `[0, 100]`.
pub fn coverage_percent(bbox: &BoundingBox, frame_width: u32, frame_height: u32) -> u32 {
    let frame_area = frame_width as f64 * frame_height as f64;
    if frame_area <= 0.0 {
        return 0;
    }

    let pct = (100.0 * bbox.area() / frame_area).round();

    pct.max(0.0).min(100.0) as u32
}

/// Scale a normalised box into pixel coordinates, limiting it to the frame.
pub fn to_pixels(norm: &NormBox, frame_width: u32, frame_height: u32) -> BoundingBox {
    let w = frame_width as f64;
    let h = frame_height as f64;
    let unit = |v: f64| if v.is_finite() { v.max(0.0).min(1.0) } else { 0.0 };

    BoundingBox::new(
        unit(norm.x_min) * w,
        unit(norm.y_min) * h,
        unit(norm.x_max) * w,
        unit(norm.y_max) * h,
    )
}

/// Build the detection for a frame from the box found in it, if any.
pub fn detection(frame_width: u32, frame_height: u32, object_box: Option<BoundingBox>) -> Detection {
    let coverage = object_box
        .as_ref()
        .map(|b| coverage_percent(b, frame_width, frame_height))
        .unwrap_or(0);

    Detection {
        frame_width,
        frame_height,
        object_box,
        coverage_percent: coverage,
    }
}

/// Build the detection for a frame from the normalised box returned by the detector.
pub fn detection_from_norm(
    frame_width: u32,
    frame_height: u32,
    norm_box: Option<NormBox>,
) -> Detection {
    detection(
        frame_width,
        frame_height,
        norm_box.map(|b| to_pixels(&b, frame_width, frame_height)),
    )
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
