//! # Object Detection Communications Module
//!
//! Types exchanged with the object detector service, and the detection result used by navigation.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An axis aligned box in pixel coordinates, with `x_min <= x_max` and `y_min <= y_max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

/// A bounding box in normalised `[0, 1]` image coordinates as returned by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

/// The result of detecting the target in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Width of the frame in pixels
    pub frame_width: u32,

    /// Height of the frame in pixels
    pub frame_height: u32,

    /// The box around the target, `None` if the target wasn't found
    pub object_box: Option<BoundingBox>,

    /// Percentage of the frame covered by `object_box`, in `[0, 100]`. Meaningless if there is no
    /// box.
    pub coverage_percent: u32,
}

/// Request sent to the detector server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectRequest {
    /// Label of the object to find
    pub label: String,

    /// Encoding of `image`, currently always `"jpeg"`
    pub format: String,

    /// Base64 encoded image data
    pub image: String,
}

/// Response from the detector server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectResponse {
    /// Every box found for the requested label, most confident first
    pub boxes: Vec<NormBox>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl BoundingBox {
    /// Create a new box, ordering the coordinates so that the min/max invariant holds.
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x_min: x0.min(x1),
            y_min: y0.min(y1),
            x_max: x0.max(x1),
            y_max: y0.max(y1),
        }
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }
}

impl DetectRequest {
    /// Build a request for the given JPEG encoded image.
    pub fn new(label: &str, jpeg: &[u8]) -> Self {
        Self {
            label: String::from(label),
            format: String::from("jpeg"),
            image: base64::encode(jpeg),
        }
    }

    /// Decode the image bytes carried by this request.
    pub fn image_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::decode(&self.image)
    }
}

impl DetectResponse {
    /// The most confident box, if any.
    pub fn first(&self) -> Option<NormBox> {
        self.boxes.first().copied()
    }
}
