//! Box representations and coordinate conversions.
//!
//! Box tensors store corners along their last axis as `[x1, y1, x2, y2]`.
//! Coordinates produced by the detector head are normalized to `[0, 1]`
//! relative to the image; `scale_boxes` maps them to pixels.

use crate::util::{DlError, DlResult};
use ndarray::{Array4, ArrayView4, Axis};

/// Axis-aligned box in corner form.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxCorners {
    /// Left edge.
    pub x1: f64,
    /// Top edge.
    pub y1: f64,
    /// Right edge.
    pub x2: f64,
    /// Bottom edge.
    pub y2: f64,
}

impl BoxCorners {
    /// Creates a box from its corners.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Returns `x2 - x1` (negative for inverted boxes).
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    /// Returns `y2 - y1` (negative for inverted boxes).
    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// Returns `width * height` without clamping.
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Returns the box scaled from normalized to pixel coordinates.
    pub fn scaled(&self, shape: ImageShape) -> Self {
        Self {
            x1: self.x1 * shape.width,
            y1: self.y1 * shape.height,
            x2: self.x2 * shape.width,
            y2: self.y2 * shape.height,
        }
    }
}

/// Axis-aligned box in center form.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxCenter {
    /// Center x coordinate.
    pub x: f64,
    /// Center y coordinate.
    pub y: f64,
    /// Box height.
    pub height: f64,
    /// Box width.
    pub width: f64,
}

impl BoxCenter {
    /// Converts to corner form.
    pub fn to_corners(&self) -> BoxCorners {
        let half_w = self.width / 2.0;
        let half_h = self.height / 2.0;
        BoxCorners {
            x1: self.x - half_w,
            y1: self.y - half_h,
            x2: self.x + half_w,
            y2: self.y + half_h,
        }
    }
}

/// Image size in pixels used to rescale normalized boxes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageShape {
    /// Image height in pixels.
    pub height: f64,
    /// Image width in pixels.
    pub width: f64,
}

impl ImageShape {
    /// Creates an image shape from height and width.
    pub fn new(height: f64, width: f64) -> Self {
        Self { height, width }
    }
}

impl Default for ImageShape {
    fn default() -> Self {
        Self {
            height: 720.0,
            width: 1280.0,
        }
    }
}

/// Converts center/size tensors into a corner tensor.
///
/// `box_xy` and `box_wh` have shape `(gh, gw, anchors, 2)` holding `[x, y]`
/// and `[w, h]`; the result has shape `(gh, gw, anchors, 4)`.
pub fn yolo_boxes_to_corners(
    box_xy: ArrayView4<'_, f64>,
    box_wh: ArrayView4<'_, f64>,
) -> DlResult<Array4<f64>> {
    if box_xy.dim().3 != 2 {
        let (a, b, c, _) = box_xy.dim();
        return Err(DlError::shape("box_xy", &[a, b, c, 2], box_xy.shape()));
    }
    if box_xy.shape() != box_wh.shape() {
        return Err(DlError::shape("box_wh", box_xy.shape(), box_wh.shape()));
    }

    let (gh, gw, anchors, _) = box_xy.dim();
    let mut corners = Array4::<f64>::zeros((gh, gw, anchors, 4));
    for ((mut out, xy), wh) in corners
        .lanes_mut(Axis(3))
        .into_iter()
        .zip(box_xy.lanes(Axis(3)))
        .zip(box_wh.lanes(Axis(3)))
    {
        let center = BoxCenter {
            x: xy[0],
            y: xy[1],
            width: wh[0],
            height: wh[1],
        };
        let c = center.to_corners();
        out[0] = c.x1;
        out[1] = c.y1;
        out[2] = c.x2;
        out[3] = c.y2;
    }
    Ok(corners)
}

/// Rescales normalized boxes to pixel coordinates in place.
pub fn scale_boxes(boxes: &mut [BoxCorners], shape: ImageShape) {
    for b in boxes.iter_mut() {
        *b = b.scaled(shape);
    }
}
