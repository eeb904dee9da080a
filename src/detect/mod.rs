//! YOLO-style detection post-processing.
//!
//! The pipeline decodes a raw head into box tensors, converts centers to
//! corners, thresholds class scores, rescales to image pixels, and prunes
//! overlapping boxes with greedy non-max suppression.

pub mod boxes;
pub(crate) mod eval;
pub(crate) mod filter;
pub(crate) mod head;
pub(crate) mod overlap;
pub(crate) mod nms;

pub use boxes::{scale_boxes, yolo_boxes_to_corners, BoxCenter, BoxCorners, ImageShape};
pub use eval::{evaluate, EvalConfig, YoloOutputs};
pub use filter::filter_boxes;
pub use head::yolo_head;
pub use overlap::{iou, iou_clamped};
pub use nms::non_max_suppression;

/// A single detection borrowed out of a [`Detections`] set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    /// Class-conditional confidence score.
    pub score: f64,
    /// Box in corner form.
    pub bbox: BoxCorners,
    /// Arg-max class index.
    pub class: usize,
}

/// Index-aligned scores, boxes, and classes.
///
/// The three sequences only grow together, so they always have equal length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Detections {
    scores: Vec<f64>,
    boxes: Vec<BoxCorners>,
    classes: Vec<usize>,
}

impl Detections {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty set with room for `capacity` detections.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            scores: Vec::with_capacity(capacity),
            boxes: Vec::with_capacity(capacity),
            classes: Vec::with_capacity(capacity),
        }
    }

    /// Appends one detection.
    pub fn push(&mut self, score: f64, bbox: BoxCorners, class: usize) {
        self.scores.push(score);
        self.boxes.push(bbox);
        self.classes.push(class);
    }

    /// Returns the number of detections.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Returns true when the set holds no detections.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Returns the scores.
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    /// Returns the boxes.
    pub fn boxes(&self) -> &[BoxCorners] {
        &self.boxes
    }

    /// Returns the class indices.
    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    /// Returns the detection at `idx`.
    pub fn get(&self, idx: usize) -> Option<Detection> {
        Some(Detection {
            score: *self.scores.get(idx)?,
            bbox: *self.boxes.get(idx)?,
            class: *self.classes.get(idx)?,
        })
    }

    /// Iterates over detections in order.
    pub fn iter(&self) -> impl Iterator<Item = Detection> + '_ {
        self.scores
            .iter()
            .zip(self.boxes.iter())
            .zip(self.classes.iter())
            .map(|((&score, &bbox), &class)| Detection { score, bbox, class })
    }

    /// Rescales every box from normalized to pixel coordinates.
    pub fn scale_boxes(&mut self, shape: ImageShape) {
        scale_boxes(&mut self.boxes, shape);
    }

    /// Gathers detections by index, in the given order.
    pub(crate) fn gather(&self, indices: &[usize]) -> Self {
        let mut out = Self::with_capacity(indices.len());
        for &idx in indices {
            out.push(self.scores[idx], self.boxes[idx], self.classes[idx]);
        }
        out
    }
}

impl FromIterator<Detection> for Detections {
    fn from_iter<I: IntoIterator<Item = Detection>>(iter: I) -> Self {
        let mut out = Self::new();
        for det in iter {
            out.push(det.score, det.bbox, det.class);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::{BoxCorners, Detection, Detections};

    #[test]
    fn detections_stay_index_aligned() {
        let mut dets = Detections::new();
        dets.push(0.9, BoxCorners::new(0.0, 0.0, 1.0, 1.0), 3);
        dets.push(0.4, BoxCorners::new(1.0, 1.0, 2.0, 2.0), 7);

        assert_eq!(dets.len(), 2);
        assert_eq!(dets.scores().len(), dets.boxes().len());
        assert_eq!(dets.boxes().len(), dets.classes().len());
        assert_eq!(dets.get(1).map(|d| d.class), Some(7));
        assert!(dets.get(2).is_none());
    }

    #[test]
    fn gather_reorders_all_sequences() {
        let dets: Detections = (0..3)
            .map(|i| Detection {
                score: i as f64,
                bbox: BoxCorners::new(i as f64, 0.0, i as f64 + 1.0, 1.0),
                class: i,
            })
            .collect();
        let picked = dets.gather(&[2, 0]);
        assert_eq!(picked.scores(), &[2.0, 0.0]);
        assert_eq!(picked.classes(), &[2, 0]);
        assert_eq!(picked.boxes()[0].x1, 2.0);
    }
}
