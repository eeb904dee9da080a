//! Decoding of the raw detector head into box and class tensors.

use crate::detect::eval::YoloOutputs;
use crate::util::math::{sigmoid, softmax_in_place};
use crate::util::{DlError, DlResult};
use ndarray::{s, Array4, ArrayView3};

/// Decodes a `(gh, gw, anchors * (5 + classes))` feature map.
///
/// Each anchor contributes `[tx, ty, tw, th, to, logits...]`. Anchors are
/// `(w, h)` pairs in grid-cell units. Box centers and sizes come out
/// normalized to the image so that `(1, 1)` is the bottom-right corner.
pub fn yolo_head(
    feats: ArrayView3<'_, f64>,
    anchors: &[[f64; 2]],
    num_classes: usize,
) -> DlResult<YoloOutputs> {
    if anchors.is_empty() {
        return Err(DlError::InvalidInput("at least one anchor is required"));
    }
    if num_classes == 0 {
        return Err(DlError::InvalidInput("num_classes must be at least 1"));
    }

    let (gh, gw, channels) = feats.dim();
    let per_anchor = 5 + num_classes;
    let num_anchors = anchors.len();
    if channels != num_anchors * per_anchor {
        return Err(DlError::shape(
            "feats",
            &[gh, gw, num_anchors * per_anchor],
            feats.shape(),
        ));
    }

    let mut box_xy = Array4::<f64>::zeros((gh, gw, num_anchors, 2));
    let mut box_wh = Array4::<f64>::zeros((gh, gw, num_anchors, 2));
    let mut box_confidence = Array4::<f64>::zeros((gh, gw, num_anchors, 1));
    let mut box_class_probs = Array4::<f64>::zeros((gh, gw, num_anchors, num_classes));

    let grid_w = gw as f64;
    let grid_h = gh as f64;
    for row in 0..gh {
        for col in 0..gw {
            for (a, anchor) in anchors.iter().enumerate() {
                let base = a * per_anchor;
                let t = feats.slice(s![row, col, base..base + per_anchor]);

                box_xy[[row, col, a, 0]] = (sigmoid(t[0]) + col as f64) / grid_w;
                box_xy[[row, col, a, 1]] = (sigmoid(t[1]) + row as f64) / grid_h;
                box_wh[[row, col, a, 0]] = t[2].exp() * anchor[0] / grid_w;
                box_wh[[row, col, a, 1]] = t[3].exp() * anchor[1] / grid_h;
                box_confidence[[row, col, a, 0]] = sigmoid(t[4]);

                let mut probs = box_class_probs.slice_mut(s![row, col, a, ..]);
                probs.assign(&t.slice(s![5..]));
                softmax_in_place(probs);
            }
        }
    }

    YoloOutputs::new(box_xy, box_wh, box_confidence, box_class_probs)
}
