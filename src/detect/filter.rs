//! Class-score thresholding over per-cell, per-anchor predictions.

use crate::detect::boxes::BoxCorners;
use crate::detect::Detections;
use crate::trace::{trace_event, trace_span};
use crate::util::{DlError, DlResult};
use ndarray::{ArrayView4, Axis};

/// Keeps boxes whose best class score reaches `threshold`.
///
/// Shapes: `box_confidence` is `(gh, gw, anchors, 1)`, `boxes` is
/// `(gh, gw, anchors, 4)` in `[x1, y1, x2, y2]` layout, and
/// `box_class_probs` is `(gh, gw, anchors, classes)`. The score of a box is
/// `confidence * class_prob` for its arg-max class; the first maximum wins
/// ties. Scores equal to the threshold are kept and non-finite scores are
/// dropped. Survivors appear in
/// row-major order of `(gh, gw, anchors)`.
pub fn filter_boxes(
    box_confidence: ArrayView4<'_, f64>,
    boxes: ArrayView4<'_, f64>,
    box_class_probs: ArrayView4<'_, f64>,
    threshold: f64,
) -> DlResult<Detections> {
    if !threshold.is_finite() {
        return Err(DlError::InvalidThreshold {
            name: "score_threshold",
            value: threshold,
        });
    }

    let (gh, gw, anchors, num_classes) = box_class_probs.dim();
    if num_classes == 0 {
        return Err(DlError::InvalidInput("box_class_probs has no classes"));
    }
    if box_confidence.dim() != (gh, gw, anchors, 1) {
        return Err(DlError::shape(
            "box_confidence",
            &[gh, gw, anchors, 1],
            box_confidence.shape(),
        ));
    }
    if boxes.dim() != (gh, gw, anchors, 4) {
        return Err(DlError::shape("boxes", &[gh, gw, anchors, 4], boxes.shape()));
    }

    let _span = trace_span!("filter_boxes", cells = gh * gw, anchors = anchors).entered();

    let mut out = Detections::new();
    let lanes = box_confidence
        .lanes(Axis(3))
        .into_iter()
        .zip(boxes.lanes(Axis(3)))
        .zip(box_class_probs.lanes(Axis(3)));
    for ((confidence, corners), probs) in lanes {
        let confidence = confidence[0];
        let mut best_class = 0usize;
        let mut best_score = confidence * probs[0];
        for (class, &p) in probs.iter().enumerate().skip(1) {
            let score = confidence * p;
            if score > best_score {
                best_class = class;
                best_score = score;
            }
        }

        if best_score.is_finite() && best_score >= threshold {
            let bbox = BoxCorners::new(corners[0], corners[1], corners[2], corners[3]);
            out.push(best_score, bbox, best_class);
        }
    }

    trace_event!("filter_survivors", count = out.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::filter_boxes;
    use crate::util::DlError;
    use ndarray::Array4;

    fn grid(confidences: &[f64], probs: &[[f64; 3]]) -> (Array4<f64>, Array4<f64>, Array4<f64>) {
        let n = confidences.len();
        let conf = Array4::from_shape_vec((1, n, 1, 1), confidences.to_vec()).unwrap();
        let boxes = Array4::from_shape_fn((1, n, 1, 4), |(_, i, _, k)| (i * 4 + k) as f64);
        let flat: Vec<f64> = probs.iter().flat_map(|p| p.iter().copied()).collect();
        let probs = Array4::from_shape_vec((1, n, 1, 3), flat).unwrap();
        (conf, boxes, probs)
    }

    #[test]
    fn keeps_scores_at_or_above_threshold() {
        let (conf, boxes, probs) = grid(
            &[1.0, 0.5, 1.0],
            &[[0.1, 0.6, 0.3], [0.2, 0.2, 0.9], [0.59, 0.1, 0.0]],
        );
        let dets = filter_boxes(conf.view(), boxes.view(), probs.view(), 0.6).unwrap();

        assert_eq!(dets.len(), 1);
        assert_eq!(dets.classes(), &[1]);
        assert_eq!(dets.scores(), &[0.6]);
        assert_eq!(dets.boxes()[0].x1, 0.0);
        assert_eq!(dets.boxes()[0].y2, 3.0);
    }

    #[test]
    fn preserves_enumeration_order_and_first_max() {
        let (conf, boxes, probs) = grid(
            &[0.9, 0.1, 0.8],
            &[[0.5, 0.5, 0.1], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
        );
        let dets = filter_boxes(conf.view(), boxes.view(), probs.view(), 0.3).unwrap();

        assert_eq!(dets.classes(), &[0, 2]);
        assert_eq!(dets.boxes()[1].x1, 8.0);
    }

    #[test]
    fn rejects_mismatched_box_tensor() {
        let (conf, _, probs) = grid(&[1.0], &[[1.0, 0.0, 0.0]]);
        let boxes = Array4::<f64>::zeros((1, 1, 1, 2));
        let err = filter_boxes(conf.view(), boxes.view(), probs.view(), 0.5).unwrap_err();
        assert_eq!(
            err,
            DlError::ShapeMismatch {
                context: "boxes",
                expected: vec![1, 1, 1, 4],
                got: vec![1, 1, 1, 2],
            }
        );
    }

    #[test]
    fn drops_non_finite_scores() {
        let (conf, boxes, probs) = grid(
            &[f64::INFINITY, f64::NAN, 1.0],
            &[[0.2, 0.9, 0.1], [0.7, 0.0, 0.0], [0.0, 0.8, 0.0]],
        );
        let dets = filter_boxes(conf.view(), boxes.view(), probs.view(), 0.5).unwrap();

        assert_eq!(dets.len(), 1);
        assert_eq!(dets.classes(), &[1]);
        assert_eq!(dets.scores(), &[0.8]);
        assert_eq!(dets.boxes()[0].x1, 8.0);
    }

    #[test]
    fn rejects_nan_threshold() {
        let (conf, boxes, probs) = grid(&[1.0], &[[1.0, 0.0, 0.0]]);
        assert!(matches!(
            filter_boxes(conf.view(), boxes.view(), probs.view(), f64::NAN),
            Err(DlError::InvalidThreshold { .. })
        ));
    }
}
