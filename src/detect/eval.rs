//! End-to-end post-processing of decoded detector outputs.

use crate::detect::boxes::{yolo_boxes_to_corners, ImageShape};
use crate::detect::filter::filter_boxes;
use crate::detect::nms::non_max_suppression;
use crate::detect::Detections;
use crate::trace::{trace_event, trace_span};
use crate::util::{DlError, DlResult};
use ndarray::Array4;

/// Decoded detector tensors, all sharing the `(gh, gw, anchors)` prefix.
#[derive(Clone, Debug)]
pub struct YoloOutputs {
    box_xy: Array4<f64>,
    box_wh: Array4<f64>,
    box_confidence: Array4<f64>,
    box_class_probs: Array4<f64>,
}

impl YoloOutputs {
    /// Bundles the decoded tensors after checking their shapes.
    pub fn new(
        box_xy: Array4<f64>,
        box_wh: Array4<f64>,
        box_confidence: Array4<f64>,
        box_class_probs: Array4<f64>,
    ) -> DlResult<Self> {
        let (gh, gw, anchors, _) = box_xy.dim();
        if box_xy.dim().3 != 2 {
            return Err(DlError::shape("box_xy", &[gh, gw, anchors, 2], box_xy.shape()));
        }
        if box_wh.dim() != (gh, gw, anchors, 2) {
            return Err(DlError::shape("box_wh", &[gh, gw, anchors, 2], box_wh.shape()));
        }
        if box_confidence.dim() != (gh, gw, anchors, 1) {
            return Err(DlError::shape(
                "box_confidence",
                &[gh, gw, anchors, 1],
                box_confidence.shape(),
            ));
        }
        let (pg_h, pg_w, p_anchors, classes) = box_class_probs.dim();
        if (pg_h, pg_w, p_anchors) != (gh, gw, anchors) {
            return Err(DlError::shape(
                "box_class_probs",
                &[gh, gw, anchors, classes],
                box_class_probs.shape(),
            ));
        }
        Ok(Self {
            box_xy,
            box_wh,
            box_confidence,
            box_class_probs,
        })
    }

    /// Box centers `[x, y]`.
    pub fn box_xy(&self) -> &Array4<f64> {
        &self.box_xy
    }

    /// Box sizes `[w, h]`.
    pub fn box_wh(&self) -> &Array4<f64> {
        &self.box_wh
    }

    /// Objectness confidences.
    pub fn box_confidence(&self) -> &Array4<f64> {
        &self.box_confidence
    }

    /// Per-class probabilities.
    pub fn box_class_probs(&self) -> &Array4<f64> {
        &self.box_class_probs
    }
}

/// Configuration for [`evaluate`].
#[derive(Clone, Copy, Debug)]
pub struct EvalConfig {
    /// Target image size for rescaling boxes.
    pub image_shape: ImageShape,
    /// Maximum number of detections to return.
    pub max_boxes: usize,
    /// Minimum class score to keep a box.
    pub score_threshold: f64,
    /// IoU above which a lower-scoring box is suppressed.
    pub iou_threshold: f64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            image_shape: ImageShape::default(),
            max_boxes: 10,
            score_threshold: 0.6,
            iou_threshold: 0.5,
        }
    }
}

/// Converts, filters, rescales, and suppresses decoded outputs.
pub fn evaluate(outputs: &YoloOutputs, cfg: &EvalConfig) -> DlResult<Detections> {
    let _span = trace_span!(
        "evaluate",
        max_boxes = cfg.max_boxes,
        score_threshold = cfg.score_threshold
    )
    .entered();

    let corners = yolo_boxes_to_corners(outputs.box_xy.view(), outputs.box_wh.view())?;
    let mut filtered = filter_boxes(
        outputs.box_confidence.view(),
        corners.view(),
        outputs.box_class_probs.view(),
        cfg.score_threshold,
    )?;
    filtered.scale_boxes(cfg.image_shape);
    let kept = non_max_suppression(&filtered, cfg.max_boxes, cfg.iou_threshold)?;

    trace_event!("evaluate_done", filtered = filtered.len(), kept = kept.len());
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::{evaluate, EvalConfig, YoloOutputs};
    use crate::detect::boxes::ImageShape;
    use crate::util::DlError;
    use ndarray::Array4;

    #[test]
    fn outputs_reject_mismatched_confidence() {
        let err = YoloOutputs::new(
            Array4::zeros((2, 2, 1, 2)),
            Array4::zeros((2, 2, 1, 2)),
            Array4::zeros((2, 2, 2, 1)),
            Array4::zeros((2, 2, 1, 3)),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DlError::ShapeMismatch { context: "box_confidence", .. }
        ));
    }

    #[test]
    fn evaluate_scales_single_confident_box() {
        let mut xy = Array4::<f64>::zeros((1, 1, 2, 2));
        let mut wh = Array4::<f64>::zeros((1, 1, 2, 2));
        let mut conf = Array4::<f64>::zeros((1, 1, 2, 1));
        let mut probs = Array4::<f64>::zeros((1, 1, 2, 2));
        xy[[0, 0, 0, 0]] = 0.5;
        xy[[0, 0, 0, 1]] = 0.5;
        wh[[0, 0, 0, 0]] = 0.5;
        wh[[0, 0, 0, 1]] = 0.5;
        conf[[0, 0, 0, 0]] = 0.9;
        probs[[0, 0, 0, 1]] = 1.0;
        conf[[0, 0, 1, 0]] = 0.2;
        probs[[0, 0, 1, 0]] = 1.0;

        let outputs = YoloOutputs::new(xy, wh, conf, probs).unwrap();
        let cfg = EvalConfig {
            image_shape: ImageShape::new(100.0, 200.0),
            ..EvalConfig::default()
        };
        let dets = evaluate(&outputs, &cfg).unwrap();

        assert_eq!(dets.len(), 1);
        let det = dets.get(0).unwrap();
        assert_eq!(det.class, 1);
        assert!((det.score - 0.9).abs() < 1e-12);
        assert!((det.bbox.x1 - 50.0).abs() < 1e-9);
        assert!((det.bbox.y1 - 25.0).abs() < 1e-9);
        assert!((det.bbox.x2 - 150.0).abs() < 1e-9);
        assert!((det.bbox.y2 - 75.0).abs() < 1e-9);
    }
}
