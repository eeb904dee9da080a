//! Greedy non-max suppression over a detection set.

use crate::detect::overlap::iou_clamped;
use crate::detect::Detections;
use crate::trace::{trace_debug, trace_event, trace_span};
use crate::util::{DlError, DlResult};
use std::cmp::Ordering;

fn score_cmp_desc(scores: &[f64], a: usize, b: usize) -> Ordering {
    scores[b].total_cmp(&scores[a]).then_with(|| a.cmp(&b))
}

/// Selects at most `max_boxes` detections by descending score.
///
/// A detection is discarded when its IoU with any already-kept detection
/// exceeds `iou_threshold`. Suppression is class-agnostic. Detections with a
/// non-finite score are never selected. The result is gathered in selection
/// order.
pub fn non_max_suppression(
    detections: &Detections,
    max_boxes: usize,
    iou_threshold: f64,
) -> DlResult<Detections> {
    if !(0.0..=1.0).contains(&iou_threshold) {
        return Err(DlError::InvalidThreshold {
            name: "iou_threshold",
            value: iou_threshold,
        });
    }

    let _span = trace_span!("non_max_suppression", candidates = detections.len()).entered();

    let scores = detections.scores();
    let boxes = detections.boxes();
    let mut order: Vec<usize> = (0..detections.len())
        .filter(|&idx| scores[idx].is_finite())
        .collect();
    order.sort_by(|&a, &b| score_cmp_desc(scores, a, b));

    let mut kept: Vec<usize> = Vec::with_capacity(max_boxes.min(order.len()));
    'outer: for idx in order {
        if kept.len() >= max_boxes {
            break;
        }
        for &kept_idx in kept.iter() {
            let overlap = iou_clamped(&boxes[idx], &boxes[kept_idx]);
            if overlap > iou_threshold {
                trace_debug!("nms_suppressed", index = idx, by = kept_idx);
                continue 'outer;
            }
        }
        kept.push(idx);
    }

    trace_event!("nms_kept", count = kept.len());
    Ok(detections.gather(&kept))
}
