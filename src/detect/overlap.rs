//! Intersection-over-union for corner-form boxes.

use crate::detect::boxes::BoxCorners;

/// Computes IoU without clamping the intersection extent.
///
/// For disjoint boxes the per-axis deltas go negative and their product is
/// not an area, so the result can be negative or even positive nonsense.
/// Use [`iou_clamped`] when a value in `[0, 1]` is required.
pub fn iou(a: &BoxCorners, b: &BoxCorners) -> f64 {
    let xi1 = a.x1.max(b.x1);
    let yi1 = a.y1.max(b.y1);
    let xi2 = a.x2.min(b.x2);
    let yi2 = a.y2.min(b.y2);
    let inter_area = (xi2 - xi1) * (yi2 - yi1);

    let union_area = a.area() + b.area() - inter_area;
    inter_area / union_area
}

/// Computes IoU with the intersection extent clamped at zero.
///
/// Returns 0 when the union has no positive area.
pub fn iou_clamped(a: &BoxCorners, b: &BoxCorners) -> f64 {
    let inter_w = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let inter_h = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter_area = inter_w * inter_h;

    let area_a = a.width().max(0.0) * a.height().max(0.0);
    let area_b = b.width().max(0.0) * b.height().max(0.0);
    let union_area = area_a + area_b - inter_area;
    if union_area <= 0.0 {
        return 0.0;
    }
    inter_area / union_area
}
