use std::cmp::Ordering;

use crate::detect::result::Detection;

/// Greedy non-max suppression.
///
/// Sorts by confidence (highest first) and drops every detection whose IoU with an
/// already kept detection exceeds `iou_threshold`. The surviving order is the
/// confidence order.
pub fn non_max_suppression(detections: &mut Vec<Detection>, iou_threshold: f32) {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut kept = 0;
    for index in 0..detections.len() {
        let overlaps = (0..kept)
            .any(|prev| detections[prev].bbox.iou(&detections[index].bbox) > iou_threshold);
        if !overlaps {
            detections.swap(kept, index);
            kept += 1;
        }
    }
    detections.truncate(kept);
}
