use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in pixel coordinates (`x0 < x1`, `y0 < y1`).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Build a box from its top-left corner and size.
    pub fn from_xywh(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self::new(x, y, x + w, y + h)
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
        let l = self.x0.max(other.x0);
        let r = self.x1.min(other.x1);
        let t = self.y0.max(other.y0);
        let b = self.y1.min(other.y1);
        (r - l).max(0.0) * (b - t).max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Clamp the box into a `width` x `height` frame.
    pub fn clamp_to(&self, width: f32, height: f32) -> Self {
        Self {
            x0: self.x0.clamp(0.0, width),
            y0: self.y0.clamp(0.0, height),
            x1: self.x1.clamp(0.0, width),
            y1: self.y1.clamp(0.0, height),
        }
    }
}

/// One detected person in a frame.
///
/// Detections are produced fresh per frame and carry no identity across frames.
/// Their position in the detector output is the index used by the violation set.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub centroid: (f32, f32),
}

impl Detection {
    pub fn new(confidence: f32, bbox: BoundingBox, centroid: (f32, f32)) -> Self {
        Self {
            confidence,
            bbox,
            centroid,
        }
    }

    /// Detection whose centroid is the centre of its box.
    pub fn from_bbox(confidence: f32, bbox: BoundingBox) -> Self {
        Self::new(confidence, bbox, bbox.center())
    }
}

/// Centroids of a detection set, in detection order.
pub fn centroids(detections: &[Detection]) -> Vec<(f32, f32)> {
    detections.iter().map(|d| d.centroid).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centroid_is_box_center() {
        let det = Detection::from_bbox(0.9, BoundingBox::new(10.0, 20.0, 30.0, 60.0));
        assert_eq!(det.centroid, (20.0, 40.0));
    }

    #[test]
    fn iou_of_disjoint_and_identical_boxes() {
        let a = BoundingBox::from_xywh(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::from_xywh(20.0, 20.0, 10.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);
        assert!((a.iou(&a) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn clamp_keeps_box_inside_frame() {
        let clamped = BoundingBox::new(-5.0, -1.0, 120.0, 50.0).clamp_to(100.0, 40.0);
        assert_eq!(clamped, BoundingBox::new(0.0, 0.0, 100.0, 40.0));
    }
}
