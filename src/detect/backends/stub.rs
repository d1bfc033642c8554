use anyhow::Result;
use image::RgbImage;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};

/// One scripted detection tagged with the class it belongs to.
#[derive(Clone, Debug)]
pub struct ScriptedDetection {
    pub class_id: usize,
    pub detection: Detection,
}

impl ScriptedDetection {
    pub fn new(class_id: usize, detection: Detection) -> Self {
        Self {
            class_id,
            detection,
        }
    }
}

enum Script {
    /// Per-frame detections; frames past the end yield nothing.
    Frames(Vec<Vec<ScriptedDetection>>),
    /// Two people walking towards each other across the frame.
    Walkers { class_id: usize },
}

/// Stub backend for testing and demo runs. Replays scripted detections, no model.
pub struct StubBackend {
    script: Script,
    frame_count: usize,
}

impl StubBackend {
    /// Replay `frames[i]` on the i-th call to `detect`.
    pub fn scripted(frames: Vec<Vec<ScriptedDetection>>) -> Self {
        Self {
            script: Script::Frames(frames),
            frame_count: 0,
        }
    }

    /// Same as [`StubBackend::scripted`] with every detection tagged as `class_id`.
    pub fn scripted_class(class_id: usize, frames: Vec<Vec<Detection>>) -> Self {
        Self::scripted(
            frames
                .into_iter()
                .map(|frame| {
                    frame
                        .into_iter()
                        .map(|detection| ScriptedDetection::new(class_id, detection))
                        .collect()
                })
                .collect(),
        )
    }

    /// Two synthetic people that start at opposite edges and meet in the middle,
    /// then separate again. The cycle repeats every 60 frames.
    pub fn walkers(class_id: usize) -> Self {
        Self {
            script: Script::Walkers { class_id },
            frame_count: 0,
        }
    }

    fn walker_frame(&self, class_id: usize, frame: &RgbImage) -> Vec<ScriptedDetection> {
        const CYCLE: usize = 60;
        let (width, height) = (frame.width() as f32, frame.height() as f32);
        let person_w = (width / 10.0).max(4.0);
        let person_h = (height / 3.0).max(8.0);
        let phase = (self.frame_count % CYCLE) as f32 / CYCLE as f32;
        // 0 -> 1 -> 0 over one cycle
        let approach = 1.0 - (2.0 * phase - 1.0).abs();
        let travel = (width / 2.0 - person_w) * approach;
        let top = (height - person_h) / 2.0;

        let left = BoundingBox::from_xywh(travel, top, person_w, person_h);
        let right = BoundingBox::from_xywh(width - person_w - travel, top, person_w, person_h);

        vec![
            ScriptedDetection::new(class_id, Detection::from_bbox(0.9, left)),
            ScriptedDetection::new(class_id, Detection::from_bbox(0.85, right)),
        ]
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &RgbImage, target_class: usize) -> Result<Vec<Detection>> {
        let scripted = match &self.script {
            Script::Frames(frames) => frames.get(self.frame_count).cloned().unwrap_or_default(),
            Script::Walkers { class_id } => self.walker_frame(*class_id, frame),
        };
        self.frame_count += 1;

        Ok(scripted
            .into_iter()
            .filter(|entry| entry.class_id == target_class)
            .map(|entry| entry.detection)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person_at(x: f32) -> Detection {
        Detection::from_bbox(0.9, BoundingBox::from_xywh(x, 0.0, 10.0, 30.0))
    }

    #[test]
    fn replays_script_and_filters_by_class() -> Result<()> {
        let frame = RgbImage::new(100, 100);
        let mut backend = StubBackend::scripted(vec![vec![
            ScriptedDetection::new(0, person_at(0.0)),
            ScriptedDetection::new(2, person_at(20.0)),
            ScriptedDetection::new(0, person_at(40.0)),
        ]]);

        let people = backend.detect(&frame, 0)?;
        assert_eq!(people.len(), 2);
        assert_eq!(people[0].bbox.x0, 0.0);
        assert_eq!(people[1].bbox.x0, 40.0);

        // script exhausted
        assert!(backend.detect(&frame, 0)?.is_empty());
        Ok(())
    }

    #[test]
    fn walkers_meet_mid_cycle() -> Result<()> {
        let frame = RgbImage::new(700, 300);
        let mut backend = StubBackend::walkers(0);

        let start = backend.detect(&frame, 0)?;
        let start_gap = start[1].centroid.0 - start[0].centroid.0;
        for _ in 1..30 {
            backend.detect(&frame, 0)?;
        }
        let middle = backend.detect(&frame, 0)?;
        let middle_gap = middle[1].centroid.0 - middle[0].centroid.0;

        assert!(middle_gap < start_gap);
        assert!(middle_gap.abs() <= 70.0 + f32::EPSILON);
        Ok(())
    }
}
