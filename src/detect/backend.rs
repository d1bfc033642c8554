use anyhow::Result;
use image::RgbImage;

use crate::detect::result::Detection;

/// Detector backend trait.
///
/// A backend turns one frame into the ordered detections of a single class.
/// Implementations must:
/// - Return only detections of `target_class`
/// - Keep a stable output order for a given frame (it becomes the violation index)
/// - Report unrecoverable faults as errors instead of returning an empty set
///
/// The pipeline treats the backend as a black box: model loading, inference and
/// non-max suppression all live behind this trait.
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame, restricted to `target_class`.
    fn detect(&mut self, frame: &RgbImage, target_class: usize) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, called once when a run starts.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
