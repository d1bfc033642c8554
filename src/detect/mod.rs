//! Person detection.
//!
//! The pipeline sees detectors only through [`DetectorBackend`]. Backends:
//! - `stub`: scripted detections for tests and demo runs
//! - `tract`: YOLOv8-style ONNX models (feature: backend-tract)

mod backend;
mod backends;
mod labels;
mod nms;
mod result;

pub use backend::DetectorBackend;
pub use backends::{ScriptedDetection, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use labels::Labels;
pub use nms::non_max_suppression;
pub use result::{centroids, BoundingBox, Detection};
