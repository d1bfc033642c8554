//! Distancing monitor
//!
//! Watches one frame source, detects people in every frame, and flags those
//! standing closer to another person than a configured pixel distance.
//!
//! # Architecture
//!
//! Per frame, leaves first:
//!
//! 1. **Detection** (`detect`): frame -> person detections (confidence, box, centroid)
//! 2. **Evaluation** (`evaluate`): centroids -> indices closer than the threshold
//! 3. **Annotation** (`annotate`): boxes and centroids drawn safe or violating, plus a count
//! 4. **Driver** (`pipeline`): source -> detect -> evaluate -> annotate -> display, recording
//!
//! # Module Structure
//!
//! - `config`: file + environment configuration
//! - `frame`: working-width resize and capture region crop
//! - `ingest`: frame sources (synthetic, image files, video files)
//! - `sink`: preview display and MJPEG/AVI recorder

pub mod annotate;
pub mod config;
pub mod detect;
pub mod evaluate;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod sink;

pub use annotate::{overlay_text, AnnotationStyle, Annotator, MarkerState};
pub use config::MonitorConfig;
pub use detect::{centroids, BoundingBox, Detection, DetectorBackend, Labels, StubBackend};
pub use evaluate::{evaluate, DistanceMatrix, ViolationSet};
pub use frame::{resize_to_width, CaptureRegion};
pub use ingest::{open_source, FrameSource};
pub use pipeline::{
    Driver, DriverState, FrameReport, PipelineSettings, RunReport, StopReason, StopSignal,
};
pub use sink::{FrameSink, LazyRecorder, PreviewDisplay};
