#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{imageops::FilterType, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::nms::non_max_suppression;
use crate::detect::result::{BoundingBox, Detection};

const BOX_ROWS: usize = 4;
const LETTERBOX_FILL: f32 = 144.0 / 255.0;

/// Tract-based backend for YOLOv8-style ONNX detectors.
///
/// Expects a single output of shape `[1, 4 + classes, anchors]` with boxes as
/// `cx, cy, w, h` in model input pixels, as exported by Ultralytics.
/// Inference runs on the CPU.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    min_confidence: f32,
    nms_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for square `input_size` inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            min_confidence: 0.3,
            nms_threshold: 0.3,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_min_confidence(mut self, threshold: f32) -> Self {
        self.min_confidence = threshold;
        self
    }

    /// Override the default non-max suppression IoU threshold.
    pub fn with_nms_threshold(mut self, threshold: f32) -> Self {
        self.nms_threshold = threshold;
        self
    }

    /// Letterbox scale from frame pixels to model pixels.
    fn scale_for(&self, width: u32, height: u32) -> f32 {
        let size = self.input_size as f32;
        (size / width as f32).min(size / height as f32)
    }

    fn build_input(&self, frame: &RgbImage, ratio: f32) -> Result<Tensor> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(anyhow!("cannot run detection on an empty {}x{} frame", width, height));
        }

        let new_w = ((width as f32 * ratio).round() as u32).clamp(1, self.input_size);
        let new_h = ((height as f32 * ratio).round() as u32).clamp(1, self.input_size);
        let resized = image::imageops::resize(frame, new_w, new_h, FilterType::Triangle);

        let size = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            if x < new_w as usize && y < new_h as usize {
                resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
            } else {
                LETTERBOX_FILL
            }
        });

        Ok(input.into_tensor())
    }

    fn decode(
        &self,
        outputs: TVec<TValue>,
        target_class: usize,
        ratio: f32,
        frame_w: f32,
        frame_h: f32,
    ) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let preds = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let frame = FrameGeometry {
            ratio,
            width: frame_w,
            height: frame_h,
        };
        decode_predictions(
            preds,
            target_class,
            frame,
            self.min_confidence,
            self.nms_threshold,
        )
    }
}

/// Letterbox scale and original size of the frame a prediction came from.
#[derive(Clone, Copy, Debug)]
struct FrameGeometry {
    ratio: f32,
    width: f32,
    height: f32,
}

/// Decode a `[1, 4 + classes, anchors]` prediction tensor into frame-space
/// detections of `target_class`, after non-max suppression.
fn decode_predictions(
    preds: tract_ndarray::ArrayViewD<'_, f32>,
    target_class: usize,
    frame: FrameGeometry,
    min_confidence: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>> {
    let shape = preds.shape();
    if shape.len() != 3 || shape[1] <= BOX_ROWS {
        return Err(anyhow!("unexpected detector output shape {:?}", shape));
    }
    let rows = shape[1];
    let anchors = shape[2];
    if target_class >= rows - BOX_ROWS {
        return Err(anyhow!(
            "target class {} out of range for a {}-class model",
            target_class,
            rows - BOX_ROWS
        ));
    }
    let preds = preds
        .into_dimensionality::<tract_ndarray::Ix3>()
        .context("detector output is not three-dimensional")?;

    let mut detections = Vec::new();
    for a in 0..anchors {
        let (best_class, best_score) = (BOX_ROWS..rows)
            .map(|r| (r - BOX_ROWS, preds[[0, r, a]]))
            .fold((0, f32::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            });
        if best_class != target_class || best_score <= min_confidence {
            continue;
        }

        let cx = preds[[0, 0, a]] / frame.ratio;
        let cy = preds[[0, 1, a]] / frame.ratio;
        let w = preds[[0, 2, a]] / frame.ratio;
        let h = preds[[0, 3, a]] / frame.ratio;
        let bbox = BoundingBox::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
            .clamp_to(frame.width, frame.height);
        if bbox.width() <= 0.0 || bbox.height() <= 0.0 {
            continue;
        }
        detections.push(Detection::from_bbox(best_score, bbox));
    }

    non_max_suppression(&mut detections, nms_threshold);
    Ok(detections)
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &RgbImage, target_class: usize) -> Result<Vec<Detection>> {
        let (width, height) = frame.dimensions();
        let ratio = self.scale_for(width, height);
        let input = self.build_input(frame, ratio)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, target_class, ratio, width as f32, height as f32)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbImage::new(self.input_size, self.input_size);
        self.detect(&blank, 0).map(|_| ())
    }
}
