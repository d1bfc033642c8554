//! Frame annotation.
//!
//! Draws every detection in one of two states, safe or violating, chosen only by
//! membership in the violation set, then overlays the violation count.

use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detect::Detection;
use crate::evaluate::ViolationSet;

/// Locations searched for an overlay font when none is configured.
const SYSTEM_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Visual state of one person marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkerState {
    Safe,
    Violating,
}

impl MarkerState {
    pub fn of(index: usize, violations: &ViolationSet) -> Self {
        if violations.contains(index) {
            MarkerState::Violating
        } else {
            MarkerState::Safe
        }
    }
}

/// Colors and sizes used when drawing.
#[derive(Clone, Debug)]
pub struct AnnotationStyle {
    pub safe: Rgb<u8>,
    pub violating: Rgb<u8>,
    pub text: Rgb<u8>,
    pub box_thickness: u32,
    pub centroid_radius: i32,
    pub text_scale: f32,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            safe: Rgb([0, 255, 0]),
            violating: Rgb([255, 0, 0]),
            text: Rgb([255, 0, 0]),
            box_thickness: 2,
            centroid_radius: 5,
            text_scale: 24.0,
        }
    }
}

impl AnnotationStyle {
    pub fn color(&self, state: MarkerState) -> Rgb<u8> {
        match state {
            MarkerState::Safe => self.safe,
            MarkerState::Violating => self.violating,
        }
    }
}

/// Overlay text for a violation count.
pub fn overlay_text(count: usize) -> String {
    format!("Social Distancing Violations: {}", count)
}

pub struct Annotator {
    style: AnnotationStyle,
    font: Option<FontVec>,
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new(AnnotationStyle::default())
    }
}

impl Annotator {
    /// Annotator without a font; the count overlay is skipped.
    pub fn new(style: AnnotationStyle) -> Self {
        Self { style, font: None }
    }

    pub fn with_font(mut self, font: FontVec) -> Self {
        self.font = Some(font);
        self
    }

    /// Load the font at `path`, or the first system font found when `path` is `None`.
    ///
    /// A configured font that cannot be loaded is an error. A missing system font is
    /// not: the annotator then runs without the text overlay.
    pub fn with_font_search(self, path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            let font = load_font(path)?;
            return Ok(self.with_font(font));
        }
        match SYSTEM_FONT_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.is_file())
        {
            Some(found) => {
                log::debug!("overlay font: {}", found.display());
                Ok(self.with_font(load_font(&found)?))
            }
            None => {
                log::warn!("no overlay font found; violation count text will not be drawn");
                Ok(self)
            }
        }
    }

    pub fn style(&self) -> &AnnotationStyle {
        &self.style
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw all detections and the count overlay. Returns the violation count.
    pub fn annotate(
        &self,
        frame: &mut RgbImage,
        detections: &[Detection],
        violations: &ViolationSet,
    ) -> usize {
        for (index, detection) in detections.iter().enumerate() {
            let color = self.style.color(MarkerState::of(index, violations));
            self.draw_box(frame, detection, color);
            let (cx, cy) = detection.centroid;
            draw_hollow_circle_mut(
                frame,
                (cx.round() as i32, cy.round() as i32),
                self.style.centroid_radius,
                color,
            );
        }

        let count = violations.len();
        if let Some(font) = &self.font {
            let y = frame.height() as i32 - 25 - self.style.text_scale as i32;
            draw_text_mut(
                frame,
                self.style.text,
                10,
                y.max(0),
                PxScale::from(self.style.text_scale),
                font,
                &overlay_text(count),
            );
        }
        count
    }

    fn draw_box(&self, frame: &mut RgbImage, detection: &Detection, color: Rgb<u8>) {
        let bbox = detection.bbox;
        let x0 = bbox.x0.round() as i32;
        let y0 = bbox.y0.round() as i32;
        let x1 = bbox.x1.round() as i32;
        let y1 = bbox.y1.round() as i32;
        for t in 0..self.style.box_thickness as i32 {
            let w = x1 - x0 - 2 * t;
            let h = y1 - y0 - 2 * t;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(x0 + t, y0 + t).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(frame, rect, color);
        }
    }
}

fn load_font(path: &Path) -> Result<FontVec> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read font {}", path.display()))?;
    FontVec::try_from_vec(bytes).with_context(|| format!("invalid font file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn person(x: f32) -> Detection {
        Detection::from_bbox(0.9, BoundingBox::from_xywh(x, 10.0, 20.0, 40.0))
    }

    #[test]
    fn only_violating_index_is_drawn_red() {
        let annotator = Annotator::default();
        let style = annotator.style().clone();
        let mut frame = RgbImage::new(200, 120);
        let detections = [person(10.0), person(60.0), person(110.0)];
        let violations: ViolationSet = [1].into_iter().collect();

        let count = annotator.annotate(&mut frame, &detections, &violations);

        assert_eq!(count, 1);
        // top-left corner of each box
        assert_eq!(*frame.get_pixel(10, 10), style.safe);
        assert_eq!(*frame.get_pixel(60, 10), style.violating);
        assert_eq!(*frame.get_pixel(110, 10), style.safe);
        // second ring of the 2px border
        assert_eq!(*frame.get_pixel(61, 11), style.violating);
    }

    #[test]
    fn marker_state_is_set_membership() {
        let violations: ViolationSet = [0, 2].into_iter().collect();
        assert_eq!(MarkerState::of(0, &violations), MarkerState::Violating);
        assert_eq!(MarkerState::of(1, &violations), MarkerState::Safe);
        assert_eq!(MarkerState::of(2, &violations), MarkerState::Violating);
    }

    #[test]
    fn empty_detections_report_zero() {
        let annotator = Annotator::default();
        let mut frame = RgbImage::new(50, 50);
        let count = annotator.annotate(&mut frame, &[], &ViolationSet::default());
        assert_eq!(count, 0);
        assert!(frame.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn boxes_outside_the_frame_are_clipped() {
        let annotator = Annotator::default();
        let mut frame = RgbImage::new(30, 30);
        let outside = Detection::from_bbox(0.5, BoundingBox::new(-50.0, -50.0, 500.0, 500.0));
        annotator.annotate(&mut frame, &[outside], &ViolationSet::default());
    }

    #[test]
    fn overlay_counts_people() {
        assert_eq!(overlay_text(3), "Social Distancing Violations: 3");
    }

    #[test]
    fn missing_configured_font_is_an_error() {
        let result =
            Annotator::default().with_font_search(Some(Path::new("/nonexistent/font.ttf")));
        assert!(result.is_err());
    }

    #[test]
    fn count_text_is_drawn_above_the_bottom_edge() -> Result<()> {
        let annotator = Annotator::default().with_font_search(None)?;
        if !annotator.has_font() {
            // no system font on this machine
            return Ok(());
        }
        let style = annotator.style().clone();
        let mut frame = RgbImage::new(400, 120);
        let violations: ViolationSet = [0, 1].into_iter().collect();

        let count = annotator.annotate(&mut frame, &[], &violations);
        assert_eq!(count, 2);

        let top = 120 - 25 - style.text_scale as u32;
        let Rgb([tr, tg, tb]) = style.text;
        let inked = (top..120 - 25)
            .flat_map(|y| (10..frame.width()).map(move |x| (x, y)))
            .filter(|&(x, y)| {
                let Rgb([r, g, b]) = *frame.get_pixel(x, y);
                r.abs_diff(tr) < 40 && g.abs_diff(tg) < 40 && b.abs_diff(tb) < 40
            })
            .count();
        assert!(inked > 20, "expected overlay text pixels, found {}", inked);

        let below = (120 - 25 + 8..120)
            .flat_map(|y| (0..frame.width()).map(move |x| (x, y)))
            .all(|(x, y)| frame.get_pixel(x, y).0 == [0, 0, 0]);
        assert!(below, "text spilled into the bottom margin");
        Ok(())
    }
}
