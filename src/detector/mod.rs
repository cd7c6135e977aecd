//! Face detection capability.
//!
//! Everything past this trait (tensor work, model execution) belongs to the
//! model runtime; the rest of the crate only sees [`FaceDetector`].

pub mod onnx;

use image::RgbImage;

use crate::error::DetectError;
use crate::expression::ExpressionScores;

pub use onnx::OnnxFaceDetector;

/// Axis-aligned box in pixel coordinates of some image.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Scales from one image size to another.
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
        }
    }

    /// Intersection over union.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.width * self.height + other.width * other.height - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// One detected face in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub bounding_box: BoundingBox,
    pub expressions: ExpressionScores,
    /// 68-point landmark set, passed through untouched.
    pub landmarks: Vec<Point>,
}

/// Width and height of an image or drawing surface in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayGeometry {
    pub width: u32,
    pub height: u32,
}

impl DisplayGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn of(image: &RgbImage) -> Self {
        Self::new(image.width(), image.height())
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// The external face analysis capability.
pub trait FaceDetector: Send {
    /// Finds every face in `frame`, with boxes in `frame` pixel coordinates.
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<DetectionResult>, DetectError>;

    /// Category labels this detector can put in an expression mapping.
    fn vocabulary(&self) -> Vec<String>;
}

/// Remaps results from the `from` resolution the detector worked at to the
/// `to` resolution they will be drawn at.
pub fn resize_results(
    results: &[DetectionResult],
    from: DisplayGeometry,
    to: DisplayGeometry,
) -> Vec<DetectionResult> {
    if from.is_empty() {
        return results.to_vec();
    }

    let sx = to.width as f32 / from.width as f32;
    let sy = to.height as f32 / from.height as f32;

    results
        .iter()
        .map(|r| DetectionResult {
            bounding_box: r.bounding_box.scaled(sx, sy),
            expressions: r.expressions,
            landmarks: r
                .landmarks
                .iter()
                .map(|p| Point {
                    x: p.x * sx,
                    y: p.y * sy,
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_at(bbox: BoundingBox) -> DetectionResult {
        DetectionResult {
            bounding_box: bbox,
            expressions: ExpressionScores::new(),
            landmarks: vec![Point { x: 10.0, y: 20.0 }],
        }
    }

    #[test]
    fn test_resize_keeps_center_relative() {
        let frame = DisplayGeometry::new(640, 480);
        let r = result_at(BoundingBox::new(270.0, 190.0, 100.0, 100.0));

        for display in [
            DisplayGeometry::new(320, 240),
            DisplayGeometry::new(1280, 960),
            DisplayGeometry::new(800, 300),
        ] {
            let resized = resize_results(std::slice::from_ref(&r), frame, display);
            let (cx, cy) = resized[0].bounding_box.center();
            assert!((cx - display.width as f32 / 2.0).abs() < 0.01);
            assert!((cy - display.height as f32 / 2.0).abs() < 0.01);
        }
    }

    #[test]
    fn test_resize_scales_landmarks() {
        let r = result_at(BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        let resized = resize_results(
            &[r],
            DisplayGeometry::new(100, 100),
            DisplayGeometry::new(200, 50),
        );
        assert_eq!(resized[0].landmarks[0], Point { x: 20.0, y: 10.0 });
        assert_eq!(resized[0].bounding_box, BoundingBox::new(0.0, 0.0, 20.0, 5.0));
    }

    #[test]
    fn test_resize_from_empty_geometry_is_identity() {
        let r = result_at(BoundingBox::new(1.0, 2.0, 3.0, 4.0));
        let resized = resize_results(
            std::slice::from_ref(&r),
            DisplayGeometry::new(0, 0),
            DisplayGeometry::new(10, 10),
        );
        assert_eq!(resized[0], r);
    }

    #[test]
    fn test_iou() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 0.001);

        let c = BoundingBox::new(20.0, 20.0, 10.0, 10.0);
        assert!((a.iou(&c) - 0.0).abs() < 0.001);
    }
}
