//! ONNX Runtime implementation of [`FaceDetector`].
//!
//! - UltraFace-320 for boxes
//! - a 68-point landmark regressor on a square face crop
//! - FER+ for expression logits
//! - ArcFace, opened with the set but not run per frame

use image::{imageops::FilterType, DynamicImage, GenericImageView, RgbImage};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;

use super::{BoundingBox, DetectionResult, FaceDetector, Point};
use crate::error::{DetectError, LoadError};
use crate::expression::{Expression, ExpressionScores};
use crate::models::{ModelArtifact, ModelSet};

const DETECT_WIDTH: u32 = 320;
const DETECT_HEIGHT: u32 = 240;
const CONFIDENCE_THRESHOLD: f32 = 0.7;
const NMS_THRESHOLD: f32 = 0.3;

/// The landmark model takes 128x128 RGB bytes, NHWC, under this input name.
const LANDMARK_INPUT: &str = "image_input";
const LANDMARK_SIZE: u32 = 128;
const LANDMARK_POINTS: usize = 68;

const EXPRESSION_SIZE: u32 = 64;

/// FER+ output order. `None` marks `contempt`, which has no category here.
const FERPLUS_LABELS: [Option<Expression>; 8] = [
    Some(Expression::Neutral),
    Some(Expression::Happy),
    Some(Expression::Surprised),
    Some(Expression::Sad),
    Some(Expression::Angry),
    Some(Expression::Disgusted),
    Some(Expression::Fearful),
    None,
];

pub struct OnnxFaceDetector {
    detector: Session,
    landmarks: Session,
    expressions: Session,
    // Opened so a broken recognition artifact fails the load; descriptors
    // are not computed per frame.
    _recognition: Session,
}

impl OnnxFaceDetector {
    /// Opens one session per artifact.
    pub fn from_models(models: &ModelSet) -> Result<Self, LoadError> {
        Ok(Self {
            detector: open_session(ModelArtifact::Detector, models.path(ModelArtifact::Detector))?,
            landmarks: open_session(ModelArtifact::Landmarks, models.path(ModelArtifact::Landmarks))?,
            _recognition: open_session(
                ModelArtifact::Recognition,
                models.path(ModelArtifact::Recognition),
            )?,
            expressions: open_session(
                ModelArtifact::Expressions,
                models.path(ModelArtifact::Expressions),
            )?,
        })
    }
}

fn open_session(artifact: ModelArtifact, path: &Path) -> Result<Session, LoadError> {
    let to_load_error = |e: ort::Error| LoadError::Session {
        artifact,
        message: e.to_string(),
    };

    Session::builder()
        .map_err(to_load_error)?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| to_load_error(e.into()))?
        .with_intra_threads(4)
        .map_err(|e| to_load_error(e.into()))?
        .commit_from_file(path)
        .map_err(to_load_error)
}

impl FaceDetector for OnnxFaceDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<DetectionResult>, DetectError> {
        let img = DynamicImage::ImageRgb8(frame.clone());
        let boxes = run_ultraface(&mut self.detector, &img)?;

        let mut results = Vec::with_capacity(boxes.len());
        for (bbox, _confidence) in boxes {
            let crop = crop_face(&img, &bbox);
            let square = square_crop(&img, &bbox);
            let landmarks = run_landmarks(&mut self.landmarks, &square.image, &square.region)?;
            let expressions = run_expressions(&mut self.expressions, &crop.image)?;
            results.push(DetectionResult {
                bounding_box: bbox,
                expressions,
                landmarks,
            });
        }

        Ok(results)
    }

    fn vocabulary(&self) -> Vec<String> {
        FERPLUS_LABELS
            .iter()
            .flatten()
            .map(|e| e.name().to_string())
            .collect()
    }
}

fn run_ultraface(session: &mut Session, img: &DynamicImage) -> Result<Vec<(BoundingBox, f32)>, DetectError> {
    let (orig_width, orig_height) = img.dimensions();

    let resized = img.resize_exact(DETECT_WIDTH, DETECT_HEIGHT, FilterType::Triangle);
    let rgb = resized.to_rgb8();

    // NCHW, normalized to roughly [-1, 1]
    let plane = (DETECT_WIDTH * DETECT_HEIGHT) as usize;
    let mut input_data = vec![0.0f32; 3 * plane];
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let idx = y as usize * DETECT_WIDTH as usize + x as usize;
        for c in 0..3 {
            input_data[c * plane + idx] = (pixel[c] as f32 - 127.0) / 128.0;
        }
    }

    let input_tensor = Tensor::from_array((
        [1usize, 3, DETECT_HEIGHT as usize, DETECT_WIDTH as usize],
        input_data.into_boxed_slice(),
    ))?;

    let outputs = session.run(ort::inputs!["input" => input_tensor])?;

    let scores_value = outputs
        .get("scores")
        .ok_or_else(|| DetectError::Output("no scores output".to_string()))?;
    let boxes_value = outputs
        .get("boxes")
        .ok_or_else(|| DetectError::Output("no boxes output".to_string()))?;

    let (scores_shape, scores_data) = scores_value.try_extract_tensor::<f32>()?;
    let (_boxes_shape, boxes_data) = boxes_value.try_extract_tensor::<f32>()?;

    // scores: [1, anchors, 2] (background, face); boxes: [1, anchors, 4] normalized corners
    let num_anchors = scores_shape
        .get(1)
        .copied()
        .ok_or_else(|| DetectError::Output("scores tensor has no anchor axis".to_string()))?
        as usize;
    if scores_data.len() < num_anchors * 2 || boxes_data.len() < num_anchors * 4 {
        return Err(DetectError::Output("truncated detector output".to_string()));
    }

    let (w, h) = (orig_width as f32, orig_height as f32);
    let mut candidates = Vec::new();
    for i in 0..num_anchors {
        let confidence = scores_data[i * 2 + 1];
        if confidence <= CONFIDENCE_THRESHOLD {
            continue;
        }

        let x1 = (boxes_data[i * 4] * w).max(0.0);
        let y1 = (boxes_data[i * 4 + 1] * h).max(0.0);
        let x2 = (boxes_data[i * 4 + 2] * w).min(w);
        let y2 = (boxes_data[i * 4 + 3] * h).min(h);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        candidates.push((BoundingBox::new(x1, y1, x2 - x1, y2 - y1), confidence));
    }

    Ok(nms(candidates, NMS_THRESHOLD))
}

/// Non-maximum suppression, highest confidence first.
fn nms(mut boxes: Vec<(BoundingBox, f32)>, threshold: f32) -> Vec<(BoundingBox, f32)> {
    boxes.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut keep: Vec<(BoundingBox, f32)> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|(kept, _)| kept.iou(&candidate.0) <= threshold) {
            keep.push(candidate);
        }
    }
    keep
}

struct FaceCrop {
    image: DynamicImage,
    /// Crop rectangle in frame coordinates.
    region: BoundingBox,
}

/// Crops the face with 20% padding, clamped to the frame.
fn crop_face(img: &DynamicImage, bbox: &BoundingBox) -> FaceCrop {
    let (img_width, img_height) = img.dimensions();
    let pad_x = bbox.width * 0.2;
    let pad_y = bbox.height * 0.2;

    let x = (bbox.x - pad_x).max(0.0) as u32;
    let y = (bbox.y - pad_y).max(0.0) as u32;
    let x = x.min(img_width.saturating_sub(1));
    let y = y.min(img_height.saturating_sub(1));
    let w = ((bbox.width + pad_x * 2.0) as u32).min(img_width - x).max(1);
    let h = ((bbox.height + pad_y * 2.0) as u32).min(img_height - y).max(1);

    FaceCrop {
        image: img.crop_imm(x, y, w, h),
        region: BoundingBox::new(x as f32, y as f32, w as f32, h as f32),
    }
}

/// Square crop around the box, shifted down a little so the chin is kept,
/// clamped to the frame.
fn square_crop(img: &DynamicImage, bbox: &BoundingBox) -> FaceCrop {
    let (img_width, img_height) = img.dimensions();
    let side = bbox.width.max(bbox.height) * 1.1;
    let (cx, cy) = bbox.center();
    let cy = cy + bbox.height * 0.1;

    let x = (cx - side / 2.0).max(0.0) as u32;
    let y = (cy - side / 2.0).max(0.0) as u32;
    let x = x.min(img_width.saturating_sub(1));
    let y = y.min(img_height.saturating_sub(1));
    let w = (side as u32).min(img_width - x).max(1);
    let h = (side as u32).min(img_height - y).max(1);

    FaceCrop {
        image: img.crop_imm(x, y, w, h),
        region: BoundingBox::new(x as f32, y as f32, w as f32, h as f32),
    }
}

fn run_landmarks(
    session: &mut Session,
    face: &DynamicImage,
    region: &BoundingBox,
) -> Result<Vec<Point>, DetectError> {
    let resized = face.resize_exact(LANDMARK_SIZE, LANDMARK_SIZE, FilterType::Triangle);
    let rgb = resized.to_rgb8();

    let input_tensor = Tensor::from_array((
        [1usize, LANDMARK_SIZE as usize, LANDMARK_SIZE as usize, 3],
        rgb.into_raw().into_boxed_slice(),
    ))?;
    let outputs = session.run(ort::inputs![LANDMARK_INPUT => input_tensor])?;

    let output = outputs
        .iter()
        .next()
        .ok_or_else(|| DetectError::Output("no landmark output".to_string()))?;
    let (_shape, data) = output.1.try_extract_tensor::<f32>()?;

    if data.len() < LANDMARK_POINTS * 2 {
        return Err(DetectError::Output(format!(
            "expected {} landmark coordinates, got {}",
            LANDMARK_POINTS * 2,
            data.len()
        )));
    }

    // Coordinates are normalized to the crop
    Ok(data[..LANDMARK_POINTS * 2]
        .chunks_exact(2)
        .map(|xy| Point {
            x: region.x + xy[0] * region.width,
            y: region.y + xy[1] * region.height,
        })
        .collect())
}

fn run_expressions(session: &mut Session, face: &DynamicImage) -> Result<ExpressionScores, DetectError> {
    let resized = face.resize_exact(EXPRESSION_SIZE, EXPRESSION_SIZE, FilterType::Triangle);
    let gray = resized.to_luma8();

    // FER+ takes raw 0-255 grayscale
    let input_data: Vec<f32> = gray.pixels().map(|p| p[0] as f32).collect();
    let input_tensor = Tensor::from_array((
        [1usize, 1, EXPRESSION_SIZE as usize, EXPRESSION_SIZE as usize],
        input_data.into_boxed_slice(),
    ))?;
    let outputs = session.run(ort::inputs!["Input3" => input_tensor])?;

    let output = outputs
        .iter()
        .next()
        .ok_or_else(|| DetectError::Output("no expression output".to_string()))?;
    let (_shape, logits) = output.1.try_extract_tensor::<f32>()?;

    if logits.len() < FERPLUS_LABELS.len() {
        return Err(DetectError::Output(format!(
            "expected {} expression logits, got {}",
            FERPLUS_LABELS.len(),
            logits.len()
        )));
    }

    Ok(scores_from_logits(&logits[..FERPLUS_LABELS.len()]))
}

/// Softmax over the categories we keep, so they sum to 1 without contempt.
fn scores_from_logits(logits: &[f32]) -> ExpressionScores {
    let kept: Vec<(Expression, f32)> = FERPLUS_LABELS
        .iter()
        .zip(logits)
        .filter_map(|(label, logit)| label.map(|e| (e, *logit)))
        .collect();

    let max = kept.iter().map(|(_, l)| *l).fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<(Expression, f32)> = kept.iter().map(|(e, l)| (*e, (l - max).exp())).collect();
    let sum: f32 = exps.iter().map(|(_, v)| v).sum();

    if sum > 0.0 && sum.is_finite() {
        ExpressionScores::from_pairs(exps.into_iter().map(|(e, v)| (e, v / sum)))
    } else {
        ExpressionScores::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_drops_contempt() {
        // neutral, happiness, surprise, sadness, anger, disgust, fear, contempt
        let scores = scores_from_logits(&[0.0, 5.0, 0.0, 0.0, 0.0, 0.0, 0.0, 50.0]);
        assert_eq!(scores.dominant(), Expression::Happy);

        let total: f32 = scores.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_softmax_uniform() {
        let scores = scores_from_logits(&[1.0; 8]);
        for (_, p) in scores.iter() {
            assert!((p - 1.0 / 7.0).abs() < 1e-4);
        }
        // Uniform scores fall back to the fixed order
        assert_eq!(scores.dominant(), Expression::Happy);
    }

    #[test]
    fn test_nms_keeps_best_of_overlap() {
        let boxes = vec![
            (BoundingBox::new(0.0, 0.0, 10.0, 10.0), 0.8),
            (BoundingBox::new(1.0, 1.0, 10.0, 10.0), 0.95),
            (BoundingBox::new(50.0, 50.0, 10.0, 10.0), 0.75),
        ];
        let kept = nms(boxes, NMS_THRESHOLD);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].1, 0.95);
        assert_eq!(kept[1].1, 0.75);
    }

    #[test]
    fn test_crop_is_clamped_to_frame() {
        let img = DynamicImage::new_rgb8(100, 80);
        let crop = crop_face(&img, &BoundingBox::new(90.0, 70.0, 30.0, 30.0));
        assert!(crop.region.x + crop.region.width <= 100.0);
        assert!(crop.region.y + crop.region.height <= 80.0);
        assert_eq!(crop.image.dimensions(), (crop.region.width as u32, crop.region.height as u32));
    }

    #[test]
    fn test_vocabulary_is_known() {
        let labels: Vec<String> = FERPLUS_LABELS.iter().flatten().map(|e| e.name().to_string()).collect();
        assert_eq!(labels.len(), 7);
        assert!(crate::expression::validate_vocabulary(&labels).is_ok());
    }
}
