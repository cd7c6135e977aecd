//! Drawing boxes and labels over the video.
//!
//! An [`OverlaySurface`] is a transparent RGBA layer the size of the display.
//! [`OverlayRenderer`] redraws it from scratch on every applied tick, and
//! [`OverlaySurface::compose`] lays it over a video frame for display and
//! snapshots.

use ab_glyph::{FontVec, PxScale};
use image::{imageops, imageops::FilterType, DynamicImage, ImageFormat, Rgba, RgbaImage, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};

use crate::config::OverlayConfig;
use crate::detection::AnnotatedFace;
use crate::detector::{resize_results, BoundingBox, DetectionResult, DisplayGeometry};

/// Gap between a box's top edge and its label's baseline.
const LABEL_GAP: f32 = 5.0;

/// Tried in order when no font is configured.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Loads the label font: the configured one, else the first usable system font.
pub fn load_label_font(config: &OverlayConfig) -> Option<FontVec> {
    let candidates: Vec<PathBuf> = match &config.font_path {
        Some(path) => vec![path.clone()],
        None => SYSTEM_FONTS.iter().map(PathBuf::from).collect(),
    };

    for path in &candidates {
        let Ok(bytes) = std::fs::read(path) else {
            continue;
        };
        match FontVec::try_from_vec(bytes) {
            Ok(font) => {
                tracing::debug!(font = ?path, "Loaded label font");
                return Some(font);
            }
            Err(e) => tracing::warn!(font = ?path, error = %e, "Unusable font file"),
        }
    }

    tracing::warn!("No label font found; expression labels will not be drawn");
    None
}

/// The annotation layer, sized to the display.
pub struct OverlaySurface {
    geometry: DisplayGeometry,
    layer: RgbaImage,
}

impl OverlaySurface {
    pub fn new(geometry: DisplayGeometry) -> Self {
        Self {
            geometry,
            layer: RgbaImage::new(geometry.width, geometry.height),
        }
    }

    pub fn geometry(&self) -> DisplayGeometry {
        self.geometry
    }

    pub fn layer(&self) -> &RgbaImage {
        &self.layer
    }

    /// Re-allocates at a new size. The drawing is lost; the next tick redraws it.
    pub fn resize(&mut self, geometry: DisplayGeometry) {
        if geometry == self.geometry {
            return;
        }
        tracing::debug!(width = geometry.width, height = geometry.height, "Overlay resized");
        *self = Self::new(geometry);
    }

    pub fn clear(&mut self) {
        for pixel in self.layer.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    /// The frame scaled to the surface with the annotations on top.
    pub fn compose(&self, frame: &RgbImage) -> RgbaImage {
        let (w, h) = (self.geometry.width, self.geometry.height);
        let video = if frame.dimensions() == (w, h) {
            frame.clone()
        } else {
            imageops::resize(frame, w, h, FilterType::Triangle)
        };

        let mut composed = DynamicImage::ImageRgb8(video).to_rgba8();
        imageops::overlay(&mut composed, &self.layer, 0, 0);
        composed
    }

    /// Writes the composed picture as PNG.
    pub fn snapshot(&self, frame: &RgbImage, path: &Path) -> image::ImageResult<()> {
        self.compose(frame).save_with_format(path, ImageFormat::Png)
    }
}

pub struct OverlayRenderer {
    font: Option<FontVec>,
    min_font_px: f32,
    font_divisor: f32,
    line_width: u32,
}

impl OverlayRenderer {
    pub fn new(config: &OverlayConfig, font: Option<FontVec>) -> Self {
        Self {
            font,
            min_font_px: config.min_font_px,
            font_divisor: config.font_divisor,
            line_width: config.line_width.max(1),
        }
    }

    /// Label size for a display of the given width.
    pub fn font_px(&self, display_width: u32) -> f32 {
        (display_width as f32 / self.font_divisor).max(self.min_font_px)
    }

    /// Clears the surface and draws every face, scaled from `frame_size`
    /// to the surface geometry.
    pub fn render(&self, surface: &mut OverlaySurface, faces: &[AnnotatedFace], frame_size: DisplayGeometry) {
        surface.clear();
        if faces.is_empty() || surface.geometry.is_empty() {
            return;
        }

        let results: Vec<DetectionResult> = faces.iter().map(|f| f.result.clone()).collect();
        let scaled = resize_results(&results, frame_size, surface.geometry);
        let scale = PxScale::from(self.font_px(surface.geometry.width));

        for (face, result) in faces.iter().zip(&scaled) {
            let color = face.dominant.color();
            self.stroke_box(&mut surface.layer, &result.bounding_box, color);

            if let Some(font) = &self.font {
                let label = face.dominant.name();
                let (text_w, text_h) = text_size(scale, font, label);
                let bbox = &result.bounding_box;
                let x = bbox.x + bbox.width / 2.0 - text_w as f32 / 2.0;
                let y = bbox.y - LABEL_GAP - text_h as f32;
                draw_text_mut(&mut surface.layer, color, x as i32, y as i32, scale, font, label);
            }
        }
    }

    /// Strokes `bbox` with the line centered on its edges.
    fn stroke_box(&self, layer: &mut RgbaImage, bbox: &BoundingBox, color: Rgba<u8>) {
        let inner = (self.line_width / 2) as i32;
        let x = bbox.x.round() as i32;
        let y = bbox.y.round() as i32;
        let w = bbox.width.round().max(1.0) as i32;
        let h = bbox.height.round().max(1.0) as i32;

        for i in 0..self.line_width as i32 {
            let offset = i - inner;
            let rect_w = w + 2 * offset;
            let rect_h = h + 2 * offset;
            if rect_w <= 0 || rect_h <= 0 {
                continue;
            }
            let rect = Rect::at(x - offset, y - offset).of_size(rect_w as u32, rect_h as u32);
            draw_hollow_rect_mut(layer, rect, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{Expression, ExpressionScores};

    fn face(bbox: BoundingBox, expression: Expression) -> AnnotatedFace {
        AnnotatedFace::new(DetectionResult {
            bounding_box: bbox,
            expressions: ExpressionScores::from_pairs([(expression, 1.0)]),
            landmarks: Vec::new(),
        })
    }

    fn renderer() -> OverlayRenderer {
        OverlayRenderer::new(&OverlayConfig::default(), None)
    }

    fn is_clear(layer: &RgbaImage) -> bool {
        layer.pixels().all(|p| p[3] == 0)
    }

    #[test]
    fn test_font_px_has_minimum() {
        let r = renderer();
        assert_eq!(r.font_px(300), 12.0);
        assert_eq!(r.font_px(1000), 20.0);
    }

    #[test]
    fn test_box_is_drawn_in_category_color() {
        let mut surface = OverlaySurface::new(DisplayGeometry::new(100, 100));
        let faces = [face(BoundingBox::new(20.0, 30.0, 40.0, 20.0), Expression::Angry)];
        renderer().render(&mut surface, &faces, DisplayGeometry::new(100, 100));

        let layer = surface.layer();
        assert_eq!(*layer.get_pixel(20, 30), Expression::Angry.color());
        assert_eq!(*layer.get_pixel(59, 49), Expression::Angry.color());
        // Inside the box stays transparent
        assert_eq!(layer.get_pixel(40, 40)[3], 0);
    }

    #[test]
    fn test_boxes_scale_with_geometry() {
        let frame = DisplayGeometry::new(100, 100);
        let centered = [face(BoundingBox::new(40.0, 40.0, 20.0, 20.0), Expression::Happy)];

        for size in [50u32, 200, 400] {
            let mut surface = OverlaySurface::new(DisplayGeometry::new(size, size));
            renderer().render(&mut surface, &centered, frame);

            // Top-left corner lands at 40% of the surface
            let corner = (size as f32 * 0.4).round() as u32;
            assert_eq!(*surface.layer().get_pixel(corner, corner), Expression::Happy.color());
            assert_eq!(surface.layer().get_pixel(size / 2, size / 2)[3], 0);
        }
    }

    #[test]
    fn test_render_clears_previous_frame() {
        let mut surface = OverlaySurface::new(DisplayGeometry::new(64, 64));
        let r = renderer();
        r.render(
            &mut surface,
            &[face(BoundingBox::new(5.0, 5.0, 10.0, 10.0), Expression::Sad)],
            DisplayGeometry::new(64, 64),
        );
        assert!(!is_clear(surface.layer()));

        r.render(&mut surface, &[], DisplayGeometry::new(64, 64));
        assert!(is_clear(surface.layer()));
    }

    #[test]
    fn test_resize_reallocates() {
        let mut surface = OverlaySurface::new(DisplayGeometry::new(10, 10));
        surface.resize(DisplayGeometry::new(30, 20));
        assert_eq!(surface.layer().dimensions(), (30, 20));
        assert_eq!(surface.geometry(), DisplayGeometry::new(30, 20));
    }

    #[test]
    fn test_compose_and_snapshot() {
        let mut surface = OverlaySurface::new(DisplayGeometry::new(40, 40));
        renderer().render(
            &mut surface,
            &[face(BoundingBox::new(4.0, 4.0, 20.0, 20.0), Expression::Sad)],
            DisplayGeometry::new(40, 40),
        );
        let frame = RgbImage::from_pixel(40, 40, image::Rgb([10, 20, 30]));

        let composed = surface.compose(&frame);
        assert_eq!(composed.dimensions(), (40, 40));
        assert_eq!(*composed.get_pixel(4, 4), Expression::Sad.color());
        assert_eq!(*composed.get_pixel(14, 14), Rgba([10, 20, 30, 255]));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.png");
        surface.snapshot(&frame, &path).unwrap();
        let reread = image::open(&path).unwrap();
        assert_eq!(reread.width(), 40);
    }
}
