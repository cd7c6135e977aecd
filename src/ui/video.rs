use image::DynamicImage;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph},
};
use ratatui_image::picker::{Picker, ProtocolType};
use ratatui_image::protocol::StatefulProtocol;
use ratatui_image::{Resize, StatefulImage};

use crate::app::App;
use crate::config::ImageProtocol;
use crate::detector::DisplayGeometry;

/// Terminal image state for the live view.
pub struct VideoPreview {
    /// Image picker for protocol detection
    picker: Option<Picker>,
    protocol: Option<StatefulProtocol>,
    dirty: bool,
    /// Inner area of the last draw, in cells.
    area: Option<Rect>,
}

impl VideoPreview {
    /// No terminal graphics; the view shows text only.
    pub fn disabled() -> Self {
        Self {
            picker: None,
            protocol: None,
            dirty: false,
            area: None,
        }
    }

    /// Must run after the terminal is in raw mode and before input is read.
    pub fn new(protocol: ImageProtocol) -> Self {
        Self {
            picker: create_picker(protocol),
            ..Self::disabled()
        }
    }

    pub fn is_available(&self) -> bool {
        self.picker.is_some()
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn clear(&mut self) {
        self.protocol = None;
        self.dirty = false;
    }

    /// Pixel size the video occupies on screen: the preview area fitted to
    /// the frame's aspect ratio.
    pub fn display_geometry(&self, frame: Option<DisplayGeometry>) -> Option<DisplayGeometry> {
        let picker = self.picker.as_ref()?;
        let area = self.area?;
        let (cell_w, cell_h) = picker.font_size();
        let available = DisplayGeometry::new(
            u32::from(area.width) * u32::from(cell_w),
            u32::from(area.height) * u32::from(cell_h),
        );
        if available.is_empty() {
            return None;
        }
        Some(match frame {
            Some(frame) => fit_within(frame, available),
            None => available,
        })
    }
}

fn create_picker(protocol: ImageProtocol) -> Option<Picker> {
    let forced = match protocol {
        ImageProtocol::None => return None,
        ImageProtocol::Auto => None,
        ImageProtocol::Sixel => Some(ProtocolType::Sixel),
        ImageProtocol::Kitty => Some(ProtocolType::Kitty),
        ImageProtocol::ITerm2 => Some(ProtocolType::Iterm2),
        ImageProtocol::Halfblocks => Some(ProtocolType::Halfblocks),
    };

    let mut picker = match Picker::from_query_stdio() {
        Ok(picker) => picker,
        Err(e) => {
            tracing::warn!(error = ?e, "Terminal graphics query failed, using halfblocks");
            let mut picker = Picker::from_fontsize((8, 16));
            picker.set_protocol_type(ProtocolType::Halfblocks);
            picker
        }
    };
    if let Some(kind) = forced {
        picker.set_protocol_type(kind);
    }
    tracing::debug!(protocol = ?picker.protocol_type(), "Video preview ready");
    Some(picker)
}

/// Largest size with `frame`'s aspect ratio that fits inside `available`.
pub fn fit_within(frame: DisplayGeometry, available: DisplayGeometry) -> DisplayGeometry {
    if frame.is_empty() {
        return available;
    }
    let scale = (available.width as f64 / frame.width as f64).min(available.height as f64 / frame.height as f64);
    DisplayGeometry::new(
        ((frame.width as f64 * scale).floor() as u32).max(1),
        ((frame.height as f64 * scale).floor() as u32).max(1),
    )
}

pub fn render(frame: &mut Frame, app: &mut App, area: Rect) {
    let title = if app.session_active() { "Camera" } else { "Camera (off)" };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(title);
    let inner = block.inner(area);
    frame.render_widget(block, area);
    app.preview.area = Some(inner);

    if app.preview.dirty && app.preview.picker.is_some() {
        let composed = app.composed_frame();
        let preview = &mut app.preview;
        preview.dirty = false;
        if let (Some(image), Some(picker)) = (composed, preview.picker.as_mut()) {
            preview.protocol = Some(picker.new_resize_protocol(DynamicImage::ImageRgba8(image)));
        }
    }

    if let Some(protocol) = app.preview.protocol.as_mut() {
        let image = StatefulImage::new(None).resize(Resize::Fit(None));
        frame.render_stateful_widget(image, inner, protocol);
        return;
    }

    let message = if !app.session_active() {
        "Camera is off"
    } else if !app.preview.is_available() {
        "Live view needs a graphics-capable terminal"
    } else {
        "Waiting for video..."
    };
    let placeholder = Paragraph::new(message)
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    frame.render_widget(placeholder, centered_line(inner));
}

fn centered_line(area: Rect) -> Rect {
    Rect::new(area.x, area.y + area.height / 2, area.width, area.height.min(1))
}
