//! Camera acquisition and release.
//!
//! [`MediaSource`] owns at most one [`CameraSession`]. Devices are reached
//! through [`CameraBackend`]; [`NokhwaBackend`] is the platform one.

use image::RgbImage;

use crate::error::DeviceError;

/// Description of one open stream track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub label: String,
    pub width: u32,
    pub height: u32,
}

/// An open video stream on a device.
pub trait CameraStream {
    fn track(&self) -> TrackInfo;

    /// Latest frame from the stream.
    fn frame(&mut self) -> Result<RgbImage, DeviceError>;

    /// Stops the stream and releases the device. Must be idempotent.
    fn stop(&mut self);
}

/// Opens camera streams.
pub trait CameraBackend {
    fn open(&self) -> Result<Box<dyn CameraStream>, DeviceError>;
}

/// An active stream and the tracks it carries.
pub struct CameraSession {
    stream: Box<dyn CameraStream>,
    tracks: Vec<TrackInfo>,
    active: bool,
}

impl CameraSession {
    fn new(stream: Box<dyn CameraStream>) -> Self {
        let tracks = vec![stream.track()];
        Self {
            stream,
            tracks,
            active: true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn tracks(&self) -> &[TrackInfo] {
        &self.tracks
    }

    fn stop(&mut self) {
        if self.active {
            self.stream.stop();
            self.active = false;
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Owns the camera session for the application.
pub struct MediaSource {
    backend: Box<dyn CameraBackend>,
    session: Option<CameraSession>,
}

impl MediaSource {
    pub fn new(backend: Box<dyn CameraBackend>) -> Self {
        Self {
            backend,
            session: None,
        }
    }

    /// Opens a video-only stream. An already active session is returned as is.
    pub fn start(&mut self) -> Result<&CameraSession, DeviceError> {
        if self.session.is_none() {
            let stream = self.backend.open()?;
            let session = CameraSession::new(stream);
            if let Some(track) = session.tracks().first() {
                tracing::info!(
                    camera = %track.label,
                    width = track.width,
                    height = track.height,
                    "Camera started"
                );
            }
            self.session = Some(session);
        }

        self.session.as_ref().ok_or(DeviceError::NotActive)
    }

    /// Stops all tracks and releases the device. Safe with no session.
    pub fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop();
            tracing::info!("Camera stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.as_ref().is_some_and(CameraSession::is_active)
    }

    /// Grabs the current frame of the active session.
    pub fn capture(&mut self) -> Result<RgbImage, DeviceError> {
        match self.session.as_mut() {
            Some(session) if session.active => session.stream.frame(),
            _ => Err(DeviceError::NotActive),
        }
    }
}

/// Native capture through `nokhwa`.
pub struct NokhwaBackend {
    index: u32,
}

impl NokhwaBackend {
    pub fn new(index: u32) -> Self {
        Self { index }
    }
}

impl CameraBackend for NokhwaBackend {
    fn open(&self) -> Result<Box<dyn CameraStream>, DeviceError> {
        use nokhwa::pixel_format::RgbFormat;
        use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};

        let devices = nokhwa::query(ApiBackend::Auto).map_err(classify)?;
        if devices.is_empty() {
            return Err(DeviceError::NoDevice);
        }

        let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = nokhwa::Camera::new(CameraIndex::Index(self.index), format).map_err(classify)?;
        camera.open_stream().map_err(classify)?;

        Ok(Box::new(NokhwaStream {
            camera,
            stopped: false,
        }))
    }
}

struct NokhwaStream {
    camera: nokhwa::Camera,
    stopped: bool,
}

impl CameraStream for NokhwaStream {
    fn track(&self) -> TrackInfo {
        let resolution = self.camera.resolution();
        TrackInfo {
            label: self.camera.info().human_name(),
            width: resolution.width(),
            height: resolution.height(),
        }
    }

    fn frame(&mut self) -> Result<RgbImage, DeviceError> {
        use nokhwa::pixel_format::RgbFormat;

        let buffer = self.camera.frame().map_err(classify)?;
        let decoded = buffer.decode_image::<RgbFormat>().map_err(classify)?;
        let (width, height) = (decoded.width(), decoded.height());

        // Rebuild from raw bytes so nokhwa's image version doesn't leak out.
        RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| DeviceError::Stream("decoded frame has wrong size".to_string()))
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if let Err(e) = self.camera.stop_stream() {
            tracing::warn!(error = %e, "Failed to stop camera stream cleanly");
        }
    }
}

fn classify(e: nokhwa::NokhwaError) -> DeviceError {
    let message = e.to_string();
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        DeviceError::PermissionDenied(message)
    } else if lower.contains("no device") || lower.contains("not found") {
        DeviceError::NoDevice
    } else {
        DeviceError::Stream(message)
    }
}
