use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use image::{RgbImage, RgbaImage};
use ratatui::prelude::*;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::camera::{CameraBackend, MediaSource};
use crate::config::Config;
use crate::detection::{AnnotatedFace, DetectionLoop, DetectionWorker, TickOutcome, TickReply, TickRequest};
use crate::detector::{DisplayGeometry, FaceDetector};
use crate::error::LoadError;
use crate::models::{ArtifactSource, LoadProgress, ModelLoader, ModelSet};
use crate::overlay::{OverlayRenderer, OverlaySurface};
use crate::summary::SummaryView;
use crate::ui;
use crate::ui::video::VideoPreview;

/// Upper bound on how long the UI loop waits for input.
const MAX_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    Loading,
    Ready,
    Failed,
}

/// Messages from the model loader thread.
pub enum LoaderUpdate {
    Progress(LoadProgress),
    Ready(Box<dyn FaceDetector>),
    Failed(String),
}

/// Last applied faces, kept so a resize can redraw without waiting a tick.
struct LastFaces {
    faces: Vec<AnnotatedFace>,
    frame_size: DisplayGeometry,
}

pub struct App {
    pub config: Config,
    pub should_quit: bool,
    /// Transient message shown in the status bar.
    pub status_message: Option<String>,
    /// Text of the loader popup.
    pub loading_status: String,
    pub loader_visible: bool,
    /// Position in the model set while loading, e.g. `2/4`.
    pub load_step: Option<String>,
    pub model_status: ModelStatus,
    pub summary: SummaryView,
    pub preview: VideoPreview,
    media: MediaSource,
    detection: DetectionLoop,
    worker: Option<DetectionWorker>,
    loader_rx: Option<mpsc::Receiver<LoaderUpdate>>,
    renderer: OverlayRenderer,
    surface: Option<OverlaySurface>,
    geometry: Option<DisplayGeometry>,
    last_frame: Option<Arc<RgbImage>>,
    last_faces: Option<LastFaces>,
    next_frame: Option<Instant>,
}

impl App {
    pub fn new(config: Config, camera: Box<dyn CameraBackend>, renderer: OverlayRenderer) -> Self {
        let detection = DetectionLoop::new(config.detection.interval());
        Self {
            config,
            should_quit: false,
            status_message: None,
            loading_status: "Loading models...".to_string(),
            loader_visible: true,
            load_step: None,
            model_status: ModelStatus::Loading,
            summary: SummaryView::empty(),
            preview: VideoPreview::disabled(),
            media: MediaSource::new(camera),
            detection,
            worker: None,
            loader_rx: None,
            renderer,
            surface: None,
            geometry: None,
            last_frame: None,
            last_faces: None,
            next_frame: None,
        }
    }

    /// Starts loading the model set on a background thread. `build` turns
    /// the fetched artifacts into a detector.
    pub fn load_models<S, F>(&mut self, source: S, build: F)
    where
        S: ArtifactSource + 'static,
        F: FnOnce(&ModelSet) -> Result<Box<dyn FaceDetector>, LoadError> + Send + 'static,
    {
        if self.model_status == ModelStatus::Ready || self.loader_rx.is_some() {
            return;
        }

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let progress_tx = tx.clone();
            let result = ModelLoader::new(source)
                .load(|progress| {
                    let _ = progress_tx.send(LoaderUpdate::Progress(progress));
                })
                .and_then(|models| build(&models));

            let update = match result {
                Ok(detector) => LoaderUpdate::Ready(detector),
                Err(e) => LoaderUpdate::Failed(e.to_string()),
            };
            let _ = tx.send(update);
        });

        self.model_status = ModelStatus::Loading;
        self.loader_rx = Some(rx);
    }

    pub fn toggle_enabled(&self) -> bool {
        self.model_status == ModelStatus::Ready
    }

    pub fn snapshot_enabled(&self) -> bool {
        self.media.is_active()
    }

    pub fn session_active(&self) -> bool {
        self.media.is_active()
    }

    pub fn toggle_label(&self) -> &'static str {
        if self.media.is_active() {
            "Stop Camera"
        } else {
            "Start Camera"
        }
    }

    pub fn has_overlay(&self) -> bool {
        self.surface.is_some()
    }

    pub fn detection_running(&self) -> bool {
        self.detection.is_running()
    }

    pub fn geometry(&self) -> Option<DisplayGeometry> {
        self.surface.as_ref().map(OverlaySurface::geometry).or(self.geometry)
    }

    /// Aspect ratio source for layout: the live frame when there is one.
    pub fn frame_size(&self) -> Option<DisplayGeometry> {
        self.last_frame.as_deref().map(DisplayGeometry::of)
    }

    /// The latest frame with the current annotations on top.
    pub fn composed_frame(&self) -> Option<RgbaImage> {
        match (&self.surface, &self.last_frame) {
            (Some(surface), Some(frame)) => Some(surface.compose(frame)),
            _ => None,
        }
    }

    pub fn toggle(&mut self) {
        if !self.toggle_enabled() {
            return;
        }
        if self.media.is_active() {
            self.stop_session();
            self.status_message = Some("Camera stopped".to_string());
        } else {
            self.start_session();
        }
    }

    fn start_session(&mut self) {
        match self.media.start() {
            Ok(_) => {
                self.loader_visible = false;
                self.status_message = None;
                self.next_frame = Some(Instant::now());
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot access webcam");
                self.loading_status = "Cannot access webcam.".to_string();
                self.loader_visible = true;
            }
        }
    }

    /// Tears the session down and resets every widget to its zero state.
    fn stop_session(&mut self) {
        self.detection.stop();
        self.media.stop();
        self.surface = None;
        self.last_frame = None;
        self.last_faces = None;
        self.next_frame = None;
        self.summary = SummaryView::empty();
        self.preview.clear();
    }

    pub fn snapshot(&mut self) {
        let (Some(surface), Some(frame)) = (&self.surface, &self.last_frame) else {
            return;
        };

        let path = self.config.snapshot.path();
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::error!(dir = ?parent, error = %e, "Cannot create snapshot directory");
                self.status_message = Some(format!("Snapshot failed: {}", e));
                return;
            }
        }

        match surface.snapshot(frame, &path) {
            Ok(()) => {
                let at = chrono::Local::now().format("%H:%M:%S");
                tracing::info!(path = ?path, "Snapshot saved");
                self.status_message = Some(format!("Snapshot saved to {} at {}", path.display(), at));
            }
            Err(e) => {
                tracing::error!(path = ?path, error = %e, "Snapshot failed");
                self.status_message = Some(format!("Snapshot failed: {}", e));
            }
        }
    }

    /// Display geometry changed (layout resize). Independent of the tick rate.
    pub fn on_resize(&mut self, geometry: DisplayGeometry) {
        if geometry.is_empty() || self.geometry == Some(geometry) {
            return;
        }
        self.geometry = Some(geometry);

        if let Some(surface) = self.surface.as_mut() {
            surface.resize(geometry);
            if let Some(last) = &self.last_faces {
                self.renderer.render(surface, &last.faces, last.frame_size);
            }
            self.preview.mark_dirty();
        }
    }

    /// One pass of the non-input work: loader progress, frame capture,
    /// tick dispatch and reply application.
    pub fn update(&mut self, now: Instant) {
        self.poll_loader();

        if self.media.is_active() && self.next_frame.is_some_and(|due| now >= due) {
            self.next_frame = Some(now + self.config.detection.interval());
            match self.media.capture() {
                Ok(frame) => self.on_frame(frame, now),
                Err(e) => {
                    tracing::warn!(error = %e, "Camera session lost");
                    self.stop_session();
                    self.status_message = Some("Camera disconnected.".to_string());
                    return;
                }
            }
        }

        self.dispatch_tick(now);
        self.poll_worker();
    }

    /// How long the input poll may block before `update` has work to do.
    pub fn next_wakeup(&self, now: Instant) -> Duration {
        let frame_wait = self
            .next_frame
            .map(|due| due.saturating_duration_since(now))
            .unwrap_or(MAX_POLL);
        let tick_wait = self.detection.time_until_next_tick(now).unwrap_or(MAX_POLL);
        frame_wait.min(tick_wait).min(MAX_POLL)
    }

    fn on_frame(&mut self, frame: RgbImage, now: Instant) {
        let frame = Arc::new(frame);

        if self.surface.is_none() {
            // First frame: the video is playing, so the overlay and the loop start.
            let geometry = self
                .geometry
                .filter(|g| !g.is_empty())
                .unwrap_or_else(|| DisplayGeometry::of(&frame));
            self.surface = Some(OverlaySurface::new(geometry));
            if let Err(e) = self
                .detection
                .start(self.worker.is_some(), self.media.is_active(), now)
            {
                tracing::warn!(error = %e, "Detection not started");
            }
        }

        self.last_frame = Some(frame);
        self.preview.mark_dirty();
    }

    fn dispatch_tick(&mut self, now: Instant) {
        let Some(frame) = self.last_frame.clone() else {
            return;
        };
        let Some(ticket) = self.detection.poll_tick(now) else {
            return;
        };

        let submitted = match &self.worker {
            Some(worker) => worker.submit(TickRequest { ticket, frame }).is_ok(),
            None => false,
        };
        if !submitted {
            self.detection.abandon(ticket);
            self.on_worker_gone();
        }
    }

    fn poll_worker(&mut self) {
        let Some(worker) = &self.worker else {
            return;
        };

        match worker.poll() {
            Ok(replies) => {
                for reply in replies {
                    self.apply_reply(reply);
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Detection worker disappeared");
                self.on_worker_gone();
            }
        }
    }

    fn on_worker_gone(&mut self) {
        self.worker = None;
        self.model_status = ModelStatus::Failed;
        if self.media.is_active() {
            self.stop_session();
        }
        self.loading_status = "Face detection stopped.".to_string();
        self.loader_visible = true;
        self.status_message = Some("Face detection stopped unexpectedly.".to_string());
    }

    fn apply_reply(&mut self, reply: TickReply) {
        let Some(outcome) = self.detection.accept(reply.ticket, reply.result) else {
            return;
        };
        let Some(surface) = self.surface.as_mut() else {
            return;
        };

        match outcome {
            TickOutcome::NoFaces => {
                surface.clear();
                self.summary = SummaryView::empty();
                self.last_faces = None;
            }
            TickOutcome::Faces { faces, tally } => {
                self.renderer.render(surface, &faces, reply.frame_size);
                self.summary = SummaryView::from_tally(tally);
                self.last_faces = Some(LastFaces {
                    faces,
                    frame_size: reply.frame_size,
                });
            }
        }
        self.preview.mark_dirty();
    }

    fn poll_loader(&mut self) {
        let Some(rx) = &self.loader_rx else {
            return;
        };

        let mut updates = Vec::new();
        let mut disconnected = false;
        loop {
            match rx.try_recv() {
                Ok(update) => updates.push(update),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }

        for update in updates {
            match update {
                LoaderUpdate::Progress(progress) => {
                    tracing::info!(artifact = %progress.artifact, step = progress.index, "{}", progress.message());
                    self.loading_status = progress.message().to_string();
                    self.load_step = Some(progress.step());
                }
                LoaderUpdate::Ready(detector) => {
                    self.loader_rx = None;
                    self.install_detector(detector);
                    return;
                }
                LoaderUpdate::Failed(error) => {
                    tracing::error!(error = %error, "Model loading failed");
                    self.loader_rx = None;
                    self.model_status = ModelStatus::Failed;
                    self.loading_status = "Error loading models.".to_string();
                    return;
                }
            }
        }

        if disconnected {
            self.loader_rx = None;
            self.model_status = ModelStatus::Failed;
            self.loading_status = "Error loading models.".to_string();
        }
    }

    fn install_detector(&mut self, detector: Box<dyn FaceDetector>) {
        match DetectionWorker::spawn(detector) {
            Ok(worker) => {
                self.worker = Some(worker);
                self.model_status = ModelStatus::Ready;
                self.loading_status = "Models Loaded!".to_string();
                self.load_step = None;
                self.loader_visible = false;
                tracing::info!("Models loaded, camera can be started");
            }
            Err(e) => {
                tracing::error!(error = %e, "Detector rejected");
                self.model_status = ModelStatus::Failed;
                self.loading_status = "Error loading models.".to_string();
            }
        }
    }

    pub async fn run(&mut self, terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>) -> Result<()> {
        while !self.should_quit {
            let now = Instant::now();
            self.update(now);

            terminal.draw(|frame| ui::render(frame, self))?;
            if let Some(geometry) = self.preview.display_geometry(self.frame_size()) {
                self.on_resize(geometry);
            }

            if event::poll(self.next_wakeup(Instant::now()))? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key),
                    // Layout is recomputed on the next draw
                    Event::Resize(_, _) => {}
                    _ => {}
                }
            }
        }

        self.stop_session();
        Ok(())
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => self.quit(),
            KeyCode::Char('q') | KeyCode::Esc => self.quit(),
            KeyCode::Char(' ') | KeyCode::Enter => self.toggle(),
            KeyCode::Char('s') => self.snapshot(),
            _ => {}
        }
    }

    fn quit(&mut self) {
        self.stop_session();
        self.should_quit = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::testing::FakeBackend;
    use crate::config::OverlayConfig;
    use crate::detection::worker::testing::ScriptedDetector;
    use crate::error::DeviceError;
    use crate::expression::Expression;
    use crate::models::ModelArtifact;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct OkSource;

    impl ArtifactSource for OkSource {
        fn fetch(&self, artifact: ModelArtifact) -> Result<PathBuf, LoadError> {
            Ok(PathBuf::from(artifact.file_name()))
        }
    }

    struct FailingSource;

    impl ArtifactSource for FailingSource {
        fn fetch(&self, artifact: ModelArtifact) -> Result<PathBuf, LoadError> {
            Err(LoadError::Fetch {
                artifact,
                url: "test://".to_string(),
                message: "offline".to_string(),
            })
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.detection.interval_ms = 5;
        config
    }

    fn app_with(backend: FakeBackend) -> App {
        App::new(
            config(),
            Box::new(backend),
            OverlayRenderer::new(&OverlayConfig::default(), None),
        )
    }

    /// Pumps `update` until `done` holds or a few seconds pass.
    fn pump_until(app: &mut App, done: impl Fn(&App) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            app.update(Instant::now());
            if done(app) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn pump_for(app: &mut App, duration: Duration) {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            app.update(Instant::now());
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn ready_app(faces: Vec<Expression>) -> (App, Arc<Mutex<Vec<Expression>>>) {
        let (backend, _) = FakeBackend::new(64, 48);
        let mut app = app_with(backend);
        let (detector, handle) = ScriptedDetector::new(faces);
        app.load_models(OkSource, move |_| Ok(Box::new(detector) as Box<dyn FaceDetector>));
        assert!(pump_until(&mut app, |a| a.model_status == ModelStatus::Ready));
        (app, handle)
    }

    #[test]
    fn test_models_ready_enables_toggle() {
        let (backend, _) = FakeBackend::new(8, 8);
        let mut app = app_with(backend);
        assert!(!app.toggle_enabled());
        assert!(app.loader_visible);

        // Toggle before ready does nothing
        app.toggle();
        assert!(!app.session_active());

        let (detector, _) = ScriptedDetector::new(vec![]);
        app.load_models(OkSource, move |_| Ok(Box::new(detector) as Box<dyn FaceDetector>));
        assert!(pump_until(&mut app, |a| a.model_status == ModelStatus::Ready));
        assert_eq!(app.loading_status, "Models Loaded!");
        assert_eq!(app.load_step, None);
        assert!(!app.loader_visible);
        assert!(app.toggle_enabled());
        assert_eq!(app.toggle_label(), "Start Camera");
        assert!(!app.snapshot_enabled());
    }

    #[test]
    fn test_model_failure_keeps_toggle_disabled() {
        let (backend, _) = FakeBackend::new(8, 8);
        let mut app = app_with(backend);
        app.load_models(FailingSource, |_| unreachable!("build after failed load"));

        assert!(pump_until(&mut app, |a| a.model_status == ModelStatus::Failed));
        assert_eq!(app.loading_status, "Error loading models.");
        assert_eq!(app.load_step.as_deref(), Some("1/4"));
        assert!(app.loader_visible);
        assert!(!app.toggle_enabled());
    }

    #[test]
    fn test_worker_crash_shows_loader() {
        let (backend, _) = FakeBackend::new(64, 48);
        let mut app = app_with(backend);
        let (mut detector, _) = ScriptedDetector::new(vec![Expression::Happy]);
        detector.panics = true;
        app.load_models(OkSource, move |_| Ok(Box::new(detector) as Box<dyn FaceDetector>));
        assert!(pump_until(&mut app, |a| a.model_status == ModelStatus::Ready));
        assert!(!app.loader_visible);

        app.toggle();
        assert!(app.session_active());
        assert!(pump_until(&mut app, |a| a.loader_visible));

        assert_eq!(app.model_status, ModelStatus::Failed);
        assert_eq!(app.loading_status, "Face detection stopped.");
        assert!(!app.toggle_enabled());
        assert!(!app.session_active());
        assert!(!app.has_overlay());
        assert_eq!(app.summary.face_count, 0);

        // Toggle stays inert once detection is gone
        app.toggle();
        assert!(!app.session_active());
    }

    #[test]
    fn test_faces_update_summary_and_overlay() {
        let (mut app, _) = ready_app(vec![Expression::Happy, Expression::Sad, Expression::Happy]);

        app.toggle();
        assert_eq!(app.toggle_label(), "Stop Camera");
        assert!(app.snapshot_enabled());
        assert!(!app.has_overlay());

        assert!(pump_until(&mut app, |a| a.summary.face_count == 3));
        assert!(app.has_overlay());
        assert!(app.detection_running());
        assert_eq!(app.summary.count_label(), "Faces detected: 3");
        assert_eq!(app.summary.lines(), vec!["happy: 2", "sad: 1"]);
        assert!(app.summary.panel_visible());
    }

    #[test]
    fn test_zero_faces_hides_summary() {
        let (mut app, faces) = ready_app(vec![Expression::Neutral]);
        app.toggle();
        assert!(pump_until(&mut app, |a| a.summary.face_count == 1));

        faces.lock().unwrap().clear();
        assert!(pump_until(&mut app, |a| a.summary.face_count == 0));
        assert_eq!(app.summary.count_label(), "Faces detected: 0");
        assert!(!app.summary.panel_visible());
        assert!(app.has_overlay());
    }

    #[test]
    fn test_stop_discards_in_flight_detection() {
        let (gate_tx, gate_rx) = mpsc::channel();
        let (backend, _) = FakeBackend::new(32, 32);
        let mut app = app_with(backend);
        let (mut detector, _) = ScriptedDetector::new(vec![Expression::Angry]);
        detector.gate = Some(gate_rx);
        app.load_models(OkSource, move |_| Ok(Box::new(detector) as Box<dyn FaceDetector>));
        assert!(pump_until(&mut app, |a| a.model_status == ModelStatus::Ready));

        app.toggle();
        assert!(pump_until(&mut app, |a| a.detection.in_flight().is_some()));

        app.toggle();
        assert!(!app.session_active());
        assert!(!app.detection_running());

        // Let the outstanding call finish after the stop
        gate_tx.send(()).unwrap();
        pump_for(&mut app, Duration::from_millis(200));
        assert!(!app.has_overlay());
        assert_eq!(app.summary, SummaryView::empty());
        assert_eq!(app.toggle_label(), "Start Camera");
        drop(gate_tx);
    }

    #[test]
    fn test_restart_matches_fresh_start() {
        let (mut app, _) = ready_app(vec![Expression::Surprised]);

        app.toggle();
        assert!(pump_until(&mut app, |a| a.summary.face_count == 1));

        app.toggle();
        assert_eq!(app.summary.count_label(), "Faces detected: 0");
        assert!(!app.summary.panel_visible());
        assert!(!app.has_overlay());
        assert!(!app.snapshot_enabled());
        assert_eq!(app.toggle_label(), "Start Camera");

        app.toggle();
        assert_eq!(app.toggle_label(), "Stop Camera");
        assert_eq!(app.summary.face_count, 0);
        assert!(!app.has_overlay());

        assert!(pump_until(&mut app, |a| a.summary.face_count == 1));
        assert_eq!(app.summary.lines(), vec!["surprised: 1"]);
    }

    #[test]
    fn test_device_error_shows_loader() {
        let (detector, _) = ScriptedDetector::new(vec![]);
        let mut app = app_with(FakeBackend::failing(DeviceError::NoDevice));
        app.load_models(OkSource, move |_| Ok(Box::new(detector) as Box<dyn FaceDetector>));
        assert!(pump_until(&mut app, |a| a.model_status == ModelStatus::Ready));

        app.toggle();
        assert!(!app.session_active());
        assert!(app.loader_visible);
        assert_eq!(app.loading_status, "Cannot access webcam.");
        assert_eq!(app.toggle_label(), "Start Camera");
    }

    #[test]
    fn test_session_loss_stops_everything() {
        let (mut backend, _) = FakeBackend::new(16, 16);
        backend.fail_after = Some(3);
        let mut app = app_with(backend);
        let (detector, _) = ScriptedDetector::new(vec![Expression::Fearful]);
        app.load_models(OkSource, move |_| Ok(Box::new(detector) as Box<dyn FaceDetector>));
        assert!(pump_until(&mut app, |a| a.model_status == ModelStatus::Ready));

        app.toggle();
        assert!(pump_until(&mut app, |a| !a.session_active()));
        assert_eq!(app.status_message.as_deref(), Some("Camera disconnected."));
        assert!(!app.detection_running());
        assert!(!app.has_overlay());
        assert_eq!(app.summary.face_count, 0);
    }

    #[test]
    fn test_snapshot_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _) = ready_app(vec![Expression::Happy]);
        app.config.snapshot.dir = dir.path().to_path_buf();

        // No surface yet: nothing happens
        app.snapshot();
        assert!(!dir.path().join("snapshot.png").exists());

        app.toggle();
        assert!(pump_until(&mut app, |a| a.summary.face_count == 1));
        app.snapshot();

        let saved = image::open(dir.path().join("snapshot.png")).unwrap();
        assert_eq!((saved.width(), saved.height()), (64, 48));
    }

    #[test]
    fn test_resize_rescales_overlay() {
        let (mut app, _) = ready_app(vec![Expression::Happy]);
        app.toggle();
        assert!(pump_until(&mut app, |a| a.summary.face_count == 1));
        assert_eq!(app.geometry(), Some(DisplayGeometry::new(64, 48)));

        app.on_resize(DisplayGeometry::new(128, 96));
        assert_eq!(app.geometry(), Some(DisplayGeometry::new(128, 96)));

        let composed = app.composed_frame().unwrap();
        assert_eq!(composed.dimensions(), (128, 96));
        // Scripted faces sit at a quarter of the frame
        assert_eq!(*composed.get_pixel(32, 24), Expression::Happy.color());
    }

    #[test]
    fn test_quit_releases_camera() {
        let (backend, stats) = FakeBackend::new(8, 8);
        let mut app = app_with(backend);
        let (detector, _) = ScriptedDetector::new(vec![]);
        app.load_models(OkSource, move |_| Ok(Box::new(detector) as Box<dyn FaceDetector>));
        assert!(pump_until(&mut app, |a| a.model_status == ModelStatus::Ready));

        app.toggle();
        app.handle_key(KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE));
        assert!(app.should_quit);
        assert!(!app.session_active());
        assert_eq!(stats.stopped.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
