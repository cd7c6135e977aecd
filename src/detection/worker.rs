//! Background thread that owns the detector.

use image::RgbImage;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;

use super::TickTicket;
use crate::detector::{DetectionResult, DisplayGeometry, FaceDetector};
use crate::error::{DetectError, VocabularyError};
use crate::expression::validate_vocabulary;

pub struct TickRequest {
    pub ticket: TickTicket,
    pub frame: Arc<RgbImage>,
}

pub struct TickReply {
    pub ticket: TickTicket,
    /// Size of the frame the boxes refer to.
    pub frame_size: DisplayGeometry,
    pub result: Result<Vec<DetectionResult>, DetectError>,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("detection worker has stopped")]
pub struct WorkerGone;

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error(transparent)]
    Vocabulary(#[from] VocabularyError),

    #[error("failed to start detection thread: {0}")]
    Thread(#[from] std::io::Error),
}

pub struct DetectionWorker {
    requests: Option<mpsc::Sender<TickRequest>>,
    replies: mpsc::Receiver<TickReply>,
    handle: Option<JoinHandle<()>>,
}

impl DetectionWorker {
    /// Checks the detector's vocabulary against the color table, then moves
    /// the detector onto its own thread.
    pub fn spawn(detector: Box<dyn FaceDetector>) -> Result<Self, SpawnError> {
        validate_vocabulary(&detector.vocabulary())?;

        let (request_tx, request_rx) = mpsc::channel::<TickRequest>();
        let (reply_tx, reply_rx) = mpsc::channel();

        let handle = std::thread::Builder::new()
            .name("detection".to_string())
            .spawn(move || run(detector, request_rx, reply_tx))?;

        Ok(Self {
            requests: Some(request_tx),
            replies: reply_rx,
            handle: Some(handle),
        })
    }

    pub fn submit(&self, request: TickRequest) -> Result<(), WorkerGone> {
        match &self.requests {
            Some(tx) => tx.send(request).map_err(|_| WorkerGone),
            None => Err(WorkerGone),
        }
    }

    /// Drains replies that are ready without blocking.
    pub fn poll(&self) -> Result<Vec<TickReply>, WorkerGone> {
        let mut replies = Vec::new();
        loop {
            match self.replies.try_recv() {
                Ok(reply) => replies.push(reply),
                Err(mpsc::TryRecvError::Empty) => return Ok(replies),
                Err(mpsc::TryRecvError::Disconnected) => {
                    if replies.is_empty() {
                        return Err(WorkerGone);
                    }
                    return Ok(replies);
                }
            }
        }
    }
}

impl Drop for DetectionWorker {
    fn drop(&mut self) {
        // Closing the request channel ends the thread after its current call.
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Detection thread panicked");
            }
        }
    }
}

fn run(
    mut detector: Box<dyn FaceDetector>,
    requests: mpsc::Receiver<TickRequest>,
    replies: mpsc::Sender<TickReply>,
) {
    tracing::debug!("Detection worker started");

    while let Ok(request) = requests.recv() {
        let started = std::time::Instant::now();
        let result = detector.detect(&request.frame);
        tracing::trace!(
            seq = request.ticket.seq,
            elapsed_ms = started.elapsed().as_millis() as u64,
            faces = result.as_ref().map(Vec::len).unwrap_or(0),
            "Detection finished"
        );

        let reply = TickReply {
            ticket: request.ticket,
            frame_size: DisplayGeometry::of(&request.frame),
            result,
        };
        if replies.send(reply).is_err() {
            break;
        }
    }

    tracing::debug!("Detection worker stopped");
}
