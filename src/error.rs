//! Error taxonomy for the capture, model and detection layers.
//!
//! None of these are fatal to the process: the app turns each one into a
//! status message and reverts to a safe UI state.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::ModelArtifact;

/// A model artifact could not be fetched, verified or opened.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to fetch {artifact} from {url}: {message}")]
    Fetch {
        artifact: ModelArtifact,
        url: String,
        message: String,
    },

    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{artifact} digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        artifact: ModelArtifact,
        expected: String,
        actual: String,
    },

    #[error("failed to open {artifact} model: {message}")]
    Session {
        artifact: ModelArtifact,
        message: String,
    },
}

/// The camera could not be opened or stopped delivering frames.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("no camera device found")]
    NoDevice,

    #[error("camera stream error: {0}")]
    Stream(String),

    #[error("no active camera session")]
    NotActive,
}

/// A single detector call failed.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("unexpected model output: {0}")]
    Output(String),
}

impl From<ort::Error> for DetectError {
    fn from(e: ort::Error) -> Self {
        DetectError::Inference(e.to_string())
    }
}

/// The detector can emit a category that has no entry in the color table.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("detector emits unknown expression categories: {}", unknown.join(", "))]
pub struct VocabularyError {
    pub unknown: Vec<String>,
}
