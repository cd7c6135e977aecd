//! Live webcam face and expression overlay for the terminal.

pub mod app;
pub mod camera;
pub mod config;
pub mod detection;
pub mod detector;
pub mod error;
pub mod expression;
pub mod logging;
pub mod models;
pub mod overlay;
pub mod summary;
pub mod ui;
