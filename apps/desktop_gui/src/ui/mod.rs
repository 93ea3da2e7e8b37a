//! UI layer for the desktop GUI: the single detection window.

pub mod app;

pub use app::{DetectionApp, WINDOW_TITLE};
