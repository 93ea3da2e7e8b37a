//! Bridge between the egui thread and the backend worker's tokio runtime.

pub mod commands;
pub mod runtime;
