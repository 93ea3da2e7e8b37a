//! Wire types of the remote prediction service.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Multipart field carrying the image bytes on `/predict`.
pub const PREDICT_FILE_FIELD: &str = "file";

/// Query parameter appended to heatmap URLs so every generation is a distinct image.
pub const CACHE_BUST_PARAM: &str = "t";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Predict,
    GenerateHeatmap,
}

impl Endpoint {
    /// Path relative to the service base, without a leading slash.
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Predict => "predict",
            Endpoint::GenerateHeatmap => "generate_heatmap",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.path())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatmapResponse {
    pub heatmap_path: String,
}
