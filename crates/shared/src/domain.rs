use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfidenceError, UnknownConfidenceScale};

macro_rules! id_newtype {
    ($name:ident, $inner:ty) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub $inner);
    };
}

// Identity of one submission's cancellation token.
id_newtype!(Generation, u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the service expresses `confidence` on `/predict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceScale {
    /// `0.0..=1.0`, converted to a percentage.
    Fraction,
    /// Already `0.0..=100.0`. The hosted service reports this way.
    #[default]
    Percent,
}

impl ConfidenceScale {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceScale::Fraction => "fraction",
            ConfidenceScale::Percent => "percent",
        }
    }

    /// Converts a raw service value to a percentage rounded to two decimals.
    ///
    /// Values outside the scale's range are rejected, not clamped.
    pub fn to_percent(self, raw: f64) -> Result<f64, ConfidenceError> {
        if !raw.is_finite() {
            return Err(ConfidenceError::NotFinite(raw));
        }
        let percent = match self {
            ConfidenceScale::Fraction => raw * 100.0,
            ConfidenceScale::Percent => raw,
        };
        if !(0.0..=100.0).contains(&percent) {
            return Err(ConfidenceError::OutOfRange { raw, scale: self });
        }
        Ok(round_two_decimals(percent))
    }
}

impl FromStr for ConfidenceScale {
    type Err = UnknownConfidenceScale;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fraction" => Ok(ConfidenceScale::Fraction),
            "percent" => Ok(ConfidenceScale::Percent),
            other => Err(UnknownConfidenceScale(other.to_string())),
        }
    }
}

impl fmt::Display for ConfidenceScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn round_two_decimals(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionOutcome {
    pub label: String,
    /// Percentage in `[0, 100]`, two decimals.
    pub confidence: f64,
}

impl PredictionOutcome {
    pub fn display_confidence(&self) -> String {
        format!("{:.2}", self.confidence)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatmapReference {
    /// Absolute, cache-busted image URL.
    pub url: String,
    /// Path exactly as returned by the service.
    pub heatmap_path: String,
    pub generated_at: DateTime<Utc>,
}
