use thiserror::Error;

use crate::domain::ConfidenceScale;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown confidence scale '{0}' (expected 'fraction' or 'percent')")]
pub struct UnknownConfidenceScale(pub String);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfidenceError {
    #[error("confidence must be a finite number, got {0}")]
    NotFinite(f64),
    #[error("confidence {raw} is outside the {scale} range")]
    OutOfRange { raw: f64, scale: ConfidenceScale },
}
