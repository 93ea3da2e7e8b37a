use shared::protocol::Endpoint;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: Endpoint, status: u16 },
    #[error("{endpoint} request failed: {source}")]
    Transport {
        endpoint: Endpoint,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned a malformed body: {reason}")]
    Malformed { endpoint: Endpoint, reason: String },
    #[error("{endpoint}: cannot resolve '{path}' against the service base: {source}")]
    InvalidUrl {
        endpoint: Endpoint,
        path: String,
        #[source]
        source: url::ParseError,
    },
}

/// Which way a service call failed, without the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Status,
    Transport,
    Malformed,
    InvalidUrl,
}

impl ServiceError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ServiceError::Status { .. } => FailureKind::Status,
            ServiceError::Transport { .. } => FailureKind::Transport,
            ServiceError::Malformed { .. } => FailureKind::Malformed,
            ServiceError::InvalidUrl { .. } => FailureKind::InvalidUrl,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        match self {
            ServiceError::Status { endpoint, .. }
            | ServiceError::Transport { endpoint, .. }
            | ServiceError::Malformed { endpoint, .. }
            | ServiceError::InvalidUrl { endpoint, .. } => *endpoint,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ServiceError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid service base url '{value}': {source}")]
    InvalidBaseUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("service base url '{0}' cannot have endpoint paths joined onto it")]
    NotABaseUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("no image selected")]
    NoSelection,
}
