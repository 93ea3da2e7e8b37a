//! UI/backend events and error modeling for the desktop GUI.

use client_core::{ControllerEvent, FailureKind, SubmissionFailure, SubmissionOutcome};

pub enum UiEvent {
    Controller(ControllerEvent),
    SubmissionFinished(SubmissionOutcome),
    HeatmapLoaded { url: String, bytes: Vec<u8> },
    HeatmapFailed { url: String, reason: String },
    Error(UiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    /// The service answered with a non-success status.
    Service,
    Transport,
    Validation,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    BackendStartup,
    FileSelection,
    Submission,
    HeatmapDownload,
}

#[derive(Debug, Clone)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let message_lower = message.to_ascii_lowercase();
        let category = if message_lower.contains("http 4")
            || message_lower.contains("http 5")
            || message_lower.contains("status")
        {
            UiErrorCategory::Service
        } else if message_lower.contains("malformed")
            || message_lower.contains("invalid")
            || message_lower.contains("decode")
            || message_lower.contains("cannot resolve")
        {
            UiErrorCategory::Validation
        } else if message_lower.contains("timeout")
            || message_lower.contains("timed out")
            || message_lower.contains("connection")
            || message_lower.contains("request failed")
            || message_lower.contains("dns")
            || message_lower.contains("disconnect")
        {
            UiErrorCategory::Transport
        } else {
            UiErrorCategory::Unknown
        };

        Self {
            category,
            context,
            message,
        }
    }

    /// Classifies from the recorded failure kind; the reason text is display only.
    pub fn from_failure(failure: &SubmissionFailure) -> Self {
        let category = match failure.kind {
            FailureKind::Status => UiErrorCategory::Service,
            FailureKind::Transport => UiErrorCategory::Transport,
            FailureKind::Malformed | FailureKind::InvalidUrl => UiErrorCategory::Validation,
        };
        Self {
            category,
            context: UiErrorContext::Submission,
            message: failure.reason.clone(),
        }
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn user_message(&self) -> String {
        let prefix = match self.context {
            UiErrorContext::BackendStartup => "Backend unavailable",
            UiErrorContext::FileSelection => "Could not load image",
            UiErrorContext::Submission => "Prediction failed",
            UiErrorContext::HeatmapDownload => "Could not load heatmap",
        };
        let hint = match self.category {
            UiErrorCategory::Service => " (the service rejected the request)",
            UiErrorCategory::Transport => " (check the network or service URL)",
            UiErrorCategory::Validation | UiErrorCategory::Unknown => "",
        };
        format!("{prefix}{hint}: {}", self.message)
    }
}

pub fn describe_outcome(outcome: &SubmissionOutcome) -> String {
    match outcome {
        SubmissionOutcome::Success { prediction, .. } => format!(
            "Done: {} ({}%)",
            prediction.label,
            prediction.display_confidence()
        ),
        SubmissionOutcome::HttpError { endpoint, status } => {
            format!("{endpoint} failed with HTTP {status}")
        }
        SubmissionOutcome::Failed { endpoint, reason } => format!("{endpoint} failed: {reason}"),
        SubmissionOutcome::Cancelled => "Submission superseded".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{
        domain::{Generation, HeatmapReference, PredictionOutcome},
        protocol::Endpoint,
    };

    fn sample_heatmap() -> HeatmapReference {
        HeatmapReference {
            url: "http://service.test/static/h.png?t=1".to_string(),
            heatmap_path: "static/h.png".to_string(),
            generated_at: Default::default(),
        }
    }

    #[test]
    fn status_failures_are_service_errors() {
        let failure = SubmissionFailure {
            generation: Generation(3),
            endpoint: Endpoint::Predict,
            kind: FailureKind::Status,
            status: Some(500),
            reason: "/predict returned HTTP 500".to_string(),
        };
        let error = UiError::from_failure(&failure);
        assert_eq!(error.category(), UiErrorCategory::Service);
        assert_eq!(error.context(), UiErrorContext::Submission);
        assert!(error.user_message().starts_with("Prediction failed"));
    }

    #[test]
    fn transport_messages_are_classified() {
        let error = UiError::from_message(
            UiErrorContext::HeatmapDownload,
            "error sending request: connection refused",
        );
        assert_eq!(error.category(), UiErrorCategory::Transport);
        assert!(error.user_message().contains("check the network"));
    }

    #[test]
    fn malformed_bodies_are_validation_errors() {
        let failure = SubmissionFailure {
            generation: Generation(1),
            endpoint: Endpoint::GenerateHeatmap,
            kind: FailureKind::Malformed,
            status: None,
            reason: "/generate_heatmap returned a malformed body: expected value".to_string(),
        };
        assert_eq!(
            UiError::from_failure(&failure).category(),
            UiErrorCategory::Validation
        );
    }

    #[test]
    fn failure_kind_wins_over_message_wording() {
        let failure = SubmissionFailure {
            generation: Generation(2),
            endpoint: Endpoint::Predict,
            kind: FailureKind::Malformed,
            status: None,
            reason: "connection body had an unexpected status field".to_string(),
        };
        assert_eq!(
            UiError::from_failure(&failure).category(),
            UiErrorCategory::Validation
        );

        let transport = SubmissionFailure {
            kind: FailureKind::Transport,
            reason: "something odd".to_string(),
            ..failure
        };
        assert_eq!(
            UiError::from_failure(&transport).category(),
            UiErrorCategory::Transport
        );
    }

    #[test]
    fn unknown_messages_keep_original_text() {
        let error = UiError::from_message(UiErrorContext::FileSelection, "something odd");
        assert_eq!(error.category(), UiErrorCategory::Unknown);
        assert_eq!(error.message(), "something odd");
        assert_eq!(error.user_message(), "Could not load image: something odd");
    }

    #[test]
    fn describes_each_outcome() {
        let success = SubmissionOutcome::Success {
            prediction: PredictionOutcome {
                label: "forged".to_string(),
                confidence: 87.34,
            },
            heatmap: sample_heatmap(),
        };
        assert_eq!(describe_outcome(&success), "Done: forged (87.34%)");
        assert_eq!(
            describe_outcome(&SubmissionOutcome::HttpError {
                endpoint: Endpoint::Predict,
                status: 502,
            }),
            "/predict failed with HTTP 502"
        );
        assert_eq!(
            describe_outcome(&SubmissionOutcome::Cancelled),
            "Submission superseded"
        );
    }
}
