use std::{
    cmp,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use shared::{
    domain::{ConfidenceScale, Generation, HeatmapReference, PredictionOutcome},
    protocol::Endpoint,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

pub mod cancellation;
pub mod config;
pub mod error;
pub mod prediction_service;
pub mod selection;

pub use cancellation::{CancellationToken, TokenSource};
pub use config::Settings;
pub use error::{ConfigError, FailureKind, ServiceError, SubmitError};
pub use prediction_service::{resolve_heatmap_url, HttpPredictionService, PredictionService};
pub use selection::{Selection, ACCEPTED_EXTENSIONS};

const CONTROLLER_EVENT_CAPACITY: usize = 64;

/// A failed submission as recorded in [`ControllerState::last_failure`].
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionFailure {
    pub generation: Generation,
    pub endpoint: Endpoint,
    pub kind: FailureKind,
    pub status: Option<u16>,
    pub reason: String,
}

impl SubmissionFailure {
    fn new(generation: Generation, err: &ServiceError) -> Self {
        Self {
            generation,
            endpoint: err.endpoint(),
            kind: err.kind(),
            status: err.status(),
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    Success {
        prediction: PredictionOutcome,
        heatmap: HeatmapReference,
    },
    HttpError {
        endpoint: Endpoint,
        status: u16,
    },
    /// Transport error, malformed body or unresolvable heatmap path.
    Failed {
        endpoint: Endpoint,
        reason: String,
    },
    Cancelled,
}

impl SubmissionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SubmissionOutcome::Success { .. })
    }
}

impl From<&SubmissionFailure> for SubmissionOutcome {
    fn from(failure: &SubmissionFailure) -> Self {
        match failure.status {
            Some(status) => SubmissionOutcome::HttpError {
                endpoint: failure.endpoint,
                status,
            },
            None => SubmissionOutcome::Failed {
                endpoint: failure.endpoint,
                reason: failure.reason.clone(),
            },
        }
    }
}

/// State changes that were actually applied, in the order they were applied.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    SelectionChanged {
        file_name: String,
    },
    SubmissionStarted {
        generation: Generation,
    },
    SubmissionCancelled {
        generation: Generation,
    },
    PredictionReady {
        generation: Generation,
        prediction: PredictionOutcome,
    },
    HeatmapReady {
        generation: Generation,
        heatmap: HeatmapReference,
    },
    SubmissionFailed(SubmissionFailure),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerState {
    pub selection: Option<Selection>,
    /// Shared by every snapshot; cloning does not copy the encoded image.
    pub preview_uri: Option<Arc<str>>,
    pub prediction: Option<PredictionOutcome>,
    pub heatmap: Option<HeatmapReference>,
    pub is_predicting: bool,
    pub active_token: Option<Generation>,
    pub last_failure: Option<SubmissionFailure>,
}

struct ControllerInner {
    view: ControllerState,
    tokens: TokenSource,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Finish,
}

/// Hands out strictly increasing epoch-millisecond stamps.
#[derive(Default)]
struct CacheBuster {
    last: AtomicI64,
}

impl CacheBuster {
    fn next(&self, now: DateTime<Utc>) -> i64 {
        let candidate = now.timestamp_millis();
        let previous = match self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(cmp::max(candidate, last + 1))
            }) {
            Ok(previous) | Err(previous) => previous,
        };
        cmp::max(candidate, previous + 1)
    }
}

/// Owns the upload/predict state and drives the two-call submission workflow.
///
/// Every transition takes the state lock once and never holds it across an
/// await. Asynchronous continuations re-check their token under that lock
/// before applying anything, so a superseded submission can never write into
/// state that belongs to a newer selection or submission.
#[derive(Clone)]
pub struct UploadController {
    service: Arc<dyn PredictionService>,
    confidence_scale: ConfidenceScale,
    inner: Arc<Mutex<ControllerInner>>,
    cache_buster: Arc<CacheBuster>,
    events: broadcast::Sender<ControllerEvent>,
}

impl UploadController {
    pub fn new(service: Arc<dyn PredictionService>) -> Self {
        Self::with_confidence_scale(service, ConfidenceScale::default())
    }

    pub fn with_confidence_scale(
        service: Arc<dyn PredictionService>,
        confidence_scale: ConfidenceScale,
    ) -> Self {
        let (events, _) = broadcast::channel(CONTROLLER_EVENT_CAPACITY);
        Self {
            service,
            confidence_scale,
            inner: Arc::new(Mutex::new(ControllerInner {
                view: ControllerState::default(),
                tokens: TokenSource::new(),
            })),
            cache_buster: Arc::new(CacheBuster::default()),
            events,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let service = HttpPredictionService::from_settings(settings)?;
        Ok(Self::with_confidence_scale(
            Arc::new(service),
            settings.confidence_scale,
        ))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> ControllerState {
        let inner = self.inner.lock();
        let mut view = inner.view.clone();
        view.active_token = inner.tokens.active();
        view
    }

    /// Replaces the selection, dropping every derived result and cancelling any
    /// in-flight submission.
    pub fn select_file(&self, selection: Selection) {
        let preview_uri: Arc<str> = selection.preview_uri().into();
        let file_name = selection.file_name().to_string();

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let cancelled = inner.tokens.cancel();

        inner.view.prediction = None;
        inner.view.heatmap = None;
        inner.view.last_failure = None;
        inner.view.is_predicting = false;
        inner.view.preview_uri = Some(preview_uri);
        info!(
            file_name = %file_name,
            size_bytes = selection.len(),
            accepted_extension = selection.has_accepted_extension(),
            "image selected"
        );
        inner.view.selection = Some(selection);

        if let Some(generation) = cancelled {
            debug!(%generation, "selection change cancelled in-flight submission");
            self.emit(ControllerEvent::SubmissionCancelled { generation });
        }
        self.emit(ControllerEvent::SelectionChanged { file_name });
    }

    /// Cancels the in-flight submission, keeping the selection and any results.
    pub fn cancel(&self) -> Option<Generation> {
        let mut inner = self.inner.lock();
        let generation = inner.tokens.cancel()?;
        inner.view.is_predicting = false;
        debug!(%generation, "submission cancelled");
        self.emit(ControllerEvent::SubmissionCancelled { generation });
        Some(generation)
    }

    /// Uploads the current selection to `/predict`, then requests
    /// `/generate_heatmap` under the same token.
    pub async fn submit(&self) -> Result<SubmissionOutcome, SubmitError> {
        let (mut token, selection) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let selection = inner
                .view
                .selection
                .clone()
                .ok_or(SubmitError::NoSelection)?;

            let superseded = inner.tokens.active();
            let token = inner.tokens.issue();
            inner.view.is_predicting = true;
            inner.view.last_failure = None;

            if let Some(generation) = superseded {
                debug!(%generation, "new submission superseded in-flight one");
                self.emit(ControllerEvent::SubmissionCancelled { generation });
            }
            self.emit(ControllerEvent::SubmissionStarted {
                generation: token.generation(),
            });
            (token, selection)
        };

        let generation = token.generation();
        info!(%generation, file_name = %selection.file_name(), "submission started");
        let outcome = self.run_submission(&mut token, &selection).await;
        match &outcome {
            SubmissionOutcome::Success { .. } => info!(%generation, "submission completed"),
            SubmissionOutcome::Cancelled => {
                debug!(%generation, "submission superseded; results discarded")
            }
            SubmissionOutcome::HttpError { .. } | SubmissionOutcome::Failed { .. } => {}
        }
        Ok(outcome)
    }

    async fn run_submission(
        &self,
        token: &mut CancellationToken,
        selection: &Selection,
    ) -> SubmissionOutcome {
        let generation = token.generation();

        let predicted = match token
            .run_until_cancelled(self.service.predict(selection))
            .await
        {
            None => return SubmissionOutcome::Cancelled,
            Some(Err(err)) => return self.fail(generation, err),
            Some(Ok(body)) => body,
        };
        let confidence = match self.confidence_scale.to_percent(predicted.confidence) {
            Ok(confidence) => confidence,
            Err(err) => {
                return self.fail(
                    generation,
                    ServiceError::Malformed {
                        endpoint: Endpoint::Predict,
                        reason: err.to_string(),
                    },
                )
            }
        };
        let prediction = PredictionOutcome {
            label: predicted.prediction,
            confidence,
        };
        let applied = self.apply(generation, Step::Continue, |view| {
            view.prediction = Some(prediction.clone());
            view.is_predicting = false;
            ControllerEvent::PredictionReady {
                generation,
                prediction: prediction.clone(),
            }
        });
        if !applied {
            return SubmissionOutcome::Cancelled;
        }
        info!(
            %generation,
            label = %prediction.label,
            confidence = prediction.confidence,
            "prediction received"
        );

        let generated = match token
            .run_until_cancelled(self.service.generate_heatmap())
            .await
        {
            None => return SubmissionOutcome::Cancelled,
            Some(Err(err)) => return self.fail(generation, err),
            Some(Ok(body)) => body,
        };
        let generated_at = Utc::now();
        let stamp = self.cache_buster.next(generated_at);
        let url = match resolve_heatmap_url(self.service.base_url(), &generated.heatmap_path, stamp)
        {
            Ok(url) => url,
            Err(source) => {
                return self.fail(
                    generation,
                    ServiceError::InvalidUrl {
                        endpoint: Endpoint::GenerateHeatmap,
                        path: generated.heatmap_path,
                        source,
                    },
                )
            }
        };
        let heatmap = HeatmapReference {
            url: url.to_string(),
            heatmap_path: generated.heatmap_path,
            generated_at,
        };
        let applied = self.apply(generation, Step::Finish, |view| {
            view.heatmap = Some(heatmap.clone());
            ControllerEvent::HeatmapReady {
                generation,
                heatmap: heatmap.clone(),
            }
        });
        if !applied {
            return SubmissionOutcome::Cancelled;
        }

        SubmissionOutcome::Success {
            prediction,
            heatmap,
        }
    }

    /// Applies `effect` only while `generation` is still the active token.
    fn apply<F>(&self, generation: Generation, step: Step, effect: F) -> bool
    where
        F: FnOnce(&mut ControllerState) -> ControllerEvent,
    {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if !inner.tokens.is_active(generation) {
            return false;
        }
        let event = effect(&mut inner.view);
        if step == Step::Finish {
            inner.tokens.release(generation);
        }
        self.emit(event);
        true
    }

    fn fail(&self, generation: Generation, err: ServiceError) -> SubmissionOutcome {
        let failure = SubmissionFailure::new(generation, &err);
        let applied = self.apply(generation, Step::Finish, |view| {
            view.is_predicting = false;
            view.last_failure = Some(failure.clone());
            ControllerEvent::SubmissionFailed(failure.clone())
        });
        if !applied {
            debug!(%generation, error = %err, "dropping failure of superseded submission");
            return SubmissionOutcome::Cancelled;
        }
        error!(
            %generation,
            endpoint = %failure.endpoint,
            status = ?failure.status,
            error = %err,
            "submission failed"
        );
        SubmissionOutcome::from(&failure)
    }

    fn emit(&self, event: ControllerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
