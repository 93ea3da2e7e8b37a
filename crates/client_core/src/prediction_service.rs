//! Transport seam between the controller and the remote prediction service.

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, Response,
};
use serde::de::DeserializeOwned;
use shared::protocol::{Endpoint, HeatmapResponse, PredictResponse, PREDICT_FILE_FIELD};
use tracing::debug;
use url::Url;

use crate::{
    config::Settings,
    error::{ConfigError, ServiceError},
    selection::Selection,
};

#[async_trait]
pub trait PredictionService: Send + Sync {
    /// Base against which service-relative paths (heatmaps) are resolved.
    fn base_url(&self) -> &Url;

    async fn predict(&self, selection: &Selection) -> Result<PredictResponse, ServiceError>;

    async fn generate_heatmap(&self) -> Result<HeatmapResponse, ServiceError>;
}

pub struct HttpPredictionService {
    http: Client,
    base_url: Url,
}

impl HttpPredictionService {
    /// `base_url` must already be normalized (see [`crate::config::parse_base_url`]).
    pub fn new(base_url: Url) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self::new(settings.service_base_url()?))
    }

    fn endpoint_url(&self, endpoint: Endpoint) -> Result<Url, ServiceError> {
        self.base_url
            .join(endpoint.path())
            .map_err(|source| ServiceError::InvalidUrl {
                endpoint,
                path: endpoint.path().to_string(),
                source,
            })
    }
}

#[async_trait]
impl PredictionService for HttpPredictionService {
    fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn predict(&self, selection: &Selection) -> Result<PredictResponse, ServiceError> {
        let endpoint = Endpoint::Predict;
        let url = self.endpoint_url(endpoint)?;
        let part = Part::bytes(selection.bytes().to_vec())
            .file_name(selection.file_name().to_string())
            .mime_str(selection.mime_type())
            .map_err(|source| ServiceError::Transport { endpoint, source })?;
        let form = Form::new().part(PREDICT_FILE_FIELD, part);

        debug!(%url, size_bytes = selection.len(), "posting image for prediction");
        let response = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|source| ServiceError::Transport { endpoint, source })?;
        read_json(endpoint, response).await
    }

    async fn generate_heatmap(&self) -> Result<HeatmapResponse, ServiceError> {
        let endpoint = Endpoint::GenerateHeatmap;
        let url = self.endpoint_url(endpoint)?;

        debug!(%url, "requesting heatmap generation");
        let response = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|source| ServiceError::Transport { endpoint, source })?;
        read_json(endpoint, response).await
    }
}

async fn read_json<T: DeserializeOwned>(
    endpoint: Endpoint,
    response: Response,
) -> Result<T, ServiceError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ServiceError::Status {
            endpoint,
            status: status.as_u16(),
        });
    }
    let body = response
        .bytes()
        .await
        .map_err(|source| ServiceError::Transport { endpoint, source })?;
    serde_json::from_slice(&body).map_err(|err| ServiceError::Malformed {
        endpoint,
        reason: err.to_string(),
    })
}

/// Resolves a service-relative heatmap path and tags it with a cache-busting stamp.
pub fn resolve_heatmap_url(
    base_url: &Url,
    heatmap_path: &str,
    stamp: i64,
) -> Result<Url, url::ParseError> {
    let mut url = base_url.join(heatmap_path.trim_start_matches('/'))?;
    url.query_pairs_mut()
        .append_pair(shared::protocol::CACHE_BUST_PARAM, &stamp.to_string());
    Ok(url)
}

#[cfg(test)]
#[path = "tests/prediction_service_tests.rs"]
mod tests;
