use std::{collections::HashMap, fs, path::Path};

use shared::domain::ConfidenceScale;
use tracing::warn;
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_SERVICE_BASE_URL: &str = "https://img-forgery-d1470ff951f0.herokuapp.com";
pub const SETTINGS_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub service_base_url: String,
    pub confidence_scale: ConfidenceScale,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_base_url: DEFAULT_SERVICE_BASE_URL.into(),
            confidence_scale: ConfidenceScale::default(),
        }
    }
}

impl Settings {
    /// Parsed base URL, normalized to end in `/` so endpoint paths join beneath it.
    pub fn service_base_url(&self) -> Result<Url, ConfigError> {
        parse_base_url(&self.service_base_url)
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE))
}

pub fn load_settings_from(path: &Path) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        apply_file_overrides(&mut settings, &raw);
    }
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());

    settings
}

fn apply_file_overrides(settings: &mut Settings, raw: &str) {
    let file_cfg = match toml::from_str::<HashMap<String, String>>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(err) => {
            warn!("ignoring unreadable {SETTINGS_FILE}: {err}");
            return;
        }
    };

    if let Some(v) = file_cfg.get("service_base_url") {
        settings.service_base_url = v.clone();
    }
    if let Some(v) = file_cfg.get("confidence_scale") {
        set_confidence_scale(settings, v);
    }
}

fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("SERVICE_BASE_URL") {
        settings.service_base_url = v;
    }
    if let Some(v) = lookup("APP__SERVICE_BASE_URL") {
        settings.service_base_url = v;
    }

    if let Some(v) = lookup("APP__CONFIDENCE_SCALE") {
        set_confidence_scale(settings, &v);
    }
}

fn set_confidence_scale(settings: &mut Settings, raw: &str) {
    match raw.parse::<ConfidenceScale>() {
        Ok(scale) => settings.confidence_scale = scale,
        Err(err) => warn!("keeping confidence scale {}: {err}", settings.confidence_scale),
    }
}

pub fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let raw = raw.trim();
    let mut url = Url::parse(raw).map_err(|source| ConfigError::InvalidBaseUrl {
        value: raw.to_string(),
        source,
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::NotABaseUrl(raw.to_string()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
