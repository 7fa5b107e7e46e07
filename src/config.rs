use std::sync::Arc;
use std::time::Duration;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

use crate::credentials::{CredentialProvider, StaticToken};

const DEFAULT_MAP_STYLE: &str = "mapbox://styles/mapbox/streets-v12";
const DEFAULT_GEOCODING_API_BASE: &str = "https://api.mapbox.com";
const DEFAULT_ZOOM: f64 = 12.0;
const DEFAULT_DEBOUNCE_MS: u64 = 300;
const DEFAULT_GEOCODE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CIRCLE_RADIUS_PX: f64 = 40.0;

#[derive(Clone, Debug)]
pub struct PickerConfig {
    pub access_token: Option<SecretString>,
    pub map_style: String,
    pub default_zoom: f64,
    pub geocoding_api_base: String,
    pub geocode_debounce_ms: u64,
    pub geocode_timeout_secs: u64,
    pub circle_radius_px: f64,
    pub persistent_circle: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicPickerConfig {
    pub map_style: String,
    pub default_zoom: f64,
    pub geocoding_api_base: String,
    pub geocode_debounce_ms: u64,
    pub geocode_timeout_secs: u64,
    pub circle_radius_px: f64,
    pub persistent_circle: bool,
    pub has_access_token: bool,
}

impl Default for PickerConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            map_style: DEFAULT_MAP_STYLE.to_string(),
            default_zoom: DEFAULT_ZOOM,
            geocoding_api_base: DEFAULT_GEOCODING_API_BASE.to_string(),
            geocode_debounce_ms: DEFAULT_DEBOUNCE_MS,
            geocode_timeout_secs: DEFAULT_GEOCODE_TIMEOUT_SECS,
            circle_radius_px: DEFAULT_CIRCLE_RADIUS_PX,
            persistent_circle: false,
        }
    }
}

impl PickerConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup instead of the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            access_token: non_blank("MAPBOX_ACCESS_TOKEN").map(SecretString::from),
            map_style: non_blank("MAP_STYLE_URL").unwrap_or_else(|| DEFAULT_MAP_STYLE.to_string()),
            default_zoom: parse_f64(&lookup, "MAP_DEFAULT_ZOOM", DEFAULT_ZOOM).clamp(0.0, 22.0),
            geocoding_api_base: non_blank("GEOCODING_API_BASE")
                .unwrap_or_else(|| DEFAULT_GEOCODING_API_BASE.to_string()),
            geocode_debounce_ms: parse_u64(&lookup, "GEOCODE_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS),
            geocode_timeout_secs: parse_u64(
                &lookup,
                "GEOCODE_TIMEOUT_SECS",
                DEFAULT_GEOCODE_TIMEOUT_SECS,
            )
            .max(1),
            circle_radius_px: parse_f64(
                &lookup,
                "PRIVACY_CIRCLE_RADIUS_PX",
                DEFAULT_CIRCLE_RADIUS_PX,
            ),
            persistent_circle: parse_bool(&lookup, "PERSISTENT_CIRCLE", false),
        }
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.geocode_debounce_ms)
    }

    pub fn geocode_timeout(&self) -> Duration {
        Duration::from_secs(self.geocode_timeout_secs)
    }

    /// Credential provider backed by the configured token, if any.
    pub fn default_credentials(&self) -> StaticToken {
        StaticToken::new(self.access_token.clone())
    }

    pub fn public_profile(&self) -> PublicPickerConfig {
        PublicPickerConfig {
            map_style: self.map_style.clone(),
            default_zoom: self.default_zoom,
            geocoding_api_base: self.geocoding_api_base.clone(),
            geocode_debounce_ms: self.geocode_debounce_ms,
            geocode_timeout_secs: self.geocode_timeout_secs,
            circle_radius_px: self.circle_radius_px,
            persistent_circle: self.persistent_circle,
            has_access_token: self.access_token.is_some(),
        }
    }
}

/// Per-mount options supplied by the host page.
#[derive(Clone)]
pub struct PickerOptions {
    pub initial_location: String,
    pub persistent_circle: bool,
    pub credentials: Arc<dyn CredentialProvider>,
}

impl PickerOptions {
    pub fn new(initial_location: impl Into<String>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            initial_location: initial_location.into(),
            persistent_circle: false,
            credentials,
        }
    }

    pub fn with_persistent_circle(mut self, persistent: bool) -> Self {
        self.persistent_circle = persistent;
        self
    }

    /// Options seeded from configuration, using the configured token.
    pub fn from_config(initial_location: impl Into<String>, config: &PickerConfig) -> Self {
        Self::new(initial_location, Arc::new(config.default_credentials()))
            .with_persistent_circle(config.persistent_circle)
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool(&|key: &str| env::var(key).ok(), "ALLOW_DOTENV", false)
}

fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_f64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: f64) -> f64 {
    lookup(key)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}
