use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::trace;

use crate::config::PickerConfig;
use crate::errors::AppResult;
use crate::location::{Coordinates, ResolvedLocation};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeocodeFeature {
    #[serde(default)]
    pub place_name: String,
}

#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Ranked candidate places for a point, best first.
    async fn reverse_geocode(
        &self,
        at: Coordinates,
        token: &SecretString,
    ) -> AppResult<Vec<GeocodeFeature>>;
}

/// Picks the best-ranked label, skipping blank names.
pub fn best_match(at: Coordinates, features: &[GeocodeFeature]) -> Option<ResolvedLocation> {
    features
        .iter()
        .map(|f| f.place_name.trim())
        .find(|name| !name.is_empty())
        .map(|name| ResolvedLocation::from_place_name(at, name))
}

pub struct HttpReverseGeocoder {
    http: Client,
    api_base: String,
}

impl HttpReverseGeocoder {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("location-picker/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &PickerConfig) -> AppResult<Self> {
        Self::new(config.geocoding_api_base.clone(), config.geocode_timeout())
    }

    fn endpoint(&self, at: Coordinates) -> String {
        format!(
            "{}/geocoding/v5/mapbox.places/{},{}.json",
            self.api_base, at.longitude, at.latitude
        )
    }
}

#[async_trait]
impl ReverseGeocoder for HttpReverseGeocoder {
    async fn reverse_geocode(
        &self,
        at: Coordinates,
        token: &SecretString,
    ) -> AppResult<Vec<GeocodeFeature>> {
        #[derive(Deserialize)]
        struct Response {
            #[serde(default)]
            features: Vec<GeocodeFeature>,
        }

        let response = self
            .http
            .get(self.endpoint(at))
            .query(&[("access_token", token.expose_secret())])
            .send()
            .await?
            .error_for_status()?;

        let parsed: Response = response.json().await?;
        trace!(
            lng = at.longitude,
            lat = at.latitude,
            candidates = parsed.features.len(),
            "reverse geocode response"
        );
        Ok(parsed.features)
    }
}
