use crate::clients::{self, ClientRegistry};
use crate::config::Config;
use crate::errors::AppError;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Open-Elevation point lookups.
pub struct ElevationService {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ElevationResponse {
    #[serde(default)]
    results: Vec<ElevationResult>,
}

#[derive(Debug, Deserialize)]
struct ElevationResult {
    elevation: f64,
}

impl ElevationService {
    pub fn new(config: &Config, registry: &ClientRegistry) -> Result<Self, AppError> {
        Ok(Self {
            client: registry.client_for(&config.elevation_base_url, Duration::from_secs(15))?,
            base_url: config.elevation_base_url.clone(),
        })
    }

    /// Elevation in meters at a point, or `None` when the service has no
    /// value for it.
    pub async fn elevation(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<f64>, AppError> {
        let url = reqwest::Url::parse(&format!("{}/api/v1/lookup", self.base_url))
            .map_err(|e| AppError::ExternalApiError(format!("Failed to build URL: {}", e)))?;

        let body = json!({
            "locations": [{"latitude": latitude, "longitude": longitude}]
        });

        let response: ElevationResponse =
            clients::post_json(&self.client, url, &body, "Open-Elevation").await?;

        Ok(response.results.first().map(|r| r.elevation))
    }
}
