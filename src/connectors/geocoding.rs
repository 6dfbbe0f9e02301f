use crate::clients::{self, ClientRegistry};
use crate::config::Config;
use crate::errors::AppError;
use crate::models::Municipality;
use serde::Deserialize;
use std::time::Duration;

/// Nominatim reverse geocoding. The pipeline's sole source of country
/// determination, so its output shape is kept deliberately small.
pub struct GeocodingService {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct NominatimReverse {
    /// Set to "Unable to geocode" for open water.
    error: Option<String>,
    display_name: Option<String>,
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    municipality: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    county: Option<String>,
    country_code: Option<String>,
}

impl GeocodingService {
    pub fn new(config: &Config, registry: &ClientRegistry) -> Result<Self, AppError> {
        Ok(Self {
            client: registry.client_for(&config.nominatim_base_url, Duration::from_secs(15))?,
            base_url: config.nominatim_base_url.clone(),
        })
    }

    /// Resolves the municipality (and country code) at a point. `Ok(None)`
    /// for locations Nominatim cannot geocode, e.g. open ocean.
    pub async fn reverse(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<Municipality>, AppError> {
        let lat = latitude.to_string();
        let lon = longitude.to_string();
        let url = reqwest::Url::parse_with_params(
            &format!("{}/reverse", self.base_url),
            &[
                ("format", "jsonv2"),
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("zoom", "10"),
                ("addressdetails", "1"),
            ],
        )
        .map_err(|e| AppError::ExternalApiError(format!("Failed to build URL: {}", e)))?;

        tracing::debug!("Nominatim reverse for ({}, {})", latitude, longitude);

        let response: NominatimReverse =
            clients::get_json(&self.client, url, "Nominatim reverse").await?;

        if response.error.is_some() {
            return Ok(None);
        }

        let Some(address) = response.address else {
            return Ok(None);
        };

        let name = address
            .municipality
            .or(address.city)
            .or(address.town)
            .or(address.village)
            .or(address.county);

        Ok(Some(Municipality {
            name,
            country_code: address.country_code,
            display_name: response.display_name,
        }))
    }
}
