use crate::clients::{self, ClientRegistry};
use crate::config::Config;
use crate::connectors::cadastre_pt::to_cadastral_info;
use crate::connectors::{parcel_candidates, progressive_parcel_search, FeatureCollection};
use crate::errors::AppError;
use crate::geometry::BoundingBox;
use crate::models::CadastralInfo;
use regex::Regex;
use std::time::Duration;

const ES_REFERENCE_KEYS: &[&str] = &["nationalCadastralReference", "localId", "reference"];

/// Spain Catastro cadastral parcels via the INSPIRE feature service.
pub struct EsCatastroService {
    client: reqwest::Client,
    base_url: String,
    reference_format: Regex,
}

impl EsCatastroService {
    pub fn new(config: &Config, registry: &ClientRegistry) -> Result<Self, AppError> {
        // Spanish cadastral references are 14 alphanumerics for the parcel,
        // 20 with the property suffix.
        let reference_format = Regex::new(r"^[A-Z0-9]{14}([A-Z0-9]{6})?$")
            .map_err(|e| AppError::InternalError(format!("Invalid reference regex: {}", e)))?;

        Ok(Self {
            client: registry.client_for(&config.es_catastro_base_url, Duration::from_secs(45))?,
            base_url: config.es_catastro_base_url.clone(),
            reference_format,
        })
    }

    pub async fn lookup(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<CadastralInfo>, AppError> {
        let selected = progressive_parcel_search(latitude, longitude, "ES catastro", |bbox| {
            self.parcels(bbox)
        })
        .await?;

        let Some(parcel) = selected else {
            return Ok(None);
        };

        if !self.reference_format.is_match(&parcel.reference) {
            tracing::warn!(
                "⚠ Catastro returned an unexpected reference format: {}",
                parcel.reference
            );
        }

        Ok(Some(to_cadastral_info(parcel, "catastro", &self.base_url)))
    }

    async fn parcels(
        &self,
        bbox: BoundingBox,
    ) -> Result<Vec<crate::parcels::ParcelCandidate>, AppError> {
        let bbox_param = format!("{},EPSG:4326", bbox.to_param());
        let url = reqwest::Url::parse_with_params(
            &self.base_url,
            &[
                ("service", "WFS"),
                ("version", "2.0.0"),
                ("request", "GetFeature"),
                ("typenames", "CP:CadastralParcel"),
                ("outputFormat", "application/json"),
                ("srsName", "EPSG:4326"),
                ("bbox", bbox_param.as_str()),
                ("count", "50"),
            ],
        )
        .map_err(|e| AppError::ExternalApiError(format!("Failed to build Catastro URL: {}", e)))?;

        let collection: FeatureCollection =
            clients::get_json(&self.client, url, "ES catastro parcels").await?;

        Ok(parcel_candidates(collection, ES_REFERENCE_KEYS))
    }
}
