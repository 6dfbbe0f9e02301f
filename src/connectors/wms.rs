use crate::clients::{self, ClientRegistry};
use crate::config::Config;
use crate::connectors::FeatureCollection;
use crate::errors::AppError;
use serde_json::Value;
use std::time::Duration;

/// Shared WMS GetFeatureInfo client for the DGT raster layers (COS, CLC,
/// built-up areas, CRUS). One pixel query per layer, JSON info format.
pub struct WmsService {
    client: reqwest::Client,
    base_url: String,
}

/// Half-size of the query window in degrees; the point lands on the center
/// pixel of a 101x101 map.
const WINDOW_HALF_DEG: f64 = 0.001;
const WINDOW_PX: u32 = 101;

impl WmsService {
    pub fn new(config: &Config, registry: &ClientRegistry) -> Result<Self, AppError> {
        Ok(Self {
            client: registry.client_for(&config.pt_wms_base_url, Duration::from_secs(30))?,
            base_url: config.pt_wms_base_url.clone(),
        })
    }

    /// Queries one layer at a point. `Ok(None)` when the layer has no feature
    /// under the center pixel.
    pub async fn get_feature_info(
        &self,
        layer: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<Value>, AppError> {
        // WMS 1.3.0 with EPSG:4326 uses lat,lon axis order in the bbox.
        let bbox = format!(
            "{},{},{},{}",
            latitude - WINDOW_HALF_DEG,
            longitude - WINDOW_HALF_DEG,
            latitude + WINDOW_HALF_DEG,
            longitude + WINDOW_HALF_DEG
        );
        let center = (WINDOW_PX / 2).to_string();
        let size = WINDOW_PX.to_string();

        let url = reqwest::Url::parse_with_params(
            &self.base_url,
            &[
                ("SERVICE", "WMS"),
                ("VERSION", "1.3.0"),
                ("REQUEST", "GetFeatureInfo"),
                ("LAYERS", layer),
                ("QUERY_LAYERS", layer),
                ("CRS", "EPSG:4326"),
                ("BBOX", bbox.as_str()),
                ("WIDTH", size.as_str()),
                ("HEIGHT", size.as_str()),
                ("I", center.as_str()),
                ("J", center.as_str()),
                ("INFO_FORMAT", "application/json"),
                ("FEATURE_COUNT", "1"),
            ],
        )
        .map_err(|e| AppError::ExternalApiError(format!("Failed to build WMS URL: {}", e)))?;

        tracing::debug!("WMS GetFeatureInfo {} at ({}, {})", layer, latitude, longitude);

        let label = format!("WMS {}", layer);
        let collection: FeatureCollection =
            clients::get_json(&self.client, url, &label).await?;

        Ok(collection
            .features
            .into_iter()
            .next()
            .map(|feature| Value::Object(feature.properties)))
    }
}
