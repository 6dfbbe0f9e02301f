use crate::clients::{self, ClientRegistry};
use crate::config::Config;
use crate::connectors::landuse::first_string;
use crate::connectors::wms::WmsService;
use crate::connectors::FeatureCollection;
use crate::errors::AppError;
use crate::geometry::BoundingBox;
use regex::Regex;
use serde_json::{json, Value};
use std::time::Duration;

const CRUS_LAYER: &str = "CRUS";
const REN_LAYER: &str = "REN";
const RAN_LAYER: &str = "RAN";

const DESIGNATION_KEYS: [&str; 5] = ["designacao", "classificacao", "uso", "label", "name"];

/// Portugal zoning: CRUS classification plus the REN/RAN restriction layers,
/// all through the DGT WMS.
pub struct PtZoningService {
    wms: WmsService,
    crus_code_format: Regex,
}

impl PtZoningService {
    pub fn new(config: &Config, registry: &ClientRegistry) -> Result<Self, AppError> {
        // CRUS class codes are dotted numeric paths, e.g. "1.1.2".
        let crus_code_format = Regex::new(r"^\d+(\.\d+)*$")
            .map_err(|e| AppError::InternalError(format!("Invalid CRUS regex: {}", e)))?;
        Ok(Self {
            wms: WmsService::new(config, registry)?,
            crus_code_format,
        })
    }

    /// CRUS land-use classification at a point.
    pub async fn crus(&self, latitude: f64, longitude: f64) -> Result<Option<Value>, AppError> {
        let Some(properties) = self
            .wms
            .get_feature_info(CRUS_LAYER, latitude, longitude)
            .await?
        else {
            return Ok(None);
        };

        let designation = first_string(&properties, &DESIGNATION_KEYS);
        let code = first_string(&properties, &["codigo", "cod_crus", "code"]);

        if designation.is_none() && code.is_none() {
            return Ok(None);
        }
        if let Some(ref c) = code {
            if !self.crus_code_format.is_match(c) {
                tracing::warn!("⚠ CRUS returned an unexpected class code: {}", c);
            }
        }

        Ok(Some(json!({
            "designation": designation,
            "code": code,
        })))
    }

    /// National Ecological Reserve restriction at a point.
    pub async fn ren(&self, latitude: f64, longitude: f64) -> Result<Option<Value>, AppError> {
        self.restriction(REN_LAYER, latitude, longitude).await
    }

    /// National Agricultural Reserve restriction at a point.
    pub async fn ran(&self, latitude: f64, longitude: f64) -> Result<Option<Value>, AppError> {
        self.restriction(RAN_LAYER, latitude, longitude).await
    }

    async fn restriction(
        &self,
        layer: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<Value>, AppError> {
        let Some(properties) = self.wms.get_feature_info(layer, latitude, longitude).await? else {
            return Ok(None);
        };
        let designation = first_string(&properties, &DESIGNATION_KEYS);
        Ok(Some(json!({
            "layer": layer,
            "restricted": true,
            "designation": designation,
        })))
    }
}

/// Regional zoning WFS queried by bbox around the point. Spain and Germany
/// differ only in endpoint, type name and the properties carrying the
/// designation, so both wrap the same query.
pub struct WfsZoningService {
    client: reqwest::Client,
    base_url: String,
    type_name: &'static str,
    label: &'static str,
}

impl WfsZoningService {
    pub fn spain(config: &Config, registry: &ClientRegistry) -> Result<Self, AppError> {
        Ok(Self {
            client: registry.client_for(&config.es_zoning_base_url, Duration::from_secs(30))?,
            base_url: config.es_zoning_base_url.clone(),
            type_name: "IDENA:PLANEA_Pol_Planeamiento",
            label: "ES zoning",
        })
    }

    pub fn germany(config: &Config, registry: &ClientRegistry) -> Result<Self, AppError> {
        Ok(Self {
            client: registry.client_for(&config.de_zoning_base_url, Duration::from_secs(30))?,
            base_url: config.de_zoning_base_url.clone(),
            type_name: "bplan:Bebauungsplan",
            label: "DE zoning",
        })
    }

    pub async fn lookup(&self, latitude: f64, longitude: f64) -> Result<Option<Value>, AppError> {
        let bbox = BoundingBox::from_buffer(latitude, longitude, 0.0005);
        let bbox_param = format!("{},EPSG:4326", bbox.to_param());

        let url = reqwest::Url::parse_with_params(
            &self.base_url,
            &[
                ("service", "WFS"),
                ("version", "2.0.0"),
                ("request", "GetFeature"),
                ("typenames", self.type_name),
                ("outputFormat", "application/json"),
                ("srsName", "EPSG:4326"),
                ("bbox", bbox_param.as_str()),
                ("count", "10"),
            ],
        )
        .map_err(|e| {
            AppError::ExternalApiError(format!("Failed to build {} URL: {}", self.label, e))
        })?;

        let collection: FeatureCollection =
            clients::get_json(&self.client, url, self.label).await?;

        let Some(feature) = collection.features.into_iter().next() else {
            return Ok(None);
        };

        let properties = Value::Object(feature.properties);
        let designation = first_string(
            &properties,
            &[
                "designacion",
                "calificacion",
                "clasificacion",
                "planart",
                "nutzungsart",
                "designation",
                "name",
            ],
        );

        let Some(designation) = designation else {
            return Ok(None);
        };

        Ok(Some(json!({
            "designation": designation,
            "type_name": self.type_name,
        })))
    }
}
