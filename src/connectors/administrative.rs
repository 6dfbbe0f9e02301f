use crate::clients::{self, ClientRegistry};
use crate::config::Config;
use crate::connectors::FeatureCollection;
use crate::errors::AppError;
use crate::geometry::{point_in_geometry, BoundingBox};
use serde_json::{json, Value};
use std::time::Duration;

/// CAOP administrative boundaries: district, municipality, parish, NUTS3.
///
/// All four share the same WFS; only the type name and the property keys
/// naming the unit differ.
pub struct AdministrativeService {
    client: reqwest::Client,
    base_url: String,
}

struct AdminLayer {
    type_name: &'static str,
    name_keys: &'static [&'static str],
    code_keys: &'static [&'static str],
}

const DISTRICT: AdminLayer = AdminLayer {
    type_name: "caop:distritos",
    name_keys: &["distrito", "Distrito", "name"],
    code_keys: &["dt", "codigo"],
};

const MUNICIPALITY: AdminLayer = AdminLayer {
    type_name: "caop:municipios",
    name_keys: &["municipio", "Municipio", "concelho", "name"],
    code_keys: &["dtmn", "codigo"],
};

const PARISH: AdminLayer = AdminLayer {
    type_name: "caop:freguesias",
    name_keys: &["freguesia", "Freguesia", "name"],
    code_keys: &["dtmnfr", "dicofre", "codigo"],
};

const NUTS3: AdminLayer = AdminLayer {
    type_name: "caop:nuts3",
    name_keys: &["nuts3", "NUTS3_DSG", "designacao", "name"],
    code_keys: &["NUTS3_COD", "codigo"],
};

impl AdministrativeService {
    pub fn new(config: &Config, registry: &ClientRegistry) -> Result<Self, AppError> {
        Ok(Self {
            client: registry.client_for(&config.pt_caop_base_url, Duration::from_secs(15))?,
            base_url: config.pt_caop_base_url.clone(),
        })
    }

    pub async fn district(&self, latitude: f64, longitude: f64) -> Result<Option<Value>, AppError> {
        self.query_layer(&DISTRICT, latitude, longitude).await
    }

    pub async fn municipality(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<Value>, AppError> {
        self.query_layer(&MUNICIPALITY, latitude, longitude).await
    }

    pub async fn parish(&self, latitude: f64, longitude: f64) -> Result<Option<Value>, AppError> {
        self.query_layer(&PARISH, latitude, longitude).await
    }

    pub async fn nuts3(&self, latitude: f64, longitude: f64) -> Result<Option<Value>, AppError> {
        self.query_layer(&NUTS3, latitude, longitude).await
    }

    /// WFS GetFeature with a tight bbox around the point, then an exact
    /// point-in-polygon pass over the returned boundaries. Administrative
    /// polygons tile the country, so the containing one is the answer; the
    /// bbox alone can clip a neighbour near unit borders.
    async fn query_layer(
        &self,
        layer: &AdminLayer,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<Value>, AppError> {
        let bbox = BoundingBox::from_buffer(latitude, longitude, 0.0005);
        let bbox_param = format!("{},EPSG:4326", bbox.to_param());

        let url = reqwest::Url::parse_with_params(
            &self.base_url,
            &[
                ("service", "WFS"),
                ("version", "2.0.0"),
                ("request", "GetFeature"),
                ("typenames", layer.type_name),
                ("outputFormat", "application/json"),
                ("srsName", "EPSG:4326"),
                ("bbox", bbox_param.as_str()),
                ("count", "10"),
            ],
        )
        .map_err(|e| AppError::ExternalApiError(format!("Failed to build WFS URL: {}", e)))?;

        let collection: FeatureCollection =
            clients::get_json(&self.client, url, layer.type_name).await?;

        let feature = collection
            .features
            .iter()
            .find(|f| {
                f.geometry
                    .as_ref()
                    .map(|g| point_in_geometry(longitude, latitude, g))
                    .unwrap_or(false)
            })
            .or_else(|| collection.features.first());

        let Some(feature) = feature else {
            return Ok(None);
        };

        let name = feature.string_property(layer.name_keys);
        let code = feature.string_property(layer.code_keys);
        if name.is_none() && code.is_none() {
            return Ok(None);
        }

        Ok(Some(json!({
            "name": name,
            "code": code,
        })))
    }
}
