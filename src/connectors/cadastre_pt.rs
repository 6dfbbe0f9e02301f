use crate::clients::{self, ClientRegistry};
use crate::config::Config;
use crate::connectors::{parcel_candidates, progressive_parcel_search, FeatureCollection};
use crate::errors::AppError;
use crate::geometry::BoundingBox;
use crate::models::{CadastralInfo, Coordinate};
use crate::parcels::SelectedParcel;
use std::time::Duration;

/// Property keys carrying the parcel reference in DGT cadastre features.
const PT_REFERENCE_KEYS: &[&str] = &["id_parcela", "referencia", "par_id", "localId"];

/// Portugal cadastre via OGC API Features (DGT).
pub struct PtCadastreService {
    client: reqwest::Client,
    base_url: String,
}

const CADASTRE_COLLECTION: &str = "cadastro-predial";

impl PtCadastreService {
    pub fn new(config: &Config, registry: &ClientRegistry) -> Result<Self, AppError> {
        Ok(Self {
            client: registry.client_for(&config.pt_cadastre_base_url, Duration::from_secs(45))?,
            base_url: config.pt_cadastre_base_url.clone(),
        })
    }

    /// Resolves the best cadastral parcel for a point, expanding the search
    /// buffer until features appear.
    pub async fn lookup(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<CadastralInfo>, AppError> {
        let selected = progressive_parcel_search(latitude, longitude, "PT cadastre", |bbox| {
            self.items(bbox)
        })
        .await?;

        Ok(selected.map(|parcel| to_cadastral_info(parcel, "dgt-cadastro", &self.base_url)))
    }

    async fn items(
        &self,
        bbox: BoundingBox,
    ) -> Result<Vec<crate::parcels::ParcelCandidate>, AppError> {
        let items_url = format!(
            "{}/collections/{}/items",
            self.base_url, CADASTRE_COLLECTION
        );
        let bbox_param = bbox.to_param();
        let url = reqwest::Url::parse_with_params(
            &items_url,
            &[
                ("f", "json"),
                ("limit", "50"),
                ("bbox", bbox_param.as_str()),
            ],
        )
        .map_err(|e| {
            AppError::ExternalApiError(format!("Failed to build cadastre items URL: {}", e))
        })?;

        let collection: FeatureCollection =
            clients::get_json(&self.client, url, "PT cadastre items").await?;

        Ok(parcel_candidates(collection, PT_REFERENCE_KEYS))
    }
}

/// BUPi property boundaries via ArcGIS REST. Continental Portugal and
/// Madeira publish separate map services; the query point picks one.
pub struct PtPropertyService {
    client: reqwest::Client,
    continental_url: String,
    madeira_url: String,
}

/// Madeira archipelago envelope.
const MADEIRA_BBOX: BoundingBox = BoundingBox {
    min_lon: -17.35,
    min_lat: 32.35,
    max_lon: -16.20,
    max_lat: 33.15,
};

const BUPI_REFERENCE_KEYS: &[&str] = &["objectid", "id_processo", "rgg_id"];

impl PtPropertyService {
    pub fn new(config: &Config, registry: &ClientRegistry) -> Result<Self, AppError> {
        Ok(Self {
            client: registry.client_for(&config.pt_bupi_base_url, Duration::from_secs(45))?,
            continental_url: config.pt_bupi_base_url.clone(),
            madeira_url: config.pt_bupi_madeira_base_url.clone(),
        })
    }

    fn endpoint_for(&self, latitude: f64, longitude: f64) -> &str {
        if MADEIRA_BBOX.contains(latitude, longitude) {
            &self.madeira_url
        } else {
            &self.continental_url
        }
    }

    pub async fn lookup(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<CadastralInfo>, AppError> {
        let base = self.endpoint_for(latitude, longitude).to_string();
        let selected = progressive_parcel_search(latitude, longitude, "BUPi property", |bbox| {
            self.query(base.clone(), bbox)
        })
        .await?;

        Ok(selected.map(|parcel| to_cadastral_info(parcel, "bupi", &base)))
    }

    async fn query(
        &self,
        base: String,
        bbox: BoundingBox,
    ) -> Result<Vec<crate::parcels::ParcelCandidate>, AppError> {
        let query_url = format!("{}/0/query", base);
        let geometry = bbox.to_param();
        let url = reqwest::Url::parse_with_params(
            &query_url,
            &[
                ("geometry", geometry.as_str()),
                ("geometryType", "esriGeometryEnvelope"),
                ("inSR", "4326"),
                ("spatialRel", "esriSpatialRelIntersects"),
                ("outFields", "*"),
                ("returnGeometry", "true"),
                ("outSR", "4326"),
                ("f", "geojson"),
            ],
        )
        .map_err(|e| AppError::ExternalApiError(format!("Failed to build BUPi URL: {}", e)))?;

        let collection: FeatureCollection =
            clients::get_json(&self.client, url, "BUPi query").await?;

        Ok(parcel_candidates(collection, BUPI_REFERENCE_KEYS))
    }
}

pub(crate) fn to_cadastral_info(
    parcel: SelectedParcel,
    source: &str,
    service_url: &str,
) -> CadastralInfo {
    CadastralInfo {
        cadastral_reference: parcel.reference,
        area_m2: parcel.area_m2,
        centroid: Some(Coordinate {
            latitude: parcel.centroid.1,
            longitude: parcel.centroid.0,
        }),
        geometry: Some(parcel.geometry),
        distance_meters: parcel.distance_m,
        contains_point: parcel.contains_point,
        source: source.to_string(),
        service_url: service_url.to_string(),
    }
}
