use crate::geometry::{BoundingBox, Geometry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

// ============ Core Enrichment Models ============

/// Countries with country-specific enrichment support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Country {
    #[serde(rename = "PT")]
    Pt,
    #[serde(rename = "ES")]
    Es,
    #[serde(rename = "DE")]
    De,
}

impl Country {
    /// Parses an ISO 3166-1 alpha-2 code as returned by Nominatim.
    /// Any other country yields `None` and skips country-specific stages.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "PT" => Some(Country::Pt),
            "ES" => Some(Country::Es),
            "DE" => Some(Country::De),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Country::Pt => "PT",
            Country::Es => "ES",
            Country::De => "DE",
        }
    }

    /// Whether the layer aggregator has a connector set for this country.
    pub fn has_layer_set(&self) -> bool {
        matches!(self, Country::Pt | Country::Es)
    }
}

impl std::fmt::Display for Country {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A coordinate pair in EPSG:4326 decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Normalized outcome of one layer connector.
///
/// `found=false` with no `error` means the service answered but has no
/// feature at this point; `error` is set only on transport/parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerResult {
    /// Stable source identifier, category-first (e.g. "cadastre-pt").
    pub layer_id: String,
    /// Human-readable label.
    pub layer_name: String,
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LayerResult {
    pub fn found(layer_id: &str, layer_name: &str, data: Value) -> Self {
        Self {
            layer_id: layer_id.to_string(),
            layer_name: layer_name.to_string(),
            found: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn not_found(layer_id: &str, layer_name: &str) -> Self {
        Self {
            layer_id: layer_id.to_string(),
            layer_name: layer_name.to_string(),
            found: false,
            data: None,
            error: None,
        }
    }

    pub fn failed(layer_id: &str, layer_name: &str, error: String) -> Self {
        Self {
            layer_id: layer_id.to_string(),
            layer_name: layer_name.to_string(),
            found: false,
            data: None,
            error: Some(error),
        }
    }

    /// Semantic bucket, derived from the id prefix up to the first '-'.
    pub fn category(&self) -> &str {
        let prefix = self
            .layer_id
            .split_once('-')
            .map(|(prefix, _)| prefix)
            .unwrap_or(self.layer_id.as_str());
        match prefix {
            "admin" => "administrative",
            other => other,
        }
    }
}

/// Input to the layer aggregator.
#[derive(Debug, Clone, Deserialize)]
pub struct LayerQueryRequest {
    pub lat: f64,
    pub lng: f64,
    pub country: Country,
    #[serde(default)]
    pub area_m2: Option<f64>,
    #[serde(default)]
    pub polygon: Option<Geometry>,
}

/// Aggregate of layer results for one coordinate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerQueryResponse {
    pub coordinates: Coordinate,
    pub country: Country,
    pub timestamp: DateTime<Utc>,
    pub layers: Vec<LayerResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_m2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polygon: Option<Geometry>,
}

/// A resolved cadastral parcel: exactly one best candidate per query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CadastralInfo {
    /// Provider parcel identifier.
    pub cadastral_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_m2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub centroid: Option<Coordinate>,
    /// 0.0 when `contains_point` is true.
    pub distance_meters: f64,
    pub contains_point: bool,
    pub source: String,
    pub service_url: String,
}

/// Per-country zoning classification, merged from up to three sub-sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoningInfo {
    /// Working label; replaced by the translation when one is applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Original untranslated label. Immutable once set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_original: Option<String>,
    #[serde(default)]
    pub translated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation_confidence: Option<f64>,
    /// Designation/category system value (e.g. CRUS class).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub designation: Option<String>,
    /// Land-cover classification value (COS/CLC).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub land_cover: Option<String>,
    /// Administrative parish, where the country has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parish: Option<String>,
    pub source: String,
    pub country: Country,
}

/// Nearest feature of one amenity category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearestAmenity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub distance_m: f64,
    /// "node" or "way".
    pub osm_type: String,
    pub osm_id: i64,
}

/// Nearest-feature distances for the nine amenity categories, all resolved
/// from a single combined Overpass query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AmenitiesInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coastline: Option<NearestAmenity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beach: Option<NearestAmenity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub airport: Option<NearestAmenity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub town: Option<NearestAmenity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_transport: Option<NearestAmenity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supermarket: Option<NearestAmenity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convenience: Option<NearestAmenity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restaurant: Option<NearestAmenity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cafe: Option<NearestAmenity>,
    /// Search radius used for the combined query, meters.
    pub radius_m: u32,
}

/// Municipality resolution result from reverse geocoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Municipality {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// ISO 3166-1 alpha-2, lowercased by Nominatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

// ============ Enrichment API Contract ============

fn default_true() -> bool {
    true
}

fn default_target_language() -> String {
    "en".to_string()
}

/// Request body for `POST /api/v1/enrich`.
#[derive(Debug, Clone, Deserialize)]
pub struct EnrichLocationRequest {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub plot_id: Option<Uuid>,
    /// Requires `plot_id`; validated before any I/O.
    #[serde(default = "default_true")]
    pub store_results: bool,
    #[serde(default)]
    pub translate: bool,
    #[serde(default = "default_target_language")]
    pub target_language: String,
}

/// Response of the enrichment pipeline. Partial enrichment is a success:
/// callers must check `error` for total failure, not rely on status codes.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichLocationResponse {
    pub location: Coordinate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<Country>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub municipality: Option<Municipality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amenities: Option<AmenitiesInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layers: Option<LayerQueryResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoning: Option<ZoningInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cadastre: Option<CadastralInfo>,
    /// The merged object as persisted (or as it would be persisted).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment_data: Option<Value>,
    pub enrichments_run: Vec<String>,
    pub enrichments_skipped: Vec<String>,
    pub enrichments_failed: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============ Database Models ============

/// A land plot row with its enrichment record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PlotRecord {
    pub id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    /// Authoritative coordinates, when a run or a survey has refined them.
    pub real_latitude: Option<f64>,
    pub real_longitude: Option<f64>,
    pub municipality_id: Option<Uuid>,
    pub enrichment_data: Option<Value>,
}
