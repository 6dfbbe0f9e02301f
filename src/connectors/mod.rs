//! Per-source connectors for the external geo services.
//!
//! Every connector follows the same contract: build a provider-specific
//! query, call the shared retrying HTTP layer, parse the provider's response
//! into typed DTOs, and hand back `Ok(Some(_))` for a hit, `Ok(None)` for a
//! legitimate "nothing at this point", and `Err` for transport/parse failure.
//! The aggregator converts those three outcomes into `LayerResult`s in one
//! place.

pub mod administrative;
pub mod cadastre_es;
pub mod cadastre_pt;
pub mod elevation;
pub mod geocoding;
pub mod landuse;
pub mod wms;
pub mod zoning;

use crate::errors::AppError;
use crate::geometry::{BoundingBox, Geometry};
use crate::parcels::{select_best_parcel, ParcelCandidate, SelectedParcel, BUFFER_STEPS_DEG};
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;

/// GeoJSON FeatureCollection as returned by OGC API Features, GeoServer WFS
/// with JSON output, and ArcGIS REST with `f=geojson`.
#[derive(Debug, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub properties: serde_json::Map<String, Value>,
}

impl Feature {
    /// First string property among `keys`, falling back to the feature id.
    pub fn string_property(&self, keys: &[&str]) -> Option<String> {
        for key in keys {
            if let Some(value) = self.properties.get(*key).and_then(|v| v.as_str()) {
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
        self.id.as_ref().and_then(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    pub fn number_property(&self, keys: &[&str]) -> Option<f64> {
        for key in keys {
            match self.properties.get(*key) {
                Some(Value::Number(n)) => return n.as_f64(),
                Some(Value::String(s)) => {
                    if let Ok(parsed) = s.replace(',', ".").parse::<f64>() {
                        return Some(parsed);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

/// Converts a feature set into parcel candidates, reading the reference from
/// the given property keys.
pub fn parcel_candidates(
    collection: FeatureCollection,
    reference_keys: &[&str],
) -> Vec<ParcelCandidate> {
    collection
        .features
        .into_iter()
        .filter_map(|feature| {
            let reference = feature.string_property(reference_keys)?;
            let area_m2 = feature.number_property(&["area_m2", "areaValue", "area", "shape_area"]);
            Some(ParcelCandidate {
                reference,
                geometry: feature.geometry,
                area_m2,
            })
        })
        .collect()
}

/// Progressive buffer search shared by every cadastre/property connector.
///
/// Buffers are tried in increasing order; the first one that yields at least
/// one candidate ends the search and the best candidate is selected. A buffer
/// whose query fails after its own retries is skipped, not fatal — but if
/// every buffer fails the last error propagates so the caller can tell
/// "service down" from "no parcel here".
pub async fn progressive_parcel_search<F, Fut>(
    latitude: f64,
    longitude: f64,
    label: &str,
    query: F,
) -> Result<Option<SelectedParcel>, AppError>
where
    F: Fn(BoundingBox) -> Fut,
    Fut: Future<Output = Result<Vec<ParcelCandidate>, AppError>>,
{
    let mut any_buffer_answered = false;
    let mut last_error: Option<AppError> = None;

    for buffer_deg in BUFFER_STEPS_DEG {
        let bbox = BoundingBox::from_buffer(latitude, longitude, buffer_deg);
        match query(bbox).await {
            Ok(candidates) => {
                any_buffer_answered = true;
                if candidates.is_empty() {
                    tracing::debug!(
                        "{}: no features within {} deg buffer, expanding",
                        label,
                        buffer_deg
                    );
                    continue;
                }
                tracing::debug!(
                    "{}: {} candidate(s) at {} deg buffer",
                    label,
                    candidates.len(),
                    buffer_deg
                );
                return Ok(select_best_parcel(longitude, latitude, &candidates));
            }
            Err(e) => {
                tracing::warn!("{}: buffer {} deg failed: {}", label, buffer_deg, e);
                last_error = Some(e);
            }
        }
    }

    if any_buffer_answered {
        Ok(None)
    } else {
        Err(last_error.unwrap_or_else(|| {
            AppError::ExternalApiError(format!("{}: no buffer attempt completed", label))
        }))
    }
}
