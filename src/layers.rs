//! Layer aggregator: fans out to the per-country connector set and collects
//! every outcome into a uniform `LayerResult` list. A connector failure is a
//! `found=false` result with an error message, never an aborted batch —
//! partial results are always returned.

use crate::clients::ClientRegistry;
use crate::config::Config;
use crate::connectors::administrative::AdministrativeService;
use crate::connectors::cadastre_es::EsCatastroService;
use crate::connectors::cadastre_pt::PtCadastreService;
use crate::connectors::elevation::ElevationService;
use crate::connectors::landuse::LandUseService;
use crate::connectors::zoning::{PtZoningService, WfsZoningService};
use crate::errors::AppError;
use crate::geometry::{validate_coordinates, BoundingBox};
use crate::models::{
    Coordinate, Country, LayerQueryRequest, LayerQueryResponse, LayerResult,
};
use serde_json::{json, Map, Value};

/// Converts the unified connector outcome into a `LayerResult`.
fn to_layer_result(
    layer_id: &str,
    layer_name: &str,
    outcome: Result<Option<Value>, AppError>,
) -> LayerResult {
    match outcome {
        Ok(Some(data)) => LayerResult::found(layer_id, layer_name, data),
        Ok(None) => LayerResult::not_found(layer_id, layer_name),
        Err(e) => {
            tracing::warn!("Layer {} failed: {}", layer_id, e);
            LayerResult::failed(layer_id, layer_name, e.to_string())
        }
    }
}

/// Queries the fixed connector set for the request's country.
///
/// Portugal gets the full stack (administrative, cadastre, zoning,
/// restrictions, land cover, elevation); Spain a smaller set by design since
/// most Spanish logic lives in the dedicated cadastre/zoning enrichments.
/// There is no aggregate timeout: each connector carries its own, so one
/// slow upstream can stretch the whole response.
pub async fn query_all_layers(
    config: &Config,
    registry: &ClientRegistry,
    request: &LayerQueryRequest,
) -> Result<LayerQueryResponse, AppError> {
    validate_coordinates(request.lat, request.lng)?;

    let layers = match request.country {
        Country::Pt => query_portugal_layers(config, registry, request.lat, request.lng).await?,
        Country::Es => query_spain_layers(config, registry, request.lat, request.lng).await?,
        Country::De => {
            return Err(AppError::BadRequest(
                "Layer queries support PT and ES only".to_string(),
            ))
        }
    };

    let bounding_box = match (&request.polygon, request.area_m2) {
        (Some(_), _) => None,
        (None, Some(area)) => Some(BoundingBox::from_area(request.lat, request.lng, area)),
        (None, None) => None,
    };

    let found = layers.iter().filter(|l| l.found).count();
    tracing::info!(
        "✓ Layer query for ({}, {}) [{}]: {}/{} layers found",
        request.lat,
        request.lng,
        request.country,
        found,
        layers.len()
    );

    Ok(LayerQueryResponse {
        coordinates: Coordinate {
            latitude: request.lat,
            longitude: request.lng,
        },
        country: request.country,
        timestamp: chrono::Utc::now(),
        layers,
        area_m2: request.area_m2,
        bounding_box,
        polygon: request.polygon.clone(),
    })
}

async fn query_portugal_layers(
    config: &Config,
    registry: &ClientRegistry,
    lat: f64,
    lng: f64,
) -> Result<Vec<LayerResult>, AppError> {
    let admin = AdministrativeService::new(config, registry)?;
    let cadastre = PtCadastreService::new(config, registry)?;
    let zoning = PtZoningService::new(config, registry)?;
    let landuse = LandUseService::new(config, registry)?;
    let elevation = ElevationService::new(config, registry)?;

    let (district, municipality, parish, nuts3, parcel, crus, ren, ran, cos, clc, built_up, elev) =
        tokio::join!(
            admin.district(lat, lng),
            admin.municipality(lat, lng),
            admin.parish(lat, lng),
            admin.nuts3(lat, lng),
            cadastre.lookup(lat, lng),
            zoning.crus(lat, lng),
            zoning.ren(lat, lng),
            zoning.ran(lat, lng),
            landuse.cos(lat, lng),
            landuse.clc(lat, lng),
            landuse.built_up(lat, lng),
            elevation.elevation(lat, lng),
        );

    Ok(vec![
        to_layer_result("admin-district", "District", district),
        to_layer_result("admin-municipality", "Municipality", municipality),
        to_layer_result("admin-parish", "Parish", parish),
        to_layer_result("admin-nuts3", "NUTS3 region", nuts3),
        to_layer_result(
            "cadastre-pt",
            "Cadastral parcel",
            parcel.map(|opt| opt.map(|info| serde_json::to_value(info).unwrap_or(Value::Null))),
        ),
        to_layer_result("zoning-crus", "CRUS classification", crus),
        to_layer_result("zoning-ren", "National Ecological Reserve", ren),
        to_layer_result("zoning-ran", "National Agricultural Reserve", ran),
        to_layer_result("landuse-cos", "COS land cover", cos),
        to_layer_result("landuse-clc", "CORINE land cover", clc),
        to_layer_result("landuse-builtup", "Built-up areas", built_up),
        to_layer_result(
            "elevation-open",
            "Elevation",
            elev.map(|opt| opt.map(|meters| json!({ "elevation_m": meters }))),
        ),
    ])
}

async fn query_spain_layers(
    config: &Config,
    registry: &ClientRegistry,
    lat: f64,
    lng: f64,
) -> Result<Vec<LayerResult>, AppError> {
    let catastro = EsCatastroService::new(config, registry)?;
    let zoning = WfsZoningService::spain(config, registry)?;
    let elevation = ElevationService::new(config, registry)?;

    let (parcel, zone, elev) = tokio::join!(
        catastro.lookup(lat, lng),
        zoning.lookup(lat, lng),
        elevation.elevation(lat, lng),
    );

    Ok(vec![
        to_layer_result(
            "cadastre-es",
            "Cadastral parcel",
            parcel.map(|opt| opt.map(|info| serde_json::to_value(info).unwrap_or(Value::Null))),
        ),
        to_layer_result("zoning-es", "Regional zoning", zone),
        to_layer_result(
            "elevation-open",
            "Elevation",
            elev.map(|opt| opt.map(|meters| json!({ "elevation_m": meters }))),
        ),
    ])
}

/// Buckets found layers by their id prefix into the semantic categories
/// (administrative/cadastre/zoning/landuse/elevation). Layers that found
/// nothing are omitted; the raw list is kept alongside for debugging.
pub fn layers_by_category(layers: &[LayerResult]) -> Value {
    let mut buckets: Map<String, Value> = Map::new();
    for layer in layers.iter().filter(|l| l.found) {
        let bucket = buckets
            .entry(layer.category().to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(entries) = bucket {
            entries.insert(
                layer.layer_id.clone(),
                layer.data.clone().unwrap_or(Value::Null),
            );
        }
    }
    Value::Object(buckets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucketing_groups_by_prefix() {
        let layers = vec![
            LayerResult::found("admin-parish", "Parish", json!({"name": "Alvalade"})),
            LayerResult::found("zoning-crus", "CRUS", json!({"code": "1.1"})),
            LayerResult::not_found("zoning-ren", "REN"),
            LayerResult::failed("landuse-cos", "COS", "timeout".to_string()),
        ];
        let buckets = layers_by_category(&layers);
        assert!(buckets.get("administrative").is_some());
        assert!(buckets["administrative"].get("admin-parish").is_some());
        assert!(buckets.get("zoning").is_some());
        // Not-found and failed layers stay out of the buckets.
        assert!(buckets["zoning"].get("zoning-ren").is_none());
        assert!(buckets.get("landuse").is_none());
    }
}
