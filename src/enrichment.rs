/// Shared enrichment pipeline for the HTTP handlers and the batch workers.
///
/// `enrich_location` runs a fixed five-stage sequence, each stage
/// fault-isolated so a failure is recorded and the pipeline continues:
/// 1. Municipality resolution (always; sole source of country)
/// 2. Layer aggregation (PT/ES only)
/// 3. Amenities proximity (always, country-independent)
/// 4. Country-specific cadastre + zoning (+ optional label translation)
/// 5. Persistence (when requested, with a plot id)
use crate::amenities::AmenitiesService;
use crate::connectors::administrative::AdministrativeService;
use crate::connectors::cadastre_es::EsCatastroService;
use crate::connectors::cadastre_pt::{PtCadastreService, PtPropertyService};
use crate::connectors::geocoding::GeocodingService;
use crate::connectors::zoning::{PtZoningService, WfsZoningService};
use crate::db_storage::{shallow_merge, PlotStorage};
use crate::errors::AppError;
use crate::geometry::validate_coordinates;
use crate::handlers::AppState;
use crate::layers::{layers_by_category, query_all_layers};
use crate::models::{
    CadastralInfo, Coordinate, Country, EnrichLocationRequest, EnrichLocationResponse,
    LayerQueryRequest, Municipality, ZoningInfo,
};
use crate::translation_client::apply_zoning_translation;
use serde_json::{json, Value};
use std::sync::Arc;

/// Stage identifiers as they appear in the run/skipped/failed lists.
pub const STAGE_MUNICIPALITIES: &str = "municipalities";
pub const STAGE_LAYERS: &str = "layers";
pub const STAGE_AMENITIES: &str = "amenities";
pub const STAGE_CADASTRE: &str = "cadastre";
pub const STAGE_ZONING: &str = "zoning";
pub const STAGE_STORAGE: &str = "storage";

/// Validates an enrichment request synchronously, before any I/O.
pub fn validate_request(request: &EnrichLocationRequest) -> Result<(), AppError> {
    validate_coordinates(request.latitude, request.longitude)?;
    if request.store_results && request.plot_id.is_none() {
        return Err(AppError::BadRequest(
            "store_results requires plot_id".to_string(),
        ));
    }
    Ok(())
}

/// Reverse-geocodes the point, with a cache in front of Nominatim. The cached
/// value includes negative lookups so open-water points do not re-query.
pub async fn resolve_municipality(
    state: &Arc<AppState>,
    latitude: f64,
    longitude: f64,
) -> Result<Option<Municipality>, AppError> {
    let cache_key = format!("revgeo:{:.5}:{:.5}", latitude, longitude);

    if let Some(cached) = state.geocode_cache.get(&cache_key).await {
        tracing::debug!("Reverse-geocode cache HIT for {}", cache_key);
        return Ok(cached);
    }

    let service = GeocodingService::new(&state.config, &state.registry)?;
    let municipality = service.reverse(latitude, longitude).await?;

    state
        .geocode_cache
        .insert(cache_key, municipality.clone())
        .await;

    Ok(municipality)
}

/// Portugal cadastre with per-service fallback: the OGC API Features cadastre
/// first, the BUPi property boundaries when it has nothing.
pub(crate) async fn pt_cadastre_with_fallback(
    state: &Arc<AppState>,
    latitude: f64,
    longitude: f64,
) -> Result<Option<CadastralInfo>, AppError> {
    let cadastre = PtCadastreService::new(&state.config, &state.registry)?;
    match cadastre.lookup(latitude, longitude).await {
        Ok(Some(info)) => return Ok(Some(info)),
        Ok(None) => {
            tracing::info!("PT cadastre empty, falling back to BUPi");
        }
        Err(e) => {
            tracing::warn!("PT cadastre failed, falling back to BUPi: {}", e);
        }
    }

    let bupi = PtPropertyService::new(&state.config, &state.registry)?;
    bupi.lookup(latitude, longitude).await
}

/// Portugal zoning merged from up to three sub-sources: CRUS designation,
/// COS land cover and the administrative parish. The CRUS/COS lookups run at
/// the parcel centroid when a cadastral hint exists; the point a user dropped
/// may sit meters outside the parcel the classification applies to.
async fn pt_zoning(
    state: &Arc<AppState>,
    latitude: f64,
    longitude: f64,
    cadastre: Option<&CadastralInfo>,
) -> Result<Option<ZoningInfo>, AppError> {
    let (hint_lat, hint_lon) = cadastre
        .and_then(|c| c.centroid)
        .map(|c| (c.latitude, c.longitude))
        .unwrap_or((latitude, longitude));

    let zoning = PtZoningService::new(&state.config, &state.registry)?;
    let landuse = crate::connectors::landuse::LandUseService::new(&state.config, &state.registry)?;
    let admin = AdministrativeService::new(&state.config, &state.registry)?;

    let (crus, cos, parish) = tokio::join!(
        zoning.crus(hint_lat, hint_lon),
        landuse.cos(hint_lat, hint_lon),
        admin.parish(latitude, longitude),
    );

    // All three sub-sources erroring is a stage failure; anything less is a
    // degraded but valid result.
    if crus.is_err() && cos.is_err() && parish.is_err() {
        return Err(AppError::ExternalApiError(
            "All PT zoning sub-sources failed".to_string(),
        ));
    }

    let designation = crus
        .ok()
        .flatten()
        .and_then(|v| v.get("designation").and_then(|d| d.as_str()).map(String::from));
    let land_cover = cos
        .ok()
        .flatten()
        .and_then(|v| v.get("class").and_then(|c| c.as_str()).map(String::from));
    let parish_name = parish
        .ok()
        .flatten()
        .and_then(|v| v.get("name").and_then(|n| n.as_str()).map(String::from));

    if designation.is_none() && land_cover.is_none() && parish_name.is_none() {
        return Ok(None);
    }

    let label = designation.clone().or_else(|| land_cover.clone());
    Ok(Some(ZoningInfo {
        label,
        label_original: None,
        translated: false,
        translation_confidence: None,
        designation,
        land_cover,
        parish: parish_name,
        source: "crus+cos+caop".to_string(),
        country: Country::Pt,
    }))
}

/// Spain/Germany zoning from the regional WFS.
async fn wfs_zoning(
    state: &Arc<AppState>,
    country: Country,
    latitude: f64,
    longitude: f64,
) -> Result<Option<ZoningInfo>, AppError> {
    let service = match country {
        Country::Es => WfsZoningService::spain(&state.config, &state.registry)?,
        Country::De => WfsZoningService::germany(&state.config, &state.registry)?,
        Country::Pt => {
            return Err(AppError::InternalError(
                "PT zoning does not use the WFS path".to_string(),
            ))
        }
    };

    let Some(zone) = service.lookup(latitude, longitude).await? else {
        return Ok(None);
    };

    let designation = zone
        .get("designation")
        .and_then(|d| d.as_str())
        .map(String::from);

    Ok(Some(ZoningInfo {
        label: designation.clone(),
        label_original: None,
        translated: false,
        translation_confidence: None,
        designation,
        land_cover: None,
        parish: None,
        source: match country {
            Country::Es => "es-regional-wfs".to_string(),
            _ => "de-laender-wfs".to_string(),
        },
        country,
    }))
}

/// Complete enrichment pipeline for one location.
///
/// Returns `Err` only for validation failures (checked before any I/O).
/// Everything downstream is absorbed into the response: a stage that errors
/// lands in `enrichments_failed`, and only a run with zero successful stages
/// sets the response-level `error` field.
pub async fn enrich_location(
    state: Arc<AppState>,
    request: EnrichLocationRequest,
) -> Result<EnrichLocationResponse, AppError> {
    validate_request(&request)?;

    let latitude = request.latitude;
    let longitude = request.longitude;

    tracing::info!(
        "Starting enrichment for ({}, {}) plot_id={:?}",
        latitude,
        longitude,
        request.plot_id
    );

    let mut run: Vec<String> = Vec::new();
    let mut skipped: Vec<String> = Vec::new();
    let mut failed: Vec<String> = Vec::new();
    let mut enrichment_data = json!({});

    // Stage 1: Municipality resolution (sole source of country)
    tracing::info!("Stage 1: Resolving municipality");
    let municipality = match resolve_municipality(&state, latitude, longitude).await {
        Ok(Some(m)) => {
            run.push(STAGE_MUNICIPALITIES.to_string());
            enrichment_data = shallow_merge(
                &enrichment_data,
                &json!({ "municipality": serde_json::to_value(&m).unwrap_or(Value::Null) }),
            );
            Some(m)
        }
        Ok(None) => {
            tracing::warn!("⚠ No municipality at ({}, {})", latitude, longitude);
            failed.push(STAGE_MUNICIPALITIES.to_string());
            None
        }
        Err(e) => {
            tracing::warn!("Municipality resolution failed: {}", e);
            failed.push(STAGE_MUNICIPALITIES.to_string());
            None
        }
    };

    let country = municipality
        .as_ref()
        .and_then(|m| m.country_code.as_deref())
        .and_then(Country::from_code);

    // Stage 2: Layer aggregation (PT/ES only)
    let layers = match country {
        Some(c) if c.has_layer_set() => {
            tracing::info!("Stage 2: Querying all layers for {}", c);
            let layer_request = LayerQueryRequest {
                lat: latitude,
                lng: longitude,
                country: c,
                area_m2: None,
                polygon: None,
            };
            match query_all_layers(&state.config, &state.registry, &layer_request).await {
                Ok(response) => {
                    run.push(STAGE_LAYERS.to_string());
                    enrichment_data = shallow_merge(
                        &enrichment_data,
                        &json!({
                            "layers": {
                                "byCategory": layers_by_category(&response.layers),
                                "raw": serde_json::to_value(&response.layers)
                                    .unwrap_or(Value::Null),
                            }
                        }),
                    );
                    Some(response)
                }
                Err(e) => {
                    tracing::warn!("Layer aggregation failed: {}", e);
                    failed.push(STAGE_LAYERS.to_string());
                    None
                }
            }
        }
        _ => {
            tracing::info!("Stage 2: Skipped (no layer set for this country)");
            skipped.push(STAGE_LAYERS.to_string());
            None
        }
    };

    // Stage 3: Amenities (always, country-independent)
    tracing::info!("Stage 3: Amenity proximity search");
    let amenities = match AmenitiesService::new(&state.config, &state.registry) {
        Ok(service) => match service.nearby(latitude, longitude).await {
            Ok(info) => {
                run.push(STAGE_AMENITIES.to_string());
                enrichment_data = shallow_merge(
                    &enrichment_data,
                    &json!({ "amenities": serde_json::to_value(&info).unwrap_or(Value::Null) }),
                );
                Some(info)
            }
            Err(e) => {
                tracing::warn!("Amenity search failed: {}", e);
                failed.push(STAGE_AMENITIES.to_string());
                None
            }
        },
        Err(e) => {
            tracing::warn!("Amenity service unavailable: {}", e);
            failed.push(STAGE_AMENITIES.to_string());
            None
        }
    };

    // Stage 4: Country-specific cadastre + zoning
    let (cadastre, mut zoning) = match country {
        Some(Country::Pt) => {
            tracing::info!("Stage 4: PT cadastre, then zoning with parcel hint");
            let cadastre = match pt_cadastre_with_fallback(&state, latitude, longitude).await {
                Ok(info) => {
                    run.push(STAGE_CADASTRE.to_string());
                    info
                }
                Err(e) => {
                    tracing::warn!("PT cadastre failed: {}", e);
                    failed.push(STAGE_CADASTRE.to_string());
                    None
                }
            };
            let zoning = match pt_zoning(&state, latitude, longitude, cadastre.as_ref()).await {
                Ok(info) => {
                    run.push(STAGE_ZONING.to_string());
                    info
                }
                Err(e) => {
                    tracing::warn!("PT zoning failed: {}", e);
                    failed.push(STAGE_ZONING.to_string());
                    None
                }
            };
            (cadastre, zoning)
        }
        Some(Country::Es) => {
            tracing::info!("Stage 4: ES cadastre and zoning");
            let cadastre = match EsCatastroService::new(&state.config, &state.registry) {
                Ok(service) => match service.lookup(latitude, longitude).await {
                    Ok(info) => {
                        run.push(STAGE_CADASTRE.to_string());
                        info
                    }
                    Err(e) => {
                        tracing::warn!("ES cadastre failed: {}", e);
                        failed.push(STAGE_CADASTRE.to_string());
                        None
                    }
                },
                Err(e) => {
                    tracing::warn!("ES cadastre unavailable: {}", e);
                    failed.push(STAGE_CADASTRE.to_string());
                    None
                }
            };
            let zoning = match wfs_zoning(&state, Country::Es, latitude, longitude).await {
                Ok(info) => {
                    run.push(STAGE_ZONING.to_string());
                    info
                }
                Err(e) => {
                    tracing::warn!("ES zoning failed: {}", e);
                    failed.push(STAGE_ZONING.to_string());
                    None
                }
            };
            (cadastre, zoning)
        }
        Some(Country::De) => {
            tracing::info!("Stage 4: DE zoning only");
            skipped.push(STAGE_CADASTRE.to_string());
            let zoning = match wfs_zoning(&state, Country::De, latitude, longitude).await {
                Ok(info) => {
                    run.push(STAGE_ZONING.to_string());
                    info
                }
                Err(e) => {
                    tracing::warn!("DE zoning failed: {}", e);
                    failed.push(STAGE_ZONING.to_string());
                    None
                }
            };
            (None, zoning)
        }
        None => {
            tracing::info!("Stage 4: Skipped (country undetermined or unsupported)");
            skipped.push(STAGE_CADASTRE.to_string());
            skipped.push(STAGE_ZONING.to_string());
            (None, None)
        }
    };

    // Optional post-hoc zoning label translation
    if request.translate {
        if let (Some(zoning_info), Some(client)) = (&mut zoning, &state.translation_client) {
            apply_zoning_translation(zoning_info, client, &request.target_language).await;
        }
    }

    if let Some(info) = &cadastre {
        enrichment_data = shallow_merge(
            &enrichment_data,
            &json!({ "cadastral": serde_json::to_value(info).unwrap_or(Value::Null) }),
        );
    }
    if let Some(info) = &zoning {
        enrichment_data = shallow_merge(
            &enrichment_data,
            &json!({ "zoning": serde_json::to_value(info).unwrap_or(Value::Null) }),
        );
    }

    // Stage 5: Persistence
    if request.store_results {
        // plot_id presence was validated up front
        if let Some(plot_id) = request.plot_id {
            tracing::info!("Stage 5: Storing enrichment for plot {}", plot_id);
            let storage = PlotStorage::new(state.db.clone());
            let stored = storage
                .upsert_enrichment(plot_id, latitude, longitude, &enrichment_data)
                .await;
            match stored {
                Ok(()) => {
                    if let Err(e) = storage
                        .maybe_update_real_coordinates(plot_id, latitude, longitude)
                        .await
                    {
                        tracing::warn!("Real-coordinate update failed: {}", e);
                    }
                    run.push(STAGE_STORAGE.to_string());
                }
                Err(e) => {
                    // The in-memory result is still returned to the caller.
                    tracing::error!("✗ Persistence failed for plot {}: {}", plot_id, e);
                    failed.push(STAGE_STORAGE.to_string());
                }
            }
        }
    } else {
        skipped.push(STAGE_STORAGE.to_string());
    }

    let error = if run.is_empty() {
        Some("All enrichment stages failed".to_string())
    } else {
        None
    };

    tracing::info!(
        "Enrichment finished: {} run, {} skipped, {} failed",
        run.len(),
        skipped.len(),
        failed.len()
    );

    Ok(EnrichLocationResponse {
        location: Coordinate {
            latitude,
            longitude,
        },
        country,
        municipality,
        amenities,
        layers,
        zoning,
        cadastre,
        enrichment_data: Some(enrichment_data),
        enrichments_run: run,
        enrichments_skipped: skipped,
        enrichments_failed: failed,
        timestamp: chrono::Utc::now(),
        error,
    })
}
