use crate::cache_validator::ValidatedCacheEntry;
use crate::clients::ClientRegistry;
use crate::config::Config;
use crate::db_storage::PlotStorage;
use crate::errors::AppError;
use crate::geometry::validate_coordinates;
use crate::layers::query_all_layers;
use crate::models::*;
use crate::translation_client::TranslationClient;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use moka::future::Cache;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Application configuration.
    pub config: Config,
    /// Outbound HTTP client registry, one client per upstream base URL.
    pub registry: Arc<ClientRegistry>,
    /// Client for the zoning-label translation gateway (optional).
    pub translation_client: Option<TranslationClient>,
    /// Reverse-geocode cache. Negative lookups are cached too, so open-water
    /// points do not hit Nominatim repeatedly.
    pub geocode_cache: Cache<String, Option<Municipality>>,
    /// Layer-query response cache (checksummed JSON strings).
    pub layer_cache: Cache<String, String>,
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "plot-enrichment-api",
            "version": "0.1.0"
        })),
    )
}

/// POST /api/v1/enrich
///
/// Runs the full enrichment pipeline for a coordinate. Validation failures
/// (bad coordinates, `store_results` without `plot_id`) reject before any
/// network or database I/O; everything else lands in the response's stage
/// lists rather than an error status.
pub async fn enrich_location(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EnrichLocationRequest>,
) -> Result<Json<EnrichLocationResponse>, AppError> {
    tracing::info!(
        "POST /enrich - ({}, {}) store={} translate={}",
        request.latitude,
        request.longitude,
        request.store_results,
        request.translate
    );

    let response = crate::enrichment::enrich_location(state, request).await?;
    Ok(Json(response))
}

/// POST /api/v1/layers
///
/// Queries the per-country layer set for a coordinate. Responses are cached
/// for a while with an integrity checksum; a corrupted entry is re-queried.
pub async fn query_layers(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LayerQueryRequest>,
) -> Result<Json<LayerQueryResponse>, AppError> {
    tracing::info!(
        "POST /layers - ({}, {}) [{}]",
        request.lat,
        request.lng,
        request.country
    );

    let cache_key = format!(
        "layers:{}:{:.5}:{:.5}:{}",
        request.country,
        request.lat,
        request.lng,
        request.area_m2.unwrap_or(0.0)
    );

    if let Some(cached) = state.layer_cache.get(&cache_key).await {
        if let Some(valid_data) = ValidatedCacheEntry::deserialize_and_validate(&cached) {
            if let Ok(response) = serde_json::from_str::<LayerQueryResponse>(&valid_data) {
                tracing::debug!("Layer cache HIT (validated) for {}", cache_key);
                return Ok(Json(response));
            }
        } else {
            tracing::warn!("Layer cache entry corrupted for {}, re-querying", cache_key);
        }
    }

    let response = query_all_layers(&state.config, &state.registry, &request).await?;

    if let Ok(serialized) = serde_json::to_string(&response) {
        let entry = ValidatedCacheEntry::new(serialized);
        state.layer_cache.insert(cache_key, entry.serialize()).await;
    }

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct CoordinateQuery {
    pub lat: f64,
    pub lng: f64,
}

/// GET /api/v1/amenities
///
/// Nearest amenities of each category around a point (10 km radius).
pub async fn amenities_lookup(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CoordinateQuery>,
) -> Result<Json<AmenitiesInfo>, AppError> {
    validate_coordinates(params.lat, params.lng)?;

    let service = crate::amenities::AmenitiesService::new(&state.config, &state.registry)?;
    let info = service.nearby(params.lat, params.lng).await?;

    Ok(Json(info))
}

#[derive(Debug, Deserialize)]
pub struct CadastreQuery {
    pub lat: f64,
    pub lng: f64,
    pub country: Country,
}

/// GET /api/v1/cadastre
///
/// Point lookup of the best cadastral parcel, independent of the pipeline.
pub async fn cadastre_lookup(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CadastreQuery>,
) -> Result<Json<CadastralInfo>, AppError> {
    validate_coordinates(params.lat, params.lng)?;

    let parcel = match params.country {
        Country::Pt => {
            crate::enrichment::pt_cadastre_with_fallback(&state, params.lat, params.lng).await?
        }
        Country::Es => {
            let service =
                crate::connectors::cadastre_es::EsCatastroService::new(&state.config, &state.registry)?;
            service.lookup(params.lat, params.lng).await?
        }
        Country::De => {
            return Err(AppError::BadRequest(
                "Cadastre lookups support PT and ES only".to_string(),
            ))
        }
    };

    parcel.map(Json).ok_or_else(|| {
        AppError::NotFound(format!(
            "No cadastral parcel near ({}, {})",
            params.lat, params.lng
        ))
    })
}

/// GET /api/v1/plots/:id/enrichment
///
/// Returns the stored plot row with its merged enrichment record.
pub async fn get_plot_enrichment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PlotRecord>, AppError> {
    tracing::info!("GET /plots/{}/enrichment", id);

    let storage = PlotStorage::new(state.db.clone());
    let plot = storage
        .get_plot(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Plot {} not found", id)))?;

    Ok(Json(plot))
}
