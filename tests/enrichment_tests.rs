/// Unit tests for enrichment logic
/// Tests request validation, parcel selection, layer categorization and
/// zoning translation idempotence — the pure parts of the pipeline.
use plot_enrichment_api::enrichment::validate_request;
use plot_enrichment_api::models::{Country, EnrichLocationRequest, LayerResult, ZoningInfo};

fn request(latitude: f64, longitude: f64) -> EnrichLocationRequest {
    EnrichLocationRequest {
        latitude,
        longitude,
        plot_id: None,
        store_results: false,
        translate: false,
        target_language: "en".to_string(),
    }
}

#[cfg(test)]
mod validation_tests {
    use super::*;
    use plot_enrichment_api::errors::AppError;

    #[test]
    fn valid_request_passes() {
        assert!(validate_request(&request(38.7223, -9.1393)).is_ok());
    }

    #[test]
    fn store_without_plot_id_rejected_before_io() {
        // No mock servers exist in this test: if validation did any I/O the
        // request would hang or error differently.
        let mut req = request(38.7223, -9.1393);
        req.store_results = true;
        let result = validate_request(&req);
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn store_with_plot_id_accepted() {
        let mut req = request(38.7223, -9.1393);
        req.store_results = true;
        req.plot_id = Some(uuid::Uuid::new_v4());
        assert!(validate_request(&req).is_ok());
    }

    #[test]
    fn out_of_range_coordinates_rejected() {
        assert!(validate_request(&request(91.0, 0.0)).is_err());
        assert!(validate_request(&request(0.0, 181.0)).is_err());
        assert!(validate_request(&request(f64::NAN, 0.0)).is_err());
        // A swapped Lisbon pair stays in range and cannot be caught here;
        // only pairs that leave the valid ranges are rejected.
        assert!(validate_request(&request(-9.1393, 38.7223)).is_ok());
    }
}

#[cfg(test)]
mod country_tests {
    use super::*;

    #[test]
    fn iso_codes_parse_case_insensitively() {
        assert_eq!(Country::from_code("pt"), Some(Country::Pt));
        assert_eq!(Country::from_code("ES"), Some(Country::Es));
        assert_eq!(Country::from_code("de"), Some(Country::De));
        assert_eq!(Country::from_code("fr"), None);
        assert_eq!(Country::from_code(""), None);
    }

    #[test]
    fn layer_sets_exist_for_pt_and_es_only() {
        assert!(Country::Pt.has_layer_set());
        assert!(Country::Es.has_layer_set());
        assert!(!Country::De.has_layer_set());
    }
}

#[cfg(test)]
mod selection_tests {
    use plot_enrichment_api::geometry::Geometry;
    use plot_enrichment_api::parcels::{select_best_parcel, ParcelCandidate};

    fn candidate(reference: &str, ring: Vec<Vec<f64>>) -> ParcelCandidate {
        ParcelCandidate {
            reference: reference.to_string(),
            geometry: Some(Geometry::Polygon {
                coordinates: vec![ring],
            }),
            area_m2: None,
        }
    }

    #[test]
    fn containment_wins_regardless_of_other_candidates_proximity() {
        // Point strictly inside exactly one polygon among several; the other
        // candidates have much closer centroids.
        let containing = candidate(
            "PT-123",
            vec![
                vec![-9.30, 38.60],
                vec![-9.00, 38.60],
                vec![-9.00, 38.90],
                vec![-9.30, 38.90],
                vec![-9.30, 38.60],
            ],
        );
        let tiny_near = candidate(
            "PT-999",
            vec![
                vec![-9.1401, 38.7230],
                vec![-9.1400, 38.7230],
                vec![-9.1400, 38.7231],
                vec![-9.1401, 38.7230],
            ],
        );

        let selected =
            select_best_parcel(-9.1393, 38.7223, &[tiny_near, containing]).unwrap();
        assert_eq!(selected.reference, "PT-123");
        assert!(selected.contains_point);
        assert_eq!(selected.distance_m, 0.0);
    }

    #[test]
    fn fallback_distance_is_positive() {
        let only = candidate(
            "PT-1",
            vec![
                vec![-9.20, 38.80],
                vec![-9.19, 38.80],
                vec![-9.19, 38.81],
                vec![-9.20, 38.80],
            ],
        );
        let selected = select_best_parcel(-9.1393, 38.7223, &[only]).unwrap();
        assert!(!selected.contains_point);
        assert!(selected.distance_m > 0.0);
    }
}

#[cfg(test)]
mod categorization_tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn layer_ids_bucket_by_prefix() {
        let layer = LayerResult::found("admin-parish", "Parish", json!({}));
        assert_eq!(layer.category(), "administrative");

        let layer = LayerResult::found("zoning-crus", "CRUS", json!({}));
        assert_eq!(layer.category(), "zoning");

        let layer = LayerResult::found("landuse-cos", "COS", json!({}));
        assert_eq!(layer.category(), "landuse");

        let layer = LayerResult::found("cadastre-pt", "Cadastre", json!({}));
        assert_eq!(layer.category(), "cadastre");

        let layer = LayerResult::found("elevation-open", "Elevation", json!({}));
        assert_eq!(layer.category(), "elevation");
    }

    #[test]
    fn not_found_carries_no_error_and_no_data() {
        // "No feature here" is not an error; the two outcomes must stay
        // distinguishable by the absence of the error field.
        let layer = LayerResult::not_found("zoning-ren", "REN");
        assert!(!layer.found);
        assert!(layer.data.is_none());
        assert!(layer.error.is_none());

        let layer = LayerResult::failed("zoning-ren", "REN", "timeout".to_string());
        assert!(!layer.found);
        assert!(layer.error.is_some());
    }
}

#[cfg(test)]
mod translation_tests {
    use super::*;
    use plot_enrichment_api::translation_client::{apply_zoning_translation, TranslationClient};

    fn zoning(label: &str) -> ZoningInfo {
        ZoningInfo {
            label: Some(label.to_string()),
            label_original: None,
            translated: false,
            translation_confidence: None,
            designation: Some(label.to_string()),
            land_cover: None,
            parish: None,
            source: "crus+cos+caop".to_string(),
            country: Country::Pt,
        }
    }

    #[tokio::test]
    async fn already_translated_zoning_is_left_untouched() {
        // The client points nowhere reachable; the idempotence guard must
        // short-circuit before any request is attempted.
        let client =
            TranslationClient::new("http://127.0.0.1:1".to_string(), None).unwrap();

        let mut info = zoning("Espaços urbanos");
        info.label = Some("Urban areas".to_string());
        info.label_original = Some("Espaços urbanos".to_string());
        info.translated = true;

        let applied = apply_zoning_translation(&mut info, &client, "en").await;

        assert!(!applied);
        assert_eq!(info.label.as_deref(), Some("Urban areas"));
        assert_eq!(info.label_original.as_deref(), Some("Espaços urbanos"));
        assert!(info.translated);
    }

    #[tokio::test]
    async fn failed_translation_degrades_to_original_label() {
        let client =
            TranslationClient::new("http://127.0.0.1:1".to_string(), None).unwrap();

        let mut info = zoning("Espaços agrícolas");
        let applied = apply_zoning_translation(&mut info, &client, "en").await;

        assert!(!applied);
        assert_eq!(info.label.as_deref(), Some("Espaços agrícolas"));
        assert!(info.label_original.is_none());
        assert!(!info.translated);
    }
}

#[cfg(test)]
mod error_handling_tests {
    use plot_enrichment_api::errors::AppError;

    #[test]
    fn test_app_error_types() {
        let db_error = AppError::DatabaseError(sqlx::Error::RowNotFound);
        assert!(matches!(db_error, AppError::DatabaseError(_)));

        let api_error = AppError::ExternalApiError("Overpass timeout".to_string());
        assert!(matches!(api_error, AppError::ExternalApiError(_)));

        let not_found = AppError::NotFound("No parcel at this point".to_string());
        assert!(matches!(not_found, AppError::NotFound(_)));

        let bad_request = AppError::BadRequest("store_results requires plot_id".to_string());
        assert!(matches!(bad_request, AppError::BadRequest(_)));
    }

    #[test]
    fn test_error_display() {
        let error = AppError::ExternalApiError("Connection timeout".to_string());
        let display = format!("{}", error);
        assert!(display.contains("External API error"));
        assert!(display.contains("Connection timeout"));

        let error = AppError::NotFound("Plot not found".to_string());
        let display = format!("{}", error);
        assert!(display.contains("Not found"));
        assert!(display.contains("Plot not found"));
    }
}

#[cfg(test)]
mod cache_tests {
    use moka::future::Cache;
    use std::time::Duration;

    #[tokio::test]
    async fn negative_geocode_lookups_are_cacheable() {
        // Option-valued entries distinguish "not looked up" from "looked up,
        // nothing there" — the ocean case must not re-query Nominatim.
        let cache: Cache<String, Option<String>> = Cache::builder()
            .time_to_live(Duration::from_secs(60))
            .max_capacity(100)
            .build();

        cache.insert("revgeo:0.00000:0.00000".to_string(), None).await;

        let value = cache.get(&"revgeo:0.00000:0.00000".to_string()).await;
        assert_eq!(value, Some(None));

        let missing = cache.get(&"revgeo:1.00000:1.00000".to_string()).await;
        assert_eq!(missing, None);
    }
}
