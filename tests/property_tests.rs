/// Property-based tests using proptest
/// Tests invariants of the spatial primitives and the shallow JSON merge
/// that backs the enrichment_data upsert.
use plot_enrichment_api::db_storage::shallow_merge;
use plot_enrichment_api::geometry::{
    centroid, haversine_distance, point_in_geometry, validate_coordinates, BoundingBox, Geometry,
};
use proptest::prelude::*;
use serde_json::json;

fn rect(min_lon: f64, min_lat: f64, width: f64, height: f64) -> Geometry {
    Geometry::Polygon {
        coordinates: vec![vec![
            vec![min_lon, min_lat],
            vec![min_lon + width, min_lat],
            vec![min_lon + width, min_lat + height],
            vec![min_lon, min_lat + height],
            vec![min_lon, min_lat],
        ]],
    }
}

// Property: haversine distance is a metric-ish function on valid coordinates
proptest! {
    #[test]
    fn haversine_is_non_negative(
        lon1 in -180.0f64..180.0, lat1 in -90.0f64..90.0,
        lon2 in -180.0f64..180.0, lat2 in -90.0f64..90.0
    ) {
        let d = haversine_distance(lon1, lat1, lon2, lat2);
        prop_assert!(d >= 0.0);
        prop_assert!(d.is_finite());
        // No two points on Earth are farther apart than half the circumference.
        prop_assert!(d <= 20_100_000.0);
    }

    #[test]
    fn haversine_is_symmetric(
        lon1 in -180.0f64..180.0, lat1 in -90.0f64..90.0,
        lon2 in -180.0f64..180.0, lat2 in -90.0f64..90.0
    ) {
        let forward = haversine_distance(lon1, lat1, lon2, lat2);
        let backward = haversine_distance(lon2, lat2, lon1, lat1);
        prop_assert!((forward - backward).abs() < 1e-6);
    }

    #[test]
    fn haversine_of_identical_points_is_zero(
        lon in -180.0f64..180.0, lat in -90.0f64..90.0
    ) {
        prop_assert_eq!(haversine_distance(lon, lat, lon, lat), 0.0);
    }
}

// Property: ray casting on generated rectangles
proptest! {
    #[test]
    fn interior_points_are_inside(
        min_lon in -170.0f64..160.0, min_lat in -80.0f64..70.0,
        width in 0.01f64..5.0, height in 0.01f64..5.0,
        fx in 0.05f64..0.95, fy in 0.05f64..0.95
    ) {
        let geometry = rect(min_lon, min_lat, width, height);
        let lon = min_lon + width * fx;
        let lat = min_lat + height * fy;
        prop_assert!(point_in_geometry(lon, lat, &geometry));
    }

    #[test]
    fn exterior_points_are_outside(
        min_lon in -170.0f64..160.0, min_lat in -80.0f64..70.0,
        width in 0.01f64..5.0, height in 0.01f64..5.0,
        offset in 0.5f64..10.0
    ) {
        let geometry = rect(min_lon, min_lat, width, height);
        // A point shifted beyond the rectangle's right edge.
        let lon = min_lon + width * (1.0 + offset);
        let lat = min_lat + height / 2.0;
        prop_assert!(!point_in_geometry(lon, lat, &geometry));
    }

    #[test]
    fn centroid_of_rectangle_lies_within_it(
        min_lon in -170.0f64..160.0, min_lat in -80.0f64..70.0,
        width in 0.01f64..5.0, height in 0.01f64..5.0
    ) {
        let geometry = rect(min_lon, min_lat, width, height);
        let (clon, clat) = centroid(&geometry).unwrap();
        prop_assert!(clon >= min_lon && clon <= min_lon + width);
        prop_assert!(clat >= min_lat && clat <= min_lat + height);
        // The centroid of a convex ring is inside it.
        prop_assert!(point_in_geometry(clon, clat, &geometry));
    }
}

// Property: coordinate validation accepts exactly the valid ranges
proptest! {
    #[test]
    fn in_range_coordinates_accepted(lat in -90.0f64..=90.0, lon in -180.0f64..=180.0) {
        prop_assert!(validate_coordinates(lat, lon).is_ok());
    }

    #[test]
    fn out_of_range_latitude_rejected(lat in 90.0001f64..1e6, lon in -180.0f64..=180.0) {
        prop_assert!(validate_coordinates(lat, lon).is_err());
        prop_assert!(validate_coordinates(-lat, lon).is_err());
    }

    #[test]
    fn out_of_range_longitude_rejected(lat in -90.0f64..=90.0, lon in 180.0001f64..1e6) {
        prop_assert!(validate_coordinates(lat, lon).is_err());
        prop_assert!(validate_coordinates(lat, -lon).is_err());
    }
}

// Property: the derived bounding box is centered on the point
proptest! {
    #[test]
    fn area_bbox_contains_its_center(
        lat in -80.0f64..80.0, lon in -179.0f64..179.0,
        area in 1.0f64..10_000_000.0
    ) {
        let bbox = BoundingBox::from_area(lat, lon, area);
        prop_assert!(bbox.contains(lat, lon));
        prop_assert!(bbox.min_lat < bbox.max_lat);
        prop_assert!(bbox.min_lon < bbox.max_lon);
    }
}

// Property: the shallow merge backing the enrichment_data upsert.
// Disjoint top-level keys always survive; identical keys are last-write-wins.
proptest! {
    #[test]
    fn merge_preserves_disjoint_keys(
        zoning_label in "[a-z]{1,12}",
        layer_count in 0usize..50
    ) {
        let existing = json!({"zoning": {"label": zoning_label}});
        let new = json!({"layers": {"count": layer_count}});

        let merged = shallow_merge(&existing, &new);

        prop_assert_eq!(&merged["zoning"]["label"], &json!(zoning_label));
        prop_assert_eq!(&merged["layers"]["count"], &json!(layer_count));
    }

    #[test]
    fn merge_result_has_union_of_keys(
        keys_a in proptest::collection::btree_set("[a-z]{1,8}", 0..6),
        keys_b in proptest::collection::btree_set("[a-z]{1,8}", 0..6)
    ) {
        let existing = json!(keys_a.iter()
            .map(|k| (k.clone(), json!("old")))
            .collect::<serde_json::Map<_, _>>());
        let new = json!(keys_b.iter()
            .map(|k| (k.clone(), json!("new")))
            .collect::<serde_json::Map<_, _>>());

        let merged = shallow_merge(&existing, &new);
        let merged_obj = merged.as_object().unwrap();

        for key in keys_a.union(&keys_b) {
            prop_assert!(merged_obj.contains_key(key), "missing key {}", key);
        }
        // Keys from `new` win; keys only in `existing` keep their value.
        for key in &keys_b {
            prop_assert_eq!(&merged_obj[key], &json!("new"));
        }
        for key in keys_a.difference(&keys_b) {
            prop_assert_eq!(&merged_obj[key], &json!("old"));
        }
    }

    #[test]
    fn merge_is_idempotent(
        key in "[a-z]{1,8}",
        value in "[a-z]{1,12}"
    ) {
        let existing = json!({});
        let new = json!({ key.clone(): value });

        let once = shallow_merge(&existing, &new);
        let twice = shallow_merge(&once, &new);

        prop_assert_eq!(once, twice);
    }
}
