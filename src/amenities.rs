//! Amenity proximity engine.
//!
//! One combined Overpass QL query fetches all nine amenity categories in a
//! single round trip; the response is bucketed by OSM tags and the nearest
//! feature per category is selected by haversine distance. Way geometry is
//! walked vertex by vertex, so a way is as accurate as its vertex density.

use crate::clients::{self, ClientRegistry};
use crate::config::Config;
use crate::errors::AppError;
use crate::geometry::haversine_distance;
use crate::models::{AmenitiesInfo, NearestAmenity};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Search radius for the combined query.
pub const AMENITY_RADIUS_M: u32 = 10_000;

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    element_type: String,
    id: i64,
    lat: Option<f64>,
    lon: Option<f64>,
    /// Way vertex chain, present with `out body geom`.
    #[serde(default)]
    geometry: Vec<OverpassVertex>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct OverpassVertex {
    lat: f64,
    lon: f64,
}

impl OverpassElement {
    /// Minimum distance from the query point to this element: the node
    /// coordinate, or the nearest vertex of the way.
    fn min_distance(&self, lat: f64, lon: f64) -> Option<(f64, f64, f64)> {
        if let (Some(elat), Some(elon)) = (self.lat, self.lon) {
            return Some((haversine_distance(lon, lat, elon, elat), elat, elon));
        }
        let mut best: Option<(f64, f64, f64)> = None;
        for vertex in &self.geometry {
            let d = haversine_distance(lon, lat, vertex.lon, vertex.lat);
            if best.map(|(bd, _, _)| d < bd).unwrap_or(true) {
                best = Some((d, vertex.lat, vertex.lon));
            }
        }
        best
    }
}

/// The nine amenity categories resolved per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Coastline,
    Beach,
    Airport,
    Town,
    PublicTransport,
    Supermarket,
    Convenience,
    Restaurant,
    Cafe,
}

fn categorize(tags: &BTreeMap<String, String>) -> Option<Category> {
    let tag = |key: &str| tags.get(key).map(String::as_str);
    match tag("natural") {
        Some("coastline") => return Some(Category::Coastline),
        Some("beach") => return Some(Category::Beach),
        _ => {}
    }
    if tag("aeroway") == Some("aerodrome") {
        return Some(Category::Airport);
    }
    if matches!(tag("place"), Some("town") | Some("city")) {
        return Some(Category::Town);
    }
    if tag("public_transport") == Some("station")
        || tag("highway") == Some("bus_stop")
        || tag("railway") == Some("station")
    {
        return Some(Category::PublicTransport);
    }
    match tag("shop") {
        Some("supermarket") => return Some(Category::Supermarket),
        Some("convenience") => return Some(Category::Convenience),
        _ => {}
    }
    match tag("amenity") {
        Some("restaurant") | Some("fast_food") => Some(Category::Restaurant),
        Some("cafe") => Some(Category::Cafe),
        _ => None,
    }
}

/// Overpass client with mirrored endpoints, tried in order; each endpoint
/// gets its own bounded retry inside the HTTP layer.
pub struct AmenitiesService {
    endpoints: Vec<(String, reqwest::Client)>,
}

impl AmenitiesService {
    pub fn new(config: &Config, registry: &ClientRegistry) -> Result<Self, AppError> {
        let mut endpoints = Vec::with_capacity(config.overpass_endpoints.len());
        for endpoint in &config.overpass_endpoints {
            let client = registry.client_for(endpoint, Duration::from_secs(60))?;
            endpoints.push((endpoint.clone(), client));
        }
        Ok(Self { endpoints })
    }

    fn build_query(latitude: f64, longitude: f64) -> String {
        let around = format!("(around:{},{},{})", AMENITY_RADIUS_M, latitude, longitude);
        format!(
            "[out:json][timeout:60];\n(\n\
             way[\"natural\"=\"coastline\"]{a};\n\
             node[\"natural\"=\"beach\"]{a};\n\
             way[\"natural\"=\"beach\"]{a};\n\
             node[\"aeroway\"=\"aerodrome\"]{a};\n\
             way[\"aeroway\"=\"aerodrome\"]{a};\n\
             node[\"place\"~\"^(town|city)$\"]{a};\n\
             node[\"public_transport\"=\"station\"]{a};\n\
             node[\"highway\"=\"bus_stop\"]{a};\n\
             node[\"railway\"=\"station\"]{a};\n\
             node[\"shop\"=\"supermarket\"]{a};\n\
             way[\"shop\"=\"supermarket\"]{a};\n\
             node[\"shop\"=\"convenience\"]{a};\n\
             node[\"amenity\"~\"^(restaurant|fast_food)$\"]{a};\n\
             node[\"amenity\"=\"cafe\"]{a};\n\
             );\nout body geom;",
            a = around
        )
    }

    /// Nearest feature of each category within `AMENITY_RADIUS_M`.
    pub async fn nearby(&self, latitude: f64, longitude: f64) -> Result<AmenitiesInfo, AppError> {
        let query = Self::build_query(latitude, longitude);
        let mut last_error: Option<AppError> = None;

        for (endpoint, client) in &self.endpoints {
            let url = reqwest::Url::parse(endpoint).map_err(|e| {
                AppError::ExternalApiError(format!("Invalid Overpass endpoint: {}", e))
            })?;

            match clients::post_form::<OverpassResponse>(
                client,
                url,
                &[("data", query.as_str())],
                "Overpass",
            )
            .await
            {
                Ok(response) => {
                    tracing::info!(
                        "Overpass returned {} elements from {}",
                        response.elements.len(),
                        endpoint
                    );
                    return Ok(bucket_nearest(latitude, longitude, response));
                }
                Err(e) => {
                    tracing::warn!("Overpass endpoint {} failed: {}", endpoint, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            AppError::ExternalApiError("No Overpass endpoints configured".to_string())
        }))
    }
}

fn bucket_nearest(latitude: f64, longitude: f64, response: OverpassResponse) -> AmenitiesInfo {
    let mut info = AmenitiesInfo {
        radius_m: AMENITY_RADIUS_M,
        ..Default::default()
    };

    for element in &response.elements {
        let Some(category) = categorize(&element.tags) else {
            continue;
        };
        let Some((distance, elat, elon)) = element.min_distance(latitude, longitude) else {
            continue;
        };

        let slot = match category {
            Category::Coastline => &mut info.coastline,
            Category::Beach => &mut info.beach,
            Category::Airport => &mut info.airport,
            Category::Town => &mut info.town,
            Category::PublicTransport => &mut info.public_transport,
            Category::Supermarket => &mut info.supermarket,
            Category::Convenience => &mut info.convenience,
            Category::Restaurant => &mut info.restaurant,
            Category::Cafe => &mut info.cafe,
        };

        let closer = slot
            .as_ref()
            .map(|current| distance < current.distance_m)
            .unwrap_or(true);
        if closer {
            *slot = Some(NearestAmenity {
                name: element.tags.get("name").cloned(),
                latitude: elat,
                longitude: elon,
                distance_m: distance,
                osm_type: element.element_type.clone(),
                osm_id: element.id,
            });
        }
    }

    info
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn categorizes_by_osm_tags() {
        assert_eq!(
            categorize(&tags(&[("natural", "coastline")])),
            Some(Category::Coastline)
        );
        assert_eq!(
            categorize(&tags(&[("amenity", "fast_food")])),
            Some(Category::Restaurant)
        );
        assert_eq!(
            categorize(&tags(&[("place", "city")])),
            Some(Category::Town)
        );
        assert_eq!(categorize(&tags(&[("place", "hamlet")])), None);
        assert_eq!(categorize(&tags(&[])), None);
    }

    #[test]
    fn way_distance_uses_every_vertex() {
        // Endpoints are far; an interior vertex is near. The element distance
        // must reflect the near interior vertex.
        let element = OverpassElement {
            element_type: "way".to_string(),
            id: 1,
            lat: None,
            lon: None,
            geometry: vec![
                OverpassVertex { lat: 39.5, lon: -9.5 },
                OverpassVertex { lat: 38.7001, lon: -9.1394 },
                OverpassVertex { lat: 38.0, lon: -8.5 },
            ],
            tags: BTreeMap::new(),
        };
        let (distance, lat, _lon) = element.min_distance(38.7, -9.14).unwrap();
        assert!(distance < 100.0, "got {}", distance);
        assert!((lat - 38.7001).abs() < 1e-9);
    }

    #[test]
    fn nearest_per_category_wins() {
        let response = OverpassResponse {
            elements: vec![
                OverpassElement {
                    element_type: "node".to_string(),
                    id: 1,
                    lat: Some(38.8),
                    lon: Some(-9.14),
                    geometry: vec![],
                    tags: tags(&[("shop", "supermarket"), ("name", "Far Market")]),
                },
                OverpassElement {
                    element_type: "node".to_string(),
                    id: 2,
                    lat: Some(38.701),
                    lon: Some(-9.14),
                    geometry: vec![],
                    tags: tags(&[("shop", "supermarket"), ("name", "Near Market")]),
                },
            ],
        };
        let info = bucket_nearest(38.7, -9.14, response);
        let nearest = info.supermarket.unwrap();
        assert_eq!(nearest.name.as_deref(), Some("Near Market"));
        assert_eq!(nearest.osm_id, 2);
        assert!(info.cafe.is_none());
    }

    #[test]
    fn combined_query_covers_all_categories() {
        let query = AmenitiesService::build_query(38.7223, -9.1393);
        for needle in [
            "coastline",
            "beach",
            "aerodrome",
            "town|city",
            "bus_stop",
            "supermarket",
            "convenience",
            "restaurant|fast_food",
            "cafe",
        ] {
            assert!(query.contains(needle), "query missing {}", needle);
        }
        assert!(query.contains("out body geom"));
    }
}
