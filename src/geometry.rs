use crate::errors::AppError;
use serde::{Deserialize, Serialize};

/// A GeoJSON position. Providers emit either `[lon, lat]` or `[lon, lat, z]`,
/// so positions are kept as variable-length arrays and read defensively.
pub type Position = Vec<f64>;

/// The subset of GeoJSON geometries the upstream services actually return.
///
/// Anything else (GeometryCollection, LineString, ...) fails deserialization
/// and is flagged as a parse error at the connector boundary instead of being
/// passed through raw.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: Position },
    Polygon { coordinates: Vec<Vec<Position>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Position>>> },
}

/// Mean Earth radius in meters, as used by the haversine formula.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude (and of longitude at the equator).
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Validates an EPSG:4326 coordinate pair before any I/O happens.
///
/// Rejects NaN/infinite values and out-of-range pairs. Callers that swap
/// lat/lon produce longitudes beyond ±90 for most of Iberia, which this
/// check catches early.
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), AppError> {
    if !latitude.is_finite() || !longitude.is_finite() {
        return Err(AppError::BadRequest(
            "Coordinates must be finite numbers".to_string(),
        ));
    }
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(AppError::BadRequest(format!(
            "Latitude {} out of range [-90, 90]",
            latitude
        )));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(AppError::BadRequest(format!(
            "Longitude {} out of range [-180, 180]",
            longitude
        )));
    }
    Ok(())
}

/// Great-circle distance in meters between two lon/lat points (haversine).
pub fn haversine_distance(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Centroid of a geometry as `(lon, lat)`.
///
/// For `Polygon`, the arithmetic mean of the exterior-ring vertices. For
/// `MultiPolygon`, only the first polygon's exterior ring is used — an
/// inherited simplification that is not area-weighted across parts.
pub fn centroid(geometry: &Geometry) -> Option<(f64, f64)> {
    match geometry {
        Geometry::Point { coordinates } => {
            if coordinates.len() >= 2 {
                Some((coordinates[0], coordinates[1]))
            } else {
                None
            }
        }
        Geometry::Polygon { coordinates } => ring_centroid(coordinates.first()?),
        Geometry::MultiPolygon { coordinates } => {
            ring_centroid(coordinates.first()?.first()?)
        }
    }
}

fn ring_centroid(ring: &[Position]) -> Option<(f64, f64)> {
    let mut sum_lon = 0.0;
    let mut sum_lat = 0.0;
    let mut count = 0usize;
    for vertex in ring {
        if vertex.len() >= 2 {
            sum_lon += vertex[0];
            sum_lat += vertex[1];
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    Some((sum_lon / count as f64, sum_lat / count as f64))
}

/// Ray-casting point-in-polygon test.
///
/// `Polygon` tests against the exterior ring only; `MultiPolygon` returns
/// true if the point falls inside any member polygon.
pub fn point_in_geometry(lon: f64, lat: f64, geometry: &Geometry) -> bool {
    match geometry {
        Geometry::Point { .. } => false,
        Geometry::Polygon { coordinates } => coordinates
            .first()
            .map(|ring| ray_cast(lon, lat, ring))
            .unwrap_or(false),
        Geometry::MultiPolygon { coordinates } => coordinates.iter().any(|polygon| {
            polygon
                .first()
                .map(|ring| ray_cast(lon, lat, ring))
                .unwrap_or(false)
        }),
    }
}

fn ray_cast(lon: f64, lat: f64, ring: &[Position]) -> bool {
    let mut inside = false;
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = match (ring[i].first(), ring[i].get(1)) {
            (Some(x), Some(y)) => (*x, *y),
            _ => continue,
        };
        let (xj, yj) = match (ring[j].first(), ring[j].get(1)) {
            (Some(x), Some(y)) => (*x, *y),
            _ => {
                j = i;
                continue;
            }
        };
        if ((yi > lat) != (yj > lat))
            && (lon < (xj - xi) * (lat - yi) / (yj - yi) + xi)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// An axis-aligned EPSG:4326 bounding box.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Square box of side `sqrt(area_m2)` centered on the point. Not a true
    /// area-preserving circle; longitude span is widened by cos(lat).
    pub fn from_area(latitude: f64, longitude: f64, area_m2: f64) -> Self {
        let side_m = area_m2.max(0.0).sqrt();
        let half_lat = side_m / 2.0 / METERS_PER_DEGREE;
        let cos_lat = latitude.to_radians().cos().abs().max(1e-6);
        let half_lon = side_m / 2.0 / (METERS_PER_DEGREE * cos_lat);
        Self {
            min_lon: longitude - half_lon,
            min_lat: latitude - half_lat,
            max_lon: longitude + half_lon,
            max_lat: latitude + half_lat,
        }
    }

    /// Box spanning `buffer_deg` degrees on each side of the point.
    pub fn from_buffer(latitude: f64, longitude: f64, buffer_deg: f64) -> Self {
        Self {
            min_lon: longitude - buffer_deg,
            min_lat: latitude - buffer_deg,
            max_lon: longitude + buffer_deg,
            max_lat: latitude + buffer_deg,
        }
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.min_lat
            && latitude <= self.max_lat
            && longitude >= self.min_lon
            && longitude <= self.max_lon
    }

    /// `minLon,minLat,maxLon,maxLat` — the order OGC API Features and WFS
    /// bbox parameters expect for EPSG:4326 with lon/lat axis order.
    pub fn to_param(&self) -> String {
        format!(
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn square(min: f64, max: f64) -> Geometry {
        Geometry::Polygon {
            coordinates: vec![vec![
                vec![min, min],
                vec![max, min],
                vec![max, max],
                vec![min, max],
                vec![min, min],
            ]],
        }
    }

    #[test]
    fn haversine_known_distance() {
        // Lisbon to Porto, roughly 274 km
        let d = haversine_distance(-9.1393, 38.7223, -8.6291, 41.1579);
        assert!((d - 274_000.0).abs() < 5_000.0, "got {}", d);
    }

    #[test]
    fn haversine_zero_for_same_point() {
        assert_eq!(haversine_distance(-9.1, 38.7, -9.1, 38.7), 0.0);
    }

    #[test]
    fn centroid_of_square_is_center() {
        let (lon, lat) = centroid(&square(0.0, 2.0)).unwrap();
        // Closing vertex repeats the first corner, pulling the mean toward it.
        assert!((lon - 0.8).abs() < 1e-9);
        assert!((lat - 0.8).abs() < 1e-9);
    }

    #[test]
    fn multipolygon_centroid_uses_first_polygon() {
        let geometry = Geometry::MultiPolygon {
            coordinates: vec![
                vec![vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![1.0, 1.0], vec![0.0, 0.0]]],
                vec![vec![vec![50.0, 50.0], vec![51.0, 50.0], vec![51.0, 51.0], vec![50.0, 50.0]]],
            ],
        };
        let (lon, lat) = centroid(&geometry).unwrap();
        assert!(lon < 2.0 && lat < 2.0);
    }

    #[test]
    fn point_inside_square() {
        assert!(point_in_geometry(1.0, 1.0, &square(0.0, 2.0)));
        assert!(!point_in_geometry(3.0, 1.0, &square(0.0, 2.0)));
    }

    #[test]
    fn point_in_any_multipolygon_member() {
        let geometry = Geometry::MultiPolygon {
            coordinates: vec![
                vec![vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![1.0, 1.0], vec![0.0, 1.0], vec![0.0, 0.0]]],
                vec![vec![vec![10.0, 10.0], vec![11.0, 10.0], vec![11.0, 11.0], vec![10.0, 11.0], vec![10.0, 10.0]]],
            ],
        };
        assert!(point_in_geometry(10.5, 10.5, &geometry));
        assert!(!point_in_geometry(5.0, 5.0, &geometry));
    }

    #[test]
    fn rejects_swapped_coordinates() {
        // lat/lon swapped for Lisbon puts "latitude" at -9.14 (fine) but a
        // swapped pair for e.g. northern Europe blows past 90.
        assert!(validate_coordinates(-9.1393, 38.7223).is_ok());
        assert!(validate_coordinates(100.0, 38.7).is_err());
        assert!(validate_coordinates(f64::NAN, 0.0).is_err());
        assert!(validate_coordinates(38.7, 200.0).is_err());
    }

    #[test]
    fn bbox_from_area_is_centered() {
        let bbox = BoundingBox::from_area(38.7, -9.1, 10_000.0);
        assert!(bbox.contains(38.7, -9.1));
        assert!((bbox.max_lat - 38.7 - (38.7 - bbox.min_lat)).abs() < 1e-12);
    }

    #[test]
    fn geometry_deserializes_from_provider_json() {
        let value = json!({
            "type": "Polygon",
            "coordinates": [[[-9.14, 38.72], [-9.13, 38.72], [-9.13, 38.73], [-9.14, 38.72]]]
        });
        let geometry: Geometry = serde_json::from_value(value).unwrap();
        assert!(matches!(geometry, Geometry::Polygon { .. }));

        let bad = json!({"type": "GeometryCollection", "geometries": []});
        assert!(serde_json::from_value::<Geometry>(bad).is_err());
    }
}
