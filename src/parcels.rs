use crate::geometry::{centroid, haversine_distance, point_in_geometry, Geometry};

/// Progressive search buffers for cadastre/property queries, in degrees.
/// Roughly 100 m, 500 m and 1 km at Iberian latitudes. Queries stop at the
/// first buffer that yields features; the largest buffer is the hard limit.
pub const BUFFER_STEPS_DEG: [f64; 3] = [0.001, 0.005, 0.01];

/// One feature from a cadastre/property spatial query, before selection.
#[derive(Debug, Clone)]
pub struct ParcelCandidate {
    pub reference: String,
    pub geometry: Option<Geometry>,
    pub area_m2: Option<f64>,
}

/// The single best candidate for a query point.
#[derive(Debug, Clone)]
pub struct SelectedParcel {
    pub reference: String,
    pub geometry: Geometry,
    /// `(lon, lat)` of the candidate's centroid.
    pub centroid: (f64, f64),
    pub distance_m: f64,
    pub contains_point: bool,
    pub area_m2: Option<f64>,
}

/// Picks the best parcel for a point from a candidate set.
///
/// Containment wins outright: the first candidate whose polygon contains the
/// point is selected with distance 0 (cadastral layers do not overlap, so
/// the first containing match is the only one). Otherwise the candidate with
/// the nearest centroid wins; ties keep the first-seen candidate so identical
/// input ordering gives identical output. Candidates without usable geometry
/// are skipped; if none remain, there is no parcel here.
pub fn select_best_parcel(
    lon: f64,
    lat: f64,
    candidates: &[ParcelCandidate],
) -> Option<SelectedParcel> {
    // Exact containment pass
    for candidate in candidates {
        let Some(geometry) = &candidate.geometry else {
            continue;
        };
        if point_in_geometry(lon, lat, geometry) {
            let center = centroid(geometry)?;
            return Some(SelectedParcel {
                reference: candidate.reference.clone(),
                geometry: geometry.clone(),
                centroid: center,
                distance_m: 0.0,
                contains_point: true,
                area_m2: candidate.area_m2,
            });
        }
    }

    // Nearest-centroid fallback
    let mut best: Option<SelectedParcel> = None;
    for candidate in candidates {
        let Some(geometry) = &candidate.geometry else {
            continue;
        };
        let Some(center) = centroid(geometry) else {
            continue;
        };
        let distance = haversine_distance(lon, lat, center.0, center.1);
        let closer = match &best {
            Some(current) => distance < current.distance_m,
            None => true,
        };
        if closer {
            best = Some(SelectedParcel {
                reference: candidate.reference.clone(),
                geometry: geometry.clone(),
                centroid: center,
                distance_m: distance,
                contains_point: false,
                area_m2: candidate.area_m2,
            });
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_at(min_lon: f64, min_lat: f64, size: f64, reference: &str) -> ParcelCandidate {
        ParcelCandidate {
            reference: reference.to_string(),
            geometry: Some(Geometry::Polygon {
                coordinates: vec![vec![
                    vec![min_lon, min_lat],
                    vec![min_lon + size, min_lat],
                    vec![min_lon + size, min_lat + size],
                    vec![min_lon, min_lat + size],
                    vec![min_lon, min_lat],
                ]],
            }),
            area_m2: None,
        }
    }

    #[test]
    fn containment_beats_proximity() {
        // The containing parcel is listed last and its centroid is farther
        // than a small nearby parcel's; containment must still win.
        let candidates = vec![
            square_at(-9.2000, 38.8000, 0.0001, "near-but-outside"),
            square_at(-9.2100, 38.7900, 0.05, "containing"),
        ];
        let selected = select_best_parcel(-9.1990, 38.8005, &candidates).unwrap();
        assert_eq!(selected.reference, "containing");
        assert!(selected.contains_point);
        assert_eq!(selected.distance_m, 0.0);
    }

    #[test]
    fn nearest_centroid_fallback() {
        let candidates = vec![
            square_at(0.0, 0.0, 0.01, "far"),
            square_at(0.1, 0.1, 0.01, "near"),
        ];
        let selected = select_best_parcel(0.09, 0.09, &candidates).unwrap();
        assert_eq!(selected.reference, "near");
        assert!(!selected.contains_point);
        assert!(selected.distance_m > 0.0);
    }

    #[test]
    fn ties_keep_first_seen() {
        // Two identical squares at the same spot: first-seen wins.
        let candidates = vec![
            square_at(1.0, 1.0, 0.01, "first"),
            square_at(1.0, 1.0, 0.01, "second"),
        ];
        let selected = select_best_parcel(2.0, 2.0, &candidates).unwrap();
        assert_eq!(selected.reference, "first");
    }

    #[test]
    fn no_geometry_means_not_found() {
        let candidates = vec![ParcelCandidate {
            reference: "geometryless".to_string(),
            geometry: None,
            area_m2: None,
        }];
        assert!(select_best_parcel(0.0, 0.0, &candidates).is_none());
        assert!(select_best_parcel(0.0, 0.0, &[]).is_none());
    }

    #[test]
    fn buffer_steps_increase() {
        for pair in BUFFER_STEPS_DEG.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }
}
