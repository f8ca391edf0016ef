//! Great-circle distance and movement detection between position fixes.

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Distance between two WGS-84 coordinates in meters (haversine formula).
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}

/// True when the distance between two fixes strictly exceeds `threshold_m`.
/// A fix exactly at the threshold does not count as movement.
pub fn movement_exceeds(
    old_lat: f64,
    old_lon: f64,
    new_lat: f64,
    new_lon: f64,
    threshold_m: f64,
) -> bool {
    haversine_m(old_lat, old_lon, new_lat, new_lon) > threshold_m
}

#[cfg(test)]
mod tests {
    use super::{haversine_m, movement_exceeds};

    #[test]
    fn zero_distance_for_same_point() {
        assert_eq!(haversine_m(45.0, -122.0, 45.0, -122.0), 0.0);
    }

    #[test]
    fn one_degree_of_latitude() {
        // One degree of latitude is ~111.19 km on a 6371 km sphere.
        let d = haversine_m(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_194.9).abs() < 10.0, "got {d}");
    }

    #[test]
    fn threshold_is_strict() {
        // ~99 m and ~101 m of northward movement at mid latitude.
        let base = (40.0, -74.0);
        let near = (40.000_890_3, -74.0);
        let far = (40.000_908_3, -74.0);

        let d_near = haversine_m(base.0, base.1, near.0, near.1);
        let d_far = haversine_m(base.0, base.1, far.0, far.1);
        assert!(d_near < 100.0 && d_near > 95.0, "got {d_near}");
        assert!(d_far > 100.0 && d_far < 105.0, "got {d_far}");

        assert!(!movement_exceeds(base.0, base.1, near.0, near.1, 100.0));
        assert!(movement_exceeds(base.0, base.1, far.0, far.1, 100.0));
    }

    #[test]
    fn exactly_at_threshold_does_not_trigger() {
        let d = haversine_m(40.0, -74.0, 40.001, -74.0);
        assert!(!movement_exceeds(40.0, -74.0, 40.001, -74.0, d));
    }
}
