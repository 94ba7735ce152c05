use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        GeoPoint { lat, lon }
    }

    /// Great-circle distance to another point in kilometers.
    #[inline]
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(*self, *other)
    }
}

/// Haversine great-circle distance between two points, in kilometers.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);

    // Clamp guards against rounding pushing h just past 1.0 for antipodal points
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEW_YORK: GeoPoint = GeoPoint { lat: 40.7128, lon: -74.0060 };
    const LONDON: GeoPoint = GeoPoint { lat: 51.5074, lon: -0.1278 };
    const SYDNEY: GeoPoint = GeoPoint { lat: -33.8688, lon: 151.2093 };

    #[test]
    fn test_same_point_is_zero() {
        assert_eq!(haversine_km(NEW_YORK, NEW_YORK), 0.0);
    }

    #[test]
    fn test_known_distance() {
        // NYC to London is roughly 5570 km
        let d = haversine_km(NEW_YORK, LONDON);
        assert!((d - 5570.0).abs() < 20.0, "got {}", d);
    }

    #[test]
    fn test_symmetric() {
        let ab = haversine_km(LONDON, SYDNEY);
        let ba = haversine_km(SYDNEY, LONDON);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn test_antipodal_is_half_circumference() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.0, 180.0);
        let half = std::f64::consts::PI * EARTH_RADIUS_KM;
        assert!((haversine_km(a, b) - half).abs() < 1e-6);
    }

    #[test]
    fn test_method_matches_function() {
        assert_eq!(NEW_YORK.distance_km(&SYDNEY), haversine_km(NEW_YORK, SYDNEY));
    }
}
