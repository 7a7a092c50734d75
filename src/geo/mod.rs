use crate::models::courier::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Great-circle distance in kilometres between two coordinates given in degrees.
pub fn distance_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + phi1.cos() * phi2.cos() * sin_lng * sin_lng;
    // Rounding can push the term a hair past 1.0 for antipodal points.
    let central_angle = 2.0 * haversine.clamp(0.0, 1.0).sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    distance_km(a.lat, a.lng, b.lat, b.lng)
}

#[cfg(test)]
mod tests {
    use super::{distance_km, haversine_km};
    use crate::models::courier::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 5.6037,
            lng: -0.1870,
        };
        assert_eq!(haversine_km(&p, &p), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let pairs = [
            ((5.6037, -0.1870), (6.6885, -1.6244)),
            ((51.5074, -0.1278), (48.8566, 2.3522)),
            ((-33.8688, 151.2093), (40.7128, -74.0060)),
            ((0.0, 0.0), (0.0, 180.0)),
        ];

        for ((lat1, lng1), (lat2, lng2)) in pairs {
            let there = distance_km(lat1, lng1, lat2, lng2);
            let back = distance_km(lat2, lng2, lat1, lng1);
            assert!((there - back).abs() < 1e-9, "{there} != {back}");
        }
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let distance = distance_km(51.5074, -0.1278, 48.8566, 2.3522);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[test]
    fn accra_to_kumasi_is_around_200_km() {
        let distance = distance_km(5.6037, -0.1870, 6.6885, -1.6244);
        assert!((distance - 200.0).abs() < 10.0);
    }
}
