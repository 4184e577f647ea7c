use serde::{Deserialize, Serialize};

use super::error::OrbitError;
use super::{R_EARTH, WGS84_E2};

/// Observer location on the WGS-84 ellipsoid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GroundStation {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_m: f64,
}

impl GroundStation {
    pub fn new(latitude_deg: f64, longitude_deg: f64, altitude_m: f64) -> Result<Self, OrbitError> {
        if !(-90.0..=90.0).contains(&latitude_deg) {
            return Err(OrbitError::InvalidInput(format!(
                "latitude {latitude_deg} outside [-90, 90]"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude_deg) {
            return Err(OrbitError::InvalidInput(format!(
                "longitude {longitude_deg} outside [-180, 180]"
            )));
        }
        Ok(Self { latitude_deg, longitude_deg, altitude_m })
    }

    pub fn lat_rad(&self) -> f64 {
        self.latitude_deg.to_radians()
    }

    pub fn lon_rad(&self) -> f64 {
        self.longitude_deg.to_radians()
    }

    /// Station position in ECEF (km) on the WGS-84 ellipsoid.
    pub fn position_ecef_km(&self) -> [f64; 3] {
        let lat = self.lat_rad();
        let lon = self.lon_rad();
        let (sin_lat, cos_lat) = lat.sin_cos();
        let (sin_lon, cos_lon) = lon.sin_cos();
        let n = R_EARTH / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
        let alt_km = self.altitude_m / 1000.0;
        [
            (n + alt_km) * cos_lat * cos_lon,
            (n + alt_km) * cos_lat * sin_lon,
            (n * (1.0 - WGS84_E2) + alt_km) * sin_lat,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(matches!(
            GroundStation::new(91.0, 0.0, 0.0),
            Err(OrbitError::InvalidInput(_))
        ));
        assert!(matches!(
            GroundStation::new(0.0, -181.0, 0.0),
            Err(OrbitError::InvalidInput(_))
        ));
        assert!(GroundStation::new(-90.0, 180.0, 0.0).is_ok());
    }

    #[test]
    fn equator_prime_meridian_ecef() {
        let station = GroundStation::new(0.0, 0.0, 0.0).unwrap();
        let [x, y, z] = station.position_ecef_km();
        assert_relative_eq!(x, R_EARTH, epsilon = 1e-6);
        assert_relative_eq!(y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(z, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn north_pole_ecef() {
        let station = GroundStation::new(90.0, 0.0, 0.0).unwrap();
        let [x, y, z] = station.position_ecef_km();
        assert_relative_eq!(x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(y, 0.0, epsilon = 1e-9);
        // WGS-84 polar radius.
        assert_relative_eq!(z, 6356.752, epsilon = 1e-2);
    }
}
