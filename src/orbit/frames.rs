//! Frame conversions: inertial to Earth-fixed, Earth-fixed to geodetic,
//! and topocentric look angles from a ground station.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use super::ground_station::GroundStation;
use super::propagator::StateVector;
use super::{R_EARTH, WGS84_E2};

const GEODETIC_MAX_ITER: usize = 10;
// Latitude convergence below 1e-12 rad is well under a millimeter.
const GEODETIC_TOL: f64 = 1e-12;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct GeodeticPosition {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct LookAngles {
    /// Angle above the local horizon (degrees, negative below).
    pub elevation_deg: f64,
    /// Compass bearing (degrees, [0, 360)).
    pub azimuth_deg: f64,
    /// Slant range to the object (km).
    pub range_km: f64,
}

/// Greenwich mean sidereal time (rad), IAU 1982 polynomial.
pub fn gmst(at: DateTime<Utc>) -> f64 {
    let d = days_since_j2000(at);
    let t = d / 36525.0;
    let deg = 280.460_618_37 + 360.985_647_366_29 * d + 0.000_387_933 * t * t
        - t * t * t / 38_710_000.0;
    deg.rem_euclid(360.0).to_radians()
}

fn days_since_j2000(at: DateTime<Utc>) -> f64 {
    let j2000 = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
    (at - j2000).num_milliseconds() as f64 / 86_400_000.0
}

/// Rotate an ECI vector into ECEF by the sidereal angle.
pub fn eci_to_ecef(v: [f64; 3], theta: f64) -> [f64; 3] {
    let (sin_t, cos_t) = theta.sin_cos();
    [v[0] * cos_t + v[1] * sin_t, -v[0] * sin_t + v[1] * cos_t, v[2]]
}

/// Geodetic latitude/longitude/altitude of a state vector.
pub fn geodetic_position(state: &StateVector, at: DateTime<Utc>) -> GeodeticPosition {
    let ecef = eci_to_ecef(state.position, gmst(at));
    ecef_to_geodetic(ecef)
}

/// Iterative oblate-spheroid solution, stable at the poles: the altitude is
/// formed from p·cosφ + z·sinφ rather than p/cosφ.
fn ecef_to_geodetic([x, y, z]: [f64; 3]) -> GeodeticPosition {
    let p = x.hypot(y);
    let longitude = y.atan2(x);

    let mut lat = z.atan2(p * (1.0 - WGS84_E2));
    let mut alt = 0.0;
    for _ in 0..GEODETIC_MAX_ITER {
        let (sin_lat, cos_lat) = lat.sin_cos();
        let w = (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
        let n = R_EARTH / w;
        alt = p * cos_lat + z * sin_lat - R_EARTH * w;
        let next = z.atan2(p * (1.0 - WGS84_E2 * n / (n + alt)));
        let done = (next - lat).abs() < GEODETIC_TOL;
        lat = next;
        if done {
            break;
        }
    }

    GeodeticPosition {
        latitude_deg: lat.to_degrees(),
        longitude_deg: longitude.to_degrees(),
        altitude_km: alt,
    }
}

/// Elevation, azimuth and slant range of a state vector as seen from a
/// ground station.
pub fn look_angles(state: &StateVector, station: &GroundStation, at: DateTime<Utc>) -> LookAngles {
    let sat_ecef = eci_to_ecef(state.position, gmst(at));
    let sta_ecef = station.position_ecef_km();

    let dr = [
        sat_ecef[0] - sta_ecef[0],
        sat_ecef[1] - sta_ecef[1],
        sat_ecef[2] - sta_ecef[2],
    ];
    let range_km = (dr[0] * dr[0] + dr[1] * dr[1] + dr[2] * dr[2]).sqrt();

    let (east, north, up) = ecef_to_enu(dr, station.lat_rad(), station.lon_rad());
    let azimuth_deg = east.atan2(north).to_degrees().rem_euclid(360.0);
    let elevation_deg = if range_km > 0.0 {
        (up / range_km).asin().to_degrees()
    } else {
        0.0
    };

    LookAngles { elevation_deg, azimuth_deg, range_km }
}

fn ecef_to_enu(dr: [f64; 3], lat_rad: f64, lon_rad: f64) -> (f64, f64, f64) {
    let (sin_lat, cos_lat) = lat_rad.sin_cos();
    let (sin_lon, cos_lon) = lon_rad.sin_cos();

    let east = -sin_lon * dr[0] + cos_lon * dr[1];
    let north = -sin_lat * cos_lon * dr[0] - sin_lat * sin_lon * dr[1] + cos_lat * dr[2];
    let up = cos_lat * cos_lon * dr[0] + cos_lat * sin_lon * dr[1] + sin_lat * dr[2];
    (east, north, up)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn state(position: [f64; 3], at: DateTime<Utc>) -> StateVector {
        StateVector { position, velocity: [0.0; 3], at }
    }

    #[test]
    fn gmst_at_j2000_reference() {
        let at = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        assert_relative_eq!(gmst(at).to_degrees(), 280.4606, epsilon = 1e-3);
    }

    #[test]
    fn gmst_advances_about_361_degrees_per_day() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let t1 = t0 + chrono::Duration::days(1);
        let advance = (gmst(t1) - gmst(t0)).to_degrees().rem_euclid(360.0);
        assert_relative_eq!(advance, 0.9856, epsilon = 1e-3);
    }

    #[test]
    fn geodetic_round_trip_mid_latitude() {
        let station = GroundStation::new(20.67, -103.35, 1500.0).unwrap();
        let geo = ecef_to_geodetic(station.position_ecef_km());
        assert_relative_eq!(geo.latitude_deg, 20.67, epsilon = 1e-9);
        assert_relative_eq!(geo.longitude_deg, -103.35, epsilon = 1e-9);
        assert_relative_eq!(geo.altitude_km, 1.5, epsilon = 1e-6);
    }

    #[test]
    fn geodetic_stable_over_pole() {
        // 400 km above the geographic north pole.
        let geo = ecef_to_geodetic([0.0, 0.0, 6356.752 + 400.0]);
        assert_relative_eq!(geo.latitude_deg, 90.0, epsilon = 1e-6);
        assert_relative_eq!(geo.altitude_km, 400.0, epsilon = 1e-3);
    }

    #[test]
    fn overhead_satellite_is_at_zenith() {
        let station = GroundStation::new(0.0, 0.0, 0.0).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        // Place the satellite 400 km straight above the station by undoing
        // the ECEF rotation.
        let theta = gmst(at);
        let ecef = [R_EARTH + 400.0, 0.0, 0.0];
        let eci = [
            ecef[0] * theta.cos() - ecef[1] * theta.sin(),
            ecef[0] * theta.sin() + ecef[1] * theta.cos(),
            ecef[2],
        ];
        let angles = look_angles(&state(eci, at), &station, at);
        assert_relative_eq!(angles.elevation_deg, 90.0, epsilon = 1e-6);
        assert_relative_eq!(angles.range_km, 400.0, epsilon = 1e-6);
    }

    #[test]
    fn below_horizon_elevation_is_negative() {
        let station = GroundStation::new(0.0, 0.0, 0.0).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        // Satellite on the far side of the Earth.
        let theta = gmst(at);
        let ecef = [-(R_EARTH + 400.0), 0.0, 0.0];
        let eci = [
            ecef[0] * theta.cos() - ecef[1] * theta.sin(),
            ecef[0] * theta.sin() + ecef[1] * theta.cos(),
            ecef[2],
        ];
        let angles = look_angles(&state(eci, at), &station, at);
        assert!(angles.elevation_deg < 0.0);
    }
}
