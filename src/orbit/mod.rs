//! Orbital mechanics: element sets, secular propagation, frame conversions
//! and ground-station pass search.

mod elements;
mod error;
mod frames;
mod ground_station;
mod passes;
mod propagator;

pub use elements::{OrbitalElementSet, TleError};
pub use error::OrbitError;
pub use frames::{geodetic_position, look_angles, GeodeticPosition, LookAngles};
pub use ground_station::GroundStation;
pub use passes::{find_passes, PassWindow};
pub use propagator::{propagate, StateVector};

/// Earth gravitational parameter (km³/s²).
pub const MU_EARTH: f64 = 398_600.4418;
/// Earth equatorial radius (km), WGS-84.
pub const R_EARTH: f64 = 6378.137;
/// J2 zonal harmonic coefficient.
pub const J2: f64 = 1.082_626_68e-3;
/// WGS-84 first eccentricity squared.
pub const WGS84_E2: f64 = 0.006_694_379_990_14;
/// Mean solar day (seconds).
pub const SOLAR_DAY: f64 = 86_400.0;

pub(crate) const TAU: f64 = std::f64::consts::TAU;

/// Normalize an angle to [0, 2π).
pub(crate) fn normalize_angle(angle: f64) -> f64 {
    let a = angle % TAU;
    if a < 0.0 {
        a + TAU
    } else {
        a
    }
}
