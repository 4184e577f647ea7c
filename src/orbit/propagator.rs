//! Analytic secular propagation of an element set to an arbitrary instant.
//!
//! The model applies J2 secular rates to RAAN, argument of perigee and mean
//! motion, and a drag-driven secular decay from the first derivative of mean
//! motion. Kepler's equation is solved by Newton-Raphson with a bounded
//! iteration count. Identical inputs always produce identical outputs.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::elements::OrbitalElementSet;
use super::error::OrbitError;
use super::{normalize_angle, J2, MU_EARTH, R_EARTH, SOLAR_DAY, TAU};

/// Kepler solver residual tolerance (rad).
const KEPLER_TOL: f64 = 1e-10;
const KEPLER_MAX_ITER: usize = 30;

/// Perigee altitudes below this are treated as re-entry (km).
const DECAY_ALTITUDE_KM: f64 = 100.0;

/// Inertial (ECI) position and velocity at an instant. Derived, never stored.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StateVector {
    /// Position (km): [x, y, z].
    pub position: [f64; 3],
    /// Velocity (km/s): [vx, vy, vz].
    pub velocity: [f64; 3],
    /// Instant this state is valid for.
    pub at: DateTime<Utc>,
}

impl StateVector {
    /// Position magnitude (km).
    pub fn radius_km(&self) -> f64 {
        let [x, y, z] = self.position;
        (x * x + y * y + z * z).sqrt()
    }

    /// Velocity magnitude (km/s).
    pub fn speed_km_s(&self) -> f64 {
        let [vx, vy, vz] = self.velocity;
        (vx * vx + vy * vy + vz * vz).sqrt()
    }
}

/// Advance an element set to `at`, producing an inertial state vector.
///
/// Fails with `Decayed` when the propagated geometry is physically invalid
/// (non-positive mean motion, or perigee inside the lower atmosphere) and
/// with `Numerical` when the Kepler solver does not converge.
pub fn propagate(elements: &OrbitalElementSet, at: DateTime<Utc>) -> Result<StateVector, OrbitError> {
    let dt_s = (at - elements.epoch).num_milliseconds() as f64 / 1000.0;
    let dt_days = dt_s / SOLAR_DAY;

    let e = elements.eccentricity;
    let incl = elements.inclination_deg.to_radians();

    // Secular drag: the TLE carries d(n)/dt / 2 in rev/day².
    let n_t_rev_day = elements.mean_motion_rev_day + 2.0 * elements.mean_motion_dot * dt_days;
    if n_t_rev_day <= 0.0 {
        return Err(OrbitError::Decayed(format!(
            "mean motion fell to {n_t_rev_day:.6} rev/day at {at}"
        )));
    }
    let n_t = n_t_rev_day * TAU / SOLAR_DAY;
    let a_t = (MU_EARTH / (n_t * n_t)).cbrt();
    let perigee_alt = a_t * (1.0 - e) - R_EARTH;
    if perigee_alt < DECAY_ALTITUDE_KM {
        return Err(OrbitError::Decayed(format!(
            "perigee altitude {perigee_alt:.1} km at {at}"
        )));
    }

    // J2 secular rates evaluated on the epoch geometry.
    let a0 = elements.semi_major_axis_km();
    let n0 = elements.mean_motion_rad_s();
    let p = a0 * (1.0 - e * e);
    let j2_factor = 1.5 * J2 * (R_EARTH / p).powi(2) * n0;
    let raan_dot = -j2_factor * incl.cos();
    let argp_dot = j2_factor * (2.0 - 2.5 * incl.sin().powi(2));
    // J2 correction to the mean motion itself.
    let eta = (1.0 - e * e).sqrt();
    let n_corr = 1.5 * J2 * (R_EARTH / a0).powi(2) * (1.0 - 1.5 * incl.sin().powi(2)) / eta.powi(3);

    let raan = normalize_angle(elements.raan_deg.to_radians() + raan_dot * dt_s);
    let argp = normalize_angle(elements.arg_perigee_deg.to_radians() + argp_dot * dt_s);

    let m_revs = elements.mean_motion_rev_day * dt_days + elements.mean_motion_dot * dt_days * dt_days;
    let mean_anomaly = normalize_angle(
        elements.mean_anomaly_deg.to_radians() + TAU * m_revs + n0 * n_corr * dt_s,
    );

    let ecc_anomaly = solve_kepler(mean_anomaly, e)?;
    let true_anomaly = 2.0
        * ((1.0 + e).sqrt() * (ecc_anomaly / 2.0).sin())
            .atan2((1.0 - e).sqrt() * (ecc_anomaly / 2.0).cos());

    Ok(state_from_keplerian(a_t, e, incl, raan, argp, true_anomaly, at))
}

/// Solve Kepler's equation M = E - e sin E for the eccentric anomaly.
fn solve_kepler(mean_anomaly: f64, e: f64) -> Result<f64, OrbitError> {
    let mut ea = if e < 0.8 { mean_anomaly } else { std::f64::consts::PI };
    for _ in 0..KEPLER_MAX_ITER {
        let f = ea - e * ea.sin() - mean_anomaly;
        let delta = f / (1.0 - e * ea.cos());
        ea -= delta;
        if delta.abs() < KEPLER_TOL {
            return Ok(ea);
        }
    }
    Err(OrbitError::Numerical(KEPLER_MAX_ITER))
}

/// Keplerian elements (radians) to an ECI state via the perifocal frame.
fn state_from_keplerian(
    a: f64,
    e: f64,
    incl: f64,
    raan: f64,
    argp: f64,
    nu: f64,
    at: DateTime<Utc>,
) -> StateVector {
    let p = a * (1.0 - e * e);
    let r_mag = p / (1.0 + e * nu.cos());

    let r_pqw = [r_mag * nu.cos(), r_mag * nu.sin(), 0.0];
    let v_scale = (MU_EARTH / p).sqrt();
    let v_pqw = [-v_scale * nu.sin(), v_scale * (e + nu.cos()), 0.0];

    let (sin_raan, cos_raan) = raan.sin_cos();
    let (sin_argp, cos_argp) = argp.sin_cos();
    let (sin_i, cos_i) = incl.sin_cos();

    let rot = [
        [
            cos_raan * cos_argp - sin_raan * sin_argp * cos_i,
            -cos_raan * sin_argp - sin_raan * cos_argp * cos_i,
            sin_raan * sin_i,
        ],
        [
            sin_raan * cos_argp + cos_raan * sin_argp * cos_i,
            -sin_raan * sin_argp + cos_raan * cos_argp * cos_i,
            -cos_raan * sin_i,
        ],
        [sin_argp * sin_i, cos_argp * sin_i, cos_i],
    ];

    let mut position = [0.0; 3];
    let mut velocity = [0.0; 3];
    for row in 0..3 {
        for col in 0..3 {
            position[row] += rot[row][col] * r_pqw[col];
            velocity[row] += rot[row][col] * v_pqw[col];
        }
    }

    StateVector { position, velocity, at }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    const ISS_LINE1: &str =
        "1 25544U 98067A   24001.50000000  .00016717  00000-0  10270-3 0  9009";
    const ISS_LINE2: &str =
        "2 25544  51.6400 208.5000 0007417  68.0000 292.1000 15.49560000400004";

    fn iss() -> OrbitalElementSet {
        OrbitalElementSet::from_tle(Some("ISS (ZARYA)"), ISS_LINE1, ISS_LINE2, "test", Utc::now())
            .unwrap()
    }

    #[test]
    fn propagation_is_deterministic() {
        let set = iss();
        let at = set.epoch + Duration::hours(6);
        let a = propagate(&set, at).unwrap();
        let b = propagate(&set, at).unwrap();
        assert_eq!(a.position, b.position);
        assert_eq!(a.velocity, b.velocity);
    }

    #[test]
    fn at_epoch_matches_orbit_size() {
        let set = iss();
        let state = propagate(&set, set.epoch).unwrap();
        let alt = state.radius_km() - R_EARTH;
        assert!(alt > 390.0 && alt < 440.0, "altitude {alt} km");
        // Circular LEO speed is about 7.7 km/s.
        assert!(state.speed_km_s() > 7.5 && state.speed_km_s() < 7.9);
    }

    #[test]
    fn ninety_minutes_is_one_revolution() {
        let set = iss();
        let at = set.epoch + Duration::minutes(90);
        let state = propagate(&set, at).unwrap();

        let alt = state.radius_km() - R_EARTH;
        assert!((alt - 450.0).abs() < 100.0, "altitude {alt} km");

        // 90 min at 15.4956 rev/day is 0.968 revolutions: close to one full
        // turn of mean anomaly.
        let revs = set.mean_motion_rev_day * 90.0 / (24.0 * 60.0);
        assert_relative_eq!(revs, 1.0, epsilon = 0.05);
    }

    #[test]
    fn kepler_solver_handles_circular_orbit() {
        assert_relative_eq!(solve_kepler(0.5, 0.0).unwrap(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn kepler_solver_high_eccentricity() {
        let e = 0.95;
        let ea = solve_kepler(1.0, e).unwrap();
        assert_relative_eq!(ea - e * ea.sin(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn decayed_orbit_is_rejected() {
        // Mean motion of 17.5 rev/day puts the orbit inside the decay
        // threshold.
        let mut set = iss();
        set.mean_motion_rev_day = 17.5;
        let err = propagate(&set, set.epoch);
        assert!(matches!(err, Err(OrbitError::Decayed(_))));
    }

    #[test]
    fn drag_decay_triggers_decayed_far_from_epoch() {
        let mut set = iss();
        // Exaggerated decay rate: n grows past the threshold within a year.
        set.mean_motion_dot = 0.005;
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let err = propagate(&set, at);
        assert!(matches!(err, Err(OrbitError::Decayed(_))));
    }

    #[test]
    fn j2_drifts_raan_westward() {
        // Prograde LEO: the node regresses. Compare states a day apart at
        // the same mean anomaly phase.
        let set = iss();
        let a = set.semi_major_axis_km();
        let n0 = set.mean_motion_rad_s();
        let raan_dot =
            -1.5 * J2 * (R_EARTH / (a * (1.0 - set.eccentricity.powi(2)))).powi(2)
                * n0
                * set.inclination_deg.to_radians().cos();
        let drift_deg_day = raan_dot.to_degrees() * SOLAR_DAY;
        assert!((-6.0..-4.0).contains(&drift_deg_day), "drift {drift_deg_day} deg/day");
    }
}
