//! Visibility pass search over a time window.
//!
//! The window is scanned at a coarse step derived from the orbital period;
//! each crossing of the elevation threshold is refined by bisection, and the
//! peak elevation inside a pass is located with a golden-section search.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::elements::OrbitalElementSet;
use super::error::OrbitError;
use super::frames::{look_angles, LookAngles};
use super::ground_station::GroundStation;
use super::propagator::propagate;

/// Bisection stops once the bracket is below half a second.
const REFINE_TOL_MS: i64 = 500;
/// Golden-section stops once the bracket is below a tenth of a second.
const PEAK_TOL_MS: f64 = 100.0;
const PEAK_MAX_ITER: usize = 80;
const INV_PHI: f64 = 0.618_033_988_749_895;

/// One visibility window, clipped to the query window.
#[derive(Debug, Clone, Serialize)]
pub struct PassWindow {
    pub rise: DateTime<Utc>,
    pub set: DateTime<Utc>,
    /// Instant of maximum elevation.
    pub tca: DateTime<Utc>,
    pub max_elevation_deg: f64,
    pub rise_azimuth_deg: f64,
    pub set_azimuth_deg: f64,
    pub duration_s: f64,
}

/// Find every pass above `min_elevation_deg` between `start` and `end`.
///
/// Passes are returned ordered by rise time and never overlap. A pass
/// already in progress at `start` (or still in progress at `end`) is
/// clipped to the window boundary. A propagation failure anywhere in the
/// scan aborts the search.
pub fn find_passes(
    elements: &OrbitalElementSet,
    station: &GroundStation,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    min_elevation_deg: f64,
) -> Result<Vec<PassWindow>, OrbitError> {
    if end <= start {
        return Err(OrbitError::InvalidInput(format!(
            "window end {end} is not after start {start}"
        )));
    }
    if min_elevation_deg <= 0.0 || min_elevation_deg > 90.0 {
        return Err(OrbitError::InvalidInput(format!(
            "minimum elevation {min_elevation_deg} outside (0, 90]"
        )));
    }

    // Step so that even a short, low pass spans several samples.
    let step_s = (elements.period_s() / 120.0).clamp(10.0, 60.0);
    let step = Duration::milliseconds((step_s * 1000.0) as i64);

    let mut passes = Vec::new();
    let mut prev_t = start;
    let mut prev = observe(elements, station, prev_t)?;
    // A pass may already be underway at the window start.
    let mut rise: Option<(DateTime<Utc>, f64)> = if prev.elevation_deg >= min_elevation_deg {
        Some((start, prev.azimuth_deg))
    } else {
        None
    };

    let mut cursor = start + step;
    loop {
        let t = cursor.min(end);
        let sample = observe(elements, station, t)?;
        let above = sample.elevation_deg >= min_elevation_deg;

        match (rise, above) {
            (None, true) => {
                let (rise_t, angles) =
                    refine_crossing(elements, station, prev_t, t, min_elevation_deg, true)?;
                rise = Some((rise_t, angles.azimuth_deg));
            }
            (Some((rise_t, rise_az)), false) => {
                let (set_t, set_angles) =
                    refine_crossing(elements, station, prev_t, t, min_elevation_deg, false)?;
                if let Some(pass) = close_pass(
                    elements,
                    station,
                    rise_t,
                    rise_az,
                    set_t,
                    set_angles.azimuth_deg,
                    min_elevation_deg,
                )? {
                    passes.push(pass);
                }
                rise = None;
            }
            _ => {}
        }

        prev_t = t;
        prev = sample;
        if t >= end {
            break;
        }
        cursor += step;
    }

    // Clip a pass still open at the window end.
    if let Some((rise_t, rise_az)) = rise {
        if let Some(pass) = close_pass(
            elements,
            station,
            rise_t,
            rise_az,
            end,
            prev.azimuth_deg,
            min_elevation_deg,
        )? {
            passes.push(pass);
        }
    }

    Ok(passes)
}

fn observe(
    elements: &OrbitalElementSet,
    station: &GroundStation,
    at: DateTime<Utc>,
) -> Result<LookAngles, OrbitError> {
    let state = propagate(elements, at)?;
    Ok(look_angles(&state, station, at))
}

/// Bisect a threshold crossing bracketed by `lo` and `hi` to sub-second
/// precision. `rising` selects which side of the bracket crosses upward.
fn refine_crossing(
    elements: &OrbitalElementSet,
    station: &GroundStation,
    mut lo: DateTime<Utc>,
    mut hi: DateTime<Utc>,
    min_elevation_deg: f64,
    rising: bool,
) -> Result<(DateTime<Utc>, LookAngles), OrbitError> {
    while (hi - lo).num_milliseconds() > REFINE_TOL_MS {
        let mid = lo + (hi - lo) / 2;
        let sample = observe(elements, station, mid)?;
        let above = sample.elevation_deg >= min_elevation_deg;
        if above == rising {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    let sample = observe(elements, station, hi)?;
    Ok((hi, sample))
}

/// Locate the elevation maximum between rise and set and assemble the pass.
/// Returns `None` for tangent passes that never clear the threshold.
fn close_pass(
    elements: &OrbitalElementSet,
    station: &GroundStation,
    rise: DateTime<Utc>,
    rise_azimuth_deg: f64,
    set: DateTime<Utc>,
    set_azimuth_deg: f64,
    min_elevation_deg: f64,
) -> Result<Option<PassWindow>, OrbitError> {
    let (tca, max_elevation_deg) = peak_elevation(elements, station, rise, set)?;
    if max_elevation_deg <= min_elevation_deg {
        return Ok(None);
    }
    let duration_s = (set - rise).num_milliseconds() as f64 / 1000.0;
    Ok(Some(PassWindow {
        rise,
        set,
        tca,
        max_elevation_deg,
        rise_azimuth_deg,
        set_azimuth_deg,
        duration_s,
    }))
}

/// Golden-section search for the elevation maximum on [lo, hi].
fn peak_elevation(
    elements: &OrbitalElementSet,
    station: &GroundStation,
    lo: DateTime<Utc>,
    hi: DateTime<Utc>,
) -> Result<(DateTime<Utc>, f64), OrbitError> {
    let span_ms = (hi - lo).num_milliseconds() as f64;
    let at_offset = |ms: f64| lo + Duration::milliseconds(ms.round() as i64);

    let mut a = 0.0;
    let mut b = span_ms;
    let mut c = b - INV_PHI * (b - a);
    let mut d = a + INV_PHI * (b - a);
    let mut fc = observe(elements, station, at_offset(c))?.elevation_deg;
    let mut fd = observe(elements, station, at_offset(d))?.elevation_deg;

    for _ in 0..PEAK_MAX_ITER {
        if b - a <= PEAK_TOL_MS {
            break;
        }
        if fc > fd {
            b = d;
            d = c;
            fd = fc;
            c = b - INV_PHI * (b - a);
            fc = observe(elements, station, at_offset(c))?.elevation_deg;
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + INV_PHI * (b - a);
            fd = observe(elements, station, at_offset(d))?.elevation_deg;
        }
    }

    let (best_ms, best) = if fc > fd { (c, fc) } else { (d, fd) };
    Ok((at_offset(best_ms), best))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ISS_LINE1: &str =
        "1 25544U 98067A   24001.50000000  .00016717  00000-0  10270-3 0  9009";
    const ISS_LINE2: &str =
        "2 25544  51.6400 208.5000 0007417  68.0000 292.1000 15.49560000400004";

    fn iss() -> OrbitalElementSet {
        OrbitalElementSet::from_tle(Some("ISS (ZARYA)"), ISS_LINE1, ISS_LINE2, "test", Utc::now())
            .unwrap()
    }

    fn guadalajara() -> GroundStation {
        GroundStation::new(20.67, -103.35, 0.0).unwrap()
    }

    fn day_window() -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        (start, start + Duration::hours(24))
    }

    #[test]
    fn finds_iss_passes_over_a_day() {
        let (start, end) = day_window();
        let passes = find_passes(&iss(), &guadalajara(), start, end, 10.0).unwrap();

        assert!(!passes.is_empty());
        assert!(passes.len() < 10, "{} passes", passes.len());
        for pass in &passes {
            assert!(pass.duration_s > 0.0);
            assert!(pass.duration_s < 15.0 * 60.0, "duration {}", pass.duration_s);
            assert!(pass.max_elevation_deg > 10.0);
            assert!(pass.max_elevation_deg <= 90.0);
        }
    }

    #[test]
    fn passes_are_ordered_and_disjoint() {
        let (start, end) = day_window();
        let passes = find_passes(&iss(), &guadalajara(), start, end, 10.0).unwrap();
        for pair in passes.windows(2) {
            assert!(pair[0].set < pair[1].rise);
        }
    }

    #[test]
    fn rise_and_set_sit_on_the_threshold() {
        let (start, end) = day_window();
        let station = guadalajara();
        let elements = iss();
        let passes = find_passes(&elements, &station, start, end, 10.0).unwrap();
        for pass in &passes {
            // Boundary passes clipped to the window don't sit on the
            // threshold; interior ones must.
            if pass.rise > start {
                let el = observe(&elements, &station, pass.rise).unwrap().elevation_deg;
                assert!((el - 10.0).abs() < 0.5, "rise elevation {el}");
            }
            if pass.set < end {
                let el = observe(&elements, &station, pass.set).unwrap().elevation_deg;
                assert!((el - 10.0).abs() < 0.5, "set elevation {el}");
            }
        }
    }

    #[test]
    fn recorded_maximum_dominates_pass_samples() {
        let (start, end) = day_window();
        let station = guadalajara();
        let elements = iss();
        let passes = find_passes(&elements, &station, start, end, 10.0).unwrap();
        for pass in &passes {
            assert!(pass.tca >= pass.rise && pass.tca <= pass.set);
            let mut t = pass.rise;
            while t <= pass.set {
                let el = observe(&elements, &station, t).unwrap().elevation_deg;
                assert!(
                    el <= pass.max_elevation_deg + 0.05,
                    "sample {el} exceeds recorded max {}",
                    pass.max_elevation_deg
                );
                t += Duration::seconds(10);
            }
        }
    }

    #[test]
    fn window_boundaries_clip_passes_in_progress() {
        let (start, end) = day_window();
        let station = guadalajara();
        let elements = iss();
        let full = find_passes(&elements, &station, start, end, 10.0).unwrap()[0].clone();

        // Window opening at the pass maximum: the rise clips to the start.
        let clipped = find_passes(&elements, &station, full.tca, end, 10.0).unwrap();
        let first = &clipped[0];
        assert_eq!(first.rise, full.tca);
        assert!(first.duration_s > 0.0);
        assert!(first.duration_s < full.duration_s);

        // Window closing at the pass maximum: the set clips to the end.
        let clipped = find_passes(&elements, &station, start, full.tca, 10.0).unwrap();
        let last = clipped.last().unwrap();
        assert_eq!(last.set, full.tca);
        assert!(last.duration_s > 0.0);
        assert!(last.duration_s < full.duration_s);
    }

    #[test]
    fn zenith_threshold_yields_no_passes() {
        let (start, end) = day_window();
        let passes = find_passes(&iss(), &guadalajara(), start, end, 90.0).unwrap();
        assert!(passes.is_empty());
    }

    #[test]
    fn rejects_inverted_window() {
        let (start, end) = day_window();
        let err = find_passes(&iss(), &guadalajara(), end, start, 10.0);
        assert!(matches!(err, Err(OrbitError::InvalidInput(_))));
    }

    #[test]
    fn rejects_non_positive_threshold() {
        let (start, end) = day_window();
        let err = find_passes(&iss(), &guadalajara(), start, end, 0.0);
        assert!(matches!(err, Err(OrbitError::InvalidInput(_))));
    }

    #[test]
    fn decayed_orbit_aborts_the_scan() {
        let mut elements = iss();
        elements.mean_motion_rev_day = 17.5;
        let (start, end) = day_window();
        let err = find_passes(&elements, &guadalajara(), start, end, 10.0);
        assert!(matches!(err, Err(OrbitError::Decayed(_))));
    }
}
