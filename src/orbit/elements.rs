//! Orbital element sets and the two-line element (TLE) parser.
//!
//! Lines are validated strictly (length, line numbers, mod-10 checksum,
//! matching catalog numbers) and the resulting element set is range-checked
//! before it is handed to the rest of the system.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Serialize;
use thiserror::Error;

use super::{MU_EARTH, SOLAR_DAY, TAU};

#[derive(Debug, Error)]
pub enum TleError {
    #[error("line {0} must be 69 characters")]
    LineLength(u8),
    #[error("line {0} contains non-ASCII data")]
    Encoding(u8),
    #[error("line {line} must start with '{expected}'")]
    LineNumber { line: u8, expected: char },
    #[error("checksum mismatch on line {line}: expected {expected}, computed {computed}")]
    Checksum { line: u8, expected: u8, computed: u8 },
    #[error("catalog numbers differ between lines: {0} vs {1}")]
    CatalogMismatch(u32, u32),
    #[error("unparseable field '{0}'")]
    Field(&'static str),
    #[error("invalid epoch")]
    Epoch,
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

/// A single orbital element set, immutable once constructed.
///
/// Angles are stored in degrees as they appear on the wire; the propagator
/// converts to radians internally.
#[derive(Debug, Clone, Serialize)]
pub struct OrbitalElementSet {
    /// NORAD catalog number.
    pub norad_id: u32,
    /// Object name, when the source supplied one.
    pub name: Option<String>,
    /// Element set reference epoch.
    pub epoch: DateTime<Utc>,
    /// Inclination (degrees).
    pub inclination_deg: f64,
    /// Eccentricity, [0, 1).
    pub eccentricity: f64,
    /// Right ascension of the ascending node (degrees).
    pub raan_deg: f64,
    /// Argument of perigee (degrees).
    pub arg_perigee_deg: f64,
    /// Mean anomaly at epoch (degrees).
    pub mean_anomaly_deg: f64,
    /// Mean motion (revolutions per day).
    pub mean_motion_rev_day: f64,
    /// First derivative of mean motion divided by two (rev/day²), as given
    /// on TLE line 1.
    pub mean_motion_dot: f64,
    /// B* drag term (1/Earth radii).
    pub bstar: f64,
    /// Element set number.
    pub element_set: u16,
    /// Name of the source that produced this set.
    pub source: String,
    /// When this set was retrieved from the source.
    pub retrieved_at: DateTime<Utc>,
}

impl OrbitalElementSet {
    /// Parse a TLE from two element lines plus an optional name line.
    pub fn from_tle(
        name: Option<&str>,
        line1: &str,
        line2: &str,
        source: &str,
        retrieved_at: DateTime<Utc>,
    ) -> Result<Self, TleError> {
        let l1 = padded(line1, 1)?;
        let l2 = padded(line2, 2)?;

        if !l1.starts_with('1') {
            return Err(TleError::LineNumber { line: 1, expected: '1' });
        }
        if !l2.starts_with('2') {
            return Err(TleError::LineNumber { line: 2, expected: '2' });
        }
        verify_checksum(&l1, 1)?;
        verify_checksum(&l2, 2)?;

        let id1 = field_u32(&l1[2..7], "catalog number (line 1)")?;
        let id2 = field_u32(&l2[2..7], "catalog number (line 2)")?;
        if id1 != id2 {
            return Err(TleError::CatalogMismatch(id1, id2));
        }

        let epoch_year = field_u32(&l1[18..20], "epoch year")? as i32;
        // Two-digit year pivot: the catalog began in 1957.
        let epoch_year = if epoch_year >= 57 { 1900 + epoch_year } else { 2000 + epoch_year };
        let epoch_day = field_f64(&l1[20..32], "epoch day")?;
        let epoch = tle_epoch(epoch_year, epoch_day).ok_or(TleError::Epoch)?;

        let mean_motion_dot = field_f64(&l1[33..43], "mean motion derivative")?;
        let bstar = implied_decimal(&l1[53..61]).ok_or(TleError::Field("bstar"))?;
        let element_set = l1[64..68].trim().parse::<u16>().unwrap_or(0);

        let inclination_deg = field_f64(&l2[8..16], "inclination")?;
        let raan_deg = field_f64(&l2[17..25], "raan")?;
        // Implied leading decimal point.
        let eccentricity = format!("0.{}", l2[26..33].trim())
            .parse::<f64>()
            .map_err(|_| TleError::Field("eccentricity"))?;
        let arg_perigee_deg = field_f64(&l2[34..42], "argument of perigee")?;
        let mean_anomaly_deg = field_f64(&l2[43..51], "mean anomaly")?;
        let mean_motion_rev_day = field_f64(&l2[52..63], "mean motion")?;

        let set = OrbitalElementSet {
            norad_id: id1,
            name: name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            epoch,
            inclination_deg,
            eccentricity,
            raan_deg,
            arg_perigee_deg,
            mean_anomaly_deg,
            mean_motion_rev_day,
            mean_motion_dot,
            bstar,
            element_set,
            source: source.to_string(),
            retrieved_at,
        };
        set.validate()?;
        Ok(set)
    }

    /// Parse a body of text holding any number of 2- or 3-line TLEs.
    ///
    /// Entries that fail to parse are logged and skipped, so one corrupt
    /// record in a batch does not discard the rest.
    pub fn parse_batch(text: &str, source: &str, retrieved_at: DateTime<Utc>) -> Vec<Self> {
        let lines: Vec<&str> = text
            .lines()
            .map(|l| l.trim_end())
            .filter(|l| !l.is_empty())
            .collect();

        let mut sets = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            let parsed = if lines[i].starts_with("1 ")
                && i + 1 < lines.len()
                && lines[i + 1].starts_with("2 ")
            {
                let r = Self::from_tle(None, lines[i], lines[i + 1], source, retrieved_at);
                i += 2;
                Some(r)
            } else if i + 2 < lines.len()
                && lines[i + 1].starts_with("1 ")
                && lines[i + 2].starts_with("2 ")
            {
                let r = Self::from_tle(
                    Some(lines[i]),
                    lines[i + 1],
                    lines[i + 2],
                    source,
                    retrieved_at,
                );
                i += 3;
                Some(r)
            } else {
                i += 1;
                None
            };

            match parsed {
                Some(Ok(set)) => sets.push(set),
                Some(Err(e)) => log::warn!("skipping malformed TLE from {}: {}", source, e),
                None => {}
            }
        }
        sets
    }

    fn validate(&self) -> Result<(), TleError> {
        if !(0.0..1.0).contains(&self.eccentricity) {
            return Err(TleError::OutOfRange { field: "eccentricity", value: self.eccentricity });
        }
        if !(0.0..=180.0).contains(&self.inclination_deg) {
            return Err(TleError::OutOfRange { field: "inclination", value: self.inclination_deg });
        }
        if self.mean_motion_rev_day <= 0.0 {
            return Err(TleError::OutOfRange {
                field: "mean motion",
                value: self.mean_motion_rev_day,
            });
        }
        Ok(())
    }

    /// Mean motion (rad/s).
    pub fn mean_motion_rad_s(&self) -> f64 {
        self.mean_motion_rev_day * TAU / SOLAR_DAY
    }

    /// Semi-major axis from Kepler's third law (km).
    pub fn semi_major_axis_km(&self) -> f64 {
        (MU_EARTH / self.mean_motion_rad_s().powi(2)).cbrt()
    }

    /// Orbital period (seconds).
    pub fn period_s(&self) -> f64 {
        SOLAR_DAY / self.mean_motion_rev_day
    }
}

fn padded(line: &str, number: u8) -> Result<String, TleError> {
    let trimmed = line.trim_end();
    // The fixed-column field slices below assume one byte per character;
    // anything non-ASCII came off the wire corrupt.
    if !trimmed.is_ascii() {
        return Err(TleError::Encoding(number));
    }
    if trimmed.len() < 69 {
        return Err(TleError::LineLength(number));
    }
    Ok(trimmed[..69].to_string())
}

fn verify_checksum(line: &str, number: u8) -> Result<(), TleError> {
    let expected = match line.as_bytes()[68] {
        b @ b'0'..=b'9' => b - b'0',
        _ => return Err(TleError::Checksum { line: number, expected: 0, computed: 0 }),
    };
    let computed = checksum(&line[..68]);
    if expected != computed {
        return Err(TleError::Checksum { line: number, expected, computed });
    }
    Ok(())
}

/// Mod-10 sum of digits; '-' counts as 1.
fn checksum(line: &str) -> u8 {
    let sum: u32 = line
        .bytes()
        .map(|b| match b {
            b'0'..=b'9' => (b - b'0') as u32,
            b'-' => 1,
            _ => 0,
        })
        .sum();
    (sum % 10) as u8
}

fn field_f64(s: &str, name: &'static str) -> Result<f64, TleError> {
    s.trim().parse::<f64>().map_err(|_| TleError::Field(name))
}

fn field_u32(s: &str, name: &'static str) -> Result<u32, TleError> {
    s.trim().parse::<u32>().map_err(|_| TleError::Field(name))
}

/// TLE "implied decimal" exponent format: " 10270-3" is 0.10270e-3.
fn implied_decimal(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return Some(0.0);
    }
    let sign = if s.starts_with('-') { -1.0 } else { 1.0 };
    let body = s.trim_start_matches(['+', '-']);
    let (mantissa, exponent) = match body.rfind(['+', '-']) {
        Some(pos) if pos > 0 => {
            let exp = body[pos..].parse::<i32>().ok()?;
            (&body[..pos], exp)
        }
        _ => (body, 0),
    };
    let mantissa = format!("0.{}", mantissa).parse::<f64>().ok()?;
    Some(sign * mantissa * 10f64.powi(exponent))
}

/// Convert the TLE year + fractional day-of-year pair to an instant.
fn tle_epoch(year: i32, day_of_year: f64) -> Option<DateTime<Utc>> {
    if !(1.0..=367.0).contains(&day_of_year) {
        return None;
    }
    let start = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single()?;
    let micros = ((day_of_year - 1.0) * SOLAR_DAY * 1e6).round() as i64;
    start.checked_add_signed(Duration::microseconds(micros))
}
