use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::orbit::OrbitalElementSet;

/// Operational status as reported by catalog metadata. Providers that only
/// serve element sets leave this at `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SatelliteStatus {
    Alive,
    Inactive,
    Decayed,
    #[default]
    Unknown,
}

/// The merged view of one satellite after reconciliation. `elements` is the
/// freshest element set any provider supplied; identity fields are filled
/// per-field from the highest-priority provider that knows them.
#[derive(Debug, Clone, Serialize)]
pub struct SatelliteRecord {
    pub norad_id: u32,
    pub name: Option<String>,
    pub country: Option<String>,
    pub operator: Option<String>,
    pub status: SatelliteStatus,
    pub launch_date: Option<NaiveDate>,
    pub elements: OrbitalElementSet,
    /// Names of the providers that contributed to this record.
    pub sources: Vec<String>,
    /// Blend of source agreement and element freshness, in [0, 1].
    pub confidence: f64,
    pub resolved_at: DateTime<Utc>,
}

/// Lightweight search result. Resolution by catalog number follows up with
/// the full reconciled record.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub norad_id: u32,
    pub name: Option<String>,
    pub operator: Option<String>,
    pub status: SatelliteStatus,
    pub source: String,
}
