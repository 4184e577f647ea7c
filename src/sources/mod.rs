//! Provider adapters behind one capability contract.
//!
//! Each external provider implements [`DataSource`] and returns a partial
//! [`ProviderRecord`]; the reconciler never speaks to a provider's transport
//! directly. Failures are typed so the reconciler can tell a transient
//! outage from bad credentials or a garbled payload.

mod celestrak;
mod n2yo;
mod satnogs;
mod spacetrack;

pub use celestrak::Celestrak;
pub use n2yo::N2yo;
pub use satnogs::Satnogs;
pub use spacetrack::SpaceTrack;

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::catalog::SatelliteStatus;
use crate::orbit::OrbitalElementSet;

const USER_AGENT: &str = concat!("satintel/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("authentication failed")]
    Unauthenticated,
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("no match")]
    NoMatch,
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Malformed(err.to_string())
        } else {
            SourceError::Unavailable(err.to_string())
        }
    }
}

/// Partial record from a single provider. Every field is optional except the
/// source name; the reconciler merges whatever each provider can supply.
#[derive(Debug, Clone, Default)]
pub struct ProviderRecord {
    pub source: String,
    pub norad_id: Option<u32>,
    pub name: Option<String>,
    pub country: Option<String>,
    pub operator: Option<String>,
    pub status: Option<SatelliteStatus>,
    pub launch_date: Option<NaiveDate>,
    pub elements: Option<OrbitalElementSet>,
}

impl ProviderRecord {
    pub(crate) fn from_elements(source: &str, elements: OrbitalElementSet) -> Self {
        ProviderRecord {
            source: source.to_string(),
            norad_id: Some(elements.norad_id),
            name: elements.name.clone(),
            elements: Some(elements),
            ..Default::default()
        }
    }
}

/// Capability contract implemented once per provider.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Budget for a single request to this provider; the reconciler bounds
    /// every attempt by it.
    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    async fn fetch_by_id(&self, norad_id: u32) -> Result<ProviderRecord, SourceError>;

    async fn fetch_by_name(&self, name: &str) -> Result<ProviderRecord, SourceError>;

    async fn search(&self, term: &str) -> Result<Vec<ProviderRecord>, SourceError>;
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .cookie_store(true)
        .build()
        .map_err(|e| SourceError::Unavailable(e.to_string()))
}
