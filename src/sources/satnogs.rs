//! SatNOGS DB adapter. Open API, no key needed. Carries rich catalog
//! metadata (operator, countries, operational status) but no element
//! sets, so its records contribute identity fields to the merge only.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{http_client, DataSource, ProviderRecord, SourceError};
use crate::catalog::SatelliteStatus;
use crate::config::SatnogsConfig;

pub struct Satnogs {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct SatnogsSatellite {
    norad_cat_id: Option<u32>,
    name: Option<String>,
    operator: Option<String>,
    countries: Option<String>,
    launched: Option<DateTime<Utc>>,
    status: Option<String>,
}

impl Satnogs {
    pub fn new(config: &SatnogsConfig) -> Result<Self, SourceError> {
        let timeout = Duration::from_secs(config.timeout_s);
        Ok(Self {
            client: http_client(timeout)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    async fn satellites(&self, query: &str) -> Result<Vec<SatnogsSatellite>, SourceError> {
        let url = format!("{}/satellites/?{}", self.base_url, query);
        log::debug!("satnogs: GET {url}");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(SourceError::Unavailable(format!(
                "satnogs returned {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    fn record_from(&self, sat: SatnogsSatellite) -> Option<ProviderRecord> {
        let norad_id = sat.norad_cat_id?;
        let operator = sat.operator.filter(|o| !o.is_empty() && o != "None");
        Some(ProviderRecord {
            source: self.name().to_string(),
            norad_id: Some(norad_id),
            name: sat.name.filter(|n| !n.is_empty()),
            country: sat.countries.filter(|c| !c.is_empty()),
            operator,
            status: sat.status.as_deref().map(status_from_str),
            launch_date: sat.launched.map(|t| t.date_naive()),
            elements: None,
        })
    }
}

fn status_from_str(s: &str) -> SatelliteStatus {
    match s {
        "alive" => SatelliteStatus::Alive,
        "dead" => SatelliteStatus::Inactive,
        "re-entered" => SatelliteStatus::Decayed,
        _ => SatelliteStatus::Unknown,
    }
}

#[async_trait]
impl DataSource for Satnogs {
    fn name(&self) -> &'static str {
        "satnogs"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch_by_id(&self, norad_id: u32) -> Result<ProviderRecord, SourceError> {
        let sats = self.satellites(&format!("norad_cat_id={norad_id}")).await?;
        sats.into_iter()
            .find_map(|s| self.record_from(s))
            .ok_or(SourceError::NoMatch)
    }

    async fn fetch_by_name(&self, name: &str) -> Result<ProviderRecord, SourceError> {
        let mut records = self.search(name).await?;
        if records.is_empty() {
            return Err(SourceError::NoMatch);
        }
        Ok(records.remove(0))
    }

    async fn search(&self, term: &str) -> Result<Vec<ProviderRecord>, SourceError> {
        let sats = self
            .satellites(&format!("name__icontains={}", term.replace(' ', "%20")))
            .await?;
        let records: Vec<ProviderRecord> =
            sats.into_iter().filter_map(|s| self.record_from(s)).collect();
        if records.is_empty() {
            return Err(SourceError::NoMatch);
        }
        Ok(records)
    }
}
