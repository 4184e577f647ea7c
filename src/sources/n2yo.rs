//! N2YO adapter. The REST API hands back the current TLE for a catalog
//! number as a JSON envelope. Keyed access only, and lookups are strictly
//! by catalog number; name queries report `NoMatch` so the reconciler
//! moves on to the next source.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use super::{http_client, DataSource, ProviderRecord, SourceError};
use crate::config::N2yoConfig;
use crate::orbit::OrbitalElementSet;

pub struct N2yo {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct TleEnvelope {
    info: TleInfo,
    tle: String,
}

#[derive(Deserialize)]
struct TleInfo {
    satid: u32,
    satname: String,
    #[serde(rename = "launchDate")]
    launch_date: Option<String>,
}

impl N2yo {
    pub fn new(config: &N2yoConfig) -> Result<Self, SourceError> {
        let timeout = Duration::from_secs(config.timeout_s);
        Ok(Self {
            client: http_client(timeout)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
            timeout,
        })
    }
}

#[async_trait]
impl DataSource for N2yo {
    fn name(&self) -> &'static str {
        "n2yo"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch_by_id(&self, norad_id: u32) -> Result<ProviderRecord, SourceError> {
        if self.api_key.is_empty() {
            return Err(SourceError::Unauthenticated);
        }
        let url = format!("{}/tle/{}&apiKey={}", self.base_url, norad_id, self.api_key);
        log::debug!("n2yo: GET {}/tle/{}", self.base_url, norad_id);
        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(SourceError::Unauthenticated);
        }
        if !response.status().is_success() {
            return Err(SourceError::Unavailable(format!(
                "n2yo returned {}",
                response.status()
            )));
        }
        let envelope: TleEnvelope = response.json().await?;
        if envelope.tle.trim().is_empty() {
            return Err(SourceError::NoMatch);
        }
        // The two TLE lines arrive joined by "\r\n" in a single JSON string.
        let mut lines = envelope.tle.lines().map(str::trim);
        let line1 = lines.next().unwrap_or_default();
        let line2 = lines.next().unwrap_or_default();
        let elements = OrbitalElementSet::from_tle(
            Some(&envelope.info.satname),
            line1,
            line2,
            self.name(),
            Utc::now(),
        )
        .map_err(|e| SourceError::Malformed(e.to_string()))?;
        Ok(ProviderRecord {
            source: self.name().to_string(),
            norad_id: Some(envelope.info.satid),
            name: Some(envelope.info.satname),
            country: None,
            operator: None,
            status: None,
            launch_date: envelope
                .info
                .launch_date
                .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
            elements: Some(elements),
        })
    }

    async fn fetch_by_name(&self, _name: &str) -> Result<ProviderRecord, SourceError> {
        Err(SourceError::NoMatch)
    }

    async fn search(&self, _term: &str) -> Result<Vec<ProviderRecord>, SourceError> {
        Err(SourceError::NoMatch)
    }
}
