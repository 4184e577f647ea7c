//! Space-Track adapter. Cookie-session authentication against the ajaxauth
//! endpoint, then GP queries for elements and satcat queries for catalog
//! metadata. Requires an account; without credentials every call fails
//! with `Unauthenticated`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

use super::{http_client, DataSource, ProviderRecord, SourceError};
use crate::config::SpacetrackConfig;
use crate::orbit::OrbitalElementSet;

pub struct SpaceTrack {
    client: reqwest::Client,
    base_url: String,
    identity: String,
    password: String,
    timeout: Duration,
    logged_in: Mutex<bool>,
}

#[derive(Deserialize)]
struct SatcatRow {
    #[serde(rename = "NORAD_CAT_ID")]
    norad_cat_id: String,
    #[serde(rename = "OBJECT_NAME")]
    object_name: Option<String>,
    #[serde(rename = "COUNTRY")]
    country: Option<String>,
    #[serde(rename = "LAUNCH")]
    launch: Option<String>,
}

impl SpaceTrack {
    pub fn new(config: &SpacetrackConfig) -> Result<Self, SourceError> {
        let timeout = Duration::from_secs(config.timeout_s);
        Ok(Self {
            client: http_client(timeout)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            identity: config.identity.clone().unwrap_or_default(),
            password: config.password.clone().unwrap_or_default(),
            timeout,
            logged_in: Mutex::new(false),
        })
    }

    /// Logs in once per adapter lifetime. The cookie store on the shared
    /// client carries the session for subsequent queries.
    async fn ensure_login(&self) -> Result<(), SourceError> {
        if self.identity.is_empty() || self.password.is_empty() {
            return Err(SourceError::Unauthenticated);
        }
        let mut logged_in = self.logged_in.lock().await;
        if *logged_in {
            return Ok(());
        }
        let url = format!("{}/ajaxauth/login", self.base_url);
        log::debug!("spacetrack: POST {url}");
        let response = self
            .client
            .post(&url)
            .form(&[("identity", self.identity.as_str()), ("password", self.password.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SourceError::Unauthenticated);
        }
        let body = response.text().await?;
        if body.contains("Failed") {
            return Err(SourceError::Unauthenticated);
        }
        *logged_in = true;
        Ok(())
    }

    async fn get_text(&self, path: &str) -> Result<String, SourceError> {
        self.ensure_login().await?;
        let url = format!("{}/basicspacedata/query/{}", self.base_url, path);
        log::debug!("spacetrack: GET {url}");
        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(SourceError::Unauthenticated);
        }
        if !response.status().is_success() {
            return Err(SourceError::Unavailable(format!(
                "space-track returned {}",
                response.status()
            )));
        }
        Ok(response.text().await?)
    }

    async fn latest_elements(&self, norad_id: u32) -> Result<OrbitalElementSet, SourceError> {
        let body = self
            .get_text(&format!(
                "class/gp/NORAD_CAT_ID/{norad_id}/orderby/EPOCH%20desc/limit/1/format/tle"
            ))
            .await?;
        let mut sets = OrbitalElementSet::parse_batch(&body, self.name(), Utc::now());
        if sets.is_empty() {
            return Err(SourceError::NoMatch);
        }
        Ok(sets.remove(0))
    }

    async fn satcat(&self, norad_id: u32) -> Result<Option<SatcatRow>, SourceError> {
        let body = self
            .get_text(&format!("class/satcat/NORAD_CAT_ID/{norad_id}/format/json"))
            .await?;
        let mut rows: Vec<SatcatRow> = serde_json::from_str(&body)
            .map_err(|e| SourceError::Malformed(format!("satcat json: {e}")))?;
        Ok(if rows.is_empty() { None } else { Some(rows.remove(0)) })
    }

    async fn satcat_by_name(&self, term: &str) -> Result<Vec<SatcatRow>, SourceError> {
        let body = self
            .get_text(&format!("class/satcat/OBJECT_NAME/~~{term}/format/json"))
            .await?;
        serde_json::from_str(&body).map_err(|e| SourceError::Malformed(format!("satcat json: {e}")))
    }

    fn record_from(&self, row: SatcatRow, elements: Option<OrbitalElementSet>) -> ProviderRecord {
        let norad_id = row
            .norad_cat_id
            .trim()
            .parse()
            .ok()
            .or_else(|| elements.as_ref().map(|e| e.norad_id));
        ProviderRecord {
            source: self.name().to_string(),
            norad_id,
            name: row.object_name,
            country: row.country,
            operator: None,
            status: None,
            launch_date: row
                .launch
                .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
            elements,
        }
    }
}

#[async_trait]
impl DataSource for SpaceTrack {
    fn name(&self) -> &'static str {
        "spacetrack"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch_by_id(&self, norad_id: u32) -> Result<ProviderRecord, SourceError> {
        let elements = self.latest_elements(norad_id).await?;
        match self.satcat(norad_id).await {
            Ok(Some(row)) => Ok(self.record_from(row, Some(elements))),
            Ok(None) => Ok(ProviderRecord::from_elements(self.name(), elements)),
            Err(e) => {
                log::warn!("spacetrack: satcat lookup for {norad_id} failed: {e}");
                Ok(ProviderRecord::from_elements(self.name(), elements))
            }
        }
    }

    async fn fetch_by_name(&self, name: &str) -> Result<ProviderRecord, SourceError> {
        let mut rows = self.satcat_by_name(name).await?;
        if rows.is_empty() {
            return Err(SourceError::NoMatch);
        }
        let row = rows.remove(0);
        let norad_id: u32 = row
            .norad_cat_id
            .trim()
            .parse()
            .map_err(|_| SourceError::Malformed("satcat row without catalog number".into()))?;
        let elements = self.latest_elements(norad_id).await.ok();
        Ok(self.record_from(row, elements))
    }

    async fn search(&self, term: &str) -> Result<Vec<ProviderRecord>, SourceError> {
        let rows = self.satcat_by_name(term).await?;
        if rows.is_empty() {
            return Err(SourceError::NoMatch);
        }
        Ok(rows.into_iter().map(|row| self.record_from(row, None)).collect())
    }
}
