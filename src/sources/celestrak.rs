//! Celestrak GP adapter. Serves current element sets as TLE text, queried
//! by catalog number or by (partial) object name. No credentials required.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::{http_client, DataSource, ProviderRecord, SourceError};
use crate::config::CelestrakConfig;
use crate::orbit::OrbitalElementSet;

pub struct Celestrak {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl Celestrak {
    pub fn new(config: &CelestrakConfig) -> Result<Self, SourceError> {
        let timeout = Duration::from_secs(config.timeout_s);
        Ok(Self {
            client: http_client(timeout)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    async fn fetch_gp(&self, query: &str) -> Result<Vec<OrbitalElementSet>, SourceError> {
        let url = format!("{}/NORAD/elements/gp.php?{}&FORMAT=tle", self.base_url, query);
        log::debug!("celestrak: GET {url}");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(SourceError::Unavailable(format!(
                "celestrak returned {}",
                response.status()
            )));
        }
        let body = response.text().await?;
        if body.contains("No GP data found") {
            return Err(SourceError::NoMatch);
        }
        let sets = OrbitalElementSet::parse_batch(&body, self.name(), Utc::now());
        if sets.is_empty() {
            return Err(SourceError::NoMatch);
        }
        Ok(sets)
    }
}

#[async_trait]
impl DataSource for Celestrak {
    fn name(&self) -> &'static str {
        "celestrak"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch_by_id(&self, norad_id: u32) -> Result<ProviderRecord, SourceError> {
        let mut sets = self.fetch_gp(&format!("CATNR={norad_id}")).await?;
        Ok(ProviderRecord::from_elements(self.name(), sets.remove(0)))
    }

    async fn fetch_by_name(&self, name: &str) -> Result<ProviderRecord, SourceError> {
        let mut sets = self.fetch_gp(&format!("NAME={}", urlencode(name))).await?;
        Ok(ProviderRecord::from_elements(self.name(), sets.remove(0)))
    }

    async fn search(&self, term: &str) -> Result<Vec<ProviderRecord>, SourceError> {
        let sets = self.fetch_gp(&format!("NAME={}", urlencode(term))).await?;
        Ok(sets
            .into_iter()
            .map(|s| ProviderRecord::from_elements(self.name(), s))
            .collect())
    }
}

/// Minimal percent-encoding for the few characters satellite names carry.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            ' ' => out.push_str("%20"),
            '&' => out.push_str("%26"),
            '+' => out.push_str("%2B"),
            '#' => out.push_str("%23"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencode_spaces_and_reserved() {
        assert_eq!(urlencode("ISS (ZARYA)"), "ISS%20(ZARYA)");
        assert_eq!(urlencode("A&B+C"), "A%26B%2BC");
    }
}
