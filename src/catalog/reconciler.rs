//! Multi-source reconciliation. Queries every configured provider
//! concurrently, absorbs individual failures, and merges the partial
//! answers into one record with a confidence score.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;

use super::cache::RecordCache;
use super::{CatalogError, SatelliteRecord, SatelliteStatus, SearchHit};
use crate::orbit::OrbitalElementSet;
use crate::sources::{DataSource, ProviderRecord, SourceError};

/// What the caller is asking for. Purely numeric input is treated as a
/// catalog number, anything else as a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Id(u32),
    Name(String),
}

impl FromStr for Query {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CatalogError::InvalidQuery("empty query".into()));
        }
        if let Ok(id) = trimmed.parse::<u32>() {
            Ok(Query::Id(id))
        } else {
            Ok(Query::Name(trimmed.to_string()))
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Id(id) => write!(f, "catalog number {id}"),
            Query::Name(name) => write!(f, "name \"{name}\""),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Attempts per source for transient failures, including the first.
    pub max_attempts: usize,
    /// Base delay for exponential retry backoff.
    pub retry_base: Duration,
    /// Element age at which freshness starts to decay.
    pub staleness: Duration,
    pub agreement_weight: f64,
    pub freshness_weight: f64,
    pub cache_ttl: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_base: Duration::from_millis(250),
            staleness: Duration::from_secs(30 * 24 * 3600),
            agreement_weight: 0.6,
            freshness_weight: 0.4,
            cache_ttl: Duration::from_secs(300),
        }
    }
}

pub struct Reconciler {
    /// Providers in descending priority order.
    sources: Vec<Arc<dyn DataSource>>,
    config: ReconcilerConfig,
    cache: RecordCache,
}

impl Reconciler {
    pub fn new(sources: Vec<Arc<dyn DataSource>>, config: ReconcilerConfig) -> Self {
        let cache = RecordCache::new(config.cache_ttl);
        Self {
            sources,
            config,
            cache,
        }
    }

    /// Resolves a query to one merged record. Provider failures are absorbed
    /// as long as at least one provider returns element data; only when all
    /// of them come back empty-handed does this fail.
    pub async fn resolve(&self, query: &Query) -> Result<Arc<SatelliteRecord>, CatalogError> {
        if let Query::Id(id) = query {
            if let Some(record) = self.cache.get(*id) {
                log::debug!("cache hit for {query}");
                return Ok(record);
            }
        }

        let attempts = join_all(
            self.sources
                .iter()
                .map(|source| self.fetch_with_retry(source.as_ref(), query)),
        )
        .await;

        let mut records = Vec::new();
        for (source, outcome) in self.sources.iter().zip(attempts) {
            match outcome {
                Ok(record) => records.push(record),
                Err(SourceError::NoMatch) => {
                    log::debug!("{}: no match for {query}", source.name())
                }
                Err(e) => log::warn!("{}: {query} failed: {e}", source.name()),
            }
        }

        let record = Arc::new(self.merge(query, records)?);
        self.cache.insert(Arc::clone(&record));
        Ok(record)
    }

    /// Fans a free-text search out to every provider and deduplicates by
    /// catalog number, keeping the highest-priority provider's hit.
    pub async fn search(&self, term: &str) -> Result<Vec<SearchHit>, CatalogError> {
        let attempts = join_all(
            self.sources
                .iter()
                .map(|source| self.with_retry(source.as_ref(), move || source.search(term))),
        )
        .await;

        let mut seen = std::collections::HashSet::new();
        let mut hits = Vec::new();
        for (source, outcome) in self.sources.iter().zip(attempts) {
            match outcome {
                Ok(records) => {
                    for record in records {
                        let Some(norad_id) = record.norad_id else { continue };
                        if seen.insert(norad_id) {
                            hits.push(SearchHit {
                                norad_id,
                                name: record.name,
                                operator: record.operator,
                                status: record.status.unwrap_or_default(),
                                source: record.source,
                            });
                        }
                    }
                }
                Err(SourceError::NoMatch) => {}
                Err(e) => log::warn!("{}: search \"{term}\" failed: {e}", source.name()),
            }
        }

        if hits.is_empty() {
            return Err(CatalogError::NotFound(format!("name \"{term}\"")));
        }
        Ok(hits)
    }

    async fn fetch_with_retry(
        &self,
        source: &dyn DataSource,
        query: &Query,
    ) -> Result<ProviderRecord, SourceError> {
        self.with_retry(source, move || async move {
            match query {
                Query::Id(id) => source.fetch_by_id(*id).await,
                Query::Name(name) => source.fetch_by_name(name).await,
            }
        })
        .await
    }

    /// One provider, bounded attempts. Only transient `Unavailable` errors
    /// are retried; bad credentials or garbled payloads fail immediately.
    async fn with_retry<T, F, Fut>(&self, source: &dyn DataSource, op: F) -> Result<T, SourceError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, SourceError>>,
    {
        let mut attempt = 0;
        loop {
            let outcome = match tokio::time::timeout(source.timeout(), op()).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::Unavailable("request timed out".into())),
            };
            match outcome {
                Err(SourceError::Unavailable(reason)) if attempt + 1 < self.config.max_attempts => {
                    attempt += 1;
                    let delay = self.config.retry_base * 2u32.pow(attempt as u32 - 1);
                    log::debug!(
                        "{}: attempt {attempt} failed ({reason}), retrying in {}",
                        source.name(),
                        humantime::format_duration(delay)
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    fn merge(
        &self,
        query: &Query,
        records: Vec<ProviderRecord>,
    ) -> Result<SatelliteRecord, CatalogError> {
        // Freshest epoch wins the element set; on equal epochs the
        // higher-priority provider does.
        let best = records
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.elements.as_ref().map(|e| (i, e)))
            .max_by(|(ia, ea), (ib, eb)| ea.epoch.cmp(&eb.epoch).then_with(|| ib.cmp(ia)));
        let Some((_, elements)) = best else {
            return Err(CatalogError::NotFound(query.to_string()));
        };
        let elements = elements.clone();

        let norad_id = records
            .iter()
            .find_map(|r| r.norad_id)
            .unwrap_or(elements.norad_id);
        let name = records
            .iter()
            .find_map(|r| r.name.clone())
            .or_else(|| elements.name.clone());
        let country = records.iter().find_map(|r| r.country.clone());
        let operator = records.iter().find_map(|r| r.operator.clone());
        let status = records
            .iter()
            .find_map(|r| r.status)
            .unwrap_or(SatelliteStatus::Unknown);
        let launch_date = records.iter().find_map(|r| r.launch_date);
        let sources = records.iter().map(|r| r.source.clone()).collect();

        let resolved_at = Utc::now();
        let confidence = self.confidence(&records, &elements, resolved_at);

        Ok(SatelliteRecord {
            norad_id,
            name,
            country,
            operator,
            status,
            launch_date,
            elements,
            sources,
            confidence,
            resolved_at,
        })
    }

    /// Agreement is the fraction of element-bearing providers whose
    /// inclination, eccentricity and mean motion match the chosen set
    /// within fixed tolerances; freshness holds at 1 until the element set
    /// passes the staleness age, then decays linearly to 0 over one more
    /// staleness interval.
    fn confidence(
        &self,
        records: &[ProviderRecord],
        chosen: &OrbitalElementSet,
        now: DateTime<Utc>,
    ) -> f64 {
        const INCL_TOL_DEG: f64 = 0.01;
        const ECC_TOL: f64 = 1e-4;
        const MM_TOL_REV_DAY: f64 = 1e-3;

        let bearing: Vec<&OrbitalElementSet> =
            records.iter().filter_map(|r| r.elements.as_ref()).collect();
        let agreeing = bearing
            .iter()
            .filter(|e| {
                (e.inclination_deg - chosen.inclination_deg).abs() <= INCL_TOL_DEG
                    && (e.eccentricity - chosen.eccentricity).abs() <= ECC_TOL
                    && (e.mean_motion_rev_day - chosen.mean_motion_rev_day).abs() <= MM_TOL_REV_DAY
            })
            .count();
        let agreement = if bearing.is_empty() {
            0.0
        } else {
            agreeing as f64 / bearing.len() as f64
        };

        let stale_s = self.config.staleness.as_secs_f64();
        let age_s = (now - chosen.epoch).num_seconds().max(0) as f64;
        let freshness = if age_s <= stale_s {
            1.0
        } else {
            (1.0 - (age_s - stale_s) / stale_s).max(0.0)
        };
        self.config.agreement_weight * agreement + self.config.freshness_weight * freshness
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;

    use super::*;
    use crate::orbit::OrbitalElementSet;

    const ISS_LINE1: &str = "1 25544U 98067A   24001.50000000  .00016717  00000-0  10270-3 0  9009";
    const ISS_LINE2: &str = "2 25544  51.6400 208.5000 0007417  68.0000 292.1000 15.49560000400004";

    fn elements(source: &str, epoch: DateTime<Utc>) -> OrbitalElementSet {
        let mut set = OrbitalElementSet::from_tle(
            Some("ISS (ZARYA)"),
            ISS_LINE1,
            ISS_LINE2,
            source,
            Utc::now(),
        )
        .unwrap();
        set.epoch = epoch;
        set
    }

    fn epoch_a() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    struct MockSource {
        name: &'static str,
        responses: Mutex<Vec<Result<ProviderRecord, SourceError>>>,
        calls: AtomicUsize,
    }

    impl MockSource {
        fn new(
            name: &'static str,
            responses: Vec<Result<ProviderRecord, SourceError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            })
        }

        fn next(&self) -> Result<ProviderRecord, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Err(SourceError::NoMatch)
            } else {
                responses.remove(0)
            }
        }
    }

    #[async_trait]
    impl DataSource for MockSource {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch_by_id(&self, _norad_id: u32) -> Result<ProviderRecord, SourceError> {
            self.next()
        }

        async fn fetch_by_name(&self, _name: &str) -> Result<ProviderRecord, SourceError> {
            self.next()
        }

        async fn search(&self, _term: &str) -> Result<Vec<ProviderRecord>, SourceError> {
            self.next().map(|r| vec![r])
        }
    }

    fn element_record(source: &str, epoch: DateTime<Utc>) -> ProviderRecord {
        ProviderRecord::from_elements(source, elements(source, epoch))
    }

    fn fast_config() -> ReconcilerConfig {
        ReconcilerConfig {
            max_attempts: 2,
            retry_base: Duration::from_millis(1),
            ..ReconcilerConfig::default()
        }
    }

    #[tokio::test]
    async fn resolves_from_single_source() {
        let source = MockSource::new("a", vec![Ok(element_record("a", epoch_a()))]);
        let reconciler = Reconciler::new(vec![source as _], fast_config());
        let record = reconciler.resolve(&Query::Id(25544)).await.unwrap();
        assert_eq!(record.norad_id, 25544);
        assert_eq!(record.sources, vec!["a"]);
        assert!(record.confidence > 0.0);
    }

    #[tokio::test]
    async fn absorbs_failed_source() {
        let a = MockSource::new(
            "a",
            vec![
                Err(SourceError::Unavailable("down".into())),
                Err(SourceError::Unavailable("down".into())),
            ],
        );
        let b = MockSource::new("b", vec![Ok(element_record("b", epoch_a()))]);
        let reconciler = Reconciler::new(vec![a as _, b as _], fast_config());
        let record = reconciler.resolve(&Query::Id(25544)).await.unwrap();
        assert_eq!(record.sources, vec!["b"]);
    }

    #[tokio::test]
    async fn merges_metadata_across_sources() {
        let a = MockSource::new("a", vec![Ok(element_record("a", epoch_a()))]);
        let metadata = ProviderRecord {
            source: "b".into(),
            norad_id: Some(25544),
            operator: Some("NASA".into()),
            country: Some("US".into()),
            status: Some(SatelliteStatus::Alive),
            ..Default::default()
        };
        let b = MockSource::new("b", vec![Ok(metadata)]);
        let reconciler = Reconciler::new(vec![a as _, b as _], fast_config());
        let record = reconciler.resolve(&Query::Id(25544)).await.unwrap();
        assert_eq!(record.operator.as_deref(), Some("NASA"));
        assert_eq!(record.country.as_deref(), Some("US"));
        assert_eq!(record.status, SatelliteStatus::Alive);
        assert_eq!(record.name.as_deref(), Some("ISS (ZARYA)"));
        assert_eq!(record.sources, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn newer_epoch_beats_priority() {
        let newer = epoch_a() + chrono::Duration::days(2);
        let a = MockSource::new("a", vec![Ok(element_record("a", epoch_a()))]);
        let b = MockSource::new("b", vec![Ok(element_record("b", newer))]);
        let reconciler = Reconciler::new(vec![a as _, b as _], fast_config());
        let record = reconciler.resolve(&Query::Id(25544)).await.unwrap();
        assert_eq!(record.elements.source, "b");
    }

    #[tokio::test]
    async fn equal_epochs_prefer_priority_order() {
        let a = MockSource::new("a", vec![Ok(element_record("a", epoch_a()))]);
        let b = MockSource::new("b", vec![Ok(element_record("b", epoch_a()))]);
        let reconciler = Reconciler::new(vec![a as _, b as _], fast_config());
        let record = reconciler.resolve(&Query::Id(25544)).await.unwrap();
        assert_eq!(record.elements.source, "a");
    }

    #[tokio::test]
    async fn all_sources_failing_is_not_found() {
        let a = MockSource::new("a", vec![Err(SourceError::NoMatch)]);
        let b = MockSource::new(
            "b",
            vec![
                Err(SourceError::Unavailable("down".into())),
                Err(SourceError::Unavailable("down".into())),
            ],
        );
        let reconciler = Reconciler::new(vec![a as _, b as _], fast_config());
        let err = reconciler.resolve(&Query::Id(99999)).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[tokio::test]
    async fn metadata_without_elements_is_not_found() {
        let metadata = ProviderRecord {
            source: "a".into(),
            norad_id: Some(25544),
            name: Some("ISS".into()),
            ..Default::default()
        };
        let a = MockSource::new("a", vec![Ok(metadata)]);
        let reconciler = Reconciler::new(vec![a as _], fast_config());
        let err = reconciler.resolve(&Query::Id(25544)).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[tokio::test]
    async fn second_resolve_hits_cache() {
        let source = MockSource::new("a", vec![Ok(element_record("a", epoch_a()))]);
        let reconciler = Reconciler::new(vec![Arc::clone(&source) as _], fast_config());
        let first = reconciler.resolve(&Query::Id(25544)).await.unwrap();
        let second = reconciler.resolve(&Query::Id(25544)).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let source = MockSource::new(
            "a",
            vec![
                Err(SourceError::Unavailable("blip".into())),
                Ok(element_record("a", epoch_a())),
            ],
        );
        let reconciler = Reconciler::new(vec![Arc::clone(&source) as _], fast_config());
        let record = reconciler.resolve(&Query::Id(25544)).await.unwrap();
        assert_eq!(record.sources, vec!["a"]);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unauthenticated_is_not_retried() {
        let source = MockSource::new("a", vec![Err(SourceError::Unauthenticated)]);
        let reconciler = Reconciler::new(vec![Arc::clone(&source) as _], fast_config());
        let err = reconciler.resolve(&Query::Id(25544)).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn search_deduplicates_by_catalog_number() {
        let a = MockSource::new("a", vec![Ok(element_record("a", epoch_a()))]);
        let b = MockSource::new("b", vec![Ok(element_record("b", epoch_a()))]);
        let reconciler = Reconciler::new(vec![a as _, b as _], fast_config());
        let hits = reconciler.search("iss").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "a");
    }

    #[tokio::test]
    async fn search_retries_transient_failures() {
        let source = MockSource::new(
            "a",
            vec![
                Err(SourceError::Unavailable("blip".into())),
                Ok(element_record("a", epoch_a())),
            ],
        );
        let reconciler = Reconciler::new(vec![Arc::clone(&source) as _], fast_config());
        let hits = reconciler.search("iss").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn query_parses_numbers_as_catalog_ids() {
        assert_eq!("25544".parse::<Query>().unwrap(), Query::Id(25544));
        assert_eq!(
            " ISS (ZARYA) ".parse::<Query>().unwrap(),
            Query::Name("ISS (ZARYA)".into())
        );
        assert!("   ".parse::<Query>().is_err());
    }

    #[test]
    fn confidence_decays_with_element_age() {
        let source = MockSource::new("a", vec![]);
        let reconciler = Reconciler::new(vec![source as _], ReconcilerConfig::default());
        let now = Utc::now();
        let score = |epoch| {
            let chosen = elements("a", epoch);
            let records = vec![ProviderRecord::from_elements("a", chosen.clone())];
            reconciler.confidence(&records, &chosen, now)
        };
        let fresh = score(now - chrono::Duration::days(5));
        let stale = score(now - chrono::Duration::days(45));
        let dead = score(now - chrono::Duration::days(90));
        assert!((fresh - 1.0).abs() < 1e-9);
        assert!(stale < fresh && stale > 0.6);
        assert!((dead - 0.6).abs() < 1e-9);
    }

    #[test]
    fn disagreeing_elements_lower_confidence() {
        let chosen = elements("a", epoch_a());
        let mut other = elements("b", epoch_a());
        other.mean_motion_rev_day += 0.5;
        let records = vec![
            ProviderRecord::from_elements("a", chosen.clone()),
            ProviderRecord::from_elements("b", other),
        ];
        let a = MockSource::new("a", vec![]);
        let b = MockSource::new("b", vec![]);
        let reconciler = Reconciler::new(vec![a as _, b as _], ReconcilerConfig::default());
        let score = reconciler.confidence(&records, &chosen, chosen.epoch);
        // Half the element-bearing sources agree; freshness is 1.
        assert!((score - (0.6 * 0.5 + 0.4)).abs() < 1e-9);
    }
}
