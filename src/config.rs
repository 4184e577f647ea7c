use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::catalog::ReconcilerConfig;
use crate::orbit::{GroundStation, OrbitError};
use crate::sources::{Celestrak, DataSource, N2yo, Satnogs, SourceError, SpaceTrack};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid station: {0}")]
    Station(#[from] OrbitError),
    #[error("source setup failed: {0}")]
    Source(#[from] SourceError),
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub station: StationConfig,
    pub sources: SourcesConfig,
    pub reconciler: ReconcilerSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub name: Option<String>,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_m: f64,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            name: None,
            latitude_deg: 20.67,
            longitude_deg: -103.35,
            altitude_m: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Celestrak,
    Spacetrack,
    N2yo,
    Satnogs,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Descending priority order; omitted sources are never queried.
    pub priority: Vec<SourceKind>,
    pub celestrak: CelestrakConfig,
    pub spacetrack: SpacetrackConfig,
    pub n2yo: N2yoConfig,
    pub satnogs: SatnogsConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            priority: vec![
                SourceKind::Celestrak,
                SourceKind::Spacetrack,
                SourceKind::N2yo,
                SourceKind::Satnogs,
            ],
            celestrak: CelestrakConfig::default(),
            spacetrack: SpacetrackConfig::default(),
            n2yo: N2yoConfig::default(),
            satnogs: SatnogsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CelestrakConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_s: u64,
}

impl Default for CelestrakConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://celestrak.org".to_string(),
            timeout_s: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpacetrackConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_s: u64,
    pub identity: Option<String>,
    pub password: Option<String>,
}

impl Default for SpacetrackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://www.space-track.org".to_string(),
            timeout_s: 15,
            identity: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct N2yoConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_s: u64,
    pub api_key: Option<String>,
}

impl Default for N2yoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.n2yo.com/rest/v1/satellite".to_string(),
            timeout_s: 15,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SatnogsConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_s: u64,
}

impl Default for SatnogsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://db.satnogs.org/api".to_string(),
            timeout_s: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcilerSettings {
    pub max_attempts: usize,
    pub retry_base_ms: u64,
    pub staleness_days: u64,
    pub agreement_weight: f64,
    pub freshness_weight: f64,
    pub cache_ttl_s: u64,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_base_ms: 250,
            staleness_days: 30,
            agreement_weight: 0.6,
            freshness_weight: 0.4,
            cache_ttl_s: 300,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Loads the given file, or built-in defaults when no file is named.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Config::default()),
        }
    }

    pub fn ground_station(&self) -> Result<GroundStation, ConfigError> {
        Ok(GroundStation::new(
            self.station.latitude_deg,
            self.station.longitude_deg,
            self.station.altitude_m,
        )?)
    }

    /// Instantiates the enabled providers in configured priority order.
    pub fn build_sources(&self) -> Result<Vec<Arc<dyn DataSource>>, ConfigError> {
        let mut sources: Vec<Arc<dyn DataSource>> = Vec::new();
        for kind in &self.sources.priority {
            match kind {
                SourceKind::Celestrak if self.sources.celestrak.enabled => {
                    sources.push(Arc::new(Celestrak::new(&self.sources.celestrak)?));
                }
                SourceKind::Spacetrack if self.sources.spacetrack.enabled => {
                    sources.push(Arc::new(SpaceTrack::new(&self.sources.spacetrack)?));
                }
                SourceKind::N2yo if self.sources.n2yo.enabled => {
                    sources.push(Arc::new(N2yo::new(&self.sources.n2yo)?));
                }
                SourceKind::Satnogs if self.sources.satnogs.enabled => {
                    sources.push(Arc::new(Satnogs::new(&self.sources.satnogs)?));
                }
                _ => log::debug!("source {kind:?} disabled, skipping"),
            }
        }
        Ok(sources)
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        let r = &self.reconciler;
        ReconcilerConfig {
            max_attempts: r.max_attempts,
            retry_base: Duration::from_millis(r.retry_base_ms),
            staleness: Duration::from_secs(r.staleness_days * 24 * 3600),
            agreement_weight: r.agreement_weight,
            freshness_weight: r.freshness_weight,
            cache_ttl: Duration::from_secs(r.cache_ttl_s),
        }
    }
}
