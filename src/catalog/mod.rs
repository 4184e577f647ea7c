//! Reconciled satellite catalog. Fans queries out to the configured
//! providers, merges their partial answers, and caches the result.

mod cache;
mod error;
mod reconciler;
mod record;

pub use cache::RecordCache;
pub use error::CatalogError;
pub use reconciler::{Query, Reconciler, ReconcilerConfig};
pub use record::{SatelliteRecord, SatelliteStatus, SearchHit};
