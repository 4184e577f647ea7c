use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// No queried provider could produce a usable record.
    #[error("no satellite found for {0}")]
    NotFound(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}
