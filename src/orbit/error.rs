use thiserror::Error;

use super::elements::TleError;

#[derive(Debug, Error)]
pub enum OrbitError {
    #[error("invalid element set: {0}")]
    Elements(#[from] TleError),
    #[error("orbit decayed: {0}")]
    Decayed(String),
    #[error("kepler solver did not converge within {0} iterations")]
    Numerical(usize),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
