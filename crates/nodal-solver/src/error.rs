//! Error types for nodal-solver.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Device(#[from] nodal_devices::Error),

    #[error("failed to converge in {iterations} iterations")]
    ConvergenceFailed { iterations: usize },

    #[error("transient failed to converge at t={time}")]
    TransientFailed { time: f64 },

    #[error("invalid analysis parameters: {0}")]
    InvalidParams(String),

    #[error("source {0} not found")]
    SourceNotFound(String),
}

impl From<nodal_core::Error> for Error {
    fn from(e: nodal_core::Error) -> Self {
        Error::Device(e.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
