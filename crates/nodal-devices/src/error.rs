//! Error types for nodal-devices.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] nodal_core::Error),

    #[error("device {name}: {reason}")]
    Stamp { name: String, reason: String },

    #[error("device {name}: zero inductance")]
    ZeroInductance { name: String },
}

impl Error {
    pub fn stamp(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Stamp {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
