//! Error types for nodal-core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("duplicate element name: {0}")]
    DuplicateElement(String),

    #[error("device {name}: expected {expected} terminals, got {got}")]
    TerminalCount {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("coupling {name}: {reason}")]
    InvalidCoupling { name: String, reason: String },

    #[error("device {name}: {reason}")]
    InvalidDevice { name: String, reason: String },

    #[error("singular matrix")]
    SingularMatrix,

    #[error("matrix not factored before solve")]
    MatrixNotFactored,
}

pub type Result<T> = std::result::Result<T, Error>;
