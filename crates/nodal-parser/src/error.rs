//! Error types for nodal-parser.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: invalid value '{token}'")]
    InvalidValue { line: usize, token: String },

    #[error("line {line}: unknown element type '{name}'")]
    UnknownElement { line: usize, name: String },

    #[error("line {line}: unknown model type '{kind}'")]
    UnknownModelType { line: usize, kind: String },
}

impl Error {
    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
