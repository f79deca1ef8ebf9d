//! Error types for the MTGL workspace.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MtglError>;

#[derive(Error, Debug)]
pub enum MtglError {
    #[error("Tensor error: {0}")]
    Tensor(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    #[error("Shape mismatch for {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    #[error("{count} node(s) have zero in-degree; add self loops or set allow_zero_in_degree")]
    ZeroInDegree { count: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<candle_core::Error> for MtglError {
    fn from(e: candle_core::Error) -> Self {
        MtglError::Tensor(e.to_string())
    }
}

impl MtglError {
    pub fn shape(what: impl Into<String>, expected: usize, found: usize) -> Self {
        MtglError::ShapeMismatch {
            what: what.into(),
            expected,
            found,
        }
    }
}
