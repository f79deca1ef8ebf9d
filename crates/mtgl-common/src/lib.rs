//! mtgl-common — Shared error type and model configuration used across all MTGL crates.

pub mod config;
pub mod error;

pub use config::{GatingConfig, ModelConfig, SharedEmbedding, TaskRoute};
pub use error::{MtglError, Result};
