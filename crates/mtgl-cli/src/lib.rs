//! Library side of the `mtgl` binary, kept separate so the commands can be
//! driven from tests.

pub mod commands;

pub use commands::{init, predict, summary, ModelSummary, PredictionRecord};
