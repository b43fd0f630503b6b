//! Shared domain types for the Anthill performance pipeline.

pub mod config;
pub mod settings;
pub mod telemetry;

mod errors;

pub use errors::{AnthillError, Result};
