#![forbid(unsafe_code)]

//! Configuration, error handling and tracing setup shared across rqlink crates.

/// Codec configuration file and environment overrides.
pub mod config;
pub mod error;
pub mod logging;

pub use config::CodecConfig;
pub use error::{Error, Result};
