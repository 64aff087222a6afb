//! Error type for configuration loading.

use thiserror::Error;

/// Result alias for this crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum Error {
	/// Reading or writing the config file failed.
	#[error("io: {0}")]
	Io(#[from] std::io::Error),
	/// The config could not be parsed or failed validation.
	#[error("config: {0}")]
	Config(String),
}

impl Error {
	/// Shorthand for [`Error::Config`].
	pub fn config(msg: impl Into<String>) -> Self { Self::Config(msg.into()) }
}
