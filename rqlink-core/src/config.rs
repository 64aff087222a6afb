//! Codec configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, str::FromStr};
use tracing::debug;

/// Log levels accepted by [`CodecConfig::log_level`].
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Codec defaults shared by the encoder factory, the CLI and subscribers.
///
/// One symbol maps onto one 1280-byte datagram payload by default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CodecConfig {
	/// One of [`LOG_LEVELS`]. `RUST_LOG` takes precedence when set.
	pub log_level: String,
	/// Encoding symbol size T, in octets.
	pub symbol_size: u16,
	/// Lower bound on the sub-symbol size (SS * Al), in octets.
	pub min_sub_symbol_size: u16,
	/// Largest sub-block decodable in working memory (WS), in octets.
	pub max_sub_block_size: u32,
	/// Symbol alignment parameter Al, in octets.
	pub alignment: u8,
	/// Capacity of ready-block queues created on behalf of callers.
	pub ready_queue_capacity: usize,
}

impl Default for CodecConfig {
	fn default() -> Self {
		Self {
			log_level: "info".into(),
			symbol_size: 1280,
			min_sub_symbol_size: 1280,
			max_sub_block_size: 8 * 1024 * 1024,
			alignment: 4,
			ready_queue_capacity: 16,
		}
	}
}

impl CodecConfig {
	/// Parse and validate a TOML file.
	pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
		let data = fs::read_to_string(path)?;
		let cfg: Self = toml::from_str(&data).map_err(|e| Error::config(format!("toml parse error: {e}")))?;
		cfg.validate()?;
		Ok(cfg)
	}

	/// Write this config as TOML.
	pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
		let data = toml::to_string_pretty(self).map_err(|e| Error::config(format!("toml encode error: {e}")))?;
		fs::write(path, data)?;
		Ok(())
	}

	/// Defaults overridden by `RQLINK_*` environment variables.
	pub fn from_env() -> Result<Self> {
		let mut cfg = Self::default();
		cfg.apply_env()?;
		cfg.validate()?;
		Ok(cfg)
	}

	/// Overlay `RQLINK_*` environment variables onto this config without validating.
	pub fn apply_env(&mut self) -> Result<()> {
		if let Ok(v) = std::env::var("RQLINK_LOG_LEVEL") { self.log_level = v; }
		if let Some(v) = env_number("RQLINK_SYMBOL_SIZE")? { self.symbol_size = v; }
		if let Some(v) = env_number("RQLINK_MIN_SUB_SYMBOL_SIZE")? { self.min_sub_symbol_size = v; }
		if let Some(v) = env_number("RQLINK_MAX_SUB_BLOCK_SIZE")? { self.max_sub_block_size = v; }
		if let Some(v) = env_number("RQLINK_ALIGNMENT")? { self.alignment = v; }
		if let Some(v) = env_number("RQLINK_READY_QUEUE_CAPACITY")? { self.ready_queue_capacity = v; }
		Ok(())
	}

	/// Reject unknown log levels and sizes the codec cannot use.
	pub fn validate(&self) -> Result<()> {
		if !LOG_LEVELS.contains(&self.log_level.as_str()) {
			return Err(Error::config(format!("invalid log_level: {}", self.log_level)));
		}
		if self.alignment == 0 {
			return Err(Error::config("alignment must be non-zero"));
		}
		let al = u16::from(self.alignment);
		if self.symbol_size == 0 || self.symbol_size % al != 0 {
			return Err(Error::config(format!(
				"symbol_size {} must be a non-zero multiple of alignment {}",
				self.symbol_size, self.alignment
			)));
		}
		if self.min_sub_symbol_size == 0 || self.min_sub_symbol_size % al != 0 {
			return Err(Error::config(format!(
				"min_sub_symbol_size {} must be a non-zero multiple of alignment {}",
				self.min_sub_symbol_size, self.alignment
			)));
		}
		if self.min_sub_symbol_size > self.symbol_size {
			return Err(Error::config(format!(
				"min_sub_symbol_size {} exceeds symbol_size {}",
				self.min_sub_symbol_size, self.symbol_size
			)));
		}
		if self.max_sub_block_size == 0 {
			return Err(Error::config("max_sub_block_size must be non-zero"));
		}
		if self.ready_queue_capacity == 0 {
			return Err(Error::config("ready_queue_capacity must be at least 1"));
		}
		Ok(())
	}
}

fn env_number<T: FromStr>(key: &str) -> Result<Option<T>> {
	match std::env::var(key) {
		Ok(v) => {
			debug!(key, value = %v, "config override from environment");
			v.trim()
				.parse::<T>()
				.map(Some)
				.map_err(|_| Error::config(format!("invalid {key}: {v}")))
		}
		Err(_) => Ok(None),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_is_valid() {
		assert!(CodecConfig::default().validate().is_ok());
	}

	#[test]
	fn misaligned_symbol_size_rejected() {
		let cfg = CodecConfig { symbol_size: 1281, ..CodecConfig::default() };
		let err = cfg.validate().unwrap_err();
		assert!(err.to_string().contains("symbol_size 1281"));
	}

	#[test]
	fn sub_symbol_larger_than_symbol_rejected() {
		let cfg = CodecConfig { symbol_size: 64, min_sub_symbol_size: 128, ..CodecConfig::default() };
		assert!(cfg.validate().is_err());
	}

	#[test]
	fn zero_capacity_rejected() {
		let cfg = CodecConfig { ready_queue_capacity: 0, ..CodecConfig::default() };
		assert!(cfg.validate().is_err());
	}
}
