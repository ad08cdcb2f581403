//! TOML runtime configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// The file was read but is not a valid configuration.
	#[error("invalid configuration in {path}: {error}")]
	Parse {
		/// Path to the offending file, or `<inline>` for string input.
		path: PathBuf,
		error: toml::de::Error,
	},
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
	/// Name used in runtime log lines.
	pub name: String,
	pub logging: LoggingConfig,
	pub registry: RegistryConfig,
}

impl Default for RuntimeConfig {
	fn default() -> Self {
		Self {
			name: "strata".to_owned(),
			logging: LoggingConfig::default(),
			registry: RegistryConfig::default(),
		}
	}
}

/// `[logging]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
	/// `EnvFilter` directives. `STRATA_LOG` takes precedence when set.
	pub filter: String,
	pub ansi: bool,
	/// Use the compact single-line formatter.
	pub compact: bool,
	/// Append logs to this file instead of writing to stderr.
	pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self {
			filter: "info".to_owned(),
			ansi: true,
			compact: false,
			file: None,
		}
	}
}

/// `[registry]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
	pub name: String,
}

impl Default for RegistryConfig {
	fn default() -> Self {
		Self {
			name: "default".to_owned(),
		}
	}
}

impl RuntimeConfig {
	/// Reads and parses a configuration file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let source = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::parse(&source, path)
	}

	/// Parses configuration from an in-memory TOML document.
	pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
		Self::parse(source, Path::new("<inline>"))
	}

	fn parse(source: &str, path: &Path) -> Result<Self, ConfigError> {
		toml::from_str(source).map_err(|error| ConfigError::Parse {
			path: path.to_path_buf(),
			error,
		})
	}
}

#[cfg(test)]
mod tests;
