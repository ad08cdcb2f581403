//! Tracing subscriber setup.

use std::fs::OpenOptions;
use std::sync::Arc;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;
use crate::error::RuntimeError;

/// Environment variable overriding the configured filter.
pub const LOG_ENV: &str = "STRATA_LOG";

/// Filter directives in effect: `STRATA_LOG`, then the configured filter,
/// with `verbose` raising strata crates to debug.
pub fn directives(config: &LoggingConfig, verbose: bool, env: Option<&str>) -> String {
	match env.map(str::trim).filter(|s| !s.is_empty()) {
		Some(env) => env.to_owned(),
		None if verbose => format!("strata_services=debug,strata_components=debug,strata_runtime=debug,{}", config.filter),
		None => config.filter.clone(),
	}
}

/// Installs the global subscriber.
///
/// Fails if the filter does not parse, the log file cannot be opened, or a
/// subscriber is already installed.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<(), RuntimeError> {
	let env = std::env::var(LOG_ENV).ok();
	let directives = directives(config, verbose, env.as_deref());
	let filter = EnvFilter::try_new(&directives).map_err(|e| RuntimeError::Logging(format!("{directives}: {e}")))?;

	let layer: Box<dyn Layer<Registry> + Send + Sync> = match &config.file {
		Some(path) => {
			let file = OpenOptions::new()
				.create(true)
				.append(true)
				.open(path)
				.map_err(|e| RuntimeError::Logging(format!("{}: {e}", path.display())))?;
			let layer = tracing_subscriber::fmt::layer()
				.with_writer(Arc::new(file))
				.with_ansi(false)
				.with_target(true);
			if config.compact { layer.compact().boxed() } else { layer.boxed() }
		}
		None => {
			let layer = tracing_subscriber::fmt::layer()
				.with_writer(std::io::stderr)
				.with_ansi(config.ansi);
			if config.compact { layer.compact().boxed() } else { layer.boxed() }
		}
	};

	tracing_subscriber::registry()
		.with(layer)
		.with(filter)
		.try_init()
		.map_err(|e| RuntimeError::Logging(e.to_string()))?;

	tracing::debug!(filter = %directives, file = ?config.file, "tracing initialized");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_env_overrides_config() {
		let config = LoggingConfig::default();
		assert_eq!(directives(&config, true, Some("warn")), "warn");
	}

	#[test]
	fn test_blank_env_falls_back_to_config() {
		let config = LoggingConfig {
			filter: "error".to_owned(),
			..LoggingConfig::default()
		};
		assert_eq!(directives(&config, false, Some("  ")), "error");
		assert_eq!(directives(&config, false, None), "error");
	}

	#[test]
	fn test_verbose_raises_strata_crates() {
		let directives = directives(&LoggingConfig::default(), true, None);
		assert!(directives.starts_with("strata_services=debug"));
		assert!(directives.ends_with(",info"));
	}
}
