use strata_services::ServiceError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised while bringing a runtime up.
#[derive(Debug, Error)]
pub enum RuntimeError {
	/// The configuration could not be loaded.
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// The tracing subscriber could not be installed.
	#[error("failed to initialize logging: {0}")]
	Logging(String),

	/// `start` was called on a running runtime.
	#[error("runtime is already running")]
	AlreadyRunning,

	/// A startup hook failed; the runtime has been stopped again.
	#[error("startup hook '{hook}' failed")]
	StartupHook {
		/// Name the hook was registered under.
		hook: String,
		#[source]
		source: anyhow::Error,
	},

	/// A module's components could not be started.
	#[error("module '{module}' failed to start")]
	Module {
		module: String,
		#[source]
		source: ServiceError,
	},
}
