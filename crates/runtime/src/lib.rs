//! Runtime hosting a strata service registry.
//!
//! The [`Runtime`] owns the registry's start/stop lifecycle, runs startup and
//! shutdown hooks around it, and acts as the module lifecycle driver for the
//! modules installed into it. Configuration is read from TOML
//! ([`RuntimeConfig`]); [`logging::init`] installs the tracing subscriber.

mod config;
mod error;
pub mod logging;
mod runtime;

pub use config::{ConfigError, LoggingConfig, RegistryConfig, RuntimeConfig};
pub use error::RuntimeError;
pub use runtime::Runtime;
