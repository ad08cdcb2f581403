//! Error types for registry, tracker and proxy operations.

use thiserror::Error;

/// Errors surfaced by the service layer.
///
/// Listener and event-handler failures never appear here: they are isolated
/// per callback and logged (see [`crate::callback::isolate`]).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
	/// The registry has not been started, or has been stopped.
	#[error("service registry is not available")]
	Unavailable,

	/// A tracker was queried before `start_tracking` or after `stop_tracking`.
	#[error("service tracker is not tracking")]
	NotTracking,

	/// `start_tracking` was called on a tracker that is already tracking.
	#[error("service tracker is already tracking")]
	AlreadyTracking,

	/// A capability proxy was invoked while no matching service is registered.
	#[error("service '{capability}' is not available")]
	ProxyUnavailable {
		/// Name of the capability type the proxy forwards to.
		capability: &'static str,
	},
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;
