//! Always-current capability handles.
//!
//! A [`ServiceProxy`] resolves the first tracked service on every call and
//! fails with [`ServiceError::ProxyUnavailable`] when there is none. The
//! [`capability_proxy!`](crate::capability_proxy) macro generates a typed
//! forwarding wrapper over a proxy.

use std::sync::Arc;

use crate::capability::{Capability, CapabilityType};
use crate::error::{Result, ServiceError};
use crate::tracker::ServiceTracker;

/// Delegating handle to the current service of capability `T`.
pub struct ServiceProxy<T: Capability + ?Sized> {
	tracker: ServiceTracker<T>,
}

impl<T: Capability + ?Sized> Clone for ServiceProxy<T> {
	fn clone(&self) -> Self {
		Self {
			tracker: self.tracker.clone(),
		}
	}
}

impl<T: Capability + ?Sized> ServiceProxy<T> {
	/// Wraps `tracker`, starting it if it is not tracking yet.
	pub fn new(tracker: ServiceTracker<T>) -> Result<Self> {
		if !tracker.is_tracking() {
			tracker.start_tracking()?;
		}
		Ok(Self { tracker })
	}

	/// The current service, if one is registered.
	pub fn current(&self) -> Option<Arc<T>> {
		self.tracker.service().ok().flatten()
	}

	pub fn get(&self) -> Result<Arc<T>> {
		self.current().ok_or(ServiceError::ProxyUnavailable {
			capability: CapabilityType::of::<T>().name(),
		})
	}

	/// Calls `f` with the current service.
	pub fn invoke_on_current<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
		let service = self.get()?;
		Ok(f(&service))
	}

	pub fn is_available(&self) -> bool {
		self.current().is_some()
	}

	pub fn tracker(&self) -> &ServiceTracker<T> {
		&self.tracker
	}

	/// Stops the underlying tracker; every later call fails.
	pub fn close(&self) {
		self.tracker.stop_tracking();
	}
}

/// Generates a forwarding wrapper over a [`ServiceProxy`].
///
/// Every listed method resolves the current service and forwards the call,
/// returning `Err(ServiceError::ProxyUnavailable)` when none is registered.
///
/// ```
/// use strata_services::capability_proxy;
///
/// pub trait Clock: Send + Sync {
/// 	fn now(&self) -> u64;
/// }
///
/// capability_proxy! {
/// 	/// Forwards to the current clock.
/// 	pub struct ClockProxy => dyn Clock {
/// 		fn now(&self) -> u64;
/// 	}
/// }
/// ```
#[macro_export]
macro_rules! capability_proxy {
	(
		$(#[$meta:meta])*
		$vis:vis struct $name:ident => $capability:ty {
			$(
				fn $method:ident(&self $(, $arg:ident : $arg_ty:ty)*) -> $ret:ty;
			)*
		}
	) => {
		$(#[$meta])*
		#[derive(Clone)]
		$vis struct $name {
			proxy: $crate::ServiceProxy<$capability>,
		}

		impl $name {
			$vis fn new(proxy: $crate::ServiceProxy<$capability>) -> Self {
				Self { proxy }
			}

			$vis fn proxy(&self) -> &$crate::ServiceProxy<$capability> {
				&self.proxy
			}

			$(
				$vis fn $method(&self $(, $arg: $arg_ty)*) -> $crate::Result<$ret> {
					self.proxy.invoke_on_current(|service| service.$method($($arg),*))
				}
			)*
		}
	};
}
