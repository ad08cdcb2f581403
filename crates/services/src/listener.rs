//! Registry listeners and their entries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::capability::{Capability, CapabilityType};
use crate::error::Result;
use crate::filter::Filter;
use crate::module::ModuleRef;
use crate::registration::{ErasedService, RegistrationHandle, ServiceRegistration};
use crate::registry::{ServiceRegistry, Shared};

/// Observer of registrations for capability `T`.
///
/// Both callbacks run synchronously on the thread that mutated the registry,
/// with no registry lock held. On unregistration the outgoing instance is
/// passed explicitly; it is no longer reachable through the registry.
pub trait ServiceListener<T: Capability + ?Sized>: Send + Sync {
	fn service_registered(&self, registration: &ServiceRegistration<T>, service: &Arc<T>);

	fn service_unregistered(&self, registration: &ServiceRegistration<T>, service: &Arc<T>);
}

/// How a listener entry holds on to its listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerRetention {
	/// The entry keeps the listener alive until it is removed.
	Strong,
	/// The entry does not keep the listener alive and drops out once the
	/// listener is gone.
	Weak,
}

type Callback<T> = Box<dyn Fn(&ServiceRegistration<T>, &Arc<T>) + Send + Sync>;

/// Listener assembled from closures. Missing callbacks ignore the event.
pub struct FnListener<T: ?Sized> {
	registered: Option<Callback<T>>,
	unregistered: Option<Callback<T>>,
}

impl<T: Capability + ?Sized> FnListener<T> {
	pub fn new() -> Self {
		Self {
			registered: None,
			unregistered: None,
		}
	}

	pub fn on_registered(
		mut self,
		f: impl Fn(&ServiceRegistration<T>, &Arc<T>) + Send + Sync + 'static,
	) -> Self {
		self.registered = Some(Box::new(f));
		self
	}

	pub fn on_unregistered(
		mut self,
		f: impl Fn(&ServiceRegistration<T>, &Arc<T>) + Send + Sync + 'static,
	) -> Self {
		self.unregistered = Some(Box::new(f));
		self
	}
}

impl<T: Capability + ?Sized> Default for FnListener<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: Capability + ?Sized> ServiceListener<T> for FnListener<T> {
	fn service_registered(&self, registration: &ServiceRegistration<T>, service: &Arc<T>) {
		if let Some(f) = &self.registered {
			f(registration, service);
		}
	}

	fn service_unregistered(&self, registration: &ServiceRegistration<T>, service: &Arc<T>) {
		if let Some(f) = &self.unregistered {
			f(registration, service);
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventKind {
	Registered,
	Unregistered,
}

impl EventKind {
	pub(crate) fn as_str(self) -> &'static str {
		match self {
			Self::Registered => "service_registered",
			Self::Unregistered => "service_unregistered",
		}
	}
}

pub(crate) enum Delivery {
	Delivered,
	/// The weak target was gone; nothing was invoked.
	Dead,
}

/// Capability-erased listener target.
pub(crate) trait ErasedListener: Send + Sync {
	fn deliver(&self, kind: EventKind, registration: &RegistrationHandle, service: &ErasedService) -> Delivery;

	fn is_dead(&self) -> bool;
}

enum Target<T: Capability + ?Sized> {
	Strong(Arc<dyn ServiceListener<T>>),
	Weak(Weak<dyn ServiceListener<T>>),
}

impl<T: Capability + ?Sized> Target<T> {
	fn upgrade(&self) -> Option<Arc<dyn ServiceListener<T>>> {
		match self {
			Self::Strong(listener) => Some(listener.clone()),
			Self::Weak(listener) => listener.upgrade(),
		}
	}
}

impl<T: Capability + ?Sized> ErasedListener for Target<T> {
	fn deliver(&self, kind: EventKind, registration: &RegistrationHandle, service: &ErasedService) -> Delivery {
		let Some(listener) = self.upgrade() else {
			return Delivery::Dead;
		};
		if let Some(service) = service.downcast_ref::<Arc<T>>() {
			let registration = ServiceRegistration::<T>::from_handle(registration.clone());
			match kind {
				EventKind::Registered => listener.service_registered(&registration, service),
				EventKind::Unregistered => listener.service_unregistered(&registration, service),
			}
		}
		Delivery::Delivered
	}

	fn is_dead(&self) -> bool {
		match self {
			Self::Strong(_) => false,
			Self::Weak(listener) => listener.strong_count() == 0,
		}
	}
}

/// One installed listener: capability, filter and target.
pub(crate) struct ListenerEntry {
	pub(crate) id: u64,
	pub(crate) capability: CapabilityType,
	pub(crate) filter: Filter,
	pub(crate) owner: Option<ModuleRef>,
	/// Address of the listener allocation, used for removal by identity.
	pub(crate) addr: usize,
	pub(crate) target: Box<dyn ErasedListener>,
	removed: AtomicBool,
}

impl ListenerEntry {
	pub(crate) fn new<T: Capability + ?Sized>(
		id: u64,
		owner: Option<ModuleRef>,
		listener: Arc<dyn ServiceListener<T>>,
		filter: Filter,
		retention: ListenerRetention,
	) -> Self {
		let addr = listener_addr(&listener);
		let target = match retention {
			ListenerRetention::Strong => Target::Strong(listener),
			ListenerRetention::Weak => Target::Weak(Arc::downgrade(&listener)),
		};
		Self {
			id,
			capability: CapabilityType::of::<T>(),
			filter,
			owner,
			addr,
			target: Box::new(target),
			removed: AtomicBool::new(false),
		}
	}

	pub(crate) fn matches(&self, registration: &RegistrationHandle) -> bool {
		self.capability == registration.capability() && self.filter.matches(registration.properties())
	}

	pub(crate) fn is_dead(&self) -> bool {
		self.target.is_dead()
	}

	pub(crate) fn is_removed(&self) -> bool {
		self.removed.load(Ordering::Acquire)
	}

	pub(crate) fn mark_removed(&self) {
		self.removed.store(true, Ordering::Release);
	}

	pub(crate) fn is_owned_by(&self, module: &ModuleRef) -> bool {
		self.owner.as_ref() == Some(module)
	}
}

pub(crate) fn listener_addr<L: ?Sized>(listener: &Arc<L>) -> usize {
	Arc::as_ptr(listener).cast::<()>() as usize
}

/// Handle to an installed listener.
///
/// Dropping the subscription does not remove the listener; call
/// [`cancel`](Self::cancel), or install the listener with
/// [`ListenerRetention::Weak`] and let it drop out on its own.
#[must_use = "a strongly held listener stays installed until cancelled"]
pub struct ListenerSubscription {
	id: u64,
	registry: Weak<Shared>,
}

impl ListenerSubscription {
	pub(crate) fn new(id: u64, registry: Weak<Shared>) -> Self {
		Self { id, registry }
	}

	/// Removes the listener entry. Returns whether it was still installed.
	pub fn cancel(&self) -> Result<bool> {
		let Some(shared) = self.registry.upgrade() else {
			return Ok(false);
		};
		ServiceRegistry::from_shared(shared).remove_entry(self.id)
	}

	pub fn id(&self) -> u64 {
		self.id
	}
}

impl std::fmt::Debug for ListenerSubscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ListenerSubscription")
			.field("id", &self.id)
			.finish()
	}
}
