//! Service trackers.
//!
//! A [`ServiceTracker`] keeps an ordered, incrementally updated view of every
//! registration matching one capability type and filter. The view is an
//! immutable [`TrackerSnapshot`] swapped copy-on-write, so readers never block
//! and never observe a list being mutated under them.
//!
//! Updates come from a weakly held registry listener and are serialised by a
//! small mutex; event handlers are notified after the snapshot is replaced,
//! iterating a copy of the handler list so handlers may add or remove
//! handlers, or mutate the registry, without disturbing delivery.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::callback::isolate;
use crate::capability::{Capability, CapabilityType};
use crate::error::{Result, ServiceError};
use crate::filter::Filter;
use crate::listener::{ListenerRetention, ListenerSubscription, ServiceListener, listener_addr};
use crate::module::ModuleRef;
use crate::registration::{RegistrationId, ServiceRegistration};
use crate::registry::ServiceRegistry;

/// Immutable view of a tracker's matches, in registration order.
pub struct TrackerSnapshot<T: ?Sized> {
	registrations: Vec<ServiceRegistration<T>>,
	services: Vec<Arc<T>>,
}

impl<T: Capability + ?Sized> TrackerSnapshot<T> {
	fn empty() -> Self {
		Self {
			registrations: Vec::new(),
			services: Vec::new(),
		}
	}

	pub fn registrations(&self) -> &[ServiceRegistration<T>] {
		&self.registrations
	}

	pub fn services(&self) -> &[Arc<T>] {
		&self.services
	}

	pub fn len(&self) -> usize {
		self.registrations.len()
	}

	pub fn is_empty(&self) -> bool {
		self.registrations.is_empty()
	}

	fn position(&self, id: RegistrationId) -> Option<usize> {
		self.registrations.iter().position(|r| r.id() == id)
	}

	fn with_inserted(&self, registration: &ServiceRegistration<T>, service: &Arc<T>) -> Self {
		let mut next = self.clone();
		let at = next.registrations.partition_point(|r| r.id() < registration.id());
		next.registrations.insert(at, registration.clone());
		next.services.insert(at, service.clone());
		next
	}

	fn without(&self, index: usize) -> Self {
		let mut next = self.clone();
		next.registrations.remove(index);
		next.services.remove(index);
		next
	}
}

impl<T: ?Sized> Clone for TrackerSnapshot<T> {
	fn clone(&self) -> Self {
		Self {
			registrations: self.registrations.clone(),
			services: self.services.clone(),
		}
	}
}

type Handler<T> = Arc<dyn ServiceListener<T>>;

struct TrackerInner<T: Capability + ?Sized> {
	registry: ServiceRegistry,
	owner: Option<ModuleRef>,
	filter: Filter,
	/// `None` while not tracking.
	snapshot: ArcSwapOption<TrackerSnapshot<T>>,
	update: Mutex<()>,
	subscription: Mutex<Option<ListenerSubscription>>,
	handlers: Mutex<Vec<Handler<T>>>,
}

impl<T: Capability + ?Sized> TrackerInner<T> {
	fn fan_out(&self, registration: &ServiceRegistration<T>, service: &Arc<T>, registered: bool) {
		let handlers = self.handlers.lock().clone();
		for handler in handlers {
			let result = isolate(|| {
				if registered {
					handler.service_registered(registration, service);
				} else {
					handler.service_unregistered(registration, service);
				}
			});
			if let Err(panic) = result {
				warn!(
					capability = %CapabilityType::of::<T>(),
					registration = %registration.id(),
					%panic,
					"tracker event handler panicked"
				);
			}
		}
	}
}

impl<T: Capability + ?Sized> ServiceListener<T> for TrackerInner<T> {
	fn service_registered(&self, registration: &ServiceRegistration<T>, service: &Arc<T>) {
		{
			let _update = self.update.lock();
			let Some(current) = self.snapshot.load_full() else {
				return;
			};
			// A replayed registration may have been withdrawn in the meantime.
			if !registration.is_live() || current.position(registration.id()).is_some() {
				return;
			}
			self.snapshot
				.store(Some(Arc::new(current.with_inserted(registration, service))));
		}
		self.fan_out(registration, service, true);
	}

	fn service_unregistered(&self, registration: &ServiceRegistration<T>, service: &Arc<T>) {
		{
			let _update = self.update.lock();
			let Some(current) = self.snapshot.load_full() else {
				return;
			};
			let Some(index) = current.position(registration.id()) else {
				return;
			};
			self.snapshot.store(Some(Arc::new(current.without(index))));
		}
		self.fan_out(registration, service, false);
	}
}

/// Live view of all registrations for capability `T` matching a filter.
///
/// Trackers are created stopped; queries fail with
/// [`ServiceError::NotTracking`] until [`start_tracking`](Self::start_tracking).
/// Clones share the same view.
pub struct ServiceTracker<T: Capability + ?Sized> {
	inner: Arc<TrackerInner<T>>,
}

impl<T: Capability + ?Sized> Clone for ServiceTracker<T> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<T: Capability + ?Sized> ServiceTracker<T> {
	pub fn new(registry: ServiceRegistry, owner: Option<ModuleRef>, filter: Filter) -> Self {
		Self {
			inner: Arc::new(TrackerInner {
				registry,
				owner,
				filter,
				snapshot: ArcSwapOption::empty(),
				update: Mutex::new(()),
				subscription: Mutex::new(None),
				handlers: Mutex::new(Vec::new()),
			}),
		}
	}

	pub fn filter(&self) -> &Filter {
		&self.inner.filter
	}

	pub fn capability(&self) -> CapabilityType {
		CapabilityType::of::<T>()
	}

	pub fn is_tracking(&self) -> bool {
		self.inner.snapshot.load().is_some()
	}

	/// Subscribes to the registry and populates the view with every matching
	/// service already registered.
	pub fn start_tracking(&self) -> Result<()> {
		{
			let _update = self.inner.update.lock();
			if self.inner.snapshot.load().is_some() {
				return Err(ServiceError::AlreadyTracking);
			}
			self.inner
				.snapshot
				.store(Some(Arc::new(TrackerSnapshot::empty())));
		}

		let subscription = self.inner.registry.add_listener::<T, _>(
			self.inner.owner.as_ref(),
			self.inner.clone(),
			self.inner.filter.clone(),
			ListenerRetention::Weak,
		);
		match subscription {
			Ok(subscription) => {
				*self.inner.subscription.lock() = Some(subscription);
				debug!(
					capability = %self.capability(),
					filter = %self.inner.filter,
					tracked = self.len().unwrap_or(0),
					"started tracking"
				);
				Ok(())
			}
			Err(err) => {
				self.inner.snapshot.store(None);
				Err(err)
			}
		}
	}

	/// Unsubscribes and discards the view. Does nothing if not tracking.
	pub fn stop_tracking(&self) {
		let subscription = self.inner.subscription.lock().take();
		if let Some(subscription) = subscription {
			let _ = subscription.cancel();
		}
		let _update = self.inner.update.lock();
		if self.inner.snapshot.swap(None).is_some() {
			debug!(capability = %self.capability(), filter = %self.inner.filter, "stopped tracking");
		}
	}

	/// The current immutable view.
	pub fn snapshot(&self) -> Result<Arc<TrackerSnapshot<T>>> {
		self.inner.snapshot.load_full().ok_or(ServiceError::NotTracking)
	}

	pub fn registrations(&self) -> Result<Vec<ServiceRegistration<T>>> {
		Ok(self.snapshot()?.registrations.clone())
	}

	pub fn services(&self) -> Result<Vec<Arc<T>>> {
		Ok(self.snapshot()?.services.clone())
	}

	/// First tracked registration, if any.
	pub fn registration(&self) -> Result<Option<ServiceRegistration<T>>> {
		Ok(self.snapshot()?.registrations.first().cloned())
	}

	/// First tracked service, if any.
	pub fn service(&self) -> Result<Option<Arc<T>>> {
		Ok(self.snapshot()?.services.first().cloned())
	}

	pub fn len(&self) -> Result<usize> {
		Ok(self.snapshot()?.len())
	}

	/// Adds a handler for this tracker's events.
	///
	/// When already tracking, the handler is first replayed one
	/// `service_registered` per tracked service.
	pub fn add_event_handler<H: ServiceListener<T> + 'static>(&self, handler: Arc<H>) {
		let handler: Handler<T> = handler;
		self.inner.handlers.lock().push(handler.clone());
		if let Some(current) = self.inner.snapshot.load_full() {
			for (registration, service) in current.registrations.iter().zip(&current.services) {
				if let Err(panic) = isolate(|| handler.service_registered(registration, service)) {
					warn!(capability = %self.capability(), %panic, "tracker event handler panicked during replay");
				}
			}
		}
	}

	/// Removes the first handler that is `handler`. Returns whether one was
	/// found.
	pub fn remove_event_handler<H: ?Sized>(&self, handler: &Arc<H>) -> bool {
		let addr = listener_addr(handler);
		let mut handlers = self.inner.handlers.lock();
		match handlers.iter().position(|h| listener_addr(h) == addr) {
			Some(index) => {
				handlers.remove(index);
				true
			}
			None => false,
		}
	}
}

impl<T: Capability + ?Sized> std::fmt::Debug for ServiceTracker<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ServiceTracker")
			.field("capability", &self.capability())
			.field("filter", &self.inner.filter)
			.field("tracked", &self.len().ok())
			.finish()
	}
}

#[cfg(test)]
mod tests;
