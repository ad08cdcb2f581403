//! The service registry.
//!
//! # Concurrency Model
//!
//! All registry state lives behind one `RwLock<Option<RegistryState>>`; `None`
//! means the registry is stopped. Queries take the read lock. Mutations take
//! the write lock, apply the change, capture the listener entries that must be
//! told about it (in listener installation order) and release the lock. The
//! captured entries are then notified on the calling thread before the call
//! returns. No lock is held while listener code runs, so a listener may call
//! back into the registry, including registering or unregistering services.
//!
//! Bookkeeping always precedes notification: an unregistered service is
//! removed from the map and its handle marked dead before any listener hears
//! about it, so a failing listener can never leave the state half-updated.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, info, trace, warn};

use crate::callback::isolate;
use crate::capability::{Capability, CapabilityType};
use crate::error::{Result, ServiceError};
use crate::filter::Filter;
use crate::listener::{
	Delivery, EventKind, ListenerEntry, ListenerRetention, ListenerSubscription, ServiceListener,
	listener_addr,
};
use crate::module::ModuleRef;
use crate::properties::Properties;
use crate::proxy::ServiceProxy;
use crate::registration::{
	ErasedService, RegistrationHandle, RegistrationId, RegistrationInner, ServiceRegistration,
};
use crate::tracker::ServiceTracker;

mod scoped;

pub use scoped::ModuleServices;

struct LiveService {
	handle: RegistrationHandle,
	service: ErasedService,
}

/// State that exists only while the registry is running.
#[derive(Default)]
struct RegistryState {
	/// Insertion order is registration order.
	services: IndexMap<RegistrationId, LiveService>,
	/// Installation order is notification order.
	listeners: Vec<Arc<ListenerEntry>>,
}

impl RegistryState {
	fn listeners_for(&self, registration: &RegistrationHandle) -> Vec<Arc<ListenerEntry>> {
		self.listeners
			.iter()
			.filter(|entry| entry.matches(registration))
			.cloned()
			.collect()
	}

	/// Drops weak entries whose listener is gone.
	fn purge_dead(&mut self) {
		self.listeners.retain(|entry| {
			let dead = entry.is_dead();
			if dead {
				entry.mark_removed();
				debug!(listener = entry.id, capability = %entry.capability, "dropped unreachable listener");
			}
			!dead
		});
	}
}

pub(crate) struct Shared {
	name: String,
	state: RwLock<Option<RegistryState>>,
	next_registration: AtomicU64,
	next_listener: AtomicU64,
}

/// Handle to a service registry. Cloning is cheap and shares the registry.
///
/// A new registry is stopped; every operation fails with
/// [`ServiceError::Unavailable`] until [`start`](Self::start) is called.
#[derive(Clone)]
pub struct ServiceRegistry {
	shared: Arc<Shared>,
}

impl ServiceRegistry {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			shared: Arc::new(Shared {
				name: name.into(),
				state: RwLock::new(None),
				next_registration: AtomicU64::new(1),
				next_listener: AtomicU64::new(1),
			}),
		}
	}

	pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
		Self { shared }
	}

	pub fn name(&self) -> &str {
		&self.shared.name
	}

	/// Creates fresh registry state. Returns `false` if already running.
	pub fn start(&self) -> bool {
		let mut state = self.shared.state.write();
		if state.is_some() {
			return false;
		}
		*state = Some(RegistryState::default());
		info!(registry = %self.shared.name, "service registry started");
		true
	}

	/// Discards all registry state without firing unregistration events.
	///
	/// Every outstanding registration handle becomes dead. Returns `false` if
	/// the registry was not running.
	pub fn stop(&self) -> bool {
		let Some(state) = self.shared.state.write().take() else {
			return false;
		};
		for live in state.services.values() {
			live.handle.mark_dead();
		}
		for entry in &state.listeners {
			entry.mark_removed();
		}
		info!(
			registry = %self.shared.name,
			services = state.services.len(),
			listeners = state.listeners.len(),
			"service registry stopped"
		);
		true
	}

	pub fn is_running(&self) -> bool {
		self.shared.state.read().is_some()
	}

	/// Publishes `service` under capability `T`.
	///
	/// Every matching listener is notified before this returns. A listener
	/// that panics is logged and skipped; the registration stands.
	pub fn register<T: Capability + ?Sized>(
		&self,
		owner: Option<&ModuleRef>,
		service: Arc<T>,
		properties: Properties,
	) -> Result<ServiceRegistration<T>> {
		let erased: ErasedService = Arc::new(service);
		let (handle, targets) = {
			let mut guard = self.shared.state.write();
			let state = guard.as_mut().ok_or(ServiceError::Unavailable)?;
			state.purge_dead();

			let id = RegistrationId(self.shared.next_registration.fetch_add(1, Ordering::Relaxed));
			let handle = RegistrationHandle::new(RegistrationInner {
				id,
				capability: CapabilityType::of::<T>(),
				properties,
				owner: owner.cloned(),
				live: true.into(),
				registry: Arc::downgrade(&self.shared),
			});
			state.services.insert(
				id,
				LiveService {
					handle: handle.clone(),
					service: erased.clone(),
				},
			);
			let targets = state.listeners_for(&handle);
			(handle, targets)
		};

		debug!(
			registration = %handle.id(),
			capability = %handle.capability(),
			owner = handle.owner().map(ModuleRef::name),
			listeners = targets.len(),
			"registered service"
		);
		self.dispatch(EventKind::Registered, &handle, &erased, &targets);
		Ok(ServiceRegistration::from_handle(handle))
	}

	/// Withdraws a registration.
	///
	/// The instance stops being reachable through lookups before any listener
	/// is told, and listeners receive it as an argument. Returns `Ok(false)`
	/// if the registration was already withdrawn.
	pub fn unregister(&self, registration: &RegistrationHandle) -> Result<bool> {
		let (service, targets) = {
			let mut guard = self.shared.state.write();
			let state = guard.as_mut().ok_or(ServiceError::Unavailable)?;
			if !registration.belongs_to(&self.shared) {
				return Ok(false);
			}
			state.purge_dead();
			let Some(live) = state.services.shift_remove(&registration.id()) else {
				return Ok(false);
			};
			live.handle.mark_dead();
			(live.service, state.listeners_for(registration))
		};

		debug!(
			registration = %registration.id(),
			capability = %registration.capability(),
			listeners = targets.len(),
			"unregistered service"
		);
		self.dispatch(EventKind::Unregistered, registration, &service, &targets);
		Ok(true)
	}

	/// First matching registration, in registration order.
	pub fn find_service<T: Capability + ?Sized>(&self, filter: &Filter) -> Result<Option<ServiceRegistration<T>>> {
		let guard = self.shared.state.read();
		let state = guard.as_ref().ok_or(ServiceError::Unavailable)?;
		Ok(state
			.services
			.values()
			.find(|live| Self::selects::<T>(&live.handle, filter))
			.map(|live| ServiceRegistration::from_handle(live.handle.clone())))
	}

	/// Every matching registration, in registration order.
	pub fn find_services<T: Capability + ?Sized>(&self, filter: &Filter) -> Result<Vec<ServiceRegistration<T>>> {
		let guard = self.shared.state.read();
		let state = guard.as_ref().ok_or(ServiceError::Unavailable)?;
		Ok(state
			.services
			.values()
			.filter(|live| Self::selects::<T>(&live.handle, filter))
			.map(|live| ServiceRegistration::from_handle(live.handle.clone()))
			.collect())
	}

	fn selects<T: Capability + ?Sized>(handle: &RegistrationHandle, filter: &Filter) -> bool {
		handle.capability().is::<T>() && filter.matches(handle.properties())
	}

	pub(crate) fn lookup(&self, id: RegistrationId) -> Result<Option<ErasedService>> {
		let guard = self.shared.state.read();
		let state = guard.as_ref().ok_or(ServiceError::Unavailable)?;
		Ok(state.services.get(&id).map(|live| live.service.clone()))
	}

	/// Installs a listener for capability `T`.
	///
	/// Before this returns, the listener receives one `service_registered`
	/// call for every currently registered matching service.
	pub fn add_listener<T, L>(
		&self,
		owner: Option<&ModuleRef>,
		listener: Arc<L>,
		filter: Filter,
		retention: ListenerRetention,
	) -> Result<ListenerSubscription>
	where
		T: Capability + ?Sized,
		L: ServiceListener<T> + 'static,
	{
		let listener: Arc<dyn ServiceListener<T>> = listener;
		let (entry, replay) = {
			let mut guard = self.shared.state.write();
			let state = guard.as_mut().ok_or(ServiceError::Unavailable)?;
			state.purge_dead();

			let id = self.shared.next_listener.fetch_add(1, Ordering::Relaxed);
			let entry = Arc::new(ListenerEntry::new(id, owner.cloned(), listener, filter, retention));
			state.listeners.push(entry.clone());
			let replay: Vec<_> = state
				.services
				.values()
				.filter(|live| entry.matches(&live.handle))
				.map(|live| (live.handle.clone(), live.service.clone()))
				.collect();
			(entry, replay)
		};

		debug!(
			listener = entry.id,
			capability = %entry.capability,
			filter = %entry.filter,
			?retention,
			replay = replay.len(),
			"added service listener"
		);
		for (handle, service) in &replay {
			if handle.is_live() {
				self.deliver(&entry, EventKind::Registered, handle, service);
			}
		}
		Ok(ListenerSubscription::new(entry.id, Arc::downgrade(&self.shared)))
	}

	/// Removes the first entry whose listener is `listener`.
	///
	/// If no live entry matches, the first entry whose weakly held listener
	/// is already gone is removed instead.
	pub fn remove_listener<L: ?Sized>(&self, listener: &Arc<L>) -> Result<bool> {
		let addr = listener_addr(listener);
		let mut guard = self.shared.state.write();
		let state = guard.as_mut().ok_or(ServiceError::Unavailable)?;
		let position = state
			.listeners
			.iter()
			.position(|entry| entry.addr == addr && !entry.is_dead())
			.or_else(|| state.listeners.iter().position(|entry| entry.is_dead()));
		let Some(position) = position else {
			return Ok(false);
		};
		let entry = state.listeners.remove(position);
		entry.mark_removed();
		debug!(listener = entry.id, capability = %entry.capability, "removed service listener");
		Ok(true)
	}

	/// Removes an entry by id. A stopped registry has no entries left, so
	/// this reports `Ok(false)` there rather than failing.
	pub(crate) fn remove_entry(&self, id: u64) -> Result<bool> {
		let mut guard = self.shared.state.write();
		let Some(state) = guard.as_mut() else {
			return Ok(false);
		};
		let Some(position) = state.listeners.iter().position(|entry| entry.id == id) else {
			return Ok(false);
		};
		let entry = state.listeners.remove(position);
		entry.mark_removed();
		debug!(listener = id, capability = %entry.capability, "cancelled service listener");
		Ok(true)
	}

	/// Unregisters every live service published by `module`, newest first.
	pub fn unregister_services_from(&self, module: &ModuleRef) -> Result<usize> {
		let owned: Vec<RegistrationHandle> = {
			let guard = self.shared.state.read();
			let state = guard.as_ref().ok_or(ServiceError::Unavailable)?;
			state
				.services
				.values()
				.filter(|live| live.handle.owner() == Some(module))
				.map(|live| live.handle.clone())
				.collect()
		};
		let mut removed = 0;
		for handle in owned.iter().rev() {
			if self.unregister(handle)? {
				removed += 1;
			}
		}
		if removed > 0 {
			debug!(module = %module, removed, "unregistered module services");
		}
		Ok(removed)
	}

	/// Removes every listener entry installed on behalf of `module`.
	pub fn remove_listeners_from(&self, module: &ModuleRef) -> Result<usize> {
		let mut guard = self.shared.state.write();
		let state = guard.as_mut().ok_or(ServiceError::Unavailable)?;
		let before = state.listeners.len();
		state.listeners.retain(|entry| {
			let owned = entry.is_owned_by(module);
			if owned {
				entry.mark_removed();
			}
			!owned
		});
		let removed = before - state.listeners.len();
		if removed > 0 {
			debug!(module = %module, removed, "removed module listeners");
		}
		Ok(removed)
	}

	/// Creates a tracker for capability `T`. The tracker is not started.
	pub fn create_tracker<T: Capability + ?Sized>(&self, owner: Option<&ModuleRef>, filter: Filter) -> ServiceTracker<T> {
		ServiceTracker::new(self.clone(), owner.cloned(), filter)
	}

	/// Creates a started tracker wrapped in a proxy forwarding to its first
	/// service.
	pub fn proxy<T: Capability + ?Sized>(&self, owner: Option<&ModuleRef>, filter: Filter) -> Result<ServiceProxy<T>> {
		ServiceProxy::new(self.create_tracker(owner, filter))
	}

	/// Facade that records `module` as the owner of everything it creates.
	pub fn for_module(&self, module: &ModuleRef) -> ModuleServices {
		ModuleServices::new(self.clone(), module.clone())
	}

	pub fn service_count(&self) -> Result<usize> {
		let guard = self.shared.state.read();
		Ok(guard.as_ref().ok_or(ServiceError::Unavailable)?.services.len())
	}

	pub fn listener_count(&self) -> Result<usize> {
		let guard = self.shared.state.read();
		Ok(guard.as_ref().ok_or(ServiceError::Unavailable)?.listeners.len())
	}

	fn dispatch(
		&self,
		kind: EventKind,
		registration: &RegistrationHandle,
		service: &ErasedService,
		targets: &[Arc<ListenerEntry>],
	) {
		for entry in targets {
			self.deliver(entry, kind, registration, service);
		}
	}

	/// Notifies one entry, isolating its failure.
	fn deliver(&self, entry: &ListenerEntry, kind: EventKind, registration: &RegistrationHandle, service: &ErasedService) {
		if entry.is_removed() {
			return;
		}
		if entry.is_dead() {
			let _ = self.remove_entry(entry.id);
			return;
		}
		match isolate(|| entry.target.deliver(kind, registration, service)) {
			Ok(Delivery::Delivered) => {
				trace!(listener = entry.id, registration = %registration.id(), event = kind.as_str(), "delivered");
			}
			Ok(Delivery::Dead) => {
				let _ = self.remove_entry(entry.id);
			}
			Err(panic) => {
				warn!(
					listener = entry.id,
					registration = %registration.id(),
					capability = %registration.capability(),
					event = kind.as_str(),
					%panic,
					"service listener panicked"
				);
			}
		}
	}
}

impl std::fmt::Debug for ServiceRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ServiceRegistry")
			.field("name", &self.shared.name)
			.field("running", &self.is_running())
			.finish()
	}
}
