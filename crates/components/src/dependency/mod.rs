//! Dependency quorums.
//!
//! A [`Dependency`] owns a [`ServiceTracker`] and turns its event stream into
//! a two-state signal: satisfied while at least `minimum` matching services
//! are tracked. Only edges are reported; a registration that leaves the
//! state unchanged notifies nobody.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use strata_services::callback::isolate;
use strata_services::{
	Capability, CapabilityType, Filter, ModuleRef, Result, ServiceListener, ServiceRegistration,
	ServiceRegistry, ServiceTracker,
};
use tracing::{debug, info, warn};

/// Identity of a dependency declaration. Declarations with equal keys within
/// one module share a single [`Dependency`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyKey {
	pub capability: CapabilityType,
	pub filter: Filter,
	pub minimum: usize,
}

impl DependencyKey {
	pub fn new<T: Capability + ?Sized>(filter: Filter, minimum: usize) -> Self {
		Self {
			capability: CapabilityType::of::<T>(),
			filter,
			minimum,
		}
	}
}

impl fmt::Display for DependencyKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}{} x{}", self.capability, self.filter, self.minimum)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Satisfaction {
	Satisfied,
	Unsatisfied,
}

impl From<bool> for Satisfaction {
	fn from(satisfied: bool) -> Self {
		if satisfied { Self::Satisfied } else { Self::Unsatisfied }
	}
}

/// Observer of dependency edges.
///
/// Edges from different threads may be observed out of order; observers
/// should re-read [`Requirement::is_satisfied`] rather than trust the
/// payload alone.
pub trait SatisfactionListener: Send + Sync {
	fn satisfaction_changed(&self, key: &DependencyKey, satisfaction: Satisfaction);
}

impl<F> SatisfactionListener for F
where
	F: Fn(&DependencyKey, Satisfaction) + Send + Sync,
{
	fn satisfaction_changed(&self, key: &DependencyKey, satisfaction: Satisfaction) {
		self(key, satisfaction)
	}
}

/// Capability-erased view of a [`Dependency`].
pub trait Requirement: Send + Sync {
	fn key(&self) -> &DependencyKey;

	fn is_satisfied(&self) -> bool;

	fn initialize(&self) -> Result<()>;

	fn shutdown(&self);

	fn add_satisfaction_listener(&self, listener: Arc<dyn SatisfactionListener>);

	fn remove_satisfaction_listener(&self, listener: &Arc<dyn SatisfactionListener>) -> bool;
}

#[derive(Default)]
struct QuorumState {
	satisfied: bool,
	/// Outstanding `initialize` calls; the tracker runs while non-zero.
	users: usize,
}

struct DependencyInner<T: Capability + ?Sized> {
	key: DependencyKey,
	tracker: ServiceTracker<T>,
	state: Mutex<QuorumState>,
	observers: Mutex<Vec<Arc<dyn SatisfactionListener>>>,
}

impl<T: Capability + ?Sized> DependencyInner<T> {
	fn evaluate(&self) {
		let (satisfaction, count) = {
			let mut state = self.state.lock();
			if state.users == 0 {
				return;
			}
			let count = self.tracker.len().unwrap_or(0);
			let satisfied = count >= self.key.minimum;
			if satisfied == state.satisfied {
				return;
			}
			state.satisfied = satisfied;
			(Satisfaction::from(satisfied), count)
		};

		match satisfaction {
			Satisfaction::Satisfied => info!(dependency = %self.key, count, "dependency satisfied"),
			Satisfaction::Unsatisfied => info!(dependency = %self.key, count, "dependency not satisfied"),
		}
		let observers = self.observers.lock().clone();
		for observer in observers {
			if let Err(panic) = isolate(|| observer.satisfaction_changed(&self.key, satisfaction)) {
				warn!(dependency = %self.key, %panic, "satisfaction listener panicked");
			}
		}
	}
}

/// Re-evaluates the quorum on every tracker event.
struct QuorumHandler<T: Capability + ?Sized> {
	dependency: Weak<DependencyInner<T>>,
}

impl<T: Capability + ?Sized> QuorumHandler<T> {
	fn evaluate(&self) {
		if let Some(dependency) = self.dependency.upgrade() {
			dependency.evaluate();
		}
	}
}

impl<T: Capability + ?Sized> ServiceListener<T> for QuorumHandler<T> {
	fn service_registered(&self, _: &ServiceRegistration<T>, _: &Arc<T>) {
		self.evaluate();
	}

	fn service_unregistered(&self, _: &ServiceRegistration<T>, _: &Arc<T>) {
		self.evaluate();
	}
}

/// A tracker with a minimum-count threshold.
pub struct Dependency<T: Capability + ?Sized> {
	inner: Arc<DependencyInner<T>>,
}

impl<T: Capability + ?Sized> Clone for Dependency<T> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<T: Capability + ?Sized> Dependency<T> {
	pub fn new(registry: &ServiceRegistry, owner: Option<&ModuleRef>, filter: Filter, minimum: usize) -> Self {
		let tracker = registry.create_tracker::<T>(owner, filter.clone());
		let inner = Arc::new(DependencyInner {
			key: DependencyKey::new::<T>(filter, minimum),
			tracker,
			state: Mutex::new(QuorumState::default()),
			observers: Mutex::new(Vec::new()),
		});
		inner.tracker.add_event_handler(Arc::new(QuorumHandler {
			dependency: Arc::downgrade(&inner),
		}));
		Self { inner }
	}

	pub fn key(&self) -> &DependencyKey {
		&self.inner.key
	}

	pub fn minimum(&self) -> usize {
		self.inner.key.minimum
	}

	pub fn is_satisfied(&self) -> bool {
		self.inner.state.lock().satisfied
	}

	pub fn tracker(&self) -> &ServiceTracker<T> {
		&self.inner.tracker
	}

	/// First tracked service, or `None` when empty or not initialised.
	pub fn service(&self) -> Option<Arc<T>> {
		self.inner.tracker.service().ok().flatten()
	}

	/// Tracked services in registration order; empty when not initialised.
	pub fn services(&self) -> Vec<Arc<T>> {
		self.inner.tracker.services().unwrap_or_default()
	}

	/// Starts tracking and evaluates the initial state.
	///
	/// Calls nest: the tracker is started by the first call and stopped by
	/// the matching last [`shutdown`](Self::shutdown). With a minimum of zero
	/// the dependency is satisfied immediately.
	pub fn initialize(&self) -> Result<()> {
		let first = {
			let mut state = self.inner.state.lock();
			state.users += 1;
			state.users == 1
		};
		if first {
			if let Err(err) = self.inner.tracker.start_tracking() {
				self.inner.state.lock().users -= 1;
				return Err(err);
			}
			debug!(dependency = %self.inner.key, "dependency initialized");
		}
		self.inner.evaluate();
		Ok(())
	}

	/// Undoes one [`initialize`](Self::initialize). The last call stops the
	/// tracker and resets the state without notifying anyone.
	pub fn shutdown(&self) {
		let last = {
			let mut state = self.inner.state.lock();
			if state.users == 0 {
				return;
			}
			state.users -= 1;
			if state.users == 0 {
				state.satisfied = false;
			}
			state.users == 0
		};
		if last {
			self.inner.tracker.stop_tracking();
			debug!(dependency = %self.inner.key, "dependency shut down");
		}
	}

	pub fn add_satisfaction_listener(&self, listener: Arc<dyn SatisfactionListener>) {
		self.inner.observers.lock().push(listener);
	}

	pub fn remove_satisfaction_listener(&self, listener: &Arc<dyn SatisfactionListener>) -> bool {
		let mut observers = self.inner.observers.lock();
		match observers.iter().position(|o| Arc::ptr_eq(o, listener)) {
			Some(index) => {
				observers.remove(index);
				true
			}
			None => false,
		}
	}
}

impl<T: Capability + ?Sized> Requirement for Dependency<T> {
	fn key(&self) -> &DependencyKey {
		Dependency::key(self)
	}

	fn is_satisfied(&self) -> bool {
		Dependency::is_satisfied(self)
	}

	fn initialize(&self) -> Result<()> {
		Dependency::initialize(self)
	}

	fn shutdown(&self) {
		Dependency::shutdown(self)
	}

	fn add_satisfaction_listener(&self, listener: Arc<dyn SatisfactionListener>) {
		Dependency::add_satisfaction_listener(self, listener)
	}

	fn remove_satisfaction_listener(&self, listener: &Arc<dyn SatisfactionListener>) -> bool {
		Dependency::remove_satisfaction_listener(self, listener)
	}
}

impl<T: Capability + ?Sized> fmt::Debug for Dependency<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Dependency")
			.field("key", &self.inner.key)
			.field("satisfied", &self.is_satisfied())
			.finish()
	}
}

struct SetEntry {
	typed: Arc<dyn Any + Send + Sync>,
	requirement: Arc<dyn Requirement>,
}

/// De-duplicates dependencies by [`DependencyKey`].
#[derive(Default)]
pub struct DependencySet {
	entries: Mutex<HashMap<DependencyKey, SetEntry>>,
}

impl DependencySet {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the dependency for `(T, filter, minimum)`, creating it on
	/// first use.
	pub fn get_or_create<T: Capability + ?Sized>(
		&self,
		registry: &ServiceRegistry,
		owner: Option<&ModuleRef>,
		filter: Filter,
		minimum: usize,
	) -> Dependency<T> {
		let key = DependencyKey::new::<T>(filter.clone(), minimum);
		let mut entries = self.entries.lock();
		if let Some(existing) = entries
			.get(&key)
			.and_then(|entry| entry.typed.downcast_ref::<Dependency<T>>())
		{
			return existing.clone();
		}
		let dependency = Dependency::<T>::new(registry, owner, filter, minimum);
		entries.insert(
			key,
			SetEntry {
				typed: Arc::new(dependency.clone()),
				requirement: Arc::new(dependency.clone()),
			},
		);
		dependency
	}

	/// Erased handle for an existing key.
	pub fn requirement(&self, key: &DependencyKey) -> Option<Arc<dyn Requirement>> {
		self.entries
			.lock()
			.get(key)
			.map(|entry| entry.requirement.clone())
	}

	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}
}
