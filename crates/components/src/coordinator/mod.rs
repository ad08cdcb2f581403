//! Component activation.
//!
//! # Concurrency Model
//!
//! Dependency edges can arrive from any thread, including re-entrantly from
//! inside this component's own hooks (registering a provided capability may
//! satisfy a dependency elsewhere, which may register something this
//! component depends on). Reconciliation is therefore serialised with a
//! busy marker instead of a lock held across hooks: a notification arriving
//! while another reconciliation runs only marks the state dirty, and the
//! running reconciliation loops until it observes a clean pass. Hooks run
//! with no coordinator lock held.
//!
//! [`ActivationCoordinator::stop`] is the exception: it waits for a
//! reconciliation running on another thread to finish, so the component is
//! fully torn down when it returns.

use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex, ReentrantMutex};
use strata_services::callback::isolate;
use strata_services::{ModuleRef, RegistrationHandle, Result, ServiceRegistry};
use tracing::{debug, error, info, warn};

use crate::adapter::Adaptation;
use crate::declare::Provision;
use crate::dependency::{DependencyKey, Requirement, Satisfaction, SatisfactionListener};

/// Creates and releases component instances.
pub trait ComponentHooks<I>: Send + Sync {
	fn instantiate(&self) -> anyhow::Result<Arc<I>>;

	/// Called after every provided capability has been withdrawn.
	fn release(&self, instance: Arc<I>) {
		drop(instance);
	}
}

impl<I, F> ComponentHooks<I> for F
where
	F: Fn() -> anyhow::Result<Arc<I>> + Send + Sync,
{
	fn instantiate(&self) -> anyhow::Result<Arc<I>> {
		self()
	}
}

type Instantiate<I> = dyn Fn() -> anyhow::Result<Arc<I>> + Send + Sync;
type Release<I> = dyn Fn(Arc<I>) + Send + Sync;

/// Hooks assembled from closures.
pub struct FnHooks<I> {
	instantiate: Box<Instantiate<I>>,
	release: Option<Box<Release<I>>>,
}

impl<I> FnHooks<I> {
	pub fn new(instantiate: impl Fn() -> anyhow::Result<Arc<I>> + Send + Sync + 'static) -> Self {
		Self {
			instantiate: Box::new(instantiate),
			release: None,
		}
	}

	pub fn on_release(mut self, release: impl Fn(Arc<I>) + Send + Sync + 'static) -> Self {
		self.release = Some(Box::new(release));
		self
	}
}

impl<I> ComponentHooks<I> for FnHooks<I> {
	fn instantiate(&self) -> anyhow::Result<Arc<I>> {
		(self.instantiate)()
	}

	fn release(&self, instance: Arc<I>) {
		match &self.release {
			Some(release) => release(instance),
			None => drop(instance),
		}
	}
}

/// External precondition for activation, typically "the owning module is
/// running".
pub trait ActivationGate: Send + Sync {
	fn permits_activation(&self) -> bool;
}

impl ActivationGate for ModuleRef {
	fn permits_activation(&self) -> bool {
		self.is_active()
	}
}

/// Gate that never blocks activation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

impl ActivationGate for Always {
	fn permits_activation(&self) -> bool {
		true
	}
}

impl<F> ActivationGate for F
where
	F: Fn() -> bool + Send + Sync,
{
	fn permits_activation(&self) -> bool {
		self()
	}
}

struct Active<I> {
	instance: Arc<I>,
	/// In registration order.
	provided: Vec<RegistrationHandle>,
}

struct ActivationState<I> {
	started: bool,
	active: Option<Active<I>>,
	busy: Option<ThreadId>,
	dirty: bool,
	activations: u64,
}

struct CoordinatorInner<I> {
	name: String,
	registry: ServiceRegistry,
	owner: Option<ModuleRef>,
	requirements: Vec<Arc<dyn Requirement>>,
	provisions: Vec<Provision<I>>,
	adaptations: Vec<Box<dyn Adaptation<I>>>,
	hooks: Box<dyn ComponentHooks<I>>,
	gate: Box<dyn ActivationGate>,
	state: Mutex<ActivationState<I>>,
	idle: Condvar,
	/// Serialises `start` and `stop`. Reentrant so a hook may stop its own
	/// coordinator.
	transitions: ReentrantMutex<()>,
	link: Arc<dyn SatisfactionListener>,
}

/// Forwards dependency edges to a coordinator without keeping it alive.
struct CoordinatorLink<I> {
	coordinator: Weak<CoordinatorInner<I>>,
}

impl<I: Send + Sync + 'static> SatisfactionListener for CoordinatorLink<I> {
	fn satisfaction_changed(&self, key: &DependencyKey, satisfaction: Satisfaction) {
		if let Some(coordinator) = self.coordinator.upgrade() {
			debug!(component = %coordinator.name, dependency = %key, ?satisfaction, "dependency edge");
			coordinator.reconcile();
		}
	}
}

impl<I: Send + Sync + 'static> CoordinatorInner<I> {
	fn can_activate(&self) -> bool {
		self.gate.permits_activation() && self.requirements.iter().all(|r| r.is_satisfied())
	}

	/// Runs a reconciliation unless one is already running, in which case it
	/// is told to run another pass.
	fn reconcile(&self) {
		{
			let mut state = self.state.lock();
			if state.busy.is_some() {
				state.dirty = true;
				return;
			}
			state.busy = Some(thread::current().id());
		}
		self.run_reconciliation();
	}

	/// Like [`reconcile`](Self::reconcile), but waits out a reconciliation
	/// running on another thread instead of deferring to it.
	fn reconcile_blocking(&self) {
		let me = thread::current().id();
		{
			let mut state = self.state.lock();
			loop {
				match state.busy {
					None => break,
					Some(owner) if owner == me => {
						state.dirty = true;
						return;
					}
					Some(_) => self.idle.wait(&mut state),
				}
			}
			state.busy = Some(me);
		}
		self.run_reconciliation();
	}

	fn run_reconciliation(&self) {
		loop {
			let (started, active) = {
				let state = self.state.lock();
				(state.started, state.active.is_some())
			};
			let wanted = started && self.can_activate();
			if wanted && !active {
				self.activate();
			} else if !wanted && active {
				self.deactivate();
			}

			let mut state = self.state.lock();
			if state.dirty {
				state.dirty = false;
				continue;
			}
			state.busy = None;
			self.idle.notify_all();
			return;
		}
	}

	fn activate(&self) {
		info!(component = %self.name, "activating");
		let instance = match isolate(|| self.hooks.instantiate()) {
			Ok(Ok(instance)) => instance,
			Ok(Err(err)) => {
				error!(component = %self.name, error = ?err, "component instantiation failed");
				return;
			}
			Err(panic) => {
				error!(component = %self.name, %panic, "component instantiation panicked");
				return;
			}
		};

		let mut provided = Vec::with_capacity(self.provisions.len());
		for provision in &self.provisions {
			match (provision.publish)(&self.registry, self.owner.as_ref(), &instance) {
				Ok(handle) => provided.push(handle),
				Err(err) => {
					error!(
						component = %self.name,
						capability = %provision.capability,
						%err,
						"failed to register provided capability"
					);
					self.withdraw(&provided);
					self.release(instance);
					return;
				}
			}
		}

		for adaptation in &self.adaptations {
			adaptation.attach(&self.registry, self.owner.as_ref(), &instance);
		}

		let mut state = self.state.lock();
		state.active = Some(Active { instance, provided });
		state.activations += 1;
		drop(state);
		info!(component = %self.name, "activated");
	}

	fn deactivate(&self) {
		let Some(active) = self.state.lock().active.take() else {
			return;
		};
		info!(component = %self.name, "deactivating");
		for adaptation in self.adaptations.iter().rev() {
			adaptation.detach();
		}
		self.withdraw(&active.provided);
		self.release(active.instance);
		info!(component = %self.name, "deactivated");
	}

	/// Unregisters in reverse registration order.
	fn withdraw(&self, provided: &[RegistrationHandle]) {
		for handle in provided.iter().rev() {
			if let Err(err) = handle.unregister() {
				debug!(component = %self.name, registration = %handle.id(), %err, "provided capability already gone");
			}
		}
	}

	fn release(&self, instance: Arc<I>) {
		if let Err(panic) = isolate(|| self.hooks.release(instance)) {
			warn!(component = %self.name, %panic, "component release panicked");
		}
	}
}

impl<I> Drop for CoordinatorInner<I> {
	fn drop(&mut self) {
		for requirement in &self.requirements {
			requirement.remove_satisfaction_listener(&self.link);
		}
	}
}

/// Drives one component between inactive and active.
///
/// The component is active exactly while the coordinator is started, every
/// dependency is satisfied and the gate permits activation. Clones share the
/// same coordinator.
pub struct ActivationCoordinator<I> {
	inner: Arc<CoordinatorInner<I>>,
}

impl<I> Clone for ActivationCoordinator<I> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<I: Send + Sync + 'static> ActivationCoordinator<I> {
	pub(crate) fn new(
		name: String,
		registry: ServiceRegistry,
		owner: Option<ModuleRef>,
		requirements: Vec<Arc<dyn Requirement>>,
		provisions: Vec<Provision<I>>,
		adaptations: Vec<Box<dyn Adaptation<I>>>,
		hooks: Box<dyn ComponentHooks<I>>,
		gate: Box<dyn ActivationGate>,
	) -> Self {
		let inner = Arc::new_cyclic(|weak: &Weak<CoordinatorInner<I>>| CoordinatorInner {
			name,
			registry,
			owner,
			requirements,
			provisions,
			adaptations,
			hooks,
			gate,
			state: Mutex::new(ActivationState {
				started: false,
				active: None,
				busy: None,
				dirty: false,
				activations: 0,
			}),
			idle: Condvar::new(),
			transitions: ReentrantMutex::new(()),
			link: Arc::new(CoordinatorLink {
				coordinator: weak.clone(),
			}),
		});
		for requirement in &inner.requirements {
			requirement.add_satisfaction_listener(inner.link.clone());
		}
		Self { inner }
	}

	pub fn name(&self) -> &str {
		&self.inner.name
	}

	/// Initialises every dependency and activates if possible.
	///
	/// If a dependency fails to initialise, the ones already initialised are
	/// shut down again and the error is returned.
	pub fn start(&self) -> Result<()> {
		let transition = self.inner.transitions.lock();
		if self.inner.state.lock().started {
			return Ok(());
		}
		for (index, requirement) in self.inner.requirements.iter().enumerate() {
			if let Err(err) = requirement.initialize() {
				error!(component = %self.inner.name, dependency = %requirement.key(), %err, "failed to initialize dependency");
				for initialized in self.inner.requirements[..index].iter().rev() {
					initialized.shutdown();
				}
				return Err(err);
			}
		}
		self.inner.state.lock().started = true;
		drop(transition);
		debug!(component = %self.inner.name, dependencies = self.inner.requirements.len(), "coordinator started");
		self.inner.reconcile();
		Ok(())
	}

	/// Deactivates the component and shuts its dependencies down.
	pub fn stop(&self) {
		let _transition = self.inner.transitions.lock();
		{
			let mut state = self.inner.state.lock();
			if !state.started {
				return;
			}
			state.started = false;
		}
		self.inner.reconcile_blocking();
		for requirement in self.inner.requirements.iter().rev() {
			requirement.shutdown();
		}
		debug!(component = %self.inner.name, "coordinator stopped");
	}

	/// Re-checks the activation condition, e.g. after the gate changed.
	pub fn reevaluate(&self) {
		self.inner.reconcile();
	}

	pub fn is_started(&self) -> bool {
		self.inner.state.lock().started
	}

	pub fn is_active(&self) -> bool {
		self.inner.state.lock().active.is_some()
	}

	/// The live component instance.
	pub fn instance(&self) -> Option<Arc<I>> {
		self.inner
			.state
			.lock()
			.active
			.as_ref()
			.map(|active| active.instance.clone())
	}

	/// How many times the component has been activated.
	pub fn activations(&self) -> u64 {
		self.inner.state.lock().activations
	}

	/// Registrations of the capabilities currently provided.
	pub fn provided(&self) -> Vec<RegistrationHandle> {
		self.inner
			.state
			.lock()
			.active
			.as_ref()
			.map(|active| active.provided.clone())
			.unwrap_or_default()
	}

	/// Keys of the dependencies currently not satisfied.
	pub fn unsatisfied(&self) -> Vec<DependencyKey> {
		self.inner
			.requirements
			.iter()
			.filter(|r| !r.is_satisfied())
			.map(|r| r.key().clone())
			.collect()
	}
}

impl<I> std::fmt::Debug for ActivationCoordinator<I> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.inner.state.lock();
		f.debug_struct("ActivationCoordinator")
			.field("name", &self.inner.name)
			.field("started", &state.started)
			.field("active", &state.active.is_some())
			.field("activations", &state.activations)
			.finish()
	}
}
