//! Module lifecycle adapter.
//!
//! [`ModuleComponents`] is what a module lifecycle driver talks to. It owns
//! the coordinators of one module, shares their dependencies, and maps the
//! resolved / starting / started / stopping / stopped callbacks onto
//! coordinator start and stop. Activation is gated on the module being
//! [`ModuleState::Active`], so nothing activates before `started`.

use std::sync::Arc;

use parking_lot::Mutex;
use strata_services::{ModuleRef, ModuleServices, ModuleState, Result, ServiceError, ServiceRegistry};
use tracing::{debug, error, info};

use crate::coordinator::ActivationCoordinator;
use crate::declare::ComponentDeclaration;
use crate::dependency::DependencySet;

/// Coordinator with its instance type erased.
pub trait ManagedComponent: Send + Sync {
	fn name(&self) -> &str;

	fn start(&self) -> Result<()>;

	fn stop(&self);

	fn reevaluate(&self);

	fn is_active(&self) -> bool;
}

impl<I: Send + Sync + 'static> ManagedComponent for ActivationCoordinator<I> {
	fn name(&self) -> &str {
		ActivationCoordinator::name(self)
	}

	fn start(&self) -> Result<()> {
		ActivationCoordinator::start(self)
	}

	fn stop(&self) {
		ActivationCoordinator::stop(self)
	}

	fn reevaluate(&self) {
		ActivationCoordinator::reevaluate(self)
	}

	fn is_active(&self) -> bool {
		ActivationCoordinator::is_active(self)
	}
}

/// Components hosted by one module.
pub struct ModuleComponents {
	module: ModuleRef,
	services: ModuleServices,
	dependencies: Arc<DependencySet>,
	components: Mutex<Vec<Arc<dyn ManagedComponent>>>,
}

impl ModuleComponents {
	pub fn new(registry: &ServiceRegistry, module: ModuleRef) -> Self {
		Self {
			services: registry.for_module(&module),
			module,
			dependencies: Arc::new(DependencySet::new()),
			components: Mutex::new(Vec::new()),
		}
	}

	pub fn module(&self) -> &ModuleRef {
		&self.module
	}

	/// Registry facade owned by this module.
	pub fn services(&self) -> &ModuleServices {
		&self.services
	}

	/// Starts a declaration owned by this module and sharing its dependencies.
	pub fn declare<I: Send + Sync + 'static>(&self, name: impl Into<String>) -> ComponentDeclaration<I> {
		ComponentDeclaration::new(name, self.services.registry())
			.owned_by(&self.module)
			.sharing(self.dependencies.clone())
	}

	/// Adds a coordinator. If the module is already starting or running the
	/// coordinator is started right away.
	pub fn install<I: Send + Sync + 'static>(&self, coordinator: ActivationCoordinator<I>) -> Result<ActivationCoordinator<I>> {
		if matches!(self.module.state(), ModuleState::Starting | ModuleState::Active) {
			coordinator.start()?;
		}
		self.components.lock().push(Arc::new(coordinator.clone()));
		debug!(module = %self.module, component = coordinator.name(), "installed component");
		Ok(coordinator)
	}

	fn components(&self) -> Vec<Arc<dyn ManagedComponent>> {
		self.components.lock().clone()
	}

	pub fn resolved(&self) {
		self.module.set_state(ModuleState::Resolved);
	}

	/// Starts every coordinator, initialising dependencies. Components stay
	/// inactive until [`started`](Self::started).
	///
	/// Every coordinator is attempted; the first failure is returned.
	pub fn starting(&self) -> Result<()> {
		self.module.set_state(ModuleState::Starting);
		let mut first_error: Option<ServiceError> = None;
		for component in self.components() {
			if let Err(err) = component.start() {
				error!(module = %self.module, component = component.name(), %err, "failed to start component");
				first_error.get_or_insert(err);
			}
		}
		first_error.map_or(Ok(()), Err)
	}

	/// Opens the gate and lets every satisfied component activate.
	pub fn started(&self) {
		self.module.set_state(ModuleState::Active);
		for component in self.components() {
			component.reevaluate();
		}
		info!(
			module = %self.module,
			components = self.components.lock().len(),
			active = self.active_components().len(),
			"module started"
		);
	}

	/// Tears every component down in reverse installation order, then
	/// withdraws whatever the module still has registered.
	pub fn stopping(&self) {
		self.module.set_state(ModuleState::Stopping);
		for component in self.components().iter().rev() {
			component.stop();
		}
		match self.services.withdraw() {
			Ok((services, listeners)) => {
				debug!(module = %self.module, services, listeners, "withdrew module registrations");
			}
			Err(err) => debug!(module = %self.module, %err, "registry gone before module stopped"),
		}
	}

	pub fn stopped(&self) {
		self.module.set_state(ModuleState::Resolved);
		info!(module = %self.module, "module stopped");
	}

	/// Names of the components currently active.
	pub fn active_components(&self) -> Vec<String> {
		self.components()
			.iter()
			.filter(|c| c.is_active())
			.map(|c| c.name().to_owned())
			.collect()
	}

	/// Number of distinct dependencies declared through this module.
	pub fn dependency_count(&self) -> usize {
		self.dependencies.len()
	}
}

impl std::fmt::Debug for ModuleComponents {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ModuleComponents")
			.field("module", &self.module)
			.field("components", &self.components.lock().len())
			.finish()
	}
}

#[cfg(test)]
mod tests;
