//! Static component declarations.
//!
//! Each dependency shape has its own declaration call and typed handle, so the
//! tracker configuration is fixed at compile time:
//!
//! | call | minimum | handle |
//! |---|---|---|
//! | [`depend_on_one`](ComponentDeclaration::depend_on_one) | 1 | [`One`] |
//! | [`depend_on_many`](ComponentDeclaration::depend_on_many) | caller's | [`Many`] |
//! | [`depend_on_optional`](ComponentDeclaration::depend_on_optional) | 0 | [`Optional`] |
//! | [`track_all`](ComponentDeclaration::track_all) | 0 | [`Tracked`] |

use std::sync::Arc;

use strata_services::{
	Capability, CapabilityType, Filter, ModuleRef, Properties, RegistrationHandle, Result,
	ServiceError, ServiceListener, ServiceRegistration, ServiceRegistry,
};

use crate::adapter::{Adaptation, Adapter};
use crate::coordinator::{ActivationCoordinator, ActivationGate, Always, ComponentHooks};
use crate::dependency::{Dependency, DependencySet, Requirement};

type Publish<I> =
	dyn Fn(&ServiceRegistry, Option<&ModuleRef>, &Arc<I>) -> Result<RegistrationHandle> + Send + Sync;

/// A capability the component publishes while active.
pub(crate) struct Provision<I> {
	pub(crate) capability: CapabilityType,
	pub(crate) publish: Box<Publish<I>>,
}

/// Builder for one component's dependencies and provided capabilities.
pub struct ComponentDeclaration<I> {
	name: String,
	registry: ServiceRegistry,
	owner: Option<ModuleRef>,
	dependencies: Arc<DependencySet>,
	requirements: Vec<Arc<dyn Requirement>>,
	provisions: Vec<Provision<I>>,
	adaptations: Vec<Box<dyn Adaptation<I>>>,
}

impl<I: Send + Sync + 'static> ComponentDeclaration<I> {
	pub fn new(name: impl Into<String>, registry: &ServiceRegistry) -> Self {
		Self {
			name: name.into(),
			registry: registry.clone(),
			owner: None,
			dependencies: Arc::new(DependencySet::new()),
			requirements: Vec::new(),
			provisions: Vec::new(),
			adaptations: Vec::new(),
		}
	}

	/// Records `module` as owner of everything the component registers. The
	/// module also becomes the default activation gate.
	pub fn owned_by(mut self, module: &ModuleRef) -> Self {
		self.owner = Some(module.clone());
		self
	}

	/// Shares dependencies with other declarations using the same set.
	pub fn sharing(mut self, dependencies: Arc<DependencySet>) -> Self {
		self.dependencies = dependencies;
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Declares a dependency on at least `minimum` services of `T`.
	pub fn require<T: Capability + ?Sized>(&mut self, filter: Filter, minimum: usize) -> Dependency<T> {
		let dependency = self
			.dependencies
			.get_or_create::<T>(&self.registry, self.owner.as_ref(), filter, minimum);
		if !self.requirements.iter().any(|r| r.key() == dependency.key()) {
			self.requirements.push(Arc::new(dependency.clone()));
		}
		dependency
	}

	pub fn depend_on_one<T: Capability + ?Sized>(&mut self, filter: Filter) -> One<T> {
		One {
			dependency: self.require(filter, 1),
		}
	}

	pub fn depend_on_many<T: Capability + ?Sized>(&mut self, filter: Filter, minimum: usize) -> Many<T> {
		Many {
			dependency: self.require(filter, minimum),
		}
	}

	pub fn depend_on_optional<T: Capability + ?Sized>(&mut self, filter: Filter) -> Optional<T> {
		Optional {
			dependency: self.require(filter, 0),
		}
	}

	pub fn track_all<T: Capability + ?Sized>(&mut self, filter: Filter) -> Tracked<T> {
		Tracked {
			dependency: self.require(filter, 0),
		}
	}

	/// Publishes `project(instance)` under `T` while the component is active.
	/// Capabilities are registered in declaration order.
	pub fn provides<T: Capability + ?Sized>(
		&mut self,
		properties: Properties,
		project: impl Fn(&Arc<I>) -> Arc<T> + Send + Sync + 'static,
	) -> &mut Self {
		self.provisions.push(Provision {
			capability: CapabilityType::of::<T>(),
			publish: Box::new(move |registry: &ServiceRegistry, owner: Option<&ModuleRef>, instance: &Arc<I>| {
				registry
					.register::<T>(owner, project(instance), properties.clone())
					.map(|registration| registration.into_handle())
			}),
		});
		self
	}

	/// While the component is active, publishes `adapt(instance, source)` under
	/// `A` for every `S` matching `filter`, with the source's properties. An
	/// adapted service is withdrawn when its source is, and all of them when
	/// the component deactivates. Sources never constrain activation.
	pub fn adapts<S: Capability + ?Sized, A: Capability + ?Sized>(
		&mut self,
		filter: Filter,
		adapt: impl Fn(&Arc<I>, &ServiceRegistration<S>, &Arc<S>) -> Arc<A> + Send + Sync + 'static,
	) -> &mut Self {
		let source = self.require::<S>(filter, 0);
		self.adaptations.push(Box::new(Adapter::new(source, adapt)));
		self
	}

	/// Builds the coordinator, gated by the owning module when there is one.
	pub fn build(self, hooks: impl ComponentHooks<I> + 'static) -> ActivationCoordinator<I> {
		let gate: Box<dyn ActivationGate> = match &self.owner {
			Some(module) => Box::new(module.clone()),
			None => Box::new(Always),
		};
		self.build_with_gate(hooks, gate)
	}

	pub fn build_with_gate(
		self,
		hooks: impl ComponentHooks<I> + 'static,
		gate: Box<dyn ActivationGate>,
	) -> ActivationCoordinator<I> {
		ActivationCoordinator::new(
			self.name,
			self.registry,
			self.owner,
			self.requirements,
			self.provisions,
			self.adaptations,
			Box::new(hooks),
			gate,
		)
	}
}

fn unavailable<T: Capability + ?Sized>() -> ServiceError {
	ServiceError::ProxyUnavailable {
		capability: CapabilityType::of::<T>().name(),
	}
}

/// Handle for a mandatory single service.
pub struct One<T: Capability + ?Sized> {
	dependency: Dependency<T>,
}

impl<T: Capability + ?Sized> One<T> {
	/// The first matching service; fails when none is registered.
	pub fn get(&self) -> Result<Arc<T>> {
		self.dependency.service().ok_or_else(unavailable::<T>)
	}

	pub fn dependency(&self) -> &Dependency<T> {
		&self.dependency
	}
}

/// Handle for a quorum of services.
pub struct Many<T: Capability + ?Sized> {
	dependency: Dependency<T>,
}

impl<T: Capability + ?Sized> Many<T> {
	pub fn all(&self) -> Vec<Arc<T>> {
		self.dependency.services()
	}

	pub fn dependency(&self) -> &Dependency<T> {
		&self.dependency
	}
}

/// Handle for a service the component can do without.
pub struct Optional<T: Capability + ?Sized> {
	dependency: Dependency<T>,
}

impl<T: Capability + ?Sized> Optional<T> {
	pub fn get(&self) -> Option<Arc<T>> {
		self.dependency.service()
	}

	pub fn dependency(&self) -> &Dependency<T> {
		&self.dependency
	}
}

/// Handle observing every matching service without constraining activation.
pub struct Tracked<T: Capability + ?Sized> {
	dependency: Dependency<T>,
}

impl<T: Capability + ?Sized> Tracked<T> {
	pub fn all(&self) -> Vec<Arc<T>> {
		self.dependency.services()
	}

	pub fn add_event_handler<H: ServiceListener<T> + 'static>(&self, handler: Arc<H>) {
		self.dependency.tracker().add_event_handler(handler);
	}

	pub fn remove_event_handler<H: ?Sized>(&self, handler: &Arc<H>) -> bool {
		self.dependency.tracker().remove_event_handler(handler)
	}

	pub fn dependency(&self) -> &Dependency<T> {
		&self.dependency
	}
}

macro_rules! impl_handle_clone {
	($($handle:ident),*) => {
		$(
			impl<T: Capability + ?Sized> Clone for $handle<T> {
				fn clone(&self) -> Self {
					Self {
						dependency: self.dependency.clone(),
					}
				}
			}
		)*
	};
}

impl_handle_clone!(One, Many, Optional, Tracked);
