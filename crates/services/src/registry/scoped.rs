use std::sync::Arc;

use crate::capability::Capability;
use crate::error::Result;
use crate::filter::Filter;
use crate::listener::{ListenerRetention, ListenerSubscription, ServiceListener};
use crate::module::ModuleRef;
use crate::properties::Properties;
use crate::proxy::ServiceProxy;
use crate::registration::ServiceRegistration;
use crate::registry::ServiceRegistry;
use crate::tracker::ServiceTracker;

/// Registry facade bound to one owning module.
#[derive(Clone, Debug)]
pub struct ModuleServices {
	registry: ServiceRegistry,
	module: ModuleRef,
}

impl ModuleServices {
	pub(crate) fn new(registry: ServiceRegistry, module: ModuleRef) -> Self {
		Self { registry, module }
	}

	pub fn module(&self) -> &ModuleRef {
		&self.module
	}

	pub fn registry(&self) -> &ServiceRegistry {
		&self.registry
	}

	pub fn register<T: Capability + ?Sized>(
		&self,
		service: Arc<T>,
		properties: Properties,
	) -> Result<ServiceRegistration<T>> {
		self.registry.register(Some(&self.module), service, properties)
	}

	pub fn add_listener<T, L>(
		&self,
		listener: Arc<L>,
		filter: Filter,
		retention: ListenerRetention,
	) -> Result<ListenerSubscription>
	where
		T: Capability + ?Sized,
		L: ServiceListener<T> + 'static,
	{
		self.registry
			.add_listener::<T, L>(Some(&self.module), listener, filter, retention)
	}

	pub fn create_tracker<T: Capability + ?Sized>(&self, filter: Filter) -> ServiceTracker<T> {
		self.registry.create_tracker(Some(&self.module), filter)
	}

	pub fn proxy<T: Capability + ?Sized>(&self, filter: Filter) -> Result<ServiceProxy<T>> {
		self.registry.proxy(Some(&self.module), filter)
	}

	/// Withdraws everything the module published and installed.
	///
	/// Returns the number of services unregistered and listeners removed.
	pub fn withdraw(&self) -> Result<(usize, usize)> {
		let services = self.registry.unregister_services_from(&self.module)?;
		let listeners = self.registry.remove_listeners_from(&self.module)?;
		Ok((services, listeners))
	}
}
