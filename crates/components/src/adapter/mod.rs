//! Service adapters.
//!
//! An adapter watches a source capability while its component is active and
//! publishes one adapted service per matching source registration. The
//! adapted service is withdrawn when its source goes away, and all of them
//! are withdrawn when the component deactivates.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use strata_services::{
	Capability, CapabilityType, ModuleRef, RegistrationHandle, RegistrationId, ServiceListener,
	ServiceRegistration, ServiceRegistry,
};
use tracing::{debug, error};

use crate::dependency::Dependency;

type AdaptFn<I, S, A> = dyn Fn(&Arc<I>, &ServiceRegistration<S>, &Arc<S>) -> Arc<A> + Send + Sync;

/// Instance-type view of an adapter, driven by the coordinator.
pub(crate) trait Adaptation<I>: Send + Sync {
	/// Starts publishing adapted services for `instance`, beginning with
	/// every source already tracked.
	fn attach(&self, registry: &ServiceRegistry, owner: Option<&ModuleRef>, instance: &Arc<I>);

	/// Withdraws every adapted service, newest first.
	fn detach(&self);
}

pub(crate) struct Adapter<I, S: Capability + ?Sized, A: Capability + ?Sized> {
	source: Dependency<S>,
	adapt: Arc<AdaptFn<I, S, A>>,
	session: Mutex<Option<Arc<AdapterSession<I, S, A>>>>,
}

impl<I, S, A> Adapter<I, S, A>
where
	I: Send + Sync + 'static,
	S: Capability + ?Sized,
	A: Capability + ?Sized,
{
	pub(crate) fn new(
		source: Dependency<S>,
		adapt: impl Fn(&Arc<I>, &ServiceRegistration<S>, &Arc<S>) -> Arc<A> + Send + Sync + 'static,
	) -> Self {
		Self {
			source,
			adapt: Arc::new(adapt),
			session: Mutex::new(None),
		}
	}
}

impl<I, S, A> Adaptation<I> for Adapter<I, S, A>
where
	I: Send + Sync + 'static,
	S: Capability + ?Sized,
	A: Capability + ?Sized,
{
	fn attach(&self, registry: &ServiceRegistry, owner: Option<&ModuleRef>, instance: &Arc<I>) {
		let session = Arc::new(AdapterSession {
			registry: registry.clone(),
			owner: owner.cloned(),
			instance: instance.clone(),
			adapt: self.adapt.clone(),
			published: Mutex::new(Vec::new()),
			closed: AtomicBool::new(false),
		});
		if let Some(previous) = self.session.lock().replace(session.clone()) {
			self.source.tracker().remove_event_handler(&previous);
			previous.close();
		}
		self.source.tracker().add_event_handler(session);
	}

	fn detach(&self) {
		let Some(session) = self.session.lock().take() else {
			return;
		};
		self.source.tracker().remove_event_handler(&session);
		session.close();
	}
}

struct AdapterSession<I, S: ?Sized, A: ?Sized> {
	registry: ServiceRegistry,
	owner: Option<ModuleRef>,
	instance: Arc<I>,
	adapt: Arc<AdaptFn<I, S, A>>,
	/// Source id to adapted registration, in publication order.
	published: Mutex<Vec<(RegistrationId, RegistrationHandle)>>,
	closed: AtomicBool,
}

impl<I, S, A> AdapterSession<I, S, A>
where
	I: Send + Sync + 'static,
	S: Capability + ?Sized,
	A: Capability + ?Sized,
{
	fn is_adapted(&self, source: RegistrationId) -> bool {
		self.published.lock().iter().any(|(id, _)| *id == source)
	}

	fn close(&self) {
		let published = {
			let mut published = self.published.lock();
			self.closed.store(true, Ordering::Release);
			std::mem::take(&mut *published)
		};
		for (_, adapted) in published.iter().rev() {
			let _ = adapted.unregister();
		}
	}
}

impl<I, S, A> ServiceListener<S> for AdapterSession<I, S, A>
where
	I: Send + Sync + 'static,
	S: Capability + ?Sized,
	A: Capability + ?Sized,
{
	fn service_registered(&self, registration: &ServiceRegistration<S>, service: &Arc<S>) {
		if self.closed.load(Ordering::Acquire) || self.is_adapted(registration.id()) {
			return;
		}
		let adapted = (self.adapt)(&self.instance, registration, service);
		let handle = match self.registry.register::<A>(
			self.owner.as_ref(),
			adapted,
			registration.properties().clone(),
		) {
			Ok(adapted) => adapted.into_handle(),
			Err(err) => {
				error!(
					source = %registration.id(),
					capability = %CapabilityType::of::<A>(),
					%err,
					"could not publish adapted service"
				);
				return;
			}
		};

		let mut published = self.published.lock();
		// Closed, the source left, or a replay raced a live event while the
		// adapted service was being registered.
		let stale = self.closed.load(Ordering::Acquire)
			|| !registration.is_live()
			|| published.iter().any(|(source, _)| *source == registration.id());
		if stale {
			drop(published);
			let _ = handle.unregister();
			return;
		}
		debug!(source = %registration.id(), adapted = %handle.id(), capability = %handle.capability(), "adapted service");
		published.push((registration.id(), handle));
	}

	fn service_unregistered(&self, registration: &ServiceRegistration<S>, _: &Arc<S>) {
		let adapted = {
			let mut published = self.published.lock();
			published
				.iter()
				.position(|(source, _)| *source == registration.id())
				.map(|index| published.remove(index).1)
		};
		if let Some(adapted) = adapted {
			debug!(source = %registration.id(), adapted = %adapted.id(), "withdrawing adapted service");
			let _ = adapted.unregister();
		}
	}
}
