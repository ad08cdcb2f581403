use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::capability::{Capability, CapabilityType};
use crate::error::{Result, ServiceError};
use crate::module::ModuleRef;
use crate::properties::Properties;
use crate::registry::{ServiceRegistry, Shared};

/// Type-erased service instance. Always holds an `Arc<T>` for the registered
/// capability `T`.
pub(crate) type ErasedService = Arc<dyn Any + Send + Sync>;

/// Registry-assigned registration identifier, increasing in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(pub(crate) u64);

impl fmt::Display for RegistrationId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "svc-{}", self.0)
	}
}

pub(crate) struct RegistrationInner {
	pub(crate) id: RegistrationId,
	pub(crate) capability: CapabilityType,
	pub(crate) properties: Properties,
	pub(crate) owner: Option<ModuleRef>,
	pub(crate) live: AtomicBool,
	pub(crate) registry: Weak<Shared>,
}

/// Untyped handle to one published service.
///
/// Identity is the registration itself: two handles are equal only if they
/// came from the same `register` call.
#[derive(Clone)]
pub struct RegistrationHandle {
	pub(crate) inner: Arc<RegistrationInner>,
}

impl RegistrationHandle {
	pub(crate) fn new(inner: RegistrationInner) -> Self {
		Self {
			inner: Arc::new(inner),
		}
	}

	pub fn id(&self) -> RegistrationId {
		self.inner.id
	}

	pub fn capability(&self) -> CapabilityType {
		self.inner.capability
	}

	pub fn properties(&self) -> &Properties {
		&self.inner.properties
	}

	pub fn owner(&self) -> Option<&ModuleRef> {
		self.inner.owner.as_ref()
	}

	/// False as soon as unregistration begins, or once the registry stopped.
	pub fn is_live(&self) -> bool {
		self.inner.live.load(Ordering::Acquire)
	}

	pub(crate) fn mark_dead(&self) {
		self.inner.live.store(false, Ordering::Release);
	}

	pub(crate) fn registry(&self) -> Result<ServiceRegistry> {
		self.inner
			.registry
			.upgrade()
			.map(ServiceRegistry::from_shared)
			.ok_or(ServiceError::Unavailable)
	}

	pub(crate) fn belongs_to(&self, shared: &Arc<Shared>) -> bool {
		std::ptr::eq(self.inner.registry.as_ptr(), Arc::as_ptr(shared))
	}

	/// Withdraws the service.
	///
	/// Returns `Ok(false)` when the registration was already withdrawn, so
	/// teardown paths may call this unconditionally.
	pub fn unregister(&self) -> Result<bool> {
		self.registry()?.unregister(self)
	}
}

impl PartialEq for RegistrationHandle {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl Eq for RegistrationHandle {}

impl Hash for RegistrationHandle {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.inner.id.hash(state);
	}
}

impl fmt::Debug for RegistrationHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Registration")
			.field("id", &self.inner.id)
			.field("capability", &self.inner.capability)
			.field("properties", &self.inner.properties)
			.field("owner", &self.inner.owner.as_ref().map(ModuleRef::name))
			.field("live", &self.is_live())
			.finish()
	}
}

/// Typed view of a [`RegistrationHandle`] for capability `T`.
pub struct ServiceRegistration<T: ?Sized> {
	handle: RegistrationHandle,
	_capability: PhantomData<fn() -> Arc<T>>,
}

impl<T: Capability + ?Sized> ServiceRegistration<T> {
	pub(crate) fn from_handle(handle: RegistrationHandle) -> Self {
		debug_assert!(handle.capability().is::<T>());
		Self {
			handle,
			_capability: PhantomData,
		}
	}

	/// The live instance, or `None` once unregistration has begun.
	pub fn service(&self) -> Result<Option<Arc<T>>> {
		let service = self.handle.registry()?.lookup(self.handle.id())?;
		Ok(service.and_then(|service| service.downcast_ref::<Arc<T>>().cloned()))
	}

	pub fn handle(&self) -> &RegistrationHandle {
		&self.handle
	}

	pub fn into_handle(self) -> RegistrationHandle {
		self.handle
	}
}

impl<T: ?Sized> Clone for ServiceRegistration<T> {
	fn clone(&self) -> Self {
		Self {
			handle: self.handle.clone(),
			_capability: PhantomData,
		}
	}
}

impl<T: ?Sized> Deref for ServiceRegistration<T> {
	type Target = RegistrationHandle;

	fn deref(&self) -> &RegistrationHandle {
		&self.handle
	}
}

impl<T: ?Sized> PartialEq for ServiceRegistration<T> {
	fn eq(&self, other: &Self) -> bool {
		self.handle == other.handle
	}
}

impl<T: ?Sized> Eq for ServiceRegistration<T> {}

impl<T: ?Sized> fmt::Debug for ServiceRegistration<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.handle.fmt(f)
	}
}
