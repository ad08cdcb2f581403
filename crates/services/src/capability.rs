use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Marker for types that can be published into the registry.
///
/// Capabilities are usually trait objects (`dyn Clock`), but any shareable
/// `'static` type qualifies.
pub trait Capability: Send + Sync + 'static {}

impl<T: ?Sized + Send + Sync + 'static> Capability for T {}

/// Opaque tag a service is published under.
///
/// Equality is by [`TypeId`]; the name is only carried for diagnostics.
#[derive(Clone, Copy)]
pub struct CapabilityType {
	id: TypeId,
	name: &'static str,
}

impl CapabilityType {
	pub fn of<T: Capability + ?Sized>() -> Self {
		Self {
			id: TypeId::of::<T>(),
			name: std::any::type_name::<T>(),
		}
	}

	pub fn name(&self) -> &'static str {
		self.name
	}

	pub fn is<T: Capability + ?Sized>(&self) -> bool {
		self.id == TypeId::of::<T>()
	}
}

impl PartialEq for CapabilityType {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for CapabilityType {}

impl Hash for CapabilityType {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.id.hash(state);
	}
}

impl fmt::Debug for CapabilityType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name)
	}
}

impl fmt::Display for CapabilityType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name)
	}
}
