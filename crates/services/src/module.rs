//! Owning-module handles.
//!
//! Registrations and listener entries remember the module that created them
//! so that a stopping module can withdraw everything it published in one
//! call. The module's lifecycle state doubles as the activation precondition
//! for the components it hosts.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Runtime-unique module identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u64);

impl fmt::Display for ModuleId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Lifecycle state reported by the module lifecycle collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ModuleState {
	Installed = 0,
	Resolved = 1,
	Starting = 2,
	Active = 3,
	Stopping = 4,
}

impl ModuleState {
	fn from_u8(raw: u8) -> Self {
		match raw {
			1 => Self::Resolved,
			2 => Self::Starting,
			3 => Self::Active,
			4 => Self::Stopping,
			_ => Self::Installed,
		}
	}
}

struct ModuleInner {
	id: ModuleId,
	name: String,
	state: AtomicU8,
}

/// Shared handle to a module. Equality is by [`ModuleId`].
#[derive(Clone)]
pub struct ModuleRef {
	inner: Arc<ModuleInner>,
}

impl ModuleRef {
	/// Creates a handle in the [`ModuleState::Installed`] state.
	pub fn new(id: ModuleId, name: impl Into<String>) -> Self {
		Self {
			inner: Arc::new(ModuleInner {
				id,
				name: name.into(),
				state: AtomicU8::new(ModuleState::Installed as u8),
			}),
		}
	}

	pub fn id(&self) -> ModuleId {
		self.inner.id
	}

	pub fn name(&self) -> &str {
		&self.inner.name
	}

	pub fn state(&self) -> ModuleState {
		ModuleState::from_u8(self.inner.state.load(Ordering::Acquire))
	}

	pub fn set_state(&self, state: ModuleState) {
		self.inner.state.store(state as u8, Ordering::Release);
	}

	/// Whether components of this module may be activated.
	pub fn is_active(&self) -> bool {
		self.state() == ModuleState::Active
	}
}

impl PartialEq for ModuleRef {
	fn eq(&self, other: &Self) -> bool {
		self.inner.id == other.inner.id
	}
}

impl Eq for ModuleRef {}

impl fmt::Debug for ModuleRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ModuleRef")
			.field("id", &self.inner.id)
			.field("name", &self.inner.name)
			.field("state", &self.state())
			.finish()
	}
}

impl fmt::Display for ModuleRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}{}", self.inner.name, self.inner.id)
	}
}
