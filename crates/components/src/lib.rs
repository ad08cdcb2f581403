//! Component activation driven by service availability.
//!
//! A component declares the capabilities it needs ([`Dependency`], each a
//! tracker plus a minimum count) and the capabilities it provides. Its
//! [`ActivationCoordinator`] instantiates it once every dependency is
//! satisfied and the owning module permits activation, publishes what it
//! provides, and tears it all down again when a dependency is lost.

mod adapter;
mod coordinator;
mod declare;
mod dependency;
mod module;

pub use coordinator::{ActivationCoordinator, ActivationGate, Always, ComponentHooks, FnHooks};
pub use declare::{ComponentDeclaration, Many, One, Optional, Tracked};
pub use dependency::{
	Dependency, DependencyKey, DependencySet, Requirement, Satisfaction, SatisfactionListener,
};
pub use module::{ManagedComponent, ModuleComponents};
