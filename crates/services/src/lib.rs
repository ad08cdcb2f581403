//! Reactive service registry.
//!
//! Modules publish implementations of shared capability types into a
//! [`ServiceRegistry`] and observe them through listeners, [`ServiceTracker`]s
//! and [`ServiceProxy`] handles. Every notification is delivered synchronously
//! on the thread that performed the mutation, after the registry lock has been
//! released, so callbacks are free to call back into the registry.

pub mod callback;
mod capability;
mod error;
mod filter;
mod listener;
mod module;
mod properties;
mod proxy;
mod registration;
mod registry;
mod tracker;

pub use capability::{Capability, CapabilityType};
pub use error::{Result, ServiceError};
pub use filter::Filter;
pub use listener::{FnListener, ListenerRetention, ListenerSubscription, ServiceListener};
pub use module::{ModuleId, ModuleRef, ModuleState};
pub use properties::{Properties, PropertyValue};
pub use proxy::ServiceProxy;
pub use registration::{RegistrationHandle, RegistrationId, ServiceRegistration};
pub use registry::{ModuleServices, ServiceRegistry};
pub use tracker::{ServiceTracker, TrackerSnapshot};
