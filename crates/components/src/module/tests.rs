use std::sync::Arc;

use strata_services::{Filter, FnListener, ListenerRetention, ModuleId, Properties};

use super::*;
use crate::coordinator::FnHooks;

trait Transport: Send + Sync {}
trait Mailer: Send + Sync {}

struct Smtp;
impl Transport for Smtp {}

struct Outbox;
impl Mailer for Outbox {}

fn running() -> ServiceRegistry {
	let registry = ServiceRegistry::new("test");
	registry.start();
	registry
}

fn mail_module(registry: &ServiceRegistry) -> (ModuleComponents, ActivationCoordinator<Outbox>) {
	let components = ModuleComponents::new(registry, ModuleRef::new(ModuleId(1), "mail"));
	let mut decl = components.declare::<Outbox>("outbox");
	decl.depend_on_one::<dyn Transport>(Filter::any());
	decl.provides::<dyn Mailer>(Properties::new(), |o| o.clone() as Arc<dyn Mailer>);
	let coordinator = components
		.install(decl.build(FnHooks::new(|| Ok(Arc::new(Outbox)))))
		.unwrap();
	(components, coordinator)
}

#[test]
fn test_nothing_activates_before_started() {
	let registry = running();
	registry
		.register::<dyn Transport>(None, Arc::new(Smtp), Properties::new())
		.unwrap();
	let (components, outbox) = mail_module(&registry);

	components.resolved();
	components.starting().unwrap();
	assert!(!outbox.is_active());

	components.started();
	assert!(outbox.is_active());
	assert_eq!(components.active_components(), vec!["outbox".to_owned()]);
	let mailer = registry.find_service::<dyn Mailer>(&Filter::any()).unwrap().unwrap();
	assert_eq!(mailer.owner(), Some(components.module()));
}

#[test]
fn test_stopping_withdraws_everything_owned() {
	let registry = running();
	let (components, outbox) = mail_module(&registry);
	components.starting().unwrap();
	components.started();

	components
		.services()
		.register::<dyn Transport>(Arc::new(Smtp), Properties::new())
		.unwrap();
	assert!(outbox.is_active());
	let _listener = components
		.services()
		.add_listener(
			Arc::new(FnListener::<dyn Mailer>::new()),
			Filter::any(),
			ListenerRetention::Strong,
		)
		.unwrap();

	components.stopping();
	assert!(!outbox.is_active());
	assert_eq!(registry.service_count(), Ok(0));
	assert_eq!(registry.listener_count(), Ok(0));

	components.stopped();
	assert_eq!(components.module().state(), ModuleState::Resolved);
}

#[test]
fn test_install_after_start_starts_immediately() {
	let registry = running();
	let components = ModuleComponents::new(&registry, ModuleRef::new(ModuleId(2), "late"));
	components.starting().unwrap();
	components.started();

	let coordinator = components
		.install(
			components
				.declare::<Outbox>("late")
				.build(FnHooks::new(|| Ok(Arc::new(Outbox)))),
		)
		.unwrap();
	assert!(coordinator.is_started());
	assert!(coordinator.is_active());
}

#[test]
fn test_declarations_share_dependencies() {
	let registry = running();
	let components = ModuleComponents::new(&registry, ModuleRef::new(ModuleId(3), "shared"));
	for name in ["a", "b"] {
		let mut decl = components.declare::<Outbox>(name);
		decl.depend_on_one::<dyn Transport>(Filter::any());
		decl.depend_on_optional::<dyn Mailer>(Filter::any());
		components
			.install(decl.build(FnHooks::new(|| Ok(Arc::new(Outbox)))))
			.unwrap();
	}
	assert_eq!(components.dependency_count(), 2);

	components.starting().unwrap();
	components.started();
	assert!(components.active_components().is_empty());

	let smtp = registry
		.register::<dyn Transport>(None, Arc::new(Smtp), Properties::new())
		.unwrap();
	assert_eq!(components.active_components().len(), 2);

	smtp.unregister().unwrap();
	assert!(components.active_components().is_empty());

	components.stopping();
	assert_eq!(registry.listener_count(), Ok(0));
}

#[test]
fn test_starting_reports_failure_on_stopped_registry() {
	let registry = ServiceRegistry::new("test");
	let (components, outbox) = {
		registry.start();
		let pair = mail_module(&registry);
		registry.stop();
		pair
	};
	assert!(components.starting().is_err());
	assert!(!outbox.is_started());
}
