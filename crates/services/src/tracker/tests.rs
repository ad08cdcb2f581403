use std::sync::Arc;

use parking_lot::Mutex;

use super::*;
use crate::listener::FnListener;
use crate::properties::Properties;

trait Codec: Send + Sync {
	fn name(&self) -> &str;
}

struct Named(&'static str);

impl Codec for Named {
	fn name(&self) -> &str {
		self.0
	}
}

fn running() -> ServiceRegistry {
	let registry = ServiceRegistry::new("test");
	registry.start();
	registry
}

fn codec(registry: &ServiceRegistry, name: &'static str, props: Properties) -> ServiceRegistration<dyn Codec> {
	registry
		.register::<dyn Codec>(None, Arc::new(Named(name)), props)
		.unwrap()
}

fn names(tracker: &ServiceTracker<dyn Codec>) -> Vec<String> {
	tracker
		.services()
		.unwrap()
		.iter()
		.map(|s| s.name().to_owned())
		.collect()
}

#[test]
fn test_queries_require_tracking() {
	let registry = running();
	let tracker = registry.create_tracker::<dyn Codec>(None, Filter::any());
	assert!(matches!(tracker.services(), Err(ServiceError::NotTracking)));
	assert!(matches!(tracker.registrations(), Err(ServiceError::NotTracking)));
	assert!(matches!(tracker.service(), Err(ServiceError::NotTracking)));

	tracker.start_tracking().unwrap();
	assert_eq!(tracker.start_tracking(), Err(ServiceError::AlreadyTracking));

	tracker.stop_tracking();
	assert_eq!(tracker.len(), Err(ServiceError::NotTracking));
}

#[test]
fn test_start_fails_on_stopped_registry() {
	let registry = ServiceRegistry::new("test");
	let tracker = registry.create_tracker::<dyn Codec>(None, Filter::any());
	assert_eq!(tracker.start_tracking(), Err(ServiceError::Unavailable));
	assert!(!tracker.is_tracking());
}

#[test]
fn test_tracks_in_registration_order() {
	let registry = running();
	codec(&registry, "gzip", Properties::new().with("lossless", true));
	codec(&registry, "jpeg", Properties::new().with("lossless", false));

	let tracker = registry.create_tracker::<dyn Codec>(None, Filter::equals("lossless", true));
	tracker.start_tracking().unwrap();
	assert_eq!(names(&tracker), vec!["gzip"]);

	let zstd = codec(&registry, "zstd", Properties::new().with("lossless", true));
	codec(&registry, "brotli", Properties::new().with("lossless", true));
	assert_eq!(names(&tracker), vec!["gzip", "zstd", "brotli"]);
	assert_eq!(tracker.service().unwrap().unwrap().name(), "gzip");

	zstd.unregister().unwrap();
	assert_eq!(names(&tracker), vec!["gzip", "brotli"]);
	assert_eq!(tracker.registrations().unwrap().len(), 2);
}

#[test]
fn test_snapshot_is_stable_across_updates() {
	let registry = running();
	let tracker = registry.create_tracker::<dyn Codec>(None, Filter::any());
	tracker.start_tracking().unwrap();
	codec(&registry, "a", Properties::new());

	let before = tracker.snapshot().unwrap();
	codec(&registry, "b", Properties::new());
	assert_eq!(before.len(), 1);
	assert_eq!(tracker.snapshot().unwrap().len(), 2);
}

#[test]
fn test_stop_discards_and_restart_repopulates() {
	let registry = running();
	let tracker = registry.create_tracker::<dyn Codec>(None, Filter::any());
	tracker.start_tracking().unwrap();
	codec(&registry, "a", Properties::new());

	tracker.stop_tracking();
	codec(&registry, "b", Properties::new());
	assert_eq!(registry.listener_count(), Ok(0));

	tracker.start_tracking().unwrap();
	assert_eq!(names(&tracker), vec!["a", "b"]);
}

#[test]
fn test_event_handlers_receive_normalized_events() {
	let registry = running();
	let tracker = registry.create_tracker::<dyn Codec>(None, Filter::any());
	let events = Arc::new(Mutex::new(Vec::new()));
	let handler = {
		let up = events.clone();
		let down = events.clone();
		Arc::new(
			FnListener::<dyn Codec>::new()
				.on_registered(move |_, s| up.lock().push(format!("+{}", s.name())))
				.on_unregistered(move |_, s| down.lock().push(format!("-{}", s.name()))),
		)
	};
	tracker.add_event_handler(handler.clone());
	tracker.start_tracking().unwrap();

	let a = codec(&registry, "a", Properties::new());
	a.unregister().unwrap();
	a.unregister().unwrap();
	assert_eq!(*events.lock(), vec!["+a", "-a"]);

	assert!(tracker.remove_event_handler(&handler));
	assert!(!tracker.remove_event_handler(&handler));
	codec(&registry, "b", Properties::new());
	assert_eq!(events.lock().len(), 2);
}

#[test]
fn test_late_handler_is_replayed() {
	let registry = running();
	let tracker = registry.create_tracker::<dyn Codec>(None, Filter::any());
	tracker.start_tracking().unwrap();
	codec(&registry, "a", Properties::new());
	codec(&registry, "b", Properties::new());

	let seen = Arc::new(Mutex::new(Vec::new()));
	let sink = seen.clone();
	tracker.add_event_handler(Arc::new(
		FnListener::<dyn Codec>::new().on_registered(move |_, s| sink.lock().push(s.name().to_owned())),
	));
	assert_eq!(*seen.lock(), vec!["a", "b"]);
}

#[test]
fn test_handler_may_mutate_registry() {
	let registry = running();
	let tracker = registry.create_tracker::<dyn Codec>(None, Filter::any());
	let inner = registry.clone();
	tracker.add_event_handler(Arc::new(FnListener::<dyn Codec>::new().on_registered(
		move |reg, s| {
			if s.name() == "first" {
				inner
					.register::<dyn Codec>(None, Arc::new(Named("second")), Properties::new())
					.unwrap();
				reg.unregister().unwrap();
			}
		},
	)));
	tracker.start_tracking().unwrap();

	codec(&registry, "first", Properties::new());
	assert_eq!(names(&tracker), vec!["second"]);
}

#[test]
fn test_panicking_handler_does_not_corrupt_lists() {
	let registry = running();
	let tracker = registry.create_tracker::<dyn Codec>(None, Filter::any());
	let calls = Arc::new(Mutex::new(0));
	tracker.add_event_handler(Arc::new(
		FnListener::<dyn Codec>::new().on_registered(|_, _| panic!("handler failure")),
	));
	let counter = calls.clone();
	tracker.add_event_handler(Arc::new(
		FnListener::<dyn Codec>::new().on_registered(move |_, _| *counter.lock() += 1),
	));
	tracker.start_tracking().unwrap();

	codec(&registry, "a", Properties::new());
	assert_eq!(names(&tracker), vec!["a"]);
	assert_eq!(*calls.lock(), 1);
}

#[test]
fn test_dropped_tracker_unsubscribes() {
	let registry = running();
	let tracker = registry.create_tracker::<dyn Codec>(None, Filter::any());
	tracker.start_tracking().unwrap();
	assert_eq!(registry.listener_count(), Ok(1));

	drop(tracker);
	codec(&registry, "a", Properties::new());
	assert_eq!(registry.listener_count(), Ok(0));
}
