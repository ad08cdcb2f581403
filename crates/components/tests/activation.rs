//! Activation behaviour observed through the public API only.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use strata_components::{ComponentDeclaration, FnHooks, Satisfaction};
use strata_services::{Filter, Properties, RegistrationHandle, ServiceRegistry};

trait Sensor: Send + Sync {
	fn channel(&self) -> u8;
}

struct Channel(u8);

impl Sensor for Channel {
	fn channel(&self) -> u8 {
		self.0
	}
}

trait Aggregate: Send + Sync {
	fn sum(&self) -> u32;
}

struct Summary {
	sensors: Vec<Arc<dyn Sensor>>,
}

impl Aggregate for Summary {
	fn sum(&self) -> u32 {
		self.sensors.iter().map(|s| u32::from(s.channel())).sum()
	}
}

fn running() -> ServiceRegistry {
	let registry = ServiceRegistry::new("activation");
	registry.start();
	registry
}

#[test]
fn quorum_gates_activation_and_instance_reads_dependencies() {
	let registry = running();
	let mut decl = ComponentDeclaration::<Summary>::new("summary", &registry);
	let sensors = decl.depend_on_many::<dyn Sensor>(Filter::any(), 2);
	decl.provides::<dyn Aggregate>(Properties::new(), |s| s.clone() as Arc<dyn Aggregate>);
	let coordinator = decl.build(FnHooks::new({
		let sensors = sensors.clone();
		move || Ok(Arc::new(Summary { sensors: sensors.all() }))
	}));
	coordinator.start().unwrap();

	let edges = Arc::new(Mutex::new(Vec::new()));
	let sink = edges.clone();
	sensors
		.dependency()
		.add_satisfaction_listener(Arc::new(move |_: &strata_components::DependencyKey, s: Satisfaction| {
			sink.lock().push(s)
		}));

	let handles: Vec<RegistrationHandle> = (1..=3)
		.map(|channel| {
			registry
				.register::<dyn Sensor>(None, Arc::new(Channel(channel)), Properties::new())
				.unwrap()
				.into_handle()
		})
		.collect();
	assert!(coordinator.is_active());
	let aggregate = registry
		.find_service::<dyn Aggregate>(&Filter::any())
		.unwrap()
		.unwrap();
	assert_eq!(aggregate.service().unwrap().unwrap().sum(), 3);

	handles[0].unregister().unwrap();
	assert!(coordinator.is_active());
	handles[1].unregister().unwrap();
	assert!(!coordinator.is_active());
	assert!(registry.find_service::<dyn Aggregate>(&Filter::any()).unwrap().is_none());

	assert_eq!(*edges.lock(), vec![Satisfaction::Satisfied, Satisfaction::Unsatisfied]);
	assert_eq!(coordinator.activations(), 1);
}

#[test]
fn concurrent_edges_activate_once_per_window() {
	const DEPENDENCIES: u8 = 4;
	const ROUNDS: usize = 25;

	let registry = running();
	let created = Arc::new(AtomicUsize::new(0));
	let mut decl = ComponentDeclaration::<Summary>::new("fan-in", &registry);
	for channel in 0..DEPENDENCIES {
		decl.depend_on_one::<dyn Sensor>(Filter::equals("channel", i64::from(channel)));
	}
	let coordinator = decl.build(FnHooks::new({
		let created = created.clone();
		move || {
			created.fetch_add(1, Ordering::SeqCst);
			Ok(Arc::new(Summary { sensors: Vec::new() }))
		}
	}));
	coordinator.start().unwrap();

	for round in 0..ROUNDS {
		let workers: Vec<_> = (0..DEPENDENCIES)
			.map(|channel| {
				let registry = registry.clone();
				thread::spawn(move || {
					registry
						.register::<dyn Sensor>(
							None,
							Arc::new(Channel(channel)),
							Properties::new().with("channel", i64::from(channel)),
						)
						.unwrap()
						.into_handle()
				})
			})
			.collect();
		let handles: Vec<RegistrationHandle> = workers.into_iter().map(|w| w.join().unwrap()).collect();

		assert!(coordinator.is_active());
		assert_eq!(created.load(Ordering::SeqCst), round + 1);

		for handle in handles {
			handle.unregister().unwrap();
		}
		assert!(!coordinator.is_active());
	}
	assert_eq!(coordinator.activations(), ROUNDS as u64);
}

#[test]
fn stop_from_another_thread_waits_for_teardown() {
	let registry = running();
	let released = Arc::new(AtomicUsize::new(0));
	let coordinator = ComponentDeclaration::<Summary>::new("stoppable", &registry).build(
		FnHooks::new(|| Ok(Arc::new(Summary { sensors: Vec::new() }))).on_release({
			let released = released.clone();
			move |_| {
				released.fetch_add(1, Ordering::SeqCst);
			}
		}),
	);
	coordinator.start().unwrap();
	assert!(coordinator.is_active());

	let remote = coordinator.clone();
	thread::spawn(move || remote.stop()).join().unwrap();
	assert!(!coordinator.is_active());
	assert_eq!(released.load(Ordering::SeqCst), 1);
}
