use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use strata_components::FnHooks;
use strata_services::{Filter, Properties};

use super::*;

trait Clock: Send + Sync {}
struct Fixed;
impl Clock for Fixed {}

fn runtime() -> Runtime {
	Runtime::new(RuntimeConfig::default())
}

fn recorder(log: &Arc<Mutex<Vec<String>>>, entry: &'static str) -> impl Fn(&ServiceRegistry) -> anyhow::Result<()> + Send + Sync + use<> {
	let log = log.clone();
	move |_| {
		log.lock().push(entry.to_owned());
		Ok(())
	}
}

#[test]
fn test_hook_ordering() {
	let runtime = runtime();
	let log = Arc::new(Mutex::new(Vec::new()));
	runtime.add_startup_hook("a", recorder(&log, "start a"));
	runtime.add_startup_hook("b", recorder(&log, "start b"));
	runtime.add_shutdown_hook("a", recorder(&log, "stop a"));
	runtime.add_shutdown_hook("b", recorder(&log, "stop b"));

	runtime.start().unwrap();
	assert!(runtime.is_running());
	assert!(runtime.uptime().is_some());
	runtime.stop();
	assert!(!runtime.is_running());
	assert_eq!(*log.lock(), vec!["start a", "start b", "stop b", "stop a"]);
}

#[test]
fn test_start_twice_is_rejected() {
	let runtime = runtime();
	runtime.start().unwrap();
	assert!(matches!(runtime.start(), Err(RuntimeError::AlreadyRunning)));
}

#[test]
fn test_failing_startup_hook_stops_runtime() {
	let runtime = runtime();
	let log = Arc::new(Mutex::new(Vec::new()));
	runtime.add_startup_hook("migrate", |_| anyhow::bail!("schema locked"));
	runtime.add_startup_hook("never", recorder(&log, "never"));
	runtime.add_shutdown_hook("cleanup", recorder(&log, "cleanup"));

	match runtime.start() {
		Err(RuntimeError::StartupHook { hook, source }) => {
			assert_eq!(hook, "migrate");
			assert_eq!(source.to_string(), "schema locked");
		}
		other => panic!("expected startup hook failure, got {other:?}"),
	}
	assert!(!runtime.is_running());
	assert_eq!(*log.lock(), vec!["cleanup"]);
}

#[test]
fn test_panicking_startup_hook_is_reported() {
	let runtime = runtime();
	runtime.add_startup_hook("explode", |_| panic!("kaboom"));
	let err = runtime.start().unwrap_err();
	assert!(matches!(&err, RuntimeError::StartupHook { source, .. } if source.to_string().contains("kaboom")));
}

#[test]
fn test_shutdown_hook_errors_do_not_abort_stop() {
	let runtime = runtime();
	let log = Arc::new(Mutex::new(Vec::new()));
	runtime.add_shutdown_hook("last", recorder(&log, "last"));
	runtime.add_shutdown_hook("first", |_| anyhow::bail!("flush failed"));
	runtime.start().unwrap();
	runtime.stop();
	assert_eq!(*log.lock(), vec!["last"]);
	assert!(!runtime.is_running());

	runtime.stop();
	assert_eq!(log.lock().len(), 1);
}

#[test]
fn test_modules_torn_down_before_shutdown_hooks() {
	let runtime = runtime();
	runtime.start().unwrap();

	let clock = runtime.install_module("clock");
	let mut decl = clock.declare::<Fixed>("fixed");
	decl.provides::<dyn Clock>(Properties::new(), |c| c.clone() as Arc<dyn Clock>);
	let component = clock.install(decl.build(FnHooks::new(|| Ok(Arc::new(Fixed))))).unwrap();
	runtime.start_module(&clock).unwrap();
	assert!(component.is_active());
	assert_eq!(clock.module().state(), ModuleState::Active);

	let seen = Arc::new(Mutex::new(None));
	runtime.add_shutdown_hook("inspect", {
		let seen = seen.clone();
		move |registry: &ServiceRegistry| {
			*seen.lock() = Some((registry.is_running(), registry.find_services::<dyn Clock>(&Filter::any())?.len()));
			Ok(())
		}
	});

	runtime.stop();
	assert_eq!(*seen.lock(), Some((true, 0)));
	assert!(!component.is_active());
	assert_eq!(clock.module().state(), ModuleState::Resolved);
}

#[test]
fn test_installed_modules_get_distinct_ids() {
	let runtime = runtime();
	let a = runtime.install_module("a");
	let b = runtime.install_module("b");
	assert_ne!(a.module().id(), b.module().id());
	assert_eq!(runtime.modules().len(), 2);
	assert_eq!(a.module().state(), ModuleState::Installed);
}

#[test]
fn test_start_module_on_stopped_runtime_fails() {
	let runtime = runtime();
	let module = runtime.install_module("orphan");
	let mut decl = module.declare::<Fixed>("needs-clock");
	decl.depend_on_one::<dyn Clock>(Filter::any());
	module.install(decl.build(FnHooks::new(|| Ok(Arc::new(Fixed))))).unwrap();

	match runtime.start_module(&module) {
		Err(RuntimeError::Module { module, .. }) => assert_eq!(module, "orphan"),
		other => panic!("expected module failure, got {other:?}"),
	}
}

#[test]
fn test_registry_named_from_config() {
	let mut config = RuntimeConfig::default();
	config.registry.name = "edge".to_owned();
	assert_eq!(Runtime::new(config).registry().name(), "edge");
}
