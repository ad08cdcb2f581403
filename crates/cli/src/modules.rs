//! Demo modules: a clock provider and a greeter that needs one.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use strata_components::{ActivationCoordinator, FnHooks, ModuleComponents};
use strata_services::{Filter, Properties, ServiceRegistry, capability_proxy};

pub trait Clock: Send + Sync {
	/// Seconds since the Unix epoch.
	fn now(&self) -> u64;
}

pub trait Greeting: Send + Sync {
	fn greet(&self, name: &str) -> String;
}

capability_proxy! {
	/// Forwards to whichever clock is currently registered.
	pub struct ClockProxy => dyn Clock {
		fn now(&self) -> u64;
	}
}

pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> u64 {
		SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map(|d| d.as_secs())
			.unwrap_or_default()
	}
}

pub struct Greeter {
	clock: ClockProxy,
}

impl Greeting for Greeter {
	fn greet(&self, name: &str) -> String {
		match self.clock.now() {
			Ok(now) => format!("hello {name}, it is {now}s past the epoch"),
			Err(err) => format!("hello {name} ({err})"),
		}
	}
}

pub fn install_clock(module: &ModuleComponents) -> anyhow::Result<ActivationCoordinator<SystemClock>> {
	let mut decl = module.declare::<SystemClock>("system-clock");
	decl.provides::<dyn Clock>(Properties::new().with("source", "system"), |c| c.clone() as Arc<dyn Clock>);
	Ok(module.install(decl.build(FnHooks::new(|| Ok(Arc::new(SystemClock)))))?)
}

/// Installs a greeter that activates only while a clock is registered.
pub fn install_greeter(module: &ModuleComponents) -> anyhow::Result<ActivationCoordinator<Greeter>> {
	let mut decl = module.declare::<Greeter>("greeter");
	decl.depend_on_one::<dyn Clock>(Filter::any());
	decl.provides::<dyn Greeting>(Properties::new(), |g| g.clone() as Arc<dyn Greeting>);

	let registry = module.services().registry().clone();
	let owner = module.module().clone();
	let hooks = FnHooks::new(move || {
		let proxy = registry.proxy::<dyn Clock>(Some(&owner), Filter::any())?;
		Ok(Arc::new(Greeter {
			clock: ClockProxy::new(proxy),
		}))
	})
	.on_release(|greeter| greeter.clock.proxy().close());

	Ok(module.install(decl.build(hooks))?)
}

/// Greets `name` through the first registered greeting service.
pub fn greet(registry: &ServiceRegistry, name: &str) -> anyhow::Result<Option<String>> {
	let Some(registration) = registry.find_service::<dyn Greeting>(&Filter::any())? else {
		return Ok(None);
	};
	Ok(registration.service()?.map(|greeting| greeting.greet(name)))
}
