//! Runtime lifecycle.
//!
//! Startup hooks run in registration order after the registry starts.
//! Shutdown hooks run most-recent-first after every installed module has been
//! torn down, and the registry is stopped last.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use strata_components::ModuleComponents;
use strata_services::callback::isolate;
use strata_services::{ModuleId, ModuleRef, ModuleState, ServiceRegistry};
use tracing::{debug, error, info, warn};

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;

type HookFn = dyn Fn(&ServiceRegistry) -> anyhow::Result<()> + Send + Sync;

struct Hook {
	name: String,
	run: Box<HookFn>,
}

impl Hook {
	fn invoke(&self, registry: &ServiceRegistry) -> anyhow::Result<()> {
		isolate(|| (self.run)(registry)).unwrap_or_else(|panic| Err(anyhow::anyhow!("hook panicked: {panic}")))
	}
}

/// Hosts a registry and the modules installed into it.
pub struct Runtime {
	config: RuntimeConfig,
	registry: ServiceRegistry,
	startup: Mutex<Vec<Arc<Hook>>>,
	shutdown: Mutex<Vec<Arc<Hook>>>,
	modules: Mutex<Vec<Arc<ModuleComponents>>>,
	next_module: AtomicU64,
	started_at: Mutex<Option<Instant>>,
}

impl Runtime {
	pub fn new(config: RuntimeConfig) -> Self {
		Self {
			registry: ServiceRegistry::new(config.registry.name.clone()),
			config,
			startup: Mutex::new(Vec::new()),
			shutdown: Mutex::new(Vec::new()),
			modules: Mutex::new(Vec::new()),
			next_module: AtomicU64::new(1),
			started_at: Mutex::new(None),
		}
	}

	pub fn config(&self) -> &RuntimeConfig {
		&self.config
	}

	pub fn registry(&self) -> &ServiceRegistry {
		&self.registry
	}

	/// Appends a hook run by [`start`](Self::start).
	pub fn add_startup_hook<F>(&self, name: impl Into<String>, hook: F)
	where
		F: Fn(&ServiceRegistry) -> anyhow::Result<()> + Send + Sync + 'static,
	{
		self.startup.lock().push(Arc::new(Hook {
			name: name.into(),
			run: Box::new(hook),
		}));
	}

	/// Prepends a hook run by [`stop`](Self::stop), so the most recently added
	/// hook runs first.
	pub fn add_shutdown_hook<F>(&self, name: impl Into<String>, hook: F)
	where
		F: Fn(&ServiceRegistry) -> anyhow::Result<()> + Send + Sync + 'static,
	{
		self.shutdown.lock().insert(
			0,
			Arc::new(Hook {
				name: name.into(),
				run: Box::new(hook),
			}),
		);
	}

	/// Starts the registry and runs startup hooks.
	///
	/// If a hook fails the runtime is stopped again and the failure returned.
	pub fn start(&self) -> Result<(), RuntimeError> {
		if !self.registry.start() {
			return Err(RuntimeError::AlreadyRunning);
		}
		*self.started_at.lock() = Some(Instant::now());
		info!(runtime = %self.config.name, registry = self.registry.name(), "runtime starting");

		let hooks = self.startup.lock().clone();
		for hook in hooks {
			debug!(hook = %hook.name, "running startup hook");
			if let Err(source) = hook.invoke(&self.registry) {
				error!(hook = %hook.name, error = %source, "startup hook failed");
				self.stop();
				return Err(RuntimeError::StartupHook {
					hook: hook.name.clone(),
					source,
				});
			}
		}

		info!(runtime = %self.config.name, "runtime started");
		Ok(())
	}

	/// Tears modules down in reverse installation order, runs shutdown hooks
	/// and stops the registry. Stopping a stopped runtime does nothing.
	pub fn stop(&self) {
		if !self.registry.is_running() {
			return;
		}
		info!(runtime = %self.config.name, "runtime stopping");

		let modules = self.modules.lock().clone();
		for module in modules.iter().rev() {
			if matches!(module.module().state(), ModuleState::Starting | ModuleState::Active) {
				self.stop_module(module);
			}
		}

		let hooks = self.shutdown.lock().clone();
		for hook in hooks {
			debug!(hook = %hook.name, "running shutdown hook");
			if let Err(err) = hook.invoke(&self.registry) {
				warn!(hook = %hook.name, error = %err, "shutdown hook failed");
			}
		}

		self.registry.stop();
		let uptime = self.started_at.lock().take().map(|at| at.elapsed());
		info!(runtime = %self.config.name, uptime = ?uptime, "runtime stopped");
	}

	pub fn is_running(&self) -> bool {
		self.registry.is_running()
	}

	/// Time since the last successful `start`, while running.
	pub fn uptime(&self) -> Option<Duration> {
		self.started_at.lock().map(|at| at.elapsed())
	}

	/// Creates a module in the installed state and tracks it for teardown.
	pub fn install_module(&self, name: impl Into<String>) -> Arc<ModuleComponents> {
		let id = ModuleId(self.next_module.fetch_add(1, Ordering::Relaxed));
		let module = ModuleRef::new(id, name);
		let components = Arc::new(ModuleComponents::new(&self.registry, module));
		self.modules.lock().push(components.clone());
		debug!(module = %components.module(), "installed module");
		components
	}

	/// Drives a module through resolved, starting and started.
	pub fn start_module(&self, module: &ModuleComponents) -> Result<(), RuntimeError> {
		module.resolved();
		module.starting().map_err(|source| RuntimeError::Module {
			module: module.module().name().to_owned(),
			source,
		})?;
		module.started();
		Ok(())
	}

	/// Drives a module through stopping and stopped.
	pub fn stop_module(&self, module: &ModuleComponents) {
		module.stopping();
		module.stopped();
	}

	/// Modules installed so far, in installation order.
	pub fn modules(&self) -> Vec<Arc<ModuleComponents>> {
		self.modules.lock().clone()
	}
}

impl Drop for Runtime {
	fn drop(&mut self) {
		self.stop();
	}
}

impl std::fmt::Debug for Runtime {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Runtime")
			.field("name", &self.config.name)
			.field("registry", &self.registry)
			.field("modules", &self.modules.lock().len())
			.finish()
	}
}

#[cfg(test)]
mod tests;
