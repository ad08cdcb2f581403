//! Strata host binary.
//!
//! Loads a runtime configuration, installs the bundled demo modules and walks
//! them through a start/stop cycle while logging every transition.

mod modules;

use std::path::PathBuf;

use clap::Parser;
use strata_runtime::{Runtime, RuntimeConfig, logging};
use tracing::info;

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(about = "Service registry and dependency-driven activation host")]
struct Args {
	/// Runtime configuration file (TOML)
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,

	/// Recipient passed to the greeter
	#[arg(long, default_value = "world")]
	name: String,
}

fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	let config = match &args.config {
		Some(path) => RuntimeConfig::load(path)?,
		None => RuntimeConfig::default(),
	};
	logging::init(&config.logging, args.verbose)?;

	let runtime = Runtime::new(config);
	runtime.add_startup_hook("announce", |registry| {
		info!(registry = registry.name(), "registry online");
		Ok(())
	});
	runtime.add_shutdown_hook("report", |registry| {
		info!(services = registry.service_count()?, listeners = registry.listener_count()?, "registry draining");
		Ok(())
	});
	runtime.start()?;

	let greeter = runtime.install_module("greeter");
	let component = modules::install_greeter(&greeter)?;
	runtime.start_module(&greeter)?;
	info!(active = component.is_active(), "greeter module started without a clock");

	let clock = runtime.install_module("clock");
	modules::install_clock(&clock)?;
	runtime.start_module(&clock)?;

	match modules::greet(runtime.registry(), &args.name)? {
		Some(line) => println!("{line}"),
		None => info!("no greeting service available"),
	}

	runtime.stop_module(&clock);
	info!(active = component.is_active(), "clock module stopped");

	runtime.stop();
	Ok(())
}
