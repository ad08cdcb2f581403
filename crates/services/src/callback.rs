//! Panic isolation for third-party callbacks.
//!
//! Listener, event-handler and hook code is arbitrary. A panic in one of them
//! is caught here and reported back as a message so the caller can log it
//! with its own context and carry on delivering to the rest.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Runs `f`, converting a panic into `Err(message)`.
pub fn isolate<R>(f: impl FnOnce() -> R) -> Result<R, String> {
	catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()).to_owned())
}

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
	if let Some(message) = payload.downcast_ref::<&'static str>() {
		message
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.as_str()
	} else {
		"<non-string panic payload>"
	}
}
