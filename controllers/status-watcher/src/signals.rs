//! OS signal handling.
//!
//! The first termination signal triggers the shutdown broadcast. Signals
//! that cannot be registered are logged and skipped; failing to register
//! any signal at all is an error.

use crate::error::ControllerError;
use crate::shutdown::{self, Shutdown};
use tracing::{debug, warn};

#[cfg(unix)]
const TERMINATION_SIGNALS: &[(libc::c_int, &str)] = &[
    (libc::SIGINT, "SIGINT"),
    (libc::SIGTERM, "SIGTERM"),
    (libc::SIGSEGV, "SIGSEGV"),
    (libc::SIGABRT, "SIGABRT"),
    (libc::SIGILL, "SIGILL"),
    (libc::SIGFPE, "SIGFPE"),
];

/// Registers the termination signals and returns the shutdown they trigger.
///
/// Must be called from within the tokio runtime.
#[cfg(unix)]
pub fn install() -> Result<Shutdown, ControllerError> {
    use futures::future::FutureExt;
    use tokio::signal::unix::{SignalKind, signal};

    let mut waiting = Vec::new();
    for &(raw, name) in TERMINATION_SIGNALS {
        match signal(SignalKind::from_raw(raw)) {
            Ok(mut stream) => {
                debug!("{} handler registered", name);
                waiting.push(
                    async move {
                        stream.recv().await;
                        name
                    }
                    .boxed(),
                );
            }
            // Synchronous fault signals are refused by the runtime
            Err(e) => warn!("Failed to register {} handler: {}", name, e),
        }
    }

    if waiting.is_empty() {
        return Err(ControllerError::Signal("no termination signal could be registered".to_string()));
    }

    Ok(trigger_on_first(waiting))
}

/// Triggers shutdown once the first of `waiting` resolves with its signal name
#[cfg(unix)]
fn trigger_on_first(waiting: Vec<futures::future::BoxFuture<'static, &'static str>>) -> Shutdown {
    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        let (name, _, _) = futures::future::select_all(waiting).await;
        warn!("Signal ({}) detected, shutting down", name);
        trigger.trigger();
    });
    shutdown
}

/// Registers Ctrl-C and returns the shutdown it triggers.
#[cfg(not(unix))]
pub fn install() -> Result<Shutdown, ControllerError> {
    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => warn!("Signal (Ctrl-C) detected, shutting down"),
            Err(e) => warn!("Failed to listen for Ctrl-C ({}), shutting down", e),
        }
        trigger.trigger();
    });
    debug!("Ctrl-C handler registered");
    Ok(shutdown)
}
