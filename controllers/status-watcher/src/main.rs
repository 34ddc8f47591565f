//! Object Status Watcher
//!
//! Watches Cluster API `Cluster` objects and emits a Kubernetes event every
//! time one is observed with `Ready=True`:
//! - list/watch with a local cache, reconnects and periodic resync
//! - condition evaluation on every add and update
//! - events recorded against the object itself
//!
//! Runs until SIGINT/SIGTERM/SIGABRT, then exits with a non-zero status.

mod condition;
mod config;
mod controller;
mod document;
mod error;
mod shutdown;
mod signals;
mod status_checker;
mod subscription;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::Config;
use crate::controller::Controller;
use crate::error::ControllerError;
use clap::Parser;
use tracing::{Instrument, debug, error, info, info_span, warn};
use tracing_subscriber::EnvFilter;

const SERVICE_NAME: &str = "ObjectStatusWatcher";

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    let config = Config::try_parse().unwrap_or_else(|e| {
        // Help and version go to stdout and exit cleanly; bad flags are fatal
        if !e.use_stderr() {
            e.exit();
        }
        let _ = e.print();
        std::process::exit(1);
    });
    init_tracing(config.debug);

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        debug!("rustls crypto provider already installed");
    }

    let span = info_span!("watcher", service = SERVICE_NAME);
    async {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            debug = config.debug,
            resource = %config.resource,
            namespace = config.namespace_filter().unwrap_or("<all>"),
            resync_interval = ?config.resync_interval,
            "Starting {}",
            SERVICE_NAME
        );

        let shutdown = signals::install().inspect_err(|e| error!("{}", e))?;
        let controller = Controller::new(&config)
            .await
            .inspect_err(|e| error!("{}", e))?;

        if let Err(e) = controller.run(shutdown).await {
            error!("{}", e);
        }
        warn!("{} done", SERVICE_NAME);
        Ok::<(), ControllerError>(())
    }
    .instrument(span)
    .await?;

    // The watcher only ever stops on a signal or a fatal watch failure
    std::process::exit(1);
}

/// Info by default, debug with `--debug`; `RUST_LOG` overrides both
fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
