//! Greenlight API server
//!
//! Resolves flags, opens the shared database pool, composes the application
//! state and metrics registry, then serves until a shutdown signal.

mod app;
mod config;
mod constants;
mod error;
mod handlers;
mod metrics;
mod models;
mod server;
mod services;
mod startup;
mod state;

#[cfg(test)]
mod tests;

use std::process;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{ConfigError, Database, ProcessEnv, Resolution};
use crate::constants::VERSION;
use crate::startup::Launch;

// High-performance memory allocator for non-MSVC targets
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() {
    let resolution = match config::resolve(std::env::args_os(), &ProcessEnv) {
        Ok(resolution) => resolution,
        Err(ConfigError::Cli(e)) => e.exit(),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(2);
        }
    };

    // Nothing is initialised for `--version`.
    let _sentry_guard = match &resolution {
        Resolution::Run(settings) => {
            init_logger();
            Some(init_sentry(&settings.sentry_dsn))
        }
        Resolution::Version => None,
    };

    let application = match startup::launch(resolution, |db| async move {
        Database::open(&db).await
    })
    .await
    {
        Ok(Launch::Version) => {
            println!("Version:\t{VERSION}");
            return;
        }
        Ok(Launch::Serve(application)) => application,
        Err(e) => fatal(&e),
    };

    if let Err(e) = server::serve(application).await {
        fatal(&e);
    }

    // Flush Sentry events before exit
    if let Some(client) = sentry::Hub::current().client() {
        client.flush(Some(std::time::Duration::from_secs(2)));
    }

    info!("Server shutdown complete");
}

fn fatal(e: &dyn std::error::Error) -> ! {
    error!(error = %e, "fatal");
    sentry::capture_error(e);
    if let Some(client) = sentry::Hub::current().client() {
        client.flush(Some(std::time::Duration::from_secs(2)));
    }
    process::exit(1);
}

fn init_logger() {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)))
        .init();
}

fn init_sentry(dsn: &str) -> sentry::ClientInitGuard {
    sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            traces_sample_rate: 0.1,
            sample_rate: 1.0,
            ..Default::default()
        },
    ))
}
