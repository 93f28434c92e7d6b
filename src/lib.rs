pub mod authorization;
pub mod availability;
pub mod billing;
pub mod booking;
pub mod clock;
pub mod commands;
pub mod config;
pub mod core_state; // Per-request connection, config, procedure port, clock
pub mod db;
pub mod error;
pub mod finance;
pub mod models;
pub mod procedures; // Named store procedures behind a port
pub mod reconciler; // Lazy lab test completion
pub mod stock;
pub mod unit_of_work;

#[cfg(test)]
mod test_support;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` wins over the default
/// filter. Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    if installed.is_ok() {
        tracing::info!("{} engine v{}", config::APP_NAME, config::APP_VERSION);
    }
}
