//! # GNSS Logger
//!
//! Log raw u-blox GNSS data for post-processing while relaying NTRIP
//! corrections to the receiver.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Parse the command line and load the configuration
//!    - Set up logging (console, plus a daily diagnostics file if configured)
//!
//! 2. **`run`**
//!    - Open the receiver port and create the session files
//!    - Decode and log frames, relay corrections, report status every second
//!    - Ctrl+C or SIGTERM closes the logs, then the relay connection
//!
//! 3. **`validate`**
//!    - Replay a raw log and print a PASS / WARN / FAIL report
//!
//! # Examples
//!
//! ```bash
//! gnss-logger run --config config/default.toml
//! gnss-logger validate data/gps_log_20260105_120000.ubx --json
//! ```
//!
//! Expected output while logging:
//! ```text
//! INFO gnss_logger: GNSS Logger v0.1.0 starting...
//! INFO gnss_logger::serial: Opened receiver at /dev/ttyAMA4 (460800 baud)
//! INFO status: Fix: 3D FIX | Sats: 12 | Lat:  37.7749000 | Lon: -122.4194000 | ...
//! ```

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use gnss_logger::cli::{Action, Cli};
use gnss_logger::config::Config;
use gnss_logger::runtime::run_session;
use gnss_logger::validate::Validator;

/// File name stem of the rolling diagnostics log
const DIAGNOSTICS_FILE: &str = "gnss-logger.log";

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::new();

    let mut config = match cli.config_path() {
        Some(path) => Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::default(),
    };

    let _guard = init_tracing(config.logging.diagnostics_dir.as_deref());
    info!("GNSS Logger v{} starting...", env!("CARGO_PKG_VERSION"));

    match cli.action() {
        Action::Run { port } => {
            if let Some(port) = port {
                config.serial.port = port;
            }
            config.validate().context("Invalid configuration")?;

            match run_session(&config, shutdown_signal()).await {
                Ok(summary) => {
                    info!("Raw log: {}", summary.paths.raw.display());
                    info!("Time sync log: {}", summary.paths.correlation.display());
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    error!("Logging stopped: {}", e);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Action::Validate {
            file,
            json,
            expected_rate_hz,
        } => {
            if let Some(rate) = expected_rate_hz {
                config.validation.expected_rate_hz = rate;
            }
            config.validate().context("Invalid configuration")?;

            let report = Validator::from_config(&config)?.validate_file(&file);
            if json {
                println!("{}", report.to_json()?);
            } else {
                println!("{}", report);
            }
            Ok(ExitCode::from(report.exit_code() as u8))
        }
    }
}

/// Console logging on stderr, plus a daily-rolling file when configured
///
/// The returned guard flushes the file writer when dropped.
fn init_tracing(diagnostics_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let console = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match diagnostics_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, DIAGNOSTICS_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(console).init();
            None
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
