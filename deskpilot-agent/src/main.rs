//! deskpilot entry point.
//!
//! ```text
//! deskpilot                      Run autonomously
//! deskpilot --step               Wait for Enter before each iteration
//! deskpilot --model <id>         Override the model identifier
//! deskpilot --endpoint <url>     Override the chat-completions URL
//! deskpilot --no-dump            Do not archive screenshots
//! deskpilot --config <path>      Load a custom config TOML
//! deskpilot --gen-config         Write the default config and exit
//! ```
//!
//! Exit status: 0 when the model reports done, 130 on Ctrl-C, 1 on a
//! fatal error.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use deskpilot_agent::cli::Cli;
use deskpilot_agent::config::AgentConfig;
use deskpilot_agent::session;
use deskpilot_core::Completion;

const EXIT_INTERRUPTED: u8 = 130;

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: write defaults and exit.
    if cli.gen_config {
        if cli.config.exists() {
            eprintln!("{} already exists; not overwriting", cli.config.display());
            return Ok(ExitCode::FAILURE);
        }
        AgentConfig::write_default(&cli.config)?;
        println!("Wrote {}", cli.config.display());
        return Ok(ExitCode::SUCCESS);
    }

    // Load config; a failure is reported once logging is up.
    let (mut config, load_error) = match AgentConfig::try_load(&cli.config) {
        Ok(config) => (config, None),
        Err(e) => (AgentConfig::default(), Some(e)),
    };
    cli.apply_overrides(&mut config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    if let Some(e) = load_error {
        e.log_fallback();
    }

    info!("deskpilot v{}", env!("CARGO_PKG_VERSION"));
    info!("model: {}", config.decision.model);
    info!("endpoint: {}", config.decision.endpoint);
    info!(
        "perception: {}x{}",
        config.perception.width, config.perception.height
    );
    if config.dump.enabled {
        info!("dump folder: {}", config.dump.folder.display());
    }

    let stop = Arc::new(AtomicBool::new(false));

    // Ctrl-C: stop between iterations; a second Ctrl-C exits at once.
    let stop_clone = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        info!("Ctrl-C received, stopping after the current iteration");
        stop_clone.store(true, Ordering::SeqCst);
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("second Ctrl-C, exiting immediately");
            std::process::exit(EXIT_INTERRUPTED.into());
        }
    });

    // The controller owns a window with thread affinity, so it is built
    // and driven entirely on one blocking thread.
    let mode = cli.mode();
    let result =
        tokio::task::spawn_blocking(move || session::run(&config, mode, &stop)).await?;

    match result {
        Ok(Completion::Done(reason)) => {
            info!("task done: {reason}");
            Ok(ExitCode::SUCCESS)
        }
        Ok(Completion::Interrupted) => {
            info!("interrupted");
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
        Err(e) => {
            error!("fatal: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}
