//! lingualink - resilience sidecar for the LinguaLink chat client
//!
//! Usage:
//!     lingualink --config <path>
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use lingualink::api::ApiServer;
use lingualink::config::{load_config, Config, ConfigWatcher};
use lingualink::util::{init_logging, wait_for_signal};
use lingualink::AppState;

/// Multi-backend resilience layer and translation failover for LinguaLink.
#[derive(Parser, Debug)]
#[command(name = "lingualink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config).with_context(|| {
        format!(
            "failed to load configuration from '{}'",
            cli.config.display()
        )
    })?;

    // CLI overrides config
    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.global.log_level);
    init_logging(log_level, &config.global.log_format);

    if cli.validate {
        info!("Configuration is valid");
        println!("Configuration is valid.");
        println!("  Strategy: {}", config.load_balancer.strategy);
        println!("  Backends: {}", config.backends.len());
        for backend in &config.backends {
            println!("    - {} ({})", backend.label, backend.url);
        }
        println!(
            "  Keep-alive: {} ({:?})",
            if config.keep_alive.enabled { "enabled" } else { "disabled" },
            config.keep_alive.resource_level
        );
        match &config.translation {
            Some(t) => println!("  Translation accounts: {}", t.credentials.len()),
            None => println!("  Translation: not configured"),
        }
        return Ok(());
    }

    info!(
        config_path = %cli.config.display(),
        backends = config.backends.len(),
        strategy = %config.load_balancer.strategy,
        "lingualink starting"
    );

    run(cli.config, config)
}

fn run(config_path: PathBuf, config: Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async { run_async(config_path, config).await })
}

async fn run_async(config_path: PathBuf, config: Config) -> Result<()> {
    let api = config.global.api.clone();
    let keep_alive_enabled = config.keep_alive.enabled;

    let state = AppState::new(config).context("failed to initialize application state")?;
    let mut handles = Vec::new();

    // The prober's first tick fires immediately, so startup gets a full probe.
    let prober = Arc::clone(state.prober());
    let shutdown_rx = state.shutdown().subscribe();
    handles.push(tokio::spawn(async move { prober.run(shutdown_rx).await }));

    if keep_alive_enabled {
        state.keep_alive().start();
    }

    if api.enabled {
        let server = ApiServer::bind(api.address, state.clone())
            .await
            .with_context(|| format!("failed to bind api listener on {}", api.address))?;
        let shutdown_rx = state.shutdown().subscribe();
        handles.push(tokio::spawn(async move { server.run(shutdown_rx).await }));
    }

    let reload_state = state.clone();
    let watcher = ConfigWatcher::new(
        config_path,
        Box::new(move |config| {
            reload_state.apply_reload(config);
        }),
    );
    let shutdown_rx = state.shutdown().subscribe();
    handles.push(tokio::spawn(async move { watcher.run(shutdown_rx).await }));

    info!("lingualink is running");
    info!("press Ctrl+C to stop");

    wait_for_signal().await;
    state.trigger_shutdown();

    for handle in handles {
        let _ = handle.await;
    }

    let stats = state.stats().snapshot();
    info!(
        total_requests = stats.total_requests,
        failed_requests = stats.failed_requests,
        backend_switches = stats.backend_switches,
        "lingualink shut down complete"
    );
    Ok(())
}
