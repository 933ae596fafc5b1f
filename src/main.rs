//! picstatus - system status snapshots with a preloaded background image
//!
//! Collects system metrics in the background and prints snapshots as JSON
//! lines for a renderer to consume.

use anyhow::Result;
use clap::Parser;
use picstatus::{app::App, cli::Cli, config::Config};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            tracing_subscriber::fmt().init();
            error!("Failed to load configuration: {:#}", err);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("picstatus {} starting up...", env!("CARGO_PKG_VERSION"));
    log_configuration(&config);

    // =========================================================================
    // Create Shutdown Channel and build the app
    // =========================================================================
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = App::builder(config).build(shutdown_rx).await?;

    if cli.once {
        app.collect_periodic_now().await;
        print_snapshot(&app).await;
    } else if let Some(seconds) = cli.every {
        let mut ticker = tokio::time::interval(Duration::from_secs(seconds.max(1)));
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, shutting down.");
                    break;
                }
                _ = ticker.tick() => print_snapshot(&app).await,
            }
        }
    } else {
        info!("Collecting until Ctrl-C is pressed.");
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
        }
    }

    // =========================================================================
    // Graceful Shutdown
    // =========================================================================
    let _ = shutdown_tx.send(true);
    app.shutdown().await;
    Ok(())
}

async fn print_snapshot(app: &App) {
    match app.snapshot().await {
        Ok(snapshot) => println!("{}", snapshot.to_json()),
        Err(e) => error!("Failed to take snapshot: {}", e),
    }
}

fn log_configuration(config: &Config) {
    let collectors = &config.collectors;
    let background = &config.background;
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Enabled Collectors: {}", collectors.enabled.join(", "));
    info!("Collect Interval: {}s", collectors.interval_seconds);
    info!("Default History Size: {}", collectors.default_history_size);
    if !collectors.history_size.is_empty() {
        info!("History Size Overrides: {:?}", collectors.history_size);
    }
    info!("Background Provider: {}", background.provider);
    info!("Preload Count: {}", background.preload_count);
    info!("Local Background Path: {}", background.local_path.display());
    info!("Cache Directory: {}", background.cache_dir.display());
    info!("Fire Timeout: {}s", background.fire_timeout_seconds);
    info!("Request Timeout: {}s", background.request_timeout_seconds);
    info!("Max Concurrent Downloads: {}", background.max_concurrent_downloads);
    info!("Proxy: {}", background.proxy.as_deref().unwrap_or("None"));
    if !background.custom.is_empty() {
        let names: Vec<&str> = background.custom.iter().map(|c| c.name.as_str()).collect();
        info!("Custom Providers: {}", names.join(", "));
    }
    info!("-------------------------------------------------------");
}
