//! CLI entry point for the train delay monitor.
//!
//! Runs the polling loop on its own or behind the JSON API, or performs a
//! single update cycle.

use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use train_delay_monitor::{
    api,
    config::{MonitorConfig, api_key_from_env, interval_from_minutes},
    infra::trafikverket::TrafikverketClient,
    monitor::Monitor,
    output::print_json,
    snapshot::SnapshotStore,
};

#[derive(Parser)]
#[command(name = "train_delay_monitor")]
#[command(about = "Monitors arrival delays at a Trafikverket station", long_about = None)]
struct Cli {
    /// JSON config file; defaults apply to missing fields
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the API until Ctrl+C
    Monitor {
        /// Minutes between cycles (overrides the config file)
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Poll the API and serve the snapshot over HTTP
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(short, long, default_value_t = 8000)]
        port: u16,

        /// Minutes between cycles (overrides the config file)
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Run a single update cycle
    Update,
    /// Print the summary of the persisted snapshot
    Summary,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/train_delay_monitor.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("train_delay_monitor.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MonitorConfig::load(path)?,
        None => MonitorConfig::default(),
    };

    match cli.command {
        Commands::Monitor { interval } => {
            let interval = interval_from_minutes(interval.unwrap_or(config.interval_minutes));
            let monitor = build_monitor(config)?;

            monitor.start(interval);
            tokio::signal::ctrl_c().await?;
            info!("Interrupt received");
            monitor.stop();
        }
        Commands::Serve {
            host,
            port,
            interval,
        } => {
            let interval = interval_from_minutes(interval.unwrap_or(config.interval_minutes));
            let monitor = build_monitor(config)?;
            monitor.start(interval);
            serve(monitor.clone(), &host, port).await?;
            monitor.stop();
        }
        Commands::Update => {
            let monitor = build_monitor(config)?;
            match monitor.run_cycle().await {
                Ok(result) => print_json(&result)?,
                Err(e) => {
                    error!(error = %e, "Update failed");
                    return Err(e.into());
                }
            }
            print_json(&monitor.store().current().summary())?;
        }
        Commands::Summary => {
            let store = SnapshotStore::open(&config.snapshot_path, &config.history_path);
            print_json(&store.current().summary())?;
        }
    }

    Ok(())
}

fn build_monitor(config: MonitorConfig) -> Result<Arc<Monitor>> {
    let api_key = api_key_from_env()?;
    let client = TrafikverketClient::new(&config.api_url, &api_key, config.request_timeout())?;
    let store = SnapshotStore::open(&config.snapshot_path, &config.history_path);
    Ok(Arc::new(Monitor::new(client, store, config)))
}

/// Serves the API until the server is shut down (Ctrl+C).
#[tracing::instrument(skip(monitor))]
async fn serve(monitor: Arc<Monitor>, host: &str, port: u16) -> Result<()> {
    let data = web::Data::from(monitor);

    info!(host, port, "Starting API server");
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(api::cors_headers())
            .wrap(Logger::default())
            .configure(api::configure)
            .default_service(web::to(api::not_found))
    })
    .bind((host, port))
    .with_context(|| format!("Failed to bind {host}:{port}"))?
    .run()
    .await?;

    info!("API server stopped");
    Ok(())
}
