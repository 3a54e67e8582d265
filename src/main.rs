use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use logsieve_core::EventSink;
use logsieve_net::LogListener;
use logsieve_types::ChangeEvent;

mod config;

use config::{Config, DEFAULT_CONFIG_PATH};

/// Logsieve - a TCP receiver for structured log streams
#[derive(Parser, Debug)]
#[command(name = "logsieve")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML config file (default: ./logsieve.toml if present)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen host, overrides the config file
    #[arg(long)]
    host: Option<String>,

    /// Listen port, overrides the config file
    #[arg(long)]
    port: Option<u16>,

    /// Record buffer capacity, overrides the config file
    #[arg(long)]
    capacity: Option<usize>,

    /// Print arriving records as JSON lines
    #[arg(long)]
    json: bool,

    /// Do not print arriving records to stdout
    #[arg(long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing for debugging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Run the application
    let result = run_app(args).await;

    // Handle any errors
    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run_app(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(Path::new(DEFAULT_CONFIG_PATH))?,
    };

    let host = args.host.clone().unwrap_or(config.listener.host);
    let port = args.port.unwrap_or(config.listener.port);
    let capacity = args.capacity.unwrap_or(config.buffer.capacity);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;

    // Change notification channel shared by the sink and its tree
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ChangeEvent>();

    let sink = EventSink::new(capacity);
    sink.set_notifier(event_tx);

    let mut listener = LogListener::new(sink.clone(), config.buffer.max_frame_len);
    let bound = listener
        .start(addr)
        .await
        .context("failed to start listener")?;
    info!(%bound, capacity, "logsieve ready");

    // Main event loop
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }

            Some(event) = event_rx.recv() => {
                handle_event(event, &args);
            }
        }
    }

    // Cleanup
    if !listener.stop().await {
        warn!("listener did not stop cleanly");
    }

    let stats = sink.stats();
    info!(
        received = stats.received,
        dropped = stats.dropped,
        buffered = stats.buffered,
        loggers = sink.tree().len(),
        "final counts"
    );

    Ok(())
}

fn handle_event(event: ChangeEvent, args: &Args) {
    match event {
        ChangeEvent::RecordAppended(record) => {
            if args.quiet {
                return;
            }
            if args.json {
                if let Ok(line) = serde_json::to_string(&record) {
                    println!("{line}");
                }
            } else {
                println!(
                    "{} [{}] {} | {}",
                    record.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                    record.level,
                    record.logger,
                    record.summary
                );
            }
        }
        ChangeEvent::LoggerAdded(path) => {
            debug!(logger = %path, "new logger registered");
        }
        ChangeEvent::StateChanged { path, state } => {
            debug!(path = %path, state = state.as_str(), "logger state changed");
        }
        ChangeEvent::BufferCleared => {
            info!("record buffer cleared");
        }
    }
}
