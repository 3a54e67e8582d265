//! Synthetic log producer for exercising a logsieve listener.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::Parser;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::info;

const COMPONENTS: &[&str] = &["Service", "Module", "Handler", "Manager", "Engine"];
const AREAS: &[&str] = &["Auth", "Data", "Network", "Cache", "Session", "Payment"];
const ROLES: &[&str] = &["Core", "Processor", "Validator", "Client", "Worker"];
const LEVELS: &[&str] = &["INFO", "DEBUG", "INFO", "WARN", "INFO", "DEBUG", "ERROR"];
const MESSAGES: &[&str] = &[
    "Processing user authentication request against the identity provider",
    "Database connection pool exhausted, queueing with exponential backoff",
    "Cache invalidation propagating through distributed cache layers",
    "Network timeout while calling external endpoint, failing over",
    "Scheduled cleanup finished, rotated and compressed log archives",
];

/// Sends synthetic log frames to a logsieve listener
#[derive(Parser, Debug)]
#[command(name = "logsieve-send")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Listener address
    #[arg(long, default_value = "127.0.0.1:4505")]
    addr: String,

    /// Messages per second
    #[arg(long, default_value = "3.0")]
    rate: f64,

    /// Stop after this many messages (default: run until Ctrl+C)
    #[arg(long)]
    count: Option<u64>,

    /// Write each frame in two halves with a short pause, to exercise
    /// stream reassembly on the receiving side
    #[arg(long)]
    split: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut socket = TcpStream::connect(&args.addr)
        .await
        .with_context(|| format!("failed to connect to {}", args.addr))?;
    info!(addr = %args.addr, rate = args.rate, "sending log frames");

    let mut ticker = tokio::time::interval(frame_period(args.rate));
    let started = Instant::now();
    let mut sent = 0u64;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            _ = ticker.tick() => {
                let frame = build_frame(sent);
                let bytes = frame.as_bytes();
                if args.split && bytes.len() > 1 {
                    let half = bytes.len() / 2;
                    socket.write_all(&bytes[..half]).await?;
                    socket.flush().await?;
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    socket.write_all(&bytes[half..]).await?;
                } else {
                    socket.write_all(bytes).await?;
                }
                socket.flush().await?;

                sent += 1;
                if sent % 100 == 0 {
                    let rate = sent as f64 / started.elapsed().as_secs_f64();
                    info!(sent, avg_rate = rate, "progress");
                }
                if Some(sent) == args.count {
                    break;
                }
            }
        }
    }

    let elapsed = started.elapsed();
    println!("sent {sent} frames in {elapsed:.2?}");
    if elapsed.as_secs_f64() > 0.0 {
        println!(
            "average rate: {:.2} frames/second",
            sent as f64 / elapsed.as_secs_f64()
        );
    }

    Ok(())
}

/// Build one wire frame. Logger names walk fixed pools so a hierarchy
/// builds up on the receiving side.
fn build_frame(n: u64) -> String {
    let component = COMPONENTS[n as usize % COMPONENTS.len()];
    let area = AREAS[(n as usize / 5) % AREAS.len()];
    let role = ROLES[(n as usize / 30) % ROLES.len()];
    // mix of one, two and three segment logger names
    let logger = match n % 10 {
        0 => format!("BT.{component}"),
        1 | 2 => format!("BT.{component}.{area}"),
        _ => format!("BT.{component}.{area}.{role}"),
    };
    let level = LEVELS[n as usize % LEVELS.len()];
    let message = format!("[#{n}] {}", MESSAGES[n as usize % MESSAGES.len()]);

    json!({
        "time": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        "level": level,
        "logger": logger,
        "message": message,
        "exception": "",
    })
    .to_string()
}

/// Delay between frames for a requested per-second rate. Clamped so the
/// period is always positive; the interval timer panics on a zero period.
fn frame_period(rate: f64) -> Duration {
    let rate = rate.max(0.01).min(1_000_000.0);
    Duration::from_secs_f64(1.0 / rate)
}
