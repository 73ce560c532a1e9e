//! Tickcast Feed Binary
//!
//! Synthesizes a market data stream and multicasts it as FIX 4.2
//! snapshots. Runs until Ctrl-C.
//!
//! Usage:
//!   tickcast --model gbm --queue lock-free --seed 42
//!
//! Environment:
//!   TICKCAST_DEST_IP - Destination IP (default: 239.255.1.1)
//!   TICKCAST_PORT - Destination port (default: 9999)
//!   TICKCAST_INTERFACE - Multicast egress interface IP (optional)
//!   TICKCAST_SYMBOL - Instrument symbol (default: ESZ5)
//!   TICKCAST_MODEL - random-walk | gbm
//!   TICKCAST_QUEUE - blocking | lock-free
//!   TICKCAST_CAPACITY - Queue capacity (default: 4096)
//!   TICKCAST_SEED - RNG seed for reproducible runs (optional)
//!   TICKCAST_TICK_INTERVAL_MS - Pacing override (optional)
//!   TICKCAST_PRODUCER_CORE / TICKCAST_CONSUMER_CORE - CPU pinning (optional)

use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use tickcast::feed::{FeedConfig, MarketDataFeed, ModelConfig, QueueKind};

#[derive(Parser, Debug)]
#[command(name = "tickcast")]
#[command(about = "Synthetic FIX 4.2 market data feed over UDP multicast")]
struct Args {
    /// Destination IP (multicast group or unicast host)
    #[arg(long, env = "TICKCAST_DEST_IP", default_value = "239.255.1.1")]
    dest_ip: String,

    /// Destination port
    #[arg(long, env = "TICKCAST_PORT", default_value = "9999")]
    port: u16,

    /// Multicast egress interface IP (optional)
    #[arg(long, env = "TICKCAST_INTERFACE")]
    interface: Option<String>,

    /// Instrument symbol
    #[arg(long, env = "TICKCAST_SYMBOL", default_value = "ESZ5")]
    symbol: String,

    /// Mid-price model
    #[arg(long, env = "TICKCAST_MODEL", value_enum, default_value_t = ModelArg::RandomWalk)]
    model: ModelArg,

    /// SPSC queue flavor
    #[arg(long, env = "TICKCAST_QUEUE", value_enum, default_value_t = QueueArg::Blocking)]
    queue: QueueArg,

    /// Queue capacity (lock-free requires a power of two)
    #[arg(long, env = "TICKCAST_CAPACITY", default_value = "4096")]
    capacity: usize,

    /// RNG seed; omit for a random seed (logged at startup)
    #[arg(long, env = "TICKCAST_SEED")]
    seed: Option<u64>,

    /// Pacing between ticks in milliseconds; omit for the model default
    #[arg(long, env = "TICKCAST_TICK_INTERVAL_MS")]
    tick_interval_ms: Option<u64>,

    /// CPU core for the producer thread (optional)
    #[arg(long, env = "TICKCAST_PRODUCER_CORE")]
    producer_core: Option<usize>,

    /// CPU core for the consumer thread (optional)
    #[arg(long, env = "TICKCAST_CONSUMER_CORE")]
    consumer_core: Option<usize>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
enum ModelArg {
    RandomWalk,
    Gbm,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
enum QueueArg {
    Blocking,
    LockFree,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("tickcast=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    info!("Starting tickcast feed");
    info!("  Dest: {}:{}", args.dest_ip, args.port);
    info!("  Symbol: {}", args.symbol);
    info!("  Model: {:?}  Queue: {:?}", args.model, args.queue);
    info!("  Capacity: {}", args.capacity);
    info!("  Pin cores: {:?}/{:?}", args.producer_core, args.consumer_core);

    let dest_ip: Ipv4Addr = args
        .dest_ip
        .parse()
        .with_context(|| format!("invalid destination IP '{}'", args.dest_ip))?;
    let interface: Option<Ipv4Addr> = match &args.interface {
        Some(raw) => Some(
            raw.parse()
                .with_context(|| format!("invalid interface IP '{raw}'"))?,
        ),
        None => None,
    };

    if args.queue == QueueArg::LockFree && !args.capacity.is_power_of_two() {
        anyhow::bail!(
            "lock-free queue capacity must be a power of two, got {}",
            args.capacity
        );
    }

    let config = FeedConfig {
        dest_ip,
        port: args.port,
        interface,
        symbol: args.symbol,
        model: match args.model {
            ModelArg::RandomWalk => ModelConfig::random_walk(),
            ModelArg::Gbm => ModelConfig::gbm(),
        },
        queue: match args.queue {
            QueueArg::Blocking => QueueKind::Blocking,
            QueueArg::LockFree => QueueKind::LockFree,
        },
        capacity: args.capacity,
        seed: args.seed,
        tick_interval: args.tick_interval_ms.map(Duration::from_millis),
        producer_core: args.producer_core,
        consumer_core: args.consumer_core,
    };

    let feed = MarketDataFeed::new(config);
    feed.start()?;

    shutdown_signal().await?;
    info!("Shutdown signal received");
    feed.stop();

    // grace period so late socket errors surface before exit
    tokio::time::sleep(Duration::from_secs(1)).await;

    let snap = feed.stats().snapshot();
    info!(
        generated = snap.ticks_generated,
        sent = snap.ticks_sent,
        queue_rejects = snap.queue_rejects,
        send_retries = snap.send_retries,
        send_errors = snap.send_errors,
        "Final feed counters"
    );
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = sigterm.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
