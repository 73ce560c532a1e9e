//! Tickcast Analyzer Binary
//!
//! Captures the multicast feed, validates and decodes every FIX snapshot,
//! and reports capture/decode counters at a fixed interval. Optionally
//! records decoded ticks to a JSONL file. Runs until Ctrl-C.
//!
//! Usage:
//!   tickcast-analyzer --group 239.255.1.1 --port 9999
//!   tickcast-analyzer --raw --record ticks.jsonl   (Linux, needs CAP_NET_RAW)
//!
//! Environment:
//!   TICKCAST_GROUP - Multicast group to join (default: 239.255.1.1)
//!   TICKCAST_PORT - Port to capture (default: 9999)
//!   TICKCAST_LISTEN_INTERFACE - Interface IP to join on (default: 0.0.0.0)
//!   TICKCAST_RECORD - JSONL output path (optional)

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::EnvFilter;

use tickcast::analyzer::TickRecorder;
use tickcast::fix;
use tickcast::net::{CaptureConfig, PacketCapture};

#[derive(Parser, Debug)]
#[command(name = "tickcast-analyzer")]
#[command(about = "Capture and decode the tickcast FIX multicast feed")]
struct Args {
    /// Multicast group to join (a unicast IP skips the join)
    #[arg(long, env = "TICKCAST_GROUP", default_value = "239.255.1.1")]
    group: String,

    /// Port to capture
    #[arg(long, env = "TICKCAST_PORT", default_value = "9999")]
    port: u16,

    /// Interface IP to join the group on
    #[arg(long, env = "TICKCAST_LISTEN_INTERFACE", default_value = "0.0.0.0")]
    interface: String,

    /// Capture raw frames via AF_PACKET instead of a UDP socket
    #[cfg(target_os = "linux")]
    #[arg(long)]
    raw: bool,

    /// Record decoded ticks to this JSONL file
    #[arg(long, env = "TICKCAST_RECORD")]
    record: Option<PathBuf>,

    /// Seconds between capture reports
    #[arg(long, default_value = "10")]
    report_interval_secs: u64,
}

/// Decode-side counters; the capture stats only know about bytes.
#[derive(Default)]
struct DecodeCounters {
    decoded: AtomicU64,
    decode_errors: AtomicU64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("tickcast=debug".parse().unwrap())
                .add_directive("tickcast_analyzer=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    info!("Starting tickcast analyzer");
    info!("  Group: {}:{}", args.group, args.port);
    info!("  Record: {:?}", args.record);

    let group: Ipv4Addr = args
        .group
        .parse()
        .with_context(|| format!("invalid group IP '{}'", args.group))?;
    let interface: Ipv4Addr = args
        .interface
        .parse()
        .with_context(|| format!("invalid interface IP '{}'", args.interface))?;

    let config = CaptureConfig {
        group,
        port: args.port,
        interface,
    };

    let recorder = match &args.record {
        Some(path) => {
            let recorder = TickRecorder::create(path)
                .with_context(|| format!("creating record file {}", path.display()))?;
            Some(Arc::new(Mutex::new(recorder)))
        }
        None => None,
    };

    let counters = Arc::new(DecodeCounters::default());
    let callback_counters = counters.clone();
    let callback_recorder = recorder.clone();
    let callback = move |payload: &[u8]| match fix::decode(payload) {
        Ok(snapshot) => {
            callback_counters.decoded.fetch_add(1, Ordering::Relaxed);
            debug!(
                symbol = %snapshot.symbol,
                bid = snapshot.bid,
                ask = snapshot.ask,
                bid_size = snapshot.bid_size,
                ask_size = snapshot.ask_size,
                mid = snapshot.mid(),
                "Tick"
            );
            if let Some(recorder) = &callback_recorder {
                if let Err(e) = recorder.lock().append(&snapshot) {
                    warn!("record write failed: {e}");
                }
            }
        }
        Err(e) => {
            callback_counters.decode_errors.fetch_add(1, Ordering::Relaxed);
            warn!(len = payload.len(), "undecodable payload: {e}");
        }
    };

    #[cfg(target_os = "linux")]
    let capture = if args.raw {
        PacketCapture::raw_socket(&config, callback).context("opening AF_PACKET capture")?
    } else {
        PacketCapture::multicast(&config, callback).context("opening multicast capture")?
    };
    #[cfg(not(target_os = "linux"))]
    let capture = PacketCapture::multicast(&config, callback).context("opening multicast capture")?;

    let mut ticker = tokio::time::interval(Duration::from_secs(args.report_interval_secs.max(1)));
    ticker.tick().await; // first tick completes immediately
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let stats = capture.stats().snapshot();
                info!(
                    packets = stats.packets,
                    bytes = stats.bytes,
                    decoded = counters.decoded.load(Ordering::Relaxed),
                    decode_errors = counters.decode_errors.load(Ordering::Relaxed),
                    truncated = stats.truncated_frames,
                    skipped = stats.skipped_frames,
                    recv_errors = stats.recv_errors,
                    "Capture report"
                );
            }
            signal = shutdown_signal() => {
                signal?;
                info!("Shutdown signal received");
                break;
            }
        }
    }

    capture.stop();

    let stats = capture.stats().snapshot();
    info!(
        packets = stats.packets,
        decoded = counters.decoded.load(Ordering::Relaxed),
        decode_errors = counters.decode_errors.load(Ordering::Relaxed),
        "Final capture counters"
    );
    if let Some(recorder) = recorder {
        let mut recorder = recorder.lock();
        recorder.flush().context("flushing record file")?;
        info!(
            lines = recorder.lines(),
            path = %recorder.path().display(),
            "Record complete"
        );
    }
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
