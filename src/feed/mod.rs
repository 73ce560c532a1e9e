//! Market Data Feed Orchestrator
//!
//! Owns the three worker threads of a running feed:
//! - producer: synthesizes ticks and pushes them into the queue
//! - consumer: pops ticks, encodes FIX, sends over UDP
//! - monitor: reports per-second generated/sent rates
//!
//! Lifecycle is `Created -> Running -> Stopping -> Stopped`, one way.
//! `start` is accepted exactly once; `stop` signals everything, wakes every
//! parked thread and joins. Dropping a running feed stops it.

pub mod config;
pub mod stats;

pub use config::{FeedConfig, ModelConfig, QueueKind, DEFAULT_CAPACITY};
pub use stats::{FeedStats, FeedStatsSnapshot};

use std::fmt;
use std::io;
use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::market::tick::SymbolError;
use crate::market::{MarketTick, Symbol, TickSynthesizer};
use crate::net::sender::{SendError, SenderConfig, UdpMulticastSender};
use crate::ring::lockfree::{self, RingConsumer, RingProducer};
use crate::ring::BlockingRingBuffer;

/// How often the monitor reports.
const MONITOR_INTERVAL: Duration = Duration::from_secs(1);
/// Pause between send retries under kernel backpressure.
const SEND_RETRY_BACKOFF: Duration = Duration::from_micros(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Created,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug)]
pub enum FeedError {
    /// `start` was already called on this feed.
    AlreadyStarted,
    Symbol(SymbolError),
    /// Socket setup failed.
    Net(io::Error),
    /// A worker thread could not be spawned.
    Spawn(io::Error),
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedError::AlreadyStarted => write!(f, "feed was already started"),
            FeedError::Symbol(e) => write!(f, "invalid symbol: {e}"),
            FeedError::Net(e) => write!(f, "socket setup failed: {e}"),
            FeedError::Spawn(e) => write!(f, "worker spawn failed: {e}"),
        }
    }
}

impl std::error::Error for FeedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FeedError::AlreadyStarted => None,
            FeedError::Symbol(e) => Some(e),
            FeedError::Net(e) | FeedError::Spawn(e) => Some(e),
        }
    }
}

impl From<SymbolError> for FeedError {
    fn from(e: SymbolError) -> Self {
        FeedError::Symbol(e)
    }
}

/// Condvar the monitor parks on between reports; `stop` notifies it so
/// shutdown does not wait out the remainder of the interval.
#[derive(Default)]
struct MonitorGate {
    lock: Mutex<()>,
    cv: Condvar,
}

pub struct MarketDataFeed {
    config: FeedConfig,
    state: Mutex<FeedState>,
    running: Arc<AtomicBool>,
    stats: Arc<FeedStats>,
    gate: Arc<MonitorGate>,
    /// Kept so `stop` can wake threads parked inside the blocking queue.
    blocking_queue: Mutex<Option<Arc<BlockingRingBuffer<MarketTick>>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl MarketDataFeed {
    pub fn new(config: FeedConfig) -> Self {
        Self {
            config,
            state: Mutex::new(FeedState::Created),
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(FeedStats::default()),
            gate: Arc::new(MonitorGate::default()),
            blocking_queue: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn state(&self) -> FeedState {
        *self.state.lock()
    }

    pub fn stats(&self) -> &FeedStats {
        &self.stats
    }

    /// Builds the pipeline and spawns the three workers. Accepted exactly
    /// once per feed; a second call reports `AlreadyStarted` whatever state
    /// the feed is in by then.
    pub fn start(&self) -> Result<(), FeedError> {
        let mut state = self.state.lock();
        if *state != FeedState::Created {
            return Err(FeedError::AlreadyStarted);
        }

        let symbol = Symbol::new(&self.config.symbol)?;
        let seed = self.config.seed.unwrap_or_else(rand::random);
        info!(seed, queue = ?self.config.queue, "starting market data feed");
        let model = self.config.model.build(seed);
        let synth = TickSynthesizer::new(symbol, model, seed.wrapping_add(1));
        let sender = UdpMulticastSender::new(&SenderConfig {
            dest: SocketAddrV4::new(self.config.dest_ip, self.config.port),
            interface: self.config.interface,
            ..SenderConfig::default()
        })
        .map_err(FeedError::Net)?;
        let interval = self
            .config
            .tick_interval
            .or_else(|| self.config.model.default_interval(self.config.queue));

        self.running.store(true, Ordering::SeqCst);
        if let Err(e) = self.spawn_workers(synth, sender, interval) {
            self.running.store(false, Ordering::SeqCst);
            if let Some(queue) = self.blocking_queue.lock().take() {
                queue.stop();
            }
            self.gate.cv.notify_all();
            let spawned: Vec<_> = self.handles.lock().drain(..).collect();
            for handle in spawned {
                let _ = handle.join();
            }
            *state = FeedState::Stopped;
            return Err(FeedError::Spawn(e));
        }

        *state = FeedState::Running;
        info!(
            dest = %self.config.dest_ip,
            port = self.config.port,
            symbol = %self.config.symbol,
            capacity = self.config.capacity,
            interval_ms = interval.map(|d| d.as_millis() as u64),
            "market data feed running"
        );
        Ok(())
    }

    fn spawn_workers(
        &self,
        synth: TickSynthesizer,
        sender: UdpMulticastSender,
        interval: Option<Duration>,
    ) -> io::Result<()> {
        match self.config.queue {
            QueueKind::Blocking => {
                let queue = Arc::new(BlockingRingBuffer::new(self.config.capacity));
                *self.blocking_queue.lock() = Some(queue.clone());

                let running = self.running.clone();
                let feed_stats = self.stats.clone();
                let producer_queue = queue.clone();
                let core = self.config.producer_core;
                let handle = thread::Builder::new()
                    .name("feed-producer".to_string())
                    .spawn(move || {
                        run_blocking_producer(running, feed_stats, synth, producer_queue, interval, core)
                    })?;
                self.handles.lock().push(handle);

                let running = self.running.clone();
                let feed_stats = self.stats.clone();
                let core = self.config.consumer_core;
                let handle = thread::Builder::new()
                    .name("feed-consumer".to_string())
                    .spawn(move || run_blocking_consumer(running, feed_stats, queue, sender, core))?;
                self.handles.lock().push(handle);
            }
            QueueKind::LockFree => {
                let (tx, rx) = lockfree::ring(self.config.capacity);

                let running = self.running.clone();
                let feed_stats = self.stats.clone();
                let core = self.config.producer_core;
                let handle = thread::Builder::new()
                    .name("feed-producer".to_string())
                    .spawn(move || {
                        run_lockfree_producer(running, feed_stats, synth, tx, interval, core)
                    })?;
                self.handles.lock().push(handle);

                let running = self.running.clone();
                let feed_stats = self.stats.clone();
                let core = self.config.consumer_core;
                let handle = thread::Builder::new()
                    .name("feed-consumer".to_string())
                    .spawn(move || run_lockfree_consumer(running, feed_stats, rx, sender, core))?;
                self.handles.lock().push(handle);
            }
        }

        let running = self.running.clone();
        let feed_stats = self.stats.clone();
        let gate = self.gate.clone();
        let handle = thread::Builder::new()
            .name("feed-monitor".to_string())
            .spawn(move || run_monitor(running, feed_stats, gate))?;
        self.handles.lock().push(handle);
        Ok(())
    }

    /// Signals shutdown, wakes every parked thread and joins all three
    /// workers. Idempotent; returns immediately unless the feed is Running.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state != FeedState::Running {
                return;
            }
            *state = FeedState::Stopping;
        }
        info!("stopping market data feed");

        self.running.store(false, Ordering::SeqCst);
        self.gate.cv.notify_all();
        if let Some(queue) = self.blocking_queue.lock().as_ref() {
            queue.stop();
        }

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }

        *self.state.lock() = FeedState::Stopped;
        let snap = self.stats.snapshot();
        info!(
            generated = snap.ticks_generated,
            sent = snap.ticks_sent,
            "market data feed stopped"
        );
    }
}

impl Drop for MarketDataFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

fn pin_to_core(core: Option<usize>) {
    let Some(core) = core else { return };
    let Some(core_ids) = core_affinity::get_core_ids() else {
        warn!("could not enumerate cores, thread left unpinned");
        return;
    };
    if let Some(id) = core_ids.get(core) {
        core_affinity::set_for_current(*id);
        debug!(core, "pinned thread");
    } else {
        warn!(core, available = core_ids.len(), "requested core out of range");
    }
}

fn run_blocking_producer(
    running: Arc<AtomicBool>,
    stats: Arc<FeedStats>,
    mut synth: TickSynthesizer,
    queue: Arc<BlockingRingBuffer<MarketTick>>,
    interval: Option<Duration>,
    core: Option<usize>,
) {
    pin_to_core(core);
    info!("producer loop started");
    while running.load(Ordering::Relaxed) {
        let tick = synth.next_tick();
        if queue.push(tick).is_err() {
            // queue stopped while we were parked
            break;
        }
        stats.note_generated();
        if let Some(pause) = interval {
            thread::sleep(pause);
        }
    }
    info!("producer loop stopped");
}

fn run_lockfree_producer(
    running: Arc<AtomicBool>,
    stats: Arc<FeedStats>,
    mut synth: TickSynthesizer,
    mut tx: RingProducer<MarketTick>,
    interval: Option<Duration>,
    core: Option<usize>,
) {
    pin_to_core(core);
    info!("producer loop started");
    'outer: while running.load(Ordering::Relaxed) {
        let mut tick = synth.next_tick();
        loop {
            match tx.push(tick) {
                Ok(()) => break,
                Err(back) => {
                    stats.note_queue_reject();
                    if !running.load(Ordering::Relaxed) {
                        break 'outer;
                    }
                    tick = back;
                    thread::yield_now();
                }
            }
        }
        stats.note_generated();
        if let Some(pause) = interval {
            thread::sleep(pause);
        }
    }
    info!("producer loop stopped");
}

fn run_blocking_consumer(
    running: Arc<AtomicBool>,
    stats: Arc<FeedStats>,
    queue: Arc<BlockingRingBuffer<MarketTick>>,
    sender: UdpMulticastSender,
    core: Option<usize>,
) {
    pin_to_core(core);
    info!("consumer loop started");
    let mut encoder = crate::fix::SnapshotEncoder::new();
    // pop returns None only once the queue is stopped and drained
    while let Some(tick) = queue.pop() {
        let payload = encoder.encode(&tick);
        send_with_retry(&running, &stats, &sender, payload);
    }
    info!("consumer loop stopped");
}

fn run_lockfree_consumer(
    running: Arc<AtomicBool>,
    stats: Arc<FeedStats>,
    mut rx: RingConsumer<MarketTick>,
    sender: UdpMulticastSender,
    core: Option<usize>,
) {
    pin_to_core(core);
    info!("consumer loop started");
    let mut encoder = crate::fix::SnapshotEncoder::new();
    loop {
        match rx.pop() {
            Some(tick) => {
                let payload = encoder.encode(&tick);
                send_with_retry(&running, &stats, &sender, payload);
            }
            None => {
                // drain fully before honoring shutdown
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                thread::yield_now();
            }
        }
    }
    info!("consumer loop stopped");
}

/// Sends one datagram, retrying on kernel backpressure until it goes out
/// or shutdown is requested. Hard errors drop the tick after logging.
fn send_with_retry(
    running: &AtomicBool,
    stats: &FeedStats,
    sender: &UdpMulticastSender,
    payload: &[u8],
) {
    loop {
        match sender.send(payload) {
            Ok(n) => {
                if n != payload.len() {
                    warn!(sent = n, len = payload.len(), "short datagram send");
                    stats.note_short_send();
                }
                stats.note_sent();
                return;
            }
            Err(SendError::Backpressure(_)) => {
                stats.note_send_retry();
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                thread::sleep(SEND_RETRY_BACKOFF);
            }
            Err(SendError::Io(e)) => {
                warn!("datagram send failed: {e}");
                stats.note_send_error();
                return;
            }
        }
    }
}

fn run_monitor(running: Arc<AtomicBool>, stats: Arc<FeedStats>, gate: Arc<MonitorGate>) {
    info!("monitor loop started");
    while running.load(Ordering::Relaxed) {
        let timed_out = {
            let mut guard = gate.lock.lock();
            gate.cv.wait_for(&mut guard, MONITOR_INTERVAL).timed_out()
        };
        if !running.load(Ordering::Relaxed) {
            break;
        }
        if timed_out {
            let (generated, sent) = stats.drain_window();
            info!(generated, sent, "ticks per second");
        }
    }
    info!("monitor loop stopped");
}
