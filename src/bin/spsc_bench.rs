//! SPSC Queue Microbenchmarks
//!
//! Run with: cargo run --release --bin spsc_bench
//!
//! Measures the two ring buffer implementations head to head:
//! - uncontended push+pop cost for each queue
//! - producer-side push latency with a consumer burning ~500ns per tick
//!   (roughly the cost of FIX encoding plus a sendto)
//! - two-thread throughput race over 10M 16-byte items

use std::{
    hint::{self, black_box},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use tickcast::ring::{ring, BlockingRingBuffer};

// ============================================================================
// Tuning
// ============================================================================

/// Stress run: small capacity so the producer collides with the slow
/// consumer early and often.
const STRESS_OPS: usize = 1_000_000;
const STRESS_CAPACITY: usize = 1024;

/// Work the stress consumer burns per tick before the next pop.
const CONSUMER_WORK: Duration = Duration::from_nanos(500);

/// Throughput race: capacity large enough to absorb bursts, small enough
/// to stay in cache.
const CONTEST_OPS: usize = 10_000_000;
const CONTEST_CAPACITY: usize = 65536;

// ============================================================================
// Payloads
// ============================================================================

/// One cache line of market data, the shape the feed pushes through its
/// queue on every tick.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct StressTick {
    pub seq: u64,
    pub bid: f64,
    pub ask: f64,
    pub symbol: [u8; 8],
    pub timestamp: u64,
    pub _pad: [u8; 24],
}

impl StressTick {
    fn new(seq: u64) -> Self {
        Self {
            seq,
            bid: 99.75 + (seq as f64 * 0.01),
            ask: 100.00 + (seq as f64 * 0.01),
            symbol: *b"ESZ5\0\0\0\0",
            timestamp: 0,
            _pad: [0; 24],
        }
    }
}

/// Minimal 16-byte payload for the raw throughput race.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Order {
    pub id: u64,
    pub ts: u64,
}

// ============================================================================
// Latency Statistics
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct LatencyStats {
    pub name: String,
    pub iterations: u64,
    pub min_ns: u64,
    pub max_ns: u64,
    pub mean_ns: f64,
    pub stdev_ns: f64,
    pub p50_ns: u64,
    pub p99_ns: u64,
    pub p999_ns: u64,
    pub throughput_ops_per_sec: f64,
}

impl LatencyStats {
    pub fn from_samples(name: &str, mut samples: Vec<u64>, total: Duration) -> Self {
        if samples.is_empty() {
            return Self {
                name: name.to_string(),
                ..Self::default()
            };
        }

        samples.sort_unstable();

        let min_ns = samples[0];
        let max_ns = samples[samples.len() - 1];
        let sum: u64 = samples.iter().sum();
        let mean_ns = sum as f64 / samples.len() as f64;
        let variance = samples
            .iter()
            .map(|&s| {
                let d = s as f64 - mean_ns;
                d * d
            })
            .sum::<f64>()
            / samples.len() as f64;

        let percentile = |frac: f64| -> u64 {
            let idx = (samples.len() as f64 * frac) as usize;
            samples[idx.min(samples.len() - 1)]
        };

        Self {
            name: name.to_string(),
            iterations: samples.len() as u64,
            min_ns,
            max_ns,
            mean_ns,
            stdev_ns: variance.sqrt(),
            p50_ns: percentile(0.50),
            p99_ns: percentile(0.99),
            p999_ns: percentile(0.999),
            throughput_ops_per_sec: samples.len() as f64 / total.as_secs_f64(),
        }
    }

    pub fn print(&self) {
        println!("=== {} ===", self.name);
        println!("  Iterations: {}", self.iterations);
        println!("  Min:    {:>8}ns", self.min_ns);
        println!("  Mean:   {:>8.1}ns", self.mean_ns);
        println!("  P50:    {:>8}ns", self.p50_ns);
        println!("  P99:    {:>8}ns", self.p99_ns);
        println!("  P999:   {:>8}ns", self.p999_ns);
        println!("  Max:    {:>8}ns", self.max_ns);
        println!("  StdDev: {:>8.1}ns", self.stdev_ns);
        println!(
            "  Throughput: {:.2}M ops/sec",
            self.throughput_ops_per_sec / 1_000_000.0
        );
        println!();
    }
}

// ============================================================================
// Benchmark Runner
// ============================================================================

pub struct BenchmarkRunner {
    warmup_iterations: u64,
    benchmark_iterations: u64,
}

impl BenchmarkRunner {
    pub fn new(warmup: u64, iterations: u64) -> Self {
        Self {
            warmup_iterations: warmup,
            benchmark_iterations: iterations,
        }
    }

    pub fn run<F>(&self, name: &str, mut f: F) -> LatencyStats
    where
        F: FnMut(),
    {
        for _ in 0..self.warmup_iterations {
            black_box(f());
        }

        let mut samples = Vec::with_capacity(self.benchmark_iterations as usize);
        let start = Instant::now();
        for _ in 0..self.benchmark_iterations {
            let iter_start = Instant::now();
            black_box(f());
            samples.push(iter_start.elapsed().as_nanos() as u64);
        }
        let total = start.elapsed();

        LatencyStats::from_samples(name, samples, total)
    }
}

// ============================================================================
// Uncontended Benchmarks
// ============================================================================

fn bench_blocking_push_pop(runner: &BenchmarkRunner) -> LatencyStats {
    let queue = BlockingRingBuffer::new(STRESS_CAPACITY);
    let mut seq = 0u64;

    runner.run("blocking_push_pop", || {
        seq += 1;
        let _ = queue.push(StressTick::new(seq));
        let _ = black_box(queue.pop());
    })
}

fn bench_lockfree_push_pop(runner: &BenchmarkRunner) -> LatencyStats {
    let (mut tx, mut rx) = ring::<StressTick>(STRESS_CAPACITY);
    let mut seq = 0u64;

    runner.run("lockfree_push_pop", || {
        seq += 1;
        let _ = tx.push(StressTick::new(seq));
        let _ = black_box(rx.pop());
    })
}

// ============================================================================
// Slow-Consumer Stress
// ============================================================================

/// Busy-waits instead of sleeping so the consumer stays on-core, the same
/// way the real consumer stays busy encoding and sending.
fn burn_cpu(work: Duration) {
    let start = Instant::now();
    while start.elapsed() < work {
        hint::spin_loop();
    }
}

/// Producer pushes as fast as it can into a small blocking queue while the
/// consumer burns ~500ns per tick. Reports how long each push took; the
/// tail shows the OS parking the producer on a full buffer.
fn stress_blocking() -> LatencyStats {
    let queue = Arc::new(BlockingRingBuffer::<StressTick>::new(STRESS_CAPACITY));
    let start_gun = Arc::new(AtomicBool::new(false));

    let consumer_queue = queue.clone();
    let consumer_gun = start_gun.clone();
    let consumer = thread::spawn(move || {
        while !consumer_gun.load(Ordering::Acquire) {
            hint::spin_loop();
        }
        let mut checksum = 0u64;
        for _ in 0..STRESS_OPS {
            if let Some(tick) = consumer_queue.pop() {
                checksum = checksum.wrapping_add(tick.seq);
            }
            burn_cpu(CONSUMER_WORK);
        }
        black_box(checksum);
    });

    let producer_queue = queue.clone();
    let producer_gun = start_gun.clone();
    let producer = thread::spawn(move || {
        while !producer_gun.load(Ordering::Acquire) {
            hint::spin_loop();
        }
        let mut latencies = Vec::with_capacity(STRESS_OPS);
        for i in 0..STRESS_OPS {
            let tick = StressTick::new(i as u64);
            let t0 = Instant::now();
            let _ = producer_queue.push(tick);
            latencies.push(t0.elapsed().as_nanos() as u64);
        }
        latencies
    });

    let started = Instant::now();
    start_gun.store(true, Ordering::Release);

    let samples = producer.join().unwrap_or_default();
    let _ = consumer.join();
    let total = started.elapsed();

    LatencyStats::from_samples("blocking_stress_slow_consumer", samples, total)
}

/// Same contest on the lock-free queue: the producer spin-retries a full
/// ring and the consumer spin-pops, so nobody is ever descheduled.
fn stress_lockfree() -> LatencyStats {
    let (mut tx, mut rx) = ring::<StressTick>(STRESS_CAPACITY);
    let start_gun = Arc::new(AtomicBool::new(false));

    let consumer_gun = start_gun.clone();
    let consumer = thread::spawn(move || {
        while !consumer_gun.load(Ordering::Acquire) {
            hint::spin_loop();
        }
        let mut checksum = 0u64;
        let mut popped = 0;
        while popped < STRESS_OPS {
            match rx.pop() {
                Some(tick) => {
                    checksum = checksum.wrapping_add(tick.seq);
                    burn_cpu(CONSUMER_WORK);
                    popped += 1;
                }
                None => hint::spin_loop(),
            }
        }
        black_box(checksum);
    });

    let producer_gun = start_gun.clone();
    let producer = thread::spawn(move || {
        while !producer_gun.load(Ordering::Acquire) {
            hint::spin_loop();
        }
        let mut latencies = Vec::with_capacity(STRESS_OPS);
        for i in 0..STRESS_OPS {
            let mut tick = StressTick::new(i as u64);
            let t0 = Instant::now();
            loop {
                match tx.push(tick) {
                    Ok(()) => break,
                    Err(back) => {
                        tick = back;
                        hint::spin_loop();
                    }
                }
            }
            latencies.push(t0.elapsed().as_nanos() as u64);
        }
        latencies
    });

    let started = Instant::now();
    start_gun.store(true, Ordering::Release);

    let samples = producer.join().unwrap_or_default();
    let _ = consumer.join();
    let total = started.elapsed();

    LatencyStats::from_samples("lockfree_stress_slow_consumer", samples, total)
}

// ============================================================================
// Throughput Contest
// ============================================================================

fn contest_blocking(count: usize) -> f64 {
    let queue = Arc::new(BlockingRingBuffer::new(CONTEST_CAPACITY));
    let start_gun = Arc::new(AtomicBool::new(false));

    let consumer_queue = queue.clone();
    let consumer_gun = start_gun.clone();
    let consumer = thread::spawn(move || {
        while !consumer_gun.load(Ordering::Acquire) {
            hint::spin_loop();
        }
        for _ in 0..count {
            let _ = black_box(consumer_queue.pop());
        }
    });

    let producer_queue = queue.clone();
    let producer_gun = start_gun.clone();
    let producer = thread::spawn(move || {
        while !producer_gun.load(Ordering::Acquire) {
            hint::spin_loop();
        }
        for i in 0..count {
            let _ = producer_queue.push(Order {
                id: i as u64,
                ts: 0,
            });
        }
    });

    let started = Instant::now();
    start_gun.store(true, Ordering::Release);

    let _ = producer.join();
    let _ = consumer.join();

    count as f64 / started.elapsed().as_secs_f64()
}

fn contest_lockfree(count: usize) -> f64 {
    let (mut tx, mut rx) = ring::<Order>(CONTEST_CAPACITY);
    let start_gun = Arc::new(AtomicBool::new(false));

    let consumer_gun = start_gun.clone();
    let consumer = thread::spawn(move || {
        while !consumer_gun.load(Ordering::Acquire) {
            hint::spin_loop();
        }
        let mut popped = 0;
        while popped < count {
            match rx.pop() {
                Some(order) => {
                    black_box(order);
                    popped += 1;
                }
                None => hint::spin_loop(),
            }
        }
    });

    let producer_gun = start_gun.clone();
    let producer = thread::spawn(move || {
        while !producer_gun.load(Ordering::Acquire) {
            hint::spin_loop();
        }
        for i in 0..count {
            let mut order = Order {
                id: i as u64,
                ts: 0,
            };
            loop {
                match tx.push(order) {
                    Ok(()) => break,
                    Err(back) => {
                        order = back;
                        hint::spin_loop();
                    }
                }
            }
        }
    });

    let started = Instant::now();
    start_gun.store(true, Ordering::Release);

    let _ = producer.join();
    let _ = consumer.join();

    count as f64 / started.elapsed().as_secs_f64()
}

fn throughput_contest() {
    println!("=== throughput_contest ===");
    println!(
        "  Payload: 16 bytes | Capacity: {} | Iterations: {}",
        CONTEST_CAPACITY, CONTEST_OPS
    );

    println!("  Warming up caches...");
    let _ = contest_blocking(CONTEST_OPS / 10);
    let _ = contest_lockfree(CONTEST_OPS / 10);

    let blocking_ops = contest_blocking(CONTEST_OPS);
    println!(
        "  Blocking (mutex):   {:>12.0} ops/sec ({:.2}M/s)",
        blocking_ops,
        blocking_ops / 1_000_000.0
    );

    let lockfree_ops = contest_lockfree(CONTEST_OPS);
    println!(
        "  Lock-free (atomic): {:>12.0} ops/sec ({:.2}M/s)",
        lockfree_ops,
        lockfree_ops / 1_000_000.0
    );

    let improvement = (lockfree_ops - blocking_ops) / blocking_ops * 100.0;
    println!("  Improvement: {improvement:.2}%");
    println!();
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    println!("\n========================================");
    println!("  SPSC Ring Buffer Microbenchmarks");
    println!("========================================\n");

    let runner = BenchmarkRunner::new(10_000, 1_000_000);

    let mut results = Vec::new();
    results.push(bench_blocking_push_pop(&runner));
    results.push(bench_lockfree_push_pop(&runner));

    println!("Running slow-consumer stress ({STRESS_OPS} ops per queue)...\n");
    results.push(stress_blocking());
    results.push(stress_lockfree());

    for r in &results {
        r.print();
    }

    println!("========================================");
    println!("  Summary");
    println!("========================================\n");

    println!(
        "{:<30} {:>10} {:>10} {:>10} {:>12}",
        "Benchmark", "P50 (ns)", "P99 (ns)", "Max (ns)", "Throughput"
    );
    println!("{}", "-".repeat(75));
    for r in &results {
        println!(
            "{:<30} {:>10} {:>10} {:>10} {:>10.2}M/s",
            r.name,
            r.p50_ns,
            r.p99_ns,
            r.max_ns,
            r.throughput_ops_per_sec / 1_000_000.0
        );
    }
    println!();

    throughput_contest();
}
