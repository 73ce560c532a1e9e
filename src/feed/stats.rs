//! Feed Counters
//!
//! The producer and consumer bump these from their hot loops, so the two
//! per-second window counters live on their own cache lines. The monitor
//! drains the windows once a second with an exchange-to-zero; cumulative
//! totals are kept separately and survive for the final snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Relaxed counter padded to a cache line.
#[repr(align(64))]
#[derive(Debug, Default)]
pub struct PaddedCounter(AtomicU64);

impl PaddedCounter {
    #[inline]
    pub fn incr(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Reads and zeroes in one step; two drains never see the same tick.
    #[inline]
    pub fn take(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct FeedStats {
    window_generated: PaddedCounter,
    window_sent: PaddedCounter,
    ticks_generated: AtomicU64,
    ticks_sent: AtomicU64,
    queue_rejects: AtomicU64,
    send_retries: AtomicU64,
    send_errors: AtomicU64,
    short_sends: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedStatsSnapshot {
    pub ticks_generated: u64,
    pub ticks_sent: u64,
    pub queue_rejects: u64,
    pub send_retries: u64,
    pub send_errors: u64,
    pub short_sends: u64,
}

impl FeedStats {
    #[inline]
    pub fn note_generated(&self) {
        self.window_generated.incr();
        self.ticks_generated.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn note_sent(&self) {
        self.window_sent.incr();
        self.ticks_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn note_queue_reject(&self) {
        self.queue_rejects.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn note_send_retry(&self) {
        self.send_retries.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn note_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn note_short_send(&self) {
        self.short_sends.fetch_add(1, Ordering::Relaxed);
    }

    /// Per-interval generated/sent counts since the previous drain.
    pub fn drain_window(&self) -> (u64, u64) {
        (self.window_generated.take(), self.window_sent.take())
    }

    pub fn snapshot(&self) -> FeedStatsSnapshot {
        FeedStatsSnapshot {
            ticks_generated: self.ticks_generated.load(Ordering::Relaxed),
            ticks_sent: self.ticks_sent.load(Ordering::Relaxed),
            queue_rejects: self.queue_rejects.load(Ordering::Relaxed),
            send_retries: self.send_retries.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            short_sends: self.short_sends.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_drain_but_totals_survive() {
        let stats = FeedStats::default();
        for _ in 0..10 {
            stats.note_generated();
        }
        for _ in 0..7 {
            stats.note_sent();
        }
        assert_eq!(stats.drain_window(), (10, 7));
        assert_eq!(stats.drain_window(), (0, 0));

        stats.note_generated();
        assert_eq!(stats.drain_window(), (1, 0));

        let snap = stats.snapshot();
        assert_eq!(snap.ticks_generated, 11);
        assert_eq!(snap.ticks_sent, 7);
    }

    #[test]
    fn snapshot_carries_every_counter() {
        let stats = FeedStats::default();
        stats.note_queue_reject();
        stats.note_send_retry();
        stats.note_send_retry();
        stats.note_send_error();
        stats.note_short_send();
        let snap = stats.snapshot();
        assert_eq!(snap.queue_rejects, 1);
        assert_eq!(snap.send_retries, 2);
        assert_eq!(snap.send_errors, 1);
        assert_eq!(snap.short_sends, 1);
    }

    #[test]
    fn padded_counter_take_is_destructive() {
        let counter = PaddedCounter::default();
        counter.incr();
        counter.incr();
        assert_eq!(counter.get(), 2);
        assert_eq!(counter.take(), 2);
        assert_eq!(counter.get(), 0);
    }
}
