//! Blocking SPSC Ring Buffer
//!
//! Fixed-capacity queue guarded by a mutex with two condvars. A full queue
//! parks the producer and an empty queue parks the consumer, so waiting is
//! the backpressure mechanism and no tick is ever silently dropped.
//!
//! Shutdown contract:
//! - `stop()` wakes every parked thread
//! - after `stop()`, `push` refuses the item and hands it back
//! - `pop` keeps draining the backlog and only then starts returning `None`

use parking_lot::{Condvar, Mutex};

struct State<T> {
    slots: Box<[Option<T>]>,
    write_idx: usize,
    read_idx: usize,
    count: usize,
    stopped: bool,
}

/// Bounded blocking queue for exactly one producer and one consumer.
///
/// The type itself does not enforce the thread count; a second producer
/// would be safe but would interleave waits unpredictably.
pub struct BlockingRingBuffer<T> {
    inner: Mutex<State<T>>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T> BlockingRingBuffer<T> {
    /// Creates a queue holding at most `capacity` items.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            inner: Mutex::new(State {
                slots: slots.into_boxed_slice(),
                write_idx: 0,
                read_idx: 0,
                count: 0,
                stopped: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// Blocks while the queue is full. Returns `Err(item)` without writing
    /// once the queue has been stopped.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut state = self.inner.lock();
        let cap = state.slots.len();
        while state.count == cap && !state.stopped {
            self.not_full.wait(&mut state);
        }
        if state.stopped {
            return Err(item);
        }
        let idx = state.write_idx;
        state.slots[idx] = Some(item);
        state.write_idx = (idx + 1) % cap;
        state.count += 1;
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Blocks while the queue is empty. Returns `None` only when the queue
    /// has been stopped and the backlog is fully drained.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.inner.lock();
        let cap = state.slots.len();
        while state.count == 0 && !state.stopped {
            self.not_empty.wait(&mut state);
        }
        if state.count == 0 {
            return None;
        }
        let idx = state.read_idx;
        let item = state.slots[idx].take();
        state.read_idx = (idx + 1) % cap;
        state.count -= 1;
        drop(state);
        self.not_full.notify_one();
        item
    }

    /// Marks the queue stopped and wakes every parked thread.
    pub fn stop(&self) {
        let mut state = self.inner.lock();
        state.stopped = true;
        drop(state);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.lock().stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn push_pop_preserves_fifo_order() {
        let queue = BlockingRingBuffer::new(8);
        for i in 0..5 {
            queue.push(i).unwrap();
        }
        assert_eq!(queue.len(), 5);
        for i in 0..5 {
            assert_eq!(queue.pop(), Some(i));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn wraps_around_capacity_boundary() {
        let queue = BlockingRingBuffer::new(4);
        for round in 0..5 {
            for i in 0..4 {
                queue.push(round * 10 + i).unwrap();
            }
            for i in 0..4 {
                assert_eq!(queue.pop(), Some(round * 10 + i));
            }
        }
    }

    #[test]
    fn pop_blocks_until_item_arrives() {
        let queue = Arc::new(BlockingRingBuffer::new(4));
        let consumer_side = queue.clone();
        let handle = thread::spawn(move || consumer_side.pop());
        thread::sleep(Duration::from_millis(50));
        queue.push(99u64).unwrap();
        assert_eq!(handle.join().unwrap(), Some(99));
    }

    #[test]
    fn push_blocks_while_full_then_resumes() {
        let queue = Arc::new(BlockingRingBuffer::new(2));
        queue.push(1).unwrap();
        queue.push(2).unwrap();

        let producer_side = queue.clone();
        let handle = thread::spawn(move || producer_side.push(3));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(queue.len(), 2, "third push should still be parked");

        assert_eq!(queue.pop(), Some(1));
        handle.join().unwrap().unwrap();
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
    }

    #[test]
    fn stop_wakes_parked_consumer_with_none() {
        let queue = Arc::new(BlockingRingBuffer::<u64>::new(4));
        let consumer_side = queue.clone();
        let handle = thread::spawn(move || consumer_side.pop());
        thread::sleep(Duration::from_millis(50));
        queue.stop();
        assert_eq!(handle.join().unwrap(), None);
    }

    #[test]
    fn stop_wakes_parked_producer_and_returns_item() {
        let queue = Arc::new(BlockingRingBuffer::new(1));
        queue.push(7).unwrap();
        let producer_side = queue.clone();
        let handle = thread::spawn(move || producer_side.push(8));
        thread::sleep(Duration::from_millis(50));
        queue.stop();
        assert_eq!(handle.join().unwrap(), Err(8));
        // the parked push never wrote
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn push_after_stop_is_rejected() {
        let queue = BlockingRingBuffer::new(4);
        queue.push(1).unwrap();
        queue.stop();
        assert!(queue.is_stopped());
        assert_eq!(queue.push(2), Err(2));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn pop_drains_backlog_after_stop() {
        let queue = BlockingRingBuffer::new(8);
        for i in 0..3 {
            queue.push(i).unwrap();
        }
        queue.stop();
        assert_eq!(queue.pop(), Some(0));
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn threaded_transfer_keeps_every_item_in_order() {
        const COUNT: u64 = 10_000;
        let queue = Arc::new(BlockingRingBuffer::new(64));
        let producer_side = queue.clone();
        let producer = thread::spawn(move || {
            for i in 0..COUNT {
                producer_side.push(i).unwrap();
            }
        });
        let mut received = Vec::with_capacity(COUNT as usize);
        while received.len() < COUNT as usize {
            if let Some(v) = queue.pop() {
                received.push(v);
            }
        }
        producer.join().unwrap();
        for (expected, got) in received.iter().enumerate() {
            assert_eq!(*got, expected as u64);
        }
    }
}
