//! Lock-Free SPSC Ring Buffer
//!
//! Wait-free bounded queue built on two monotonically increasing cursors.
//! The producer owns `head`, the consumer owns `tail`; each cursor is only
//! ever stored by its owner (Release) and loaded by the other side
//! (Acquire), which is what publishes slot contents across threads.
//!
//! Capacity must be a power of two so a cursor maps to a slot with a single
//! mask instead of a modulo. Cursors never wrap logically: occupancy is
//! `head - tail` in wrapping arithmetic, full is `occupancy == capacity`,
//! empty is `head == tail`.
//!
//! Each handle caches the opposite cursor and only re-reads the shared
//! atomic when the cached value makes the queue look full (producer) or
//! empty (consumer), keeping the fast path free of cross-core traffic.

use std::cell::{Cell, UnsafeCell};
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Marker that keeps a handle `Send` but not `Sync`, so two threads cannot
/// share one side of the queue through a reference.
type PhantomUnsync = PhantomData<Cell<&'static ()>>;

/// Cursor on its own cache line so producer and consumer stores never
/// false-share.
#[repr(align(64))]
struct PaddedAtomic(AtomicUsize);

struct Slot<T>(UnsafeCell<MaybeUninit<T>>);

#[repr(C)]
struct Shared<T> {
    head: PaddedAtomic,
    tail: PaddedAtomic,
    mask: usize,
    slots: Box<[Slot<T>]>,
}

// SAFETY: the queue moves T values between exactly two threads; sending the
// structure itself is fine whenever T is Send.
unsafe impl<T: Send> Send for Shared<T> {}
// SAFETY: producer and consumer never touch the same slot concurrently. A
// slot is written before the Release store of `head` and read only after the
// Acquire load of `head` observes it (and vice versa for `tail` on reuse).
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    #[inline]
    fn capacity(&self) -> usize {
        self.mask + 1
    }

    #[inline]
    fn len(&self) -> usize {
        let head = self.head.0.load(Ordering::Acquire);
        let tail = self.tail.0.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let head = *self.head.0.get_mut();
        let mut tail = *self.tail.0.get_mut();
        while tail != head {
            let idx = tail & self.mask;
            // SAFETY: slots in [tail, head) were written and never consumed;
            // &mut self guarantees no live handle can race this drain.
            unsafe { (*self.slots[idx].0.get()).assume_init_drop() };
            tail = tail.wrapping_add(1);
        }
    }
}

/// Write half of the queue. Move it to the producer thread; `push` needs
/// `&mut self`, and the handle is deliberately not `Sync`.
pub struct RingProducer<T> {
    shared: Arc<Shared<T>>,
    /// Local mirror of the shared head cursor; only this handle advances it.
    head: usize,
    /// Consumer cursor as of the last refresh; may lag the true value.
    cached_tail: usize,
    _unsync: PhantomUnsync,
}

/// Read half of the queue, single-threaded like the producer half.
pub struct RingConsumer<T> {
    shared: Arc<Shared<T>>,
    tail: usize,
    cached_head: usize,
    _unsync: PhantomUnsync,
}

/// Creates the two halves of a bounded SPSC ring.
///
/// # Panics
/// Panics if `capacity` is not a power of two (zero included).
pub fn ring<T>(capacity: usize) -> (RingProducer<T>, RingConsumer<T>) {
    assert!(
        capacity.is_power_of_two(),
        "lock-free ring capacity must be a non-zero power of two, got {capacity}"
    );
    let mut slots = Vec::with_capacity(capacity);
    for _ in 0..capacity {
        slots.push(Slot(UnsafeCell::new(MaybeUninit::uninit())));
    }
    let shared = Arc::new(Shared {
        head: PaddedAtomic(AtomicUsize::new(0)),
        tail: PaddedAtomic(AtomicUsize::new(0)),
        mask: capacity - 1,
        slots: slots.into_boxed_slice(),
    });
    let producer = RingProducer {
        shared: shared.clone(),
        head: 0,
        cached_tail: 0,
        _unsync: PhantomData,
    };
    let consumer = RingConsumer {
        shared,
        tail: 0,
        cached_head: 0,
        _unsync: PhantomData,
    };
    (producer, consumer)
}

impl<T> RingProducer<T> {
    /// Attempts to enqueue without blocking. On a full queue the item is
    /// handed back unchanged so the caller can retry or drop it.
    #[inline]
    pub fn push(&mut self, item: T) -> Result<(), T> {
        let shared = &*self.shared;
        let head = self.head;
        if head.wrapping_sub(self.cached_tail) >= shared.capacity() {
            self.cached_tail = shared.tail.0.load(Ordering::Acquire);
            if head.wrapping_sub(self.cached_tail) >= shared.capacity() {
                return Err(item);
            }
        }
        // SAFETY: the full check above proves slot `head & mask` is not in
        // [tail, head), so the consumer cannot be reading it; this handle is
        // the only writer.
        unsafe { (*shared.slots[head & shared.mask].0.get()).write(item) };
        self.head = head.wrapping_add(1);
        shared.head.0.store(self.head, Ordering::Release);
        Ok(())
    }

    /// Occupancy as seen from a racy read of both cursors.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}

impl<T> RingConsumer<T> {
    /// Attempts to dequeue without blocking. `None` means the queue was
    /// empty at the time of the check, nothing more.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        let shared = &*self.shared;
        let tail = self.tail;
        if tail == self.cached_head {
            self.cached_head = shared.head.0.load(Ordering::Acquire);
            if tail == self.cached_head {
                return None;
            }
        }
        // SAFETY: tail != head, so slot `tail & mask` holds an initialized
        // value published by the producer's Release store of `head`.
        let item = unsafe { (*shared.slots[tail & shared.mask].0.get()).assume_init_read() };
        self.tail = tail.wrapping_add(1);
        shared.tail.0.store(self.tail, Ordering::Release);
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}
