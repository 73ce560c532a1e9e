//! Bounded SPSC Ring Buffers
//!
//! Two interchangeable transports for moving ticks from the producer thread
//! to the consumer thread:
//! - Blocking: mutex + condvars, waiting is the backpressure mechanism
//! - Lock-free: atomic cursors, callers decide how to handle full/empty
//!
//! Both are strictly single-producer/single-consumer.

pub mod blocking;
pub mod lockfree;

pub use blocking::BlockingRingBuffer;
pub use lockfree::{ring, RingConsumer, RingProducer};
