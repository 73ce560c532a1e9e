//! tickcast
//!
//! Synthetic market data feed: producer threads synthesize quotes from a
//! stochastic price model, push them through a bounded SPSC ring (blocking
//! or lock-free), encode FIX 4.2 snapshots and multicast them over UDP.
//! The analyzer side captures, validates and optionally records the same
//! stream.

pub mod analyzer;
pub mod feed;
pub mod fix;
pub mod market;
pub mod net;
pub mod ring;

pub use feed::MarketDataFeed;
