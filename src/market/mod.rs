//! Market Data Synthesis
//!
//! Everything the producer thread needs to fabricate a plausible quote
//! stream: fixed-size symbols, the tick struct that crosses the queue, the
//! stochastic mid-price models, and the synthesizer that turns a mid into a
//! two-sided quote.

pub mod model;
pub mod synth;
pub mod tick;

pub use model::{Gbm, PriceModel, RandomWalk};
pub use synth::TickSynthesizer;
pub use tick::{MarketTick, Symbol, SymbolError, SYMBOL_LEN};
