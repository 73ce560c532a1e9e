//! Tick Synthesizer
//!
//! Wraps a mid-price model and dresses each mid into a full quote: a small
//! randomized spread, equal bid/ask volume, and (for GBM) a weak pull back
//! toward the long-run target so the stream does not drift off to silly
//! prices during long runs.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::market::model::PriceModel;
use crate::market::tick::{MarketTick, Symbol};

/// Long-run anchor for the mean-reverting adjustment.
pub const REVERSION_TARGET: f64 = 100.0;
/// Fraction of the distance to the target recovered per tick.
pub const REVERSION_STRENGTH: f64 = 0.00005;
/// Spread is `BASE + JITTER * U(0,1)`, rounded to cents.
pub const SPREAD_BASE: f64 = 0.05;
pub const SPREAD_JITTER: f64 = 0.01;
/// Bid/ask volume range, half-open.
pub const VOLUME_MIN: u32 = 50;
pub const VOLUME_MAX: u32 = 150;

/// Turns a mid-price stream into `MarketTick`s for one symbol.
///
/// Noise (spread, volume) draws from its own seeded stream so the mid-price
/// path for a given model seed is independent of how the quote is dressed.
pub struct TickSynthesizer {
    symbol: Symbol,
    model: PriceModel,
    rng: ChaCha8Rng,
    mean_reverting: bool,
}

impl TickSynthesizer {
    pub fn new(symbol: Symbol, model: PriceModel, noise_seed: u64) -> Self {
        let mean_reverting = matches!(model, PriceModel::Gbm(_));
        Self {
            symbol,
            model,
            rng: ChaCha8Rng::seed_from_u64(noise_seed),
            mean_reverting,
        }
    }

    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    pub fn next_tick(&mut self) -> MarketTick {
        let mut mid = self.model.next_price();
        if self.mean_reverting {
            mid += (REVERSION_TARGET - mid) * REVERSION_STRENGTH;
        }
        let spread = SPREAD_BASE + SPREAD_JITTER * self.rng.gen::<f64>();
        let spread = (spread * 100.0).round() / 100.0;
        let volume = self.rng.gen_range(VOLUME_MIN..VOLUME_MAX);
        MarketTick {
            symbol: self.symbol,
            bid: mid - spread / 2.0,
            ask: mid + spread / 2.0,
            bid_size: volume,
            ask_size: volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    #[test]
    fn quotes_are_well_formed() {
        let model = PriceModel::random_walk(100.0, 0.01, 5);
        let mut synth = TickSynthesizer::new(sym("ESZ5"), model, 6);
        for _ in 0..1000 {
            let tick = synth.next_tick();
            assert_eq!(tick.symbol.as_str(), "ESZ5");
            assert!(tick.is_valid());
            let spread = tick.spread();
            assert!(
                spread >= SPREAD_BASE - 1e-9 && spread <= SPREAD_BASE + SPREAD_JITTER + 1e-9,
                "spread out of range: {spread}"
            );
            // spread is rounded to cents
            let cents = spread * 100.0;
            assert!((cents - cents.round()).abs() < 1e-6);
            assert_eq!(tick.bid_size, tick.ask_size);
            assert!(tick.bid_size >= VOLUME_MIN && tick.bid_size < VOLUME_MAX);
        }
    }

    #[test]
    fn synthesis_is_deterministic_per_seed_pair() {
        let mut a = TickSynthesizer::new(sym("NQH6"), PriceModel::gbm(100.0, 0.1, 0.3, 0.001, 1), 2);
        let mut b = TickSynthesizer::new(sym("NQH6"), PriceModel::gbm(100.0, 0.1, 0.3, 0.001, 1), 2);
        for _ in 0..200 {
            assert_eq!(a.next_tick(), b.next_tick());
        }
    }

    #[test]
    fn random_walk_mid_passes_through_unadjusted() {
        let model = PriceModel::random_walk(100.0, 0.01, 77);
        let mut reference = model.clone();
        let mut synth = TickSynthesizer::new(sym("ESZ5"), model, 78);
        for _ in 0..100 {
            let expected_mid = reference.next_price();
            let tick = synth.next_tick();
            assert!((tick.mid() - expected_mid).abs() < 1e-9);
        }
    }

    #[test]
    fn gbm_mid_is_pulled_toward_target() {
        let model = PriceModel::gbm(200.0, 0.1, 0.3, 0.001, 21);
        let mut reference = model.clone();
        let mut synth = TickSynthesizer::new(sym("ESZ5"), model, 22);
        for _ in 0..100 {
            let raw = reference.next_price();
            let expected_mid = raw + (REVERSION_TARGET - raw) * REVERSION_STRENGTH;
            let tick = synth.next_tick();
            assert!((tick.mid() - expected_mid).abs() < 1e-9);
        }
    }
}
