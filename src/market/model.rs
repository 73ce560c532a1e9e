//! Stochastic Mid-Price Models
//!
//! Two generators for the synthetic mid price:
//! - `RandomWalk`: fixed step up or down, direction from the sign of a
//!   standard normal draw
//! - `Gbm`: geometric Brownian motion,
//!   `S *= exp((mu - sigma^2/2) dt + sigma sqrt(dt) Z)`
//!
//! Both run on a seeded ChaCha stream so a run can be reproduced exactly
//! from the seed logged at startup.

use rand::distributions::Distribution;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use statrs::distribution::Normal;

pub const DEFAULT_START_PRICE: f64 = 100.0;
pub const DEFAULT_WALK_STEP: f64 = 0.01;
pub const DEFAULT_GBM_MU: f64 = 0.1;
pub const DEFAULT_GBM_SIGMA: f64 = 0.3;
pub const DEFAULT_GBM_DT: f64 = 0.001;

/// Fixed-step random walk. The price moves exactly `step` per tick and is
/// snapped back to `step` if it would go non-positive.
#[derive(Debug, Clone)]
pub struct RandomWalk {
    price: f64,
    step: f64,
    normal: Normal,
    rng: ChaCha8Rng,
}

impl RandomWalk {
    pub fn new(start: f64, step: f64, seed: u64) -> Self {
        Self {
            price: start,
            step,
            normal: Normal::new(0.0, 1.0).unwrap(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn next_price(&mut self) -> f64 {
        let z: f64 = self.normal.sample(&mut self.rng);
        self.price += if z > 0.0 { self.step } else { -self.step };
        if self.price <= 0.0 {
            self.price = self.step;
        }
        self.price
    }

    pub fn price(&self) -> f64 {
        self.price
    }
}

/// Geometric Brownian motion with drift `mu` and volatility `sigma` over
/// step `dt`. The multiplicative update keeps the price positive on its
/// own; the 0.01 floor only guards against underflow to zero.
#[derive(Debug, Clone)]
pub struct Gbm {
    price: f64,
    mu: f64,
    sigma: f64,
    dt: f64,
    normal: Normal,
    rng: ChaCha8Rng,
}

impl Gbm {
    pub fn new(start: f64, mu: f64, sigma: f64, dt: f64, seed: u64) -> Self {
        Self {
            price: if start > 0.0 { start } else { 1.0 },
            mu,
            sigma,
            dt,
            normal: Normal::new(0.0, 1.0).unwrap(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn next_price(&mut self) -> f64 {
        let z: f64 = self.normal.sample(&mut self.rng);
        let drift = (self.mu - 0.5 * self.sigma * self.sigma) * self.dt;
        let diffusion = self.sigma * self.dt.sqrt() * z;
        self.price *= (drift + diffusion).exp();
        if self.price <= 0.0 {
            self.price = 0.01;
        }
        self.price
    }

    pub fn price(&self) -> f64 {
        self.price
    }
}

/// The model a feed runs with, chosen at startup.
#[derive(Debug, Clone)]
pub enum PriceModel {
    RandomWalk(RandomWalk),
    Gbm(Gbm),
}

impl PriceModel {
    pub fn random_walk(start: f64, step: f64, seed: u64) -> Self {
        PriceModel::RandomWalk(RandomWalk::new(start, step, seed))
    }

    pub fn gbm(start: f64, mu: f64, sigma: f64, dt: f64, seed: u64) -> Self {
        PriceModel::Gbm(Gbm::new(start, mu, sigma, dt, seed))
    }

    pub fn next_price(&mut self) -> f64 {
        match self {
            PriceModel::RandomWalk(m) => m.next_price(),
            PriceModel::Gbm(m) => m.next_price(),
        }
    }

    pub fn price(&self) -> f64 {
        match self {
            PriceModel::RandomWalk(m) => m.price(),
            PriceModel::Gbm(m) => m.price(),
        }
    }
}
