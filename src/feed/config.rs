//! Feed Configuration
//!
//! Everything the orchestrator needs to wire up a run: destination,
//! symbol, model parameters, queue flavor and pacing. Binaries fill this
//! from CLI flags / environment; tests construct it directly.

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::market::model::{
    PriceModel, DEFAULT_GBM_DT, DEFAULT_GBM_MU, DEFAULT_GBM_SIGMA, DEFAULT_START_PRICE,
    DEFAULT_WALK_STEP,
};
use crate::net::sender::{DEFAULT_GROUP, DEFAULT_PORT};

/// Queue depth used when nothing else is configured.
pub const DEFAULT_CAPACITY: usize = 4096;

/// Which SPSC transport carries ticks from producer to consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Blocking,
    LockFree,
}

/// Model choice plus its parameters.
#[derive(Debug, Clone)]
pub enum ModelConfig {
    RandomWalk { start: f64, step: f64 },
    Gbm { start: f64, mu: f64, sigma: f64, dt: f64 },
}

impl ModelConfig {
    pub fn random_walk() -> Self {
        ModelConfig::RandomWalk {
            start: DEFAULT_START_PRICE,
            step: DEFAULT_WALK_STEP,
        }
    }

    pub fn gbm() -> Self {
        ModelConfig::Gbm {
            start: DEFAULT_START_PRICE,
            mu: DEFAULT_GBM_MU,
            sigma: DEFAULT_GBM_SIGMA,
            dt: DEFAULT_GBM_DT,
        }
    }

    pub(crate) fn build(&self, seed: u64) -> PriceModel {
        match *self {
            ModelConfig::RandomWalk { start, step } => PriceModel::random_walk(start, step, seed),
            ModelConfig::Gbm {
                start,
                mu,
                sigma,
                dt,
            } => PriceModel::gbm(start, mu, sigma, dt, seed),
        }
    }

    /// Pacing when the config does not set one. The random walk free-runs;
    /// GBM paces at a quote-stream-ish rate, slightly slower on the
    /// lock-free queue where a full ring spins instead of parking.
    pub fn default_interval(&self, queue: QueueKind) -> Option<Duration> {
        match self {
            ModelConfig::RandomWalk { .. } => None,
            ModelConfig::Gbm { .. } => Some(match queue {
                QueueKind::Blocking => Duration::from_millis(7),
                QueueKind::LockFree => Duration::from_millis(9),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub dest_ip: Ipv4Addr,
    pub port: u16,
    /// Egress interface for multicast sends.
    pub interface: Option<Ipv4Addr>,
    pub symbol: String,
    pub model: ModelConfig,
    pub queue: QueueKind,
    pub capacity: usize,
    /// `None` draws a seed at startup and logs it.
    pub seed: Option<u64>,
    /// `None` falls back to the model's default pacing.
    pub tick_interval: Option<Duration>,
    pub producer_core: Option<usize>,
    pub consumer_core: Option<usize>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            dest_ip: DEFAULT_GROUP,
            port: DEFAULT_PORT,
            interface: None,
            symbol: "ESZ5".to_string(),
            model: ModelConfig::random_walk(),
            queue: QueueKind::Blocking,
            capacity: DEFAULT_CAPACITY,
            seed: None,
            tick_interval: None,
            producer_core: None,
            consumer_core: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_targets_the_standard_group() {
        let config = FeedConfig::default();
        assert_eq!(config.dest_ip, Ipv4Addr::new(239, 255, 1, 1));
        assert_eq!(config.port, 9999);
        assert_eq!(config.capacity, 4096);
        assert_eq!(config.queue, QueueKind::Blocking);
        assert!(config.seed.is_none());
    }

    #[test]
    fn pacing_defaults_follow_model_and_queue() {
        let rw = ModelConfig::random_walk();
        assert_eq!(rw.default_interval(QueueKind::Blocking), None);
        assert_eq!(rw.default_interval(QueueKind::LockFree), None);

        let gbm = ModelConfig::gbm();
        assert_eq!(
            gbm.default_interval(QueueKind::Blocking),
            Some(Duration::from_millis(7))
        );
        assert_eq!(
            gbm.default_interval(QueueKind::LockFree),
            Some(Duration::from_millis(9))
        );
    }

    #[test]
    fn model_config_builds_matching_model() {
        let model = ModelConfig::random_walk().build(3);
        assert!(matches!(model, PriceModel::RandomWalk(_)));
        let model = ModelConfig::gbm().build(3);
        assert!(matches!(model, PriceModel::Gbm(_)));
    }
}
