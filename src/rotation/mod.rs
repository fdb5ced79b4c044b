//! Proxy rotation
//!
//! The read-side API consumed by scrapers: select a usable proxy, feed
//! back whether it worked. Selection strategies operate on the eligible
//! slice; all state mutation goes through the store's single-writer
//! boundary.

mod round_robin;
mod weighted;

pub use round_robin::RoundRobinSelector;
pub use weighted::WeightedSelector;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use crate::config::RotationConfig;
use crate::error::{Result, ShepherdError};
use crate::models::{ProxyRecord, ProxyStatus};
use crate::store::PoolStore;

/// Strategy types for proxy rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationStrategy {
    #[default]
    RoundRobin,
    Weighted,
}

impl RotationStrategy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "round_robin" | "roundrobin" | "round-robin" => Some(Self::RoundRobin),
            "weighted" => Some(Self::Weighted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::Weighted => "weighted",
        }
    }
}

/// Trait for proxy selection strategies
///
/// `select` picks an index into the eligible slice, or None when the
/// slice is empty.
pub trait ProxySelector: Send + Sync {
    fn select(&self, eligible: &[ProxyRecord]) -> Option<usize>;

    fn name(&self) -> &'static str;
}

/// Create a proxy selector based on the strategy type
pub fn create_selector(strategy: RotationStrategy) -> Box<dyn ProxySelector> {
    match strategy {
        RotationStrategy::RoundRobin => Box::new(RoundRobinSelector::new()),
        RotationStrategy::Weighted => Box::new(WeightedSelector::new()),
    }
}

/// Read-side facade over the pool
pub struct Rotator {
    store: Arc<PoolStore>,
    selector: Box<dyn ProxySelector>,
    cooldown: Duration,
}

impl Rotator {
    pub fn new(store: Arc<PoolStore>, config: &RotationConfig) -> Result<Self> {
        let strategy = RotationStrategy::from_str(&config.strategy).ok_or_else(|| {
            ShepherdError::InvalidConfig(format!("unknown rotation strategy: {}", config.strategy))
        })?;
        Ok(Self {
            store,
            selector: create_selector(strategy),
            cooldown: config.cooldown(),
        })
    }

    /// Select a proxy for use.
    ///
    /// Only valid records outside the cool-down window are eligible.
    pub fn acquire(&self) -> Result<ProxyRecord> {
        let now = Utc::now();
        let cooldown =
            chrono::Duration::from_std(self.cooldown).unwrap_or_else(|_| chrono::Duration::zero());

        let eligible: Vec<ProxyRecord> = self
            .store
            .records()
            .into_iter()
            .filter(|r| r.status.is_usable())
            .filter(|r| match r.last_used_at {
                None => true,
                Some(used_at) => now - used_at >= cooldown,
            })
            .collect();

        let idx = self
            .selector
            .select(&eligible)
            .ok_or(ShepherdError::NoProxiesAvailable)?;
        let chosen = eligible[idx].clone();

        self.store.record_use(&chosen.id)?;
        debug!(address = %chosen.address, strategy = self.selector.name(), "Acquired proxy");
        Ok(chosen)
    }

    /// Post-use feedback.
    ///
    /// Persists immediately: a crash right after use must not lose the
    /// failure signal for the shared pool.
    pub fn report(&self, id: &str, success: bool) -> Result<ProxyStatus> {
        let status = self.store.apply_feedback(id, success)?;
        self.store.persist()?;
        Ok(status)
    }
}
