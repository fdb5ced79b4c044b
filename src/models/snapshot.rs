use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::proxy::{ProxyRecord, ProxyStatus};

/// Overall pool health as persisted in the snapshot.
///
/// `Missing` is never written to disk; it is the bootstrap state before the
/// first snapshot exists, and external readers treat an absent file the same
/// way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PoolHealth {
    Ok,
    Degraded,
    #[default]
    Missing,
}

impl PoolHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolHealth::Ok => "ok",
            PoolHealth::Degraded => "degraded",
            PoolHealth::Missing => "missing",
        }
    }
}

impl std::fmt::Display for PoolHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregate pool statistics. Always derived from `records`, never edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PoolStats {
    pub total_count: usize,
    pub valid_count: usize,
    pub failed_count: usize,
}

/// The persisted unit of truth for the pool.
///
/// External readers (scraper jobs gating on "do I have enough valid
/// proxies") depend on this exact shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub records: Vec<ProxyRecord>,
    pub stats: PoolStats,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
    pub status: PoolHealth,
}

impl PoolSnapshot {
    /// Bootstrap snapshot for a pool that has never been persisted
    pub fn empty() -> Self {
        PoolSnapshot {
            records: Vec::new(),
            stats: PoolStats::default(),
            last_update: None,
            status: PoolHealth::Missing,
        }
    }

    /// Recompute derived stats and health from the record list.
    ///
    /// Called after every mutation; `stats` is never independent truth.
    pub fn recompute(&mut self, min_healthy: usize) {
        self.stats = PoolStats {
            total_count: self.records.len(),
            valid_count: self
                .records
                .iter()
                .filter(|r| r.status == ProxyStatus::Valid)
                .count(),
            failed_count: self
                .records
                .iter()
                .filter(|r| r.status == ProxyStatus::Failed)
                .count(),
        };
        self.status = if self.stats.valid_count >= min_healthy {
            PoolHealth::Ok
        } else {
            PoolHealth::Degraded
        };
    }
}

impl Default for PoolSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}
