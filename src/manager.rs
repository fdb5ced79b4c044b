//! Maintenance operations over the pool
//!
//! Each operation is a transition from the current snapshot to a new one
//! plus an outcome report. The manager never chains operations itself;
//! whether a below-threshold outcome escalates (recover then rebuild,
//! say) is caller policy, driven by the exit code.

use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::models::{Candidate, PoolStats, ProxyStatus};
use crate::source::{self, ProxySource, SourceError, SourceFilter};
use crate::store::PoolStore;
use crate::validator::Validator;

/// The five maintenance operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Update,
    Validate,
    Clean,
    Rebuild,
    Recover,
}

impl Operation {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "update" => Some(Operation::Update),
            "validate" => Some(Operation::Validate),
            "clean" => Some(Operation::Clean),
            "rebuild" => Some(Operation::Rebuild),
            "recover" => Some(Operation::Recover),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Update => "update",
            Operation::Validate => "validate",
            Operation::Clean => "clean",
            Operation::Rebuild => "rebuild",
            Operation::Recover => "recover",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one operation
#[derive(Debug, Clone)]
pub struct OperationReport {
    pub operation: Operation,
    pub success: bool,
    pub fallback_needed: bool,
    pub stats: PoolStats,
    pub removed: usize,
    pub banned: usize,
    pub source_errors: Vec<SourceError>,
    pub elapsed: Duration,
}

impl OperationReport {
    /// Process exit code: 0 met the success condition, 1 completed below
    /// threshold (caller applies its fallback policy)
    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }

    /// One-line outcome summary, printed regardless of success
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{}: {} valid={} failed={} total={}",
            self.operation,
            if self.success { "ok" } else { "below-threshold" },
            self.stats.valid_count,
            self.stats.failed_count,
            self.stats.total_count,
        );
        if self.removed > 0 {
            summary.push_str(&format!(" removed={}", self.removed));
        }
        if self.banned > 0 {
            summary.push_str(&format!(" banned={}", self.banned));
        }
        if !self.source_errors.is_empty() {
            let failed_sources: Vec<&str> = self
                .source_errors
                .iter()
                .map(|e| e.source_id.as_str())
                .collect();
            summary.push_str(&format!(" sources_failed={}", failed_sources.join(",")));
        }
        summary.push_str(&format!(" elapsed={:.1}s", self.elapsed.as_secs_f64()));
        summary
    }
}

/// Orchestrates sources, validator and store for each operation
pub struct PoolManager {
    config: Config,
    sources: Vec<Box<dyn ProxySource>>,
    validator: Validator,
}

impl PoolManager {
    pub fn new(config: Config) -> Result<Self> {
        let sources = source::build_sources(&config.sources);
        let validator = Validator::new(config.validator.clone())?;
        Ok(Self {
            config,
            sources,
            validator,
        })
    }

    /// Keep existing valid records, source new candidates, validate until
    /// the pool holds at least `min_count` valid records
    pub async fn update(
        &self,
        min_count: usize,
        timeout: Duration,
        filter: SourceFilter,
    ) -> Result<OperationReport> {
        let store = PoolStore::open_or_default(&self.config.pool)?;
        self.fill(Operation::Update, store, min_count, timeout, filter)
            .await
    }

    /// Discard the pool and refill from scratch across all sources
    pub async fn rebuild(&self, min_count: usize, timeout: Duration) -> Result<OperationReport> {
        let store = PoolStore::open_or_default(&self.config.pool)?;
        store.reset();
        self.fill(Operation::Rebuild, store, min_count, timeout, SourceFilter::All)
            .await
    }

    async fn fill(
        &self,
        operation: Operation,
        store: PoolStore,
        min_count: usize,
        timeout: Duration,
        filter: SourceFilter,
    ) -> Result<OperationReport> {
        let started = Instant::now();
        let deadline = started + timeout;

        let outcome = source::fetch_candidates(&self.sources, filter).await;
        // Already-valid records keep their verdict; banned stay out of
        // every fetch cycle.
        let candidates: Vec<Candidate> = outcome
            .candidates
            .into_iter()
            .filter(|c| {
                !matches!(
                    store.status_of(&c.id()),
                    Some(ProxyStatus::Valid) | Some(ProxyStatus::Banned)
                )
            })
            .collect();

        info!(
            operation = operation.as_str(),
            candidates = candidates.len(),
            existing_valid = store.valid_count(),
            min_count,
            "Filling pool"
        );

        // Validate in bounded batches so the run can stop as soon as the
        // threshold is met instead of probing every sourced candidate.
        let batch_size = self.config.validator.concurrency.max(1) * 2;
        let mut offset = 0;
        while store.valid_count() < min_count
            && offset < candidates.len()
            && Instant::now() < deadline
        {
            let end = (offset + batch_size).min(candidates.len());
            let batch = candidates[offset..end].to_vec();
            offset = end;

            let verdicts = self.validator.run(batch, deadline).await;
            store.apply_verdicts(&verdicts);
        }

        store.persist()?;

        let stats = store.stats();
        let success = stats.valid_count >= min_count;
        info!(
            operation = operation.as_str(),
            valid = stats.valid_count,
            total = stats.total_count,
            success,
            "Fill complete"
        );

        Ok(OperationReport {
            operation,
            success,
            fallback_needed: !success,
            stats,
            removed: 0,
            banned: 0,
            source_errors: outcome.source_errors,
            elapsed: started.elapsed(),
        })
    }

    /// Revalidate every record in the pool (banned excluded).
    ///
    /// Informational: completing the pass is success regardless of the
    /// resulting counts.
    pub async fn validate(&self, timeout: Duration) -> Result<OperationReport> {
        let started = Instant::now();
        let store = PoolStore::open(&self.config.pool)?;

        let candidates: Vec<Candidate> = store
            .records()
            .iter()
            .filter(|r| r.status.is_probeable())
            .map(Candidate::from)
            .collect();

        info!(count = candidates.len(), "Revalidating pool");
        let verdicts = self.validator.run(candidates, started + timeout).await;
        store.apply_verdicts(&verdicts);
        store.persist()?;

        Ok(OperationReport {
            operation: Operation::Validate,
            success: true,
            fallback_needed: false,
            stats: store.stats(),
            removed: 0,
            banned: 0,
            source_errors: Vec::new(),
            elapsed: started.elapsed(),
        })
    }

    /// Remove banned records and failed records past the retention window
    pub async fn clean(&self) -> Result<OperationReport> {
        let started = Instant::now();
        let store = PoolStore::open(&self.config.pool)?;

        let removed = store.clean(self.config.pool.failed_retention());
        store.persist()?;

        info!(removed, "Clean complete");
        Ok(OperationReport {
            operation: Operation::Clean,
            success: true,
            fallback_needed: false,
            stats: store.stats(),
            removed,
            banned: 0,
            source_errors: Vec::new(),
            elapsed: started.elapsed(),
        })
    }

    /// Revalidate only failed records; ban those that keep failing.
    ///
    /// Valid records are never touched by this operation.
    pub async fn recover(&self, threshold: usize, timeout: Duration) -> Result<OperationReport> {
        let started = Instant::now();
        let store = PoolStore::open(&self.config.pool)?;

        let failed: Vec<Candidate> = store
            .records()
            .iter()
            .filter(|r| r.status == ProxyStatus::Failed)
            .map(Candidate::from)
            .collect();

        info!(count = failed.len(), threshold, "Recovering failed records");
        let verdicts = self.validator.run(failed, started + timeout).await;
        store.apply_verdicts(&verdicts);
        let banned = store.apply_recovery(&verdicts, self.config.pool.max_recovery_attempts);
        store.persist()?;

        let stats = store.stats();
        let success = stats.valid_count >= threshold;
        Ok(OperationReport {
            operation: Operation::Recover,
            success,
            fallback_needed: !success,
            stats,
            removed: 0,
            banned,
            source_errors: Vec::new(),
            elapsed: started.elapsed(),
        })
    }
}
