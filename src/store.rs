//! Pool state and persistence
//!
//! `PoolStore` is the authoritative in-memory pool plus its JSON snapshot
//! on disk. All mutation funnels through one mutex, so concurrent readers
//! of the same process (rotator feedback, verdict application) can never
//! race on a record's counters. Across processes the snapshot file is the
//! only shared resource, and it is only ever replaced atomically.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::error::{Result, ShepherdError};
use crate::models::{PoolHealth, PoolSnapshot, PoolStats, ProxyRecord, ProxyStatus};
use crate::validator::Verdict;

#[derive(Debug)]
pub struct PoolStore {
    path: PathBuf,
    max_fails: u32,
    min_healthy: usize,
    inner: Mutex<PoolSnapshot>,
}

impl PoolStore {
    /// Open an existing snapshot; fails fast when none exists.
    ///
    /// For operations that only make sense against an existing pool
    /// (validate, clean, recover).
    pub fn open(config: &PoolConfig) -> Result<Self> {
        let snapshot = match fs::read_to_string(&config.snapshot_path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| ShepherdError::CorruptSnapshot(e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ShepherdError::MissingSnapshot {
                    path: config.snapshot_path.display().to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self::from_snapshot(config, snapshot))
    }

    /// Open the snapshot, bootstrapping an empty pool when it is absent or
    /// unreadable. For creating operations (update, rebuild).
    pub fn open_or_default(config: &PoolConfig) -> Result<Self> {
        let snapshot = match fs::read_to_string(&config.snapshot_path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(
                        path = %config.snapshot_path.display(),
                        "Snapshot unreadable, bootstrapping empty pool: {}", e
                    );
                    PoolSnapshot::empty()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    path = %config.snapshot_path.display(),
                    "No snapshot found, bootstrapping empty pool"
                );
                PoolSnapshot::empty()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self::from_snapshot(config, snapshot))
    }

    fn from_snapshot(config: &PoolConfig, snapshot: PoolSnapshot) -> Self {
        Self {
            path: config.snapshot_path.clone(),
            max_fails: config.max_fails,
            min_healthy: config.min_healthy,
            inner: Mutex::new(snapshot),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        self.inner.lock().clone()
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.lock().stats
    }

    pub fn health(&self) -> PoolHealth {
        self.inner.lock().status
    }

    pub fn records(&self) -> Vec<ProxyRecord> {
        self.inner.lock().records.clone()
    }

    pub fn valid_count(&self) -> usize {
        self.inner.lock().stats.valid_count
    }

    pub fn get(&self, id: &str) -> Option<ProxyRecord> {
        self.inner.lock().records.iter().find(|r| r.id == id).cloned()
    }

    pub fn status_of(&self, id: &str) -> Option<ProxyStatus> {
        self.inner
            .lock()
            .records
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.status)
    }

    /// Apply a batch of validation verdicts.
    ///
    /// New candidates are inserted; existing records are updated in place.
    /// Banned records are never resurrected here; only rebuild() starts a
    /// world without them.
    pub fn apply_verdicts(&self, verdicts: &[Verdict]) {
        let now = Utc::now();
        let mut inner = self.inner.lock();

        for verdict in verdicts {
            let id = verdict.candidate.id();
            let idx = match inner.records.iter().position(|r| r.id == id) {
                Some(idx) => idx,
                None => {
                    inner
                        .records
                        .push(ProxyRecord::from_candidate(&verdict.candidate, now));
                    inner.records.len() - 1
                }
            };
            let record = &mut inner.records[idx];

            if record.status == ProxyStatus::Banned {
                debug!(address = %record.address, "Ignoring verdict for banned record");
                continue;
            }

            record.last_validated_at = Some(now);
            if verdict.ok {
                record.status = ProxyStatus::Valid;
                record.latency_ms = verdict.latency_ms;
                record.consecutive_failures = 0;
                record.recovery_attempts = 0;
            } else {
                record.status = ProxyStatus::Failed;
                record.consecutive_failures += 1;
            }
        }

        inner.recompute(self.min_healthy);
    }

    /// Recovery-pass bookkeeping over the verdicts of a recover() run.
    ///
    /// Counts a recovery attempt against each still-failed record and bans
    /// those that have exhausted `max_attempts`. Returns the newly banned
    /// count.
    pub fn apply_recovery(&self, verdicts: &[Verdict], max_attempts: u32) -> usize {
        let mut inner = self.inner.lock();
        let mut banned = 0usize;

        for verdict in verdicts.iter().filter(|v| !v.ok) {
            let id = verdict.candidate.id();
            if let Some(record) = inner.records.iter_mut().find(|r| r.id == id) {
                if record.status != ProxyStatus::Failed {
                    continue;
                }
                record.recovery_attempts += 1;
                if record.recovery_attempts >= max_attempts {
                    record.status = ProxyStatus::Banned;
                    banned += 1;
                    info!(address = %record.address, "Record banned after failed recoveries");
                }
            }
        }

        inner.recompute(self.min_healthy);
        banned
    }

    /// Post-use feedback from a scraper.
    ///
    /// Demotion to failed happens here, synchronously, the moment
    /// `consecutive_failures` reaches the threshold; the next acquire()
    /// must not see the record as valid.
    pub fn apply_feedback(&self, id: &str, success: bool) -> Result<ProxyStatus> {
        let mut inner = self.inner.lock();
        let record = inner
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| ShepherdError::ProxyNotFound(id.to_string()))?;

        if success {
            record.total_successes += 1;
            record.consecutive_failures = 0;
            record.recovery_attempts = 0;
            if record.status == ProxyStatus::Failed {
                record.status = ProxyStatus::Valid;
            }
        } else {
            record.total_failures += 1;
            record.consecutive_failures += 1;
            if record.status == ProxyStatus::Valid && record.consecutive_failures >= self.max_fails
            {
                record.status = ProxyStatus::Failed;
                debug!(address = %record.address, "Record demoted after consecutive failures");
            }
        }

        let status = record.status;
        inner.recompute(self.min_healthy);
        Ok(status)
    }

    /// Stamp a record as just-selected by the rotator
    pub fn record_use(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let record = inner
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| ShepherdError::ProxyNotFound(id.to_string()))?;
        record.last_used_at = Some(Utc::now());
        Ok(())
    }

    /// Remove banned records and failed records older than the retention
    /// window. Returns the removed count.
    pub fn clean(&self, retention: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::MAX);
        let mut inner = self.inner.lock();

        let before = inner.records.len();
        inner.records.retain(|record| match record.status {
            ProxyStatus::Banned => false,
            ProxyStatus::Failed => record.last_validated_at.unwrap_or(record.added_at) >= cutoff,
            _ => true,
        });
        let removed = before - inner.records.len();

        inner.recompute(self.min_healthy);
        removed
    }

    /// Discard the whole pool (rebuild)
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.records.clear();
        inner.recompute(self.min_healthy);
    }

    /// Atomically replace the snapshot file.
    ///
    /// Write-temp, fsync, rename-over; readers never observe a torn
    /// snapshot, and a killed process leaves the previous one intact.
    pub fn persist(&self) -> Result<()> {
        let serialized = {
            let mut inner = self.inner.lock();
            inner.recompute(self.min_healthy);
            inner.last_update = Some(Utc::now());
            serde_json::to_string_pretty(&*inner)?
        };

        let tmp_path = self.path.with_extension("tmp");
        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(serialized.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp_path, &self.path)?;
            Ok(())
        };

        write().map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            ShepherdError::Persistence(format!("{}: {}", self.path.display(), e))
        })?;

        debug!(path = %self.path.display(), "Snapshot persisted");
        Ok(())
    }
}
