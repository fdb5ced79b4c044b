//! Concurrent candidate validation
//!
//! A bounded worker pool probes candidates against the configured probe
//! URLs with per-attempt timeouts and exponential backoff. The whole run
//! is bounded by an operation deadline; candidates still unresolved when
//! it fires are fail-closed to `failed`, never left untested.

mod probe;

pub use probe::{ProbeTarget, ProxyProbe};

use std::collections::HashSet;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::config::ValidatorConfig;
use crate::error::Result;
use crate::models::Candidate;

/// Per-candidate validation verdict
#[derive(Debug, Clone)]
pub struct Verdict {
    pub candidate: Candidate,
    pub ok: bool,
    pub latency_ms: Option<u64>,
}

impl Verdict {
    fn valid(candidate: Candidate, latency_ms: u64) -> Self {
        Verdict {
            candidate,
            ok: true,
            latency_ms: Some(latency_ms),
        }
    }

    fn failed(candidate: Candidate) -> Self {
        Verdict {
            candidate,
            ok: false,
            latency_ms: None,
        }
    }
}

/// Outcome of a single probe attempt
#[derive(Debug)]
struct Attempt {
    latency_ms: u64,
    error: Option<String>,
}

impl Attempt {
    fn ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Validator over a fixed probe-target list
pub struct Validator {
    config: ValidatorConfig,
    targets: Vec<ProbeTarget>,
}

impl Validator {
    pub fn new(config: ValidatorConfig) -> Result<Self> {
        let targets = config
            .probe_urls
            .iter()
            .map(|probe_url| ProbeTarget::from_url(probe_url))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { config, targets })
    }

    /// Probe every candidate, returning one verdict per candidate.
    ///
    /// Verdicts are returned as a batch; the caller applies them to the
    /// store sequentially (single-writer discipline).
    pub async fn run(&self, candidates: Vec<Candidate>, deadline: Instant) -> Vec<Verdict> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let workers = self.config.concurrency.min(candidates.len()).max(1);
        info!(
            count = candidates.len(),
            workers, "Validating candidates"
        );

        let mut stream = futures::stream::iter(
            candidates
                .iter()
                .cloned()
                .map(|candidate| self.probe_candidate(candidate)),
        )
        .buffer_unordered(workers);

        let mut verdicts: Vec<Verdict> = Vec::with_capacity(candidates.len());
        let mut resolved: HashSet<String> = HashSet::with_capacity(candidates.len());

        loop {
            match timeout_at(deadline, stream.next()).await {
                Ok(Some(verdict)) => {
                    resolved.insert(verdict.candidate.id());
                    verdicts.push(verdict);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        unresolved = candidates.len() - resolved.len(),
                        "Validation deadline reached, cancelling in-flight probes"
                    );
                    break;
                }
            }
        }
        // Dropping the stream cancels any in-flight probe futures.
        drop(stream);

        // Fail-closed: a candidate without a verdict is failed, not untested.
        for candidate in candidates {
            if !resolved.contains(&candidate.id()) {
                verdicts.push(Verdict::failed(candidate));
            }
        }

        let valid = verdicts.iter().filter(|v| v.ok).count();
        info!(
            valid,
            failed = verdicts.len() - valid,
            "Validation complete"
        );

        verdicts
    }

    /// Probe one candidate: targets in configured order, bounded retries each
    async fn probe_candidate(&self, candidate: Candidate) -> Verdict {
        for target in &self.targets {
            for attempt_no in 0..self.config.retry_count {
                if attempt_no > 0 {
                    sleep(self.backoff_delay(attempt_no)).await;
                }

                let attempt = self.attempt(&candidate, target).await;
                if attempt.ok() {
                    debug!(
                        address = %candidate.address,
                        target = %target,
                        latency_ms = attempt.latency_ms,
                        "Probe succeeded"
                    );
                    return Verdict::valid(candidate, attempt.latency_ms);
                }

                debug!(
                    address = %candidate.address,
                    target = %target,
                    attempt = attempt_no + 1,
                    "Probe failed: {}",
                    attempt.error.as_deref().unwrap_or("unknown")
                );
            }
        }
        Verdict::failed(candidate)
    }

    /// One probe attempt with its own timeout
    async fn attempt(&self, candidate: &Candidate, target: &ProbeTarget) -> Attempt {
        let started = std::time::Instant::now();
        let result = timeout(
            self.config.attempt_timeout(),
            ProxyProbe::connect(candidate, target),
        )
        .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(())) => Attempt {
                latency_ms,
                error: None,
            },
            Ok(Err(e)) => Attempt {
                latency_ms,
                error: Some(e.to_string()),
            },
            Err(_) => Attempt {
                latency_ms,
                error: Some("probe timed out".to_string()),
            },
        }
    }

    /// Delay before the given retry (1-based): base * factor^(retry - 1)
    fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = self.config.backoff_factor.powi(retry as i32 - 1);
        Duration::from_millis((self.config.backoff_base_ms as f64 * factor) as u64)
    }
}
