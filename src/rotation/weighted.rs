//! Weighted proxy selection strategy
//!
//! Favors records with fewer recent failures and lower measured latency.

use rand::Rng;

use super::ProxySelector;
use crate::models::ProxyRecord;

/// Latency that a never-measured record is assumed to have
const DEFAULT_LATENCY_MS: u64 = 1000;

/// Latency scale: a record this many ms slower weighs roughly half
const LATENCY_SCALE_MS: f64 = 250.0;

pub struct WeightedSelector;

impl WeightedSelector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WeightedSelector {
    fn default() -> Self {
        Self::new()
    }
}

/// Selection weight; always positive
fn weight(record: &ProxyRecord) -> f64 {
    let failure_penalty = 1.0 / (1.0 + record.consecutive_failures as f64);
    let latency = record.latency_ms.unwrap_or(DEFAULT_LATENCY_MS) as f64;
    let latency_penalty = 1.0 / (1.0 + latency / LATENCY_SCALE_MS);
    failure_penalty * latency_penalty
}

impl ProxySelector for WeightedSelector {
    fn select(&self, eligible: &[ProxyRecord]) -> Option<usize> {
        if eligible.is_empty() {
            return None;
        }

        let weights: Vec<f64> = eligible.iter().map(weight).collect();
        let total: f64 = weights.iter().sum();

        let mut roll = rand::thread_rng().gen_range(0.0..total);
        for (idx, w) in weights.iter().enumerate() {
            if roll < *w {
                return Some(idx);
            }
            roll -= w;
        }
        // Floating-point remainder lands on the last entry.
        Some(eligible.len() - 1)
    }

    fn name(&self) -> &'static str {
        "weighted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Candidate, ProxyProtocol, ProxyStatus};
    use chrono::Utc;

    fn record(address: &str, latency_ms: u64, consecutive_failures: u32) -> ProxyRecord {
        let candidate = Candidate {
            address: address.to_string(),
            protocol: ProxyProtocol::Http,
            source_id: "file:test".to_string(),
            username: None,
            password: None,
        };
        let mut record = ProxyRecord::from_candidate(&candidate, Utc::now());
        record.status = ProxyStatus::Valid;
        record.latency_ms = Some(latency_ms);
        record.consecutive_failures = consecutive_failures;
        record
    }

    #[test]
    fn test_empty_slice() {
        let selector = WeightedSelector::new();
        assert_eq!(selector.select(&[]), None);
    }

    #[test]
    fn test_weight_favors_low_latency() {
        let fast = record("10.0.0.1:80", 50, 0);
        let slow = record("10.0.0.2:80", 5000, 0);
        assert!(weight(&fast) > weight(&slow));
    }

    #[test]
    fn test_weight_penalizes_failures() {
        let clean = record("10.0.0.1:80", 100, 0);
        let flaky = record("10.0.0.2:80", 100, 4);
        assert!(weight(&clean) > weight(&flaky));
    }

    #[test]
    fn test_select_always_in_range() {
        let selector = WeightedSelector::new();
        let eligible = vec![
            record("10.0.0.1:80", 50, 0),
            record("10.0.0.2:80", 200, 1),
            record("10.0.0.3:80", 800, 3),
        ];

        for _ in 0..100 {
            let idx = selector.select(&eligible).unwrap();
            assert!(idx < eligible.len());
        }
    }

    #[test]
    fn test_overwhelming_weight_dominates() {
        let selector = WeightedSelector::new();
        let eligible = vec![
            record("10.0.0.1:80", 0, 0),
            record("10.0.0.2:80", 100_000, 99),
        ];

        let favored = (0..200)
            .filter(|_| selector.select(&eligible).unwrap() == 0)
            .count();
        assert!(favored >= 190, "favored only {} of 200 draws", favored);
    }
}
