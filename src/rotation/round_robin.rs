//! Round-robin proxy selection strategy

use std::sync::atomic::{AtomicUsize, Ordering};

use super::ProxySelector;
use crate::models::ProxyRecord;

/// Selects proxies in round-robin order
///
/// Uses an atomic cursor; the eligible list may shrink between calls, so
/// the cursor wraps against the current length rather than being reset.
pub struct RoundRobinSelector {
    cursor: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxySelector for RoundRobinSelector {
    fn select(&self, eligible: &[ProxyRecord]) -> Option<usize> {
        if eligible.is_empty() {
            return None;
        }
        Some(self.cursor.fetch_add(1, Ordering::Relaxed) % eligible.len())
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}
