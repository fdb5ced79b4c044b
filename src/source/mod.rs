//! Candidate sourcing
//!
//! Normalizes heterogeneous proxy sources (static files, provider HTTP
//! APIs) into one deduplicated candidate list. A broken source contributes
//! zero candidates and a recorded error; it never aborts the operation.

mod api;
mod file;

pub use api::ApiSource;
pub use file::FileSource;

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::SourceConfig;
use crate::error::Result;
use crate::models::Candidate;

/// Which source kinds an operation draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceFilter {
    #[default]
    All,
    Api,
    File,
}

impl SourceFilter {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "all" => Some(SourceFilter::All),
            "api" => Some(SourceFilter::Api),
            "file" => Some(SourceFilter::File),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFilter::All => "all",
            SourceFilter::Api => "api",
            SourceFilter::File => "file",
        }
    }

    pub fn accepts(&self, kind: SourceKind) -> bool {
        match self {
            SourceFilter::All => true,
            SourceFilter::Api => kind == SourceKind::Api,
            SourceFilter::File => kind == SourceKind::File,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Api,
    File,
}

/// A single configured candidate source
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// Stable identity recorded on every candidate this source produces
    fn id(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// Fetch the current candidate list from this source
    async fn fetch(&self) -> Result<Vec<Candidate>>;
}

/// A recorded per-source fetch failure (non-fatal)
#[derive(Debug, Clone)]
pub struct SourceError {
    pub source_id: String,
    pub reason: String,
}

/// Aggregate result of fetching every eligible source
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub candidates: Vec<Candidate>,
    pub source_errors: Vec<SourceError>,
}

/// Build source instances from configuration
pub fn build_sources(configs: &[SourceConfig]) -> Vec<Box<dyn ProxySource>> {
    configs
        .iter()
        .map(|config| match config {
            SourceConfig::File(f) => {
                Box::new(FileSource::new(config.id(), f.clone())) as Box<dyn ProxySource>
            }
            SourceConfig::Api(a) => Box::new(ApiSource::new(config.id(), a.clone())),
        })
        .collect()
}

/// Fetch candidates from every source matching the filter.
///
/// Candidates are deduplicated by (protocol, address); the first source to
/// produce an address wins, so ordering between sources is irrelevant to
/// pool identity.
pub async fn fetch_candidates(
    sources: &[Box<dyn ProxySource>],
    filter: SourceFilter,
) -> FetchOutcome {
    let eligible: Vec<&Box<dyn ProxySource>> =
        sources.iter().filter(|s| filter.accepts(s.kind())).collect();

    let results = futures::future::join_all(eligible.iter().map(|s| s.fetch())).await;

    let mut outcome = FetchOutcome::default();
    let mut seen = HashSet::new();

    for (source, result) in eligible.iter().zip(results) {
        match result {
            Ok(candidates) => {
                let mut fresh = 0usize;
                for candidate in candidates {
                    if seen.insert(candidate.dedup_key()) {
                        outcome.candidates.push(candidate);
                        fresh += 1;
                    }
                }
                info!(source = source.id(), count = fresh, "Fetched candidates");
            }
            Err(e) => {
                warn!(source = source.id(), "Source fetch failed: {}", e);
                outcome.source_errors.push(SourceError {
                    source_id: source.id().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShepherdError;
    use crate::models::ProxyProtocol;

    struct StaticSource {
        id: String,
        kind: SourceKind,
        addresses: Vec<&'static str>,
        fail: bool,
    }

    #[async_trait]
    impl ProxySource for StaticSource {
        fn id(&self) -> &str {
            &self.id
        }

        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn fetch(&self) -> Result<Vec<Candidate>> {
            if self.fail {
                return Err(ShepherdError::SourceUnavailable {
                    source_id: self.id.clone(),
                    reason: "boom".to_string(),
                });
            }
            Ok(self
                .addresses
                .iter()
                .map(|address| Candidate {
                    address: address.to_string(),
                    protocol: ProxyProtocol::Http,
                    source_id: self.id.clone(),
                    username: None,
                    password: None,
                })
                .collect())
        }
    }

    fn source(
        id: &str,
        kind: SourceKind,
        addresses: Vec<&'static str>,
        fail: bool,
    ) -> Box<dyn ProxySource> {
        Box::new(StaticSource {
            id: id.to_string(),
            kind,
            addresses,
            fail,
        })
    }

    #[test]
    fn test_source_filter_parsing() {
        assert_eq!(SourceFilter::from_str("all"), Some(SourceFilter::All));
        assert_eq!(SourceFilter::from_str("API"), Some(SourceFilter::Api));
        assert_eq!(SourceFilter::from_str("file"), Some(SourceFilter::File));
        assert_eq!(SourceFilter::from_str("database"), None);
    }

    #[test]
    fn test_source_filter_accepts() {
        assert!(SourceFilter::All.accepts(SourceKind::Api));
        assert!(SourceFilter::All.accepts(SourceKind::File));
        assert!(SourceFilter::Api.accepts(SourceKind::Api));
        assert!(!SourceFilter::Api.accepts(SourceKind::File));
        assert!(!SourceFilter::File.accepts(SourceKind::Api));
    }

    #[tokio::test]
    async fn test_fetch_deduplicates_across_sources() {
        let sources = vec![
            source(
                "file:a",
                SourceKind::File,
                vec!["10.0.0.1:80", "10.0.0.2:80"],
                false,
            ),
            source(
                "file:b",
                SourceKind::File,
                vec!["10.0.0.2:80", "10.0.0.3:80"],
                false,
            ),
        ];

        let outcome = fetch_candidates(&sources, SourceFilter::All).await;
        assert_eq!(outcome.candidates.len(), 3);
        assert!(outcome.source_errors.is_empty());

        // First source wins the duplicate.
        let dup = outcome
            .candidates
            .iter()
            .find(|c| c.address == "10.0.0.2:80")
            .unwrap();
        assert_eq!(dup.source_id, "file:a");
    }

    #[tokio::test]
    async fn test_broken_source_is_not_fatal() {
        let sources = vec![
            source("api:down", SourceKind::Api, vec![], true),
            source("file:ok", SourceKind::File, vec!["10.0.0.1:80"], false),
        ];

        let outcome = fetch_candidates(&sources, SourceFilter::All).await;
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.source_errors.len(), 1);
        assert_eq!(outcome.source_errors[0].source_id, "api:down");
    }

    #[tokio::test]
    async fn test_filter_restricts_kinds() {
        let sources = vec![
            source("api:x", SourceKind::Api, vec!["10.0.0.1:80"], false),
            source("file:y", SourceKind::File, vec!["10.0.0.2:80"], false),
        ];

        let outcome = fetch_candidates(&sources, SourceFilter::File).await;
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].source_id, "file:y");
    }
}
