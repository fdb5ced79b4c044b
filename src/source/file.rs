//! Static file source: newline list or JSON array of host:port entries

use async_trait::async_trait;
use tracing::debug;

use super::{ProxySource, SourceKind};
use crate::config::FileSourceConfig;
use crate::error::{Result, ShepherdError};
use crate::models::Candidate;

pub struct FileSource {
    id: String,
    config: FileSourceConfig,
}

impl FileSource {
    pub fn new(id: String, config: FileSourceConfig) -> Self {
        Self { id, config }
    }

    fn parse_entries(&self, raw: &str) -> Result<Vec<String>> {
        let trimmed = raw.trim_start();
        if trimmed.starts_with('[') {
            let entries: Vec<String> = serde_json::from_str(raw).map_err(|e| {
                ShepherdError::SourceUnavailable {
                    source_id: self.id.clone(),
                    reason: format!("invalid JSON list: {}", e),
                }
            })?;
            Ok(entries)
        } else {
            Ok(raw
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string)
                .collect())
        }
    }
}

/// A well-formed entry is host:port with a parsable port
fn is_valid_entry(entry: &str) -> bool {
    match entry.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

#[async_trait]
impl ProxySource for FileSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    async fn fetch(&self) -> Result<Vec<Candidate>> {
        let raw = tokio::fs::read_to_string(&self.config.path)
            .await
            .map_err(|e| ShepherdError::SourceUnavailable {
                source_id: self.id.clone(),
                reason: format!("cannot read {}: {}", self.config.path.display(), e),
            })?;

        let entries = self.parse_entries(&raw)?;
        let mut candidates = Vec::with_capacity(entries.len());
        let mut skipped = 0usize;

        for entry in entries {
            if !is_valid_entry(&entry) {
                skipped += 1;
                continue;
            }
            candidates.push(Candidate {
                address: entry,
                protocol: self.config.protocol,
                source_id: self.id.clone(),
                username: None,
                password: None,
            });
        }

        if skipped > 0 {
            debug!(source = %self.id, skipped, "Skipped malformed entries");
        }

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProxyProtocol;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    static FILE_SEQ: AtomicU32 = AtomicU32::new(0);

    fn write_temp(contents: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "shepherd-file-source-{}-{}.txt",
            std::process::id(),
            FILE_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn file_source(path: PathBuf) -> FileSource {
        FileSource::new(
            format!("file:{}", path.display()),
            FileSourceConfig {
                path,
                protocol: ProxyProtocol::Http,
            },
        )
    }

    #[tokio::test]
    async fn test_newline_list() {
        let path = write_temp("10.0.0.1:8080\n\n# comment\n10.0.0.2:3128\n");
        let source = file_source(path.clone());

        let candidates = source.fetch().await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].address, "10.0.0.1:8080");
        assert_eq!(candidates[1].address, "10.0.0.2:3128");
        assert_eq!(candidates[0].protocol, ProxyProtocol::Http);

        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_json_list() {
        let path = write_temp(r#"["10.0.0.1:8080", "10.0.0.2:3128"]"#);
        let source = file_source(path.clone());

        let candidates = source.fetch().await.unwrap();
        assert_eq!(candidates.len(), 2);

        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_malformed_entries_skipped() {
        let path = write_temp("10.0.0.1:8080\nnot-an-address\n10.0.0.2:notaport\n:9999\n");
        let source = file_source(path.clone());

        let candidates = source.fetch().await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].address, "10.0.0.1:8080");

        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_is_source_unavailable() {
        let source = file_source(PathBuf::from("/nonexistent/proxies.txt"));
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, ShepherdError::SourceUnavailable { .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_invalid_json_list_is_source_unavailable() {
        let path = write_temp(r#"["10.0.0.1:8080", 42]"#);
        let source = file_source(path.clone());

        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, ShepherdError::SourceUnavailable { .. }));

        std::fs::remove_file(path).unwrap();
    }
}
