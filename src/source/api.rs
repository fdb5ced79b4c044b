//! Provider API source
//!
//! Issues an authenticated GET against a third-party proxy provider and
//! maps its untyped JSON response into candidates via configured field
//! paths. Provider payload shapes vary wildly; everything here is
//! defensive lookups over `serde_json::Value`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{ProxySource, SourceKind};
use crate::config::ApiSourceConfig;
use crate::error::{Result, ShepherdError};
use crate::models::Candidate;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Wrapper keys tried when no items_field is configured and the response
/// root is not itself an array.
const ITEM_WRAPPER_KEYS: &[&str] = &["data", "list", "items", "proxies"];

pub struct ApiSource {
    id: String,
    config: ApiSourceConfig,
    client: reqwest::Client,
}

impl ApiSource {
    pub fn new(id: String, config: ApiSourceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { id, config, client }
    }

    fn unavailable(&self, reason: impl Into<String>) -> ShepherdError {
        ShepherdError::SourceUnavailable {
            source_id: self.id.clone(),
            reason: reason.into(),
        }
    }

    /// Map a provider response body into candidates
    fn candidates_from_json(&self, body: &Value) -> Result<Vec<Candidate>> {
        let items = locate_items(body, self.config.items_field.as_deref())
            .ok_or_else(|| self.unavailable("response contained no item list"))?;

        let mut candidates = Vec::with_capacity(items.len());
        let mut skipped = 0usize;

        for item in items {
            let Some(ip) = lookup(item, &self.config.ip_field).and_then(Value::as_str) else {
                skipped += 1;
                continue;
            };
            let Some(port) = lookup(item, &self.config.port_field).and_then(port_value) else {
                skipped += 1;
                continue;
            };

            let username = self
                .config
                .username_field
                .as_deref()
                .and_then(|field| lookup(item, field))
                .and_then(Value::as_str)
                .map(str::to_string);
            let password = self
                .config
                .password_field
                .as_deref()
                .and_then(|field| lookup(item, field))
                .and_then(Value::as_str)
                .map(str::to_string);

            candidates.push(Candidate {
                address: format!("{}:{}", ip, port),
                protocol: self.config.protocol,
                source_id: self.id.clone(),
                username,
                password,
            });
        }

        if skipped > 0 {
            debug!(source = %self.id, skipped, "Skipped malformed items");
        }

        Ok(candidates)
    }
}

#[async_trait]
impl ProxySource for ApiSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Api
    }

    async fn fetch(&self) -> Result<Vec<Candidate>> {
        let mut request = self.client.get(&self.config.url);
        for (name, value) in &self.config.headers {
            request = request.header(name, value);
        }
        if !self.config.params.is_empty() {
            request = request.query(&self.config.params);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.unavailable(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.unavailable(format!("HTTP {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("invalid JSON response: {}", e)))?;

        self.candidates_from_json(&body)
    }
}

/// Find the item array: configured path, root array, or a wrapper key
fn locate_items<'a>(body: &'a Value, items_field: Option<&str>) -> Option<&'a Vec<Value>> {
    if let Some(path) = items_field {
        return lookup(body, path).and_then(Value::as_array);
    }
    if let Some(items) = body.as_array() {
        return Some(items);
    }
    ITEM_WRAPPER_KEYS
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_array))
}

/// Resolve a dotted field path within a JSON value
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |v, key| v.get(key))
}

/// Ports arrive as numbers or strings depending on the provider
fn port_value(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProxyProtocol;
    use serde_json::json;
    use std::collections::HashMap;

    fn api_source(config: ApiSourceConfig) -> ApiSource {
        ApiSource::new("api:test".to_string(), config)
    }

    fn base_config() -> ApiSourceConfig {
        ApiSourceConfig {
            url: "https://provider.example/v1/proxies".to_string(),
            headers: HashMap::new(),
            params: HashMap::new(),
            items_field: None,
            ip_field: "ip".to_string(),
            port_field: "port".to_string(),
            username_field: None,
            password_field: None,
            protocol: ProxyProtocol::Http,
        }
    }

    #[test]
    fn test_root_array_response() {
        let source = api_source(base_config());
        let body = json!([
            {"ip": "10.0.0.1", "port": 8080},
            {"ip": "10.0.0.2", "port": "3128"}
        ]);

        let candidates = source.candidates_from_json(&body).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].address, "10.0.0.1:8080");
        assert_eq!(candidates[1].address, "10.0.0.2:3128");
    }

    #[test]
    fn test_wrapped_response_with_conventional_key() {
        let source = api_source(base_config());
        let body = json!({"data": [{"ip": "10.0.0.1", "port": 8080}]});

        let candidates = source.candidates_from_json(&body).unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_configured_items_field_and_nested_paths() {
        let mut config = base_config();
        config.items_field = Some("result.proxies".to_string());
        config.ip_field = "conn.host".to_string();
        config.port_field = "conn.port".to_string();
        config.username_field = Some("auth.user".to_string());
        config.password_field = Some("auth.pass".to_string());
        let source = api_source(config);

        let body = json!({
            "result": {
                "proxies": [{
                    "conn": {"host": "10.0.0.1", "port": 8080},
                    "auth": {"user": "u", "pass": "p"}
                }]
            }
        });

        let candidates = source.candidates_from_json(&body).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].address, "10.0.0.1:8080");
        assert_eq!(candidates[0].username.as_deref(), Some("u"));
        assert_eq!(candidates[0].password.as_deref(), Some("p"));
    }

    #[test]
    fn test_malformed_items_skipped() {
        let source = api_source(base_config());
        let body = json!([
            {"ip": "10.0.0.1", "port": 8080},
            {"ip": "10.0.0.2"},
            {"port": 8080},
            {"ip": "10.0.0.3", "port": 99999}
        ]);

        let candidates = source.candidates_from_json(&body).unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_unrecognizable_shape_is_source_unavailable() {
        let source = api_source(base_config());
        let body = json!({"message": "quota exceeded"});

        let err = source.candidates_from_json(&body).unwrap_err();
        assert!(matches!(err, ShepherdError::SourceUnavailable { .. }));
    }

    #[test]
    fn test_empty_list_is_zero_candidates_not_an_error() {
        let source = api_source(base_config());
        let body = json!({"data": []});

        let candidates = source.candidates_from_json(&body).unwrap();
        assert!(candidates.is_empty());
    }
}
