use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Admission control settings for the bounded requester
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequesterConfig {
    /// Maximum simultaneous outstanding queries against the raw transport
    #[serde(default = "default_concurrent_limit")]
    pub concurrent_limit: usize,
    /// Per-request wall-clock budget in milliseconds, measured from dispatch
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_concurrent_limit() -> usize {
    5
}

fn default_timeout_ms() -> u64 {
    240_000
}

impl RequesterConfig {
    pub fn new() -> Self {
        Self {
            concurrent_limit: default_concurrent_limit(),
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn with_concurrent_limit(mut self, limit: usize) -> Self {
        self.concurrent_limit = limit;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

impl Default for RequesterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Declarative description of an external source, consumed by the factory
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExternalDescription {
    /// Engine identifier, e.g. "clickhouse"
    pub engine: String,
    /// Backing table or dataset name
    pub source: String,
    /// Engine-specific options, passed through opaquely
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl ExternalDescription {
    pub fn new(engine: &str, source: &str) -> Self {
        Self {
            engine: engine.to_string(),
            source: source.to_string(),
            options: HashMap::new(),
        }
    }

    pub fn with_option(mut self, key: &str, value: &str) -> Self {
        self.options.insert(key.to_string(), value.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requester_config_defaults() {
        let config = RequesterConfig::default();
        assert_eq!(config.concurrent_limit, 5);
        assert_eq!(config.timeout_ms, 240_000);
    }

    #[test]
    fn test_requester_config_builder() {
        let config = RequesterConfig::new()
            .with_concurrent_limit(2)
            .with_timeout_ms(1_000);
        assert_eq!(config.concurrent_limit, 2);
        assert_eq!(config.timeout_ms, 1_000);
    }

    #[test]
    fn test_requester_config_deserialize_defaults() {
        let config: RequesterConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.concurrent_limit, 5);
        assert_eq!(config.timeout_ms, 240_000);
    }

    #[test]
    fn test_external_description_builder() {
        let desc = ExternalDescription::new("clickhouse", "wiki_events")
            .with_option("default_limit", "10000");
        assert_eq!(desc.engine, "clickhouse");
        assert_eq!(desc.source, "wiki_events");
        assert_eq!(desc.options.get("default_limit"), Some(&"10000".to_string()));
    }
}
