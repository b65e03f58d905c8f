//! # Engine Configuration
//!
//! Tunables of the transaction engine. Loaded as the `[engine]` table of the
//! API's TOML file; every field has a default so an empty table is valid.
//!
//! ```toml
//! [engine]
//! pending_ttl_secs = 120     # age after which a pending guard record is stale
//! max_batch_events = 200     # events accepted by one push call
//! pull_page_limit = 500      # records per collection per pull page
//! ledger_retry_limit = 5     # optimistic append attempts before Contention
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// A pending idempotency record younger than this is "in progress";
    /// older ones are taken over.
    #[serde(default = "default_pending_ttl")]
    pub pending_ttl_secs: u64,

    #[serde(default = "default_max_batch_events")]
    pub max_batch_events: usize,

    #[serde(default = "default_pull_page_limit")]
    pub pull_page_limit: usize,

    #[serde(default = "default_ledger_retry_limit")]
    pub ledger_retry_limit: u32,
}

fn default_pending_ttl() -> u64 {
    120
}

fn default_max_batch_events() -> usize {
    200
}

fn default_pull_page_limit() -> usize {
    500
}

fn default_ledger_retry_limit() -> u32 {
    5
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            pending_ttl_secs: default_pending_ttl(),
            max_batch_events: default_max_batch_events(),
            pull_page_limit: default_pull_page_limit(),
            ledger_retry_limit: default_ledger_retry_limit(),
        }
    }
}

impl EngineConfig {
    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_secs)
    }

    /// Returns the name of the first field holding an unusable value.
    pub fn invalid_field(&self) -> Option<&'static str> {
        if self.max_batch_events == 0 {
            Some("engine.max_batch_events")
        } else if self.pull_page_limit == 0 {
            Some("engine.pull_page_limit")
        } else if self.ledger_retry_limit == 0 {
            Some("engine.ledger_retry_limit")
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table_uses_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.pending_ttl(), Duration::from_secs(120));
        assert_eq!(config.max_batch_events, 200);
        assert_eq!(config.pull_page_limit, 500);
        assert_eq!(config.ledger_retry_limit, 5);
    }

    #[test]
    fn test_partial_override() {
        let config: EngineConfig = toml::from_str("pull_page_limit = 50").unwrap();
        assert_eq!(config.pull_page_limit, 50);
        assert_eq!(config.max_batch_events, 200);
        assert!(config.invalid_field().is_none());

        let zero: EngineConfig = toml::from_str("ledger_retry_limit = 0").unwrap();
        assert_eq!(zero.invalid_field(), Some("engine.ledger_retry_limit"));
    }
}
