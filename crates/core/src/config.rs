//! Store configuration
//!
//! All settings are runtime-adjustable named values, not compiled constants.
//! `max_size` is the per-host default; each host persists its own effective
//! budget in its descriptor and may change it at runtime (taking effect on
//! the next cleanup pass).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime-adjustable settings for one host store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Default per-host retained-bytes budget.
    pub max_size: u64,
    /// Maximum size of a single segment file.
    pub file_size: u64,
    /// Soft search budget, milliseconds: a scan stops here once it has
    /// produced at least one result.
    pub soft_budget_ms: u64,
    /// Hard search budget, milliseconds: a scan stops here regardless of
    /// result count.
    pub hard_budget_ms: u64,
    /// Stack frames kept when rendering exception info in search results.
    pub stack_depth_limit: usize,
    /// Attribute values longer than this are truncated in search results.
    pub attr_value_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_size: 1024 * 1024 * 1024,
            file_size: 16 * 1024 * 1024,
            soft_budget_ms: 2_000,
            hard_budget_ms: 5_000,
            stack_depth_limit: 10,
            attr_value_limit: 250,
        }
    }
}

impl StoreConfig {
    /// Soft search budget as a [`Duration`].
    pub fn soft_budget(&self) -> Duration {
        Duration::from_millis(self.soft_budget_ms)
    }

    /// Hard search budget as a [`Duration`].
    pub fn hard_budget(&self) -> Duration {
        Duration::from_millis(self.hard_budget_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.max_size, 1024 * 1024 * 1024);
        assert!(cfg.soft_budget() < cfg.hard_budget());
    }

    #[test]
    fn test_json_roundtrip() {
        let cfg = StoreConfig {
            max_size: 4096,
            ..Default::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: StoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
