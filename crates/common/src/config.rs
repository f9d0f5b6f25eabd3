//! Common configuration types for the live-class room crates.

use serde::{Deserialize, Serialize};

/// Default `EnvFilter` directive used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "room_session=info";

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Fallback `EnvFilter` directive (used when `RUST_LOG` is absent)
    pub log_filter: String,
    /// Enable JSON-formatted logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            json_logs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_text_logging() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
        assert!(!config.json_logs);
    }
}
