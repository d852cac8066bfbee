use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// GitHub rejects search queries longer than this.
pub const DEFAULT_MAX_QUERY_CHARS: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Quiet period before raw input is committed as a query.
    pub debounce_ms: u64,
    pub max_query_chars: usize,
    /// Strip surrounding whitespace before validating and comparing queries.
    pub trim_input: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2_000,
            max_query_chars: DEFAULT_MAX_QUERY_CHARS,
            trim_input: true,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_query_chars == 0 {
            return Err(EngineError::Config(
                "max_query_chars must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
