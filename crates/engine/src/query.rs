use crate::{EngineConfig, ValidationError};
use std::fmt;
use std::sync::Arc;

/// A committed, validated search term. Cheap to clone; never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query(Arc<str>);

impl Query {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Query {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryValidator {
    max_chars: usize,
    trim: bool,
}

impl Default for QueryValidator {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl QueryValidator {
    #[must_use]
    pub const fn new(max_chars: usize, trim: bool) -> Self {
        Self { max_chars, trim }
    }

    #[must_use]
    pub const fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_query_chars, config.trim_input)
    }

    pub fn validate(&self, raw: &str) -> Result<Query, ValidationError> {
        let candidate = if self.trim { raw.trim() } else { raw };
        if candidate.is_empty() {
            return Err(ValidationError::Empty);
        }
        if candidate.chars().any(char::is_control) {
            return Err(ValidationError::ControlCharacters);
        }
        let actual = candidate.chars().count();
        if actual > self.max_chars {
            return Err(ValidationError::TooLong {
                max: self.max_chars,
                actual,
            });
        }
        Ok(Query(Arc::from(candidate)))
    }
}
