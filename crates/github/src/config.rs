use crate::{GitHubError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use usersearch_protocol::{GITHUB_API_URL, GITHUB_API_VERSION};

/// GitHub caps `per_page` for search endpoints at this value.
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GitHubConfig {
    pub api_url: String,
    /// Sent as `X-GitHub-Api-Version`.
    pub api_version: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    /// Left to the server default when unset.
    pub per_page: Option<u32>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: GITHUB_API_URL.to_string(),
            api_version: GITHUB_API_VERSION.to_string(),
            user_agent: concat!("usersearch/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_ms: 10_000,
            per_page: None,
        }
    }
}

impl GitHubConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// `{api_url}/search/users`, tolerating a trailing slash in `api_url`.
    #[must_use]
    pub fn search_users_url(&self) -> String {
        format!("{}/search/users", self.api_url.trim_end_matches('/'))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.api_url.starts_with("https://") || self.api_url.starts_with("http://")) {
            return Err(GitHubError::Config(format!(
                "api_url must be an http(s) URL, got '{}'",
                self.api_url
            )));
        }
        if self.api_version.trim().is_empty() {
            return Err(GitHubError::Config("api_version is empty".to_string()));
        }
        if self.user_agent.trim().is_empty() {
            return Err(GitHubError::Config("user_agent is empty".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(GitHubError::Config(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(per_page) = self.per_page {
            if per_page == 0 || per_page > MAX_PER_PAGE {
                return Err(GitHubError::Config(format!(
                    "per_page must be within 1..={MAX_PER_PAGE}, got {per_page}"
                )));
            }
        }
        Ok(())
    }
}
