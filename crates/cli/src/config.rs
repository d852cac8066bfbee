use anyhow::{Context as AnyhowContext, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use usersearch_engine::{EngineConfig, PageFetcher};
use usersearch_github::{GitHubConfig, GitHubUserFetcher, MockUserFetcher};
use usersearch_protocol::User;

/// Which transport answers page requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetcherKind {
    #[default]
    Github,
    Mock,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub github: GitHubConfig,
    pub fetcher: FetcherKind,
}

impl AppConfig {
    /// Reads `path` when given; otherwise every section takes its defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self =
            toml::from_str(&raw).with_context(|| format!("Invalid {}", path.display()))?;
        Ok(config)
    }

    /// Command-line flags win over the file.
    pub fn apply_overrides(&mut self, mock: bool, debounce_ms: Option<u64>) {
        if mock {
            self.fetcher = FetcherKind::Mock;
        }
        if let Some(ms) = debounce_ms {
            self.engine.debounce_ms = ms;
        }
    }

    pub fn build_fetcher(&self) -> Result<Arc<dyn PageFetcher<Item = User>>> {
        match self.fetcher {
            FetcherKind::Github => {
                let fetcher = GitHubUserFetcher::new(self.github.clone())
                    .context("Failed to set up the GitHub transport")?;
                Ok(Arc::new(fetcher))
            }
            FetcherKind::Mock => {
                warn!("Using mock data instead of the GitHub API");
                Ok(Arc::new(MockUserFetcher::new()))
            }
        }
    }
}
