use thiserror::Error;

pub type Result<T> = std::result::Result<T, GitHubError>;

#[derive(Error, Debug)]
pub enum GitHubError {
    #[error("Invalid GitHub configuration: {0}")]
    Config(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
