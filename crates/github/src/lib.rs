//! # User Search GitHub transport
//!
//! [`PageFetcher`](usersearch_engine::PageFetcher) implementations for
//! GitHub's user search:
//!
//! - [`GitHubUserFetcher`]: `GET {api_url}/search/users?q=..&page=..` over
//!   reqwest; hands the `Link` header to the cursor protocol.
//! - [`MockUserFetcher`]: deterministic offline pages with optional injected
//!   failures.

mod client;
mod config;
mod error;
mod mock;

pub use client::{decode_search_response, GitHubUserFetcher};
pub use config::{GitHubConfig, MAX_PER_PAGE};
pub use error::{GitHubError, Result};
pub use mock::{MockUserFetcher, DEFAULT_MOCK_LAST_PAGE, DEFAULT_MOCK_PAGE_SIZE};
