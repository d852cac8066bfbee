//! # User Search Protocol
//!
//! Types shared between the query engine, the fetch collaborators and the CLI.
//!
//! - [`SearchItem`]: the only thing the engine needs to know about a result item
//!   (a stable identity).
//! - [`User`] / [`SearchUsersResponse`] / [`ApiErrorBody`]: the GitHub
//!   `GET /search/users` payloads.
//! - [`pagination`]: the cursor protocol that turns transport-level pagination
//!   metadata into the next page token.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;

pub mod metadata;
pub mod pagination;

pub use metadata::UsersMetadata;
pub use pagination::{derive_next_token, parse_link_next, FetchedPage, PageToken, PaginationMeta};

pub const GITHUB_API_URL: &str = "https://api.github.com";
pub const GITHUB_API_VERSION: &str = "2022-11-28";

/// An item the engine can accumulate into a result set.
///
/// Only identity is required: it drives de-duplication when pages are appended.
pub trait SearchItem: Clone + Send + Sync + 'static {
    type Id: Eq + Hash + Clone + Debug + Send + Sync;

    fn item_id(&self) -> Self::Id;
}

/// The subset of GitHub's search user schema we consume.
///
/// Deserialisation is strict: a missing required field makes the whole page
/// malformed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    pub login: String,
    pub id: u64,
    pub node_id: String,
    pub avatar_url: String,
    #[serde(default)]
    pub gravatar_id: Option<String>,
    pub url: String,
    pub html_url: String,
    pub followers_url: String,
    pub following_url: String,
    pub gists_url: String,
    pub starred_url: String,
    pub subscriptions_url: String,
    pub organizations_url: String,
    pub repos_url: String,
    pub events_url: String,
    pub received_events_url: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub user_view_type: String,
    pub site_admin: bool,
    pub score: f64,
}

impl User {
    #[must_use]
    pub fn is_organization(&self) -> bool {
        self.kind == "Organization"
    }

    #[must_use]
    pub fn is_regular_user(&self) -> bool {
        self.kind == "User"
    }
}

impl SearchItem for User {
    type Id = u64;

    fn item_id(&self) -> u64 {
        self.id
    }
}

/// Success body of `GET /search/users`. Pagination is carried by the `Link`
/// header, not by the body.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SearchUsersResponse {
    pub total_count: u64,
    pub incomplete_results: bool,
    pub items: Vec<User>,
}

/// Error body GitHub returns alongside non-success statuses.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ApiErrorBody {
    pub message: String,
    #[serde(default)]
    pub documentation_url: Option<String>,
}
