use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use usersearch_engine::{FetchError, PageFetcher, PageRequest};
use usersearch_protocol::{FetchedPage, PageToken, PaginationMeta, User};

pub const DEFAULT_MOCK_LAST_PAGE: u32 = 10;
pub const DEFAULT_MOCK_PAGE_SIZE: u32 = 30;

/// Offline stand-in for the GitHub transport.
///
/// Every query yields `last_page` pages of synthetic users. Ids are offset by
/// page, so identities never repeat across pages.
#[derive(Debug)]
pub struct MockUserFetcher {
    last_page: u32,
    page_size: u32,
    latency: Duration,
    failures: Mutex<HashMap<u32, FetchError>>,
}

impl Default for MockUserFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockUserFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_page: DEFAULT_MOCK_LAST_PAGE,
            page_size: DEFAULT_MOCK_PAGE_SIZE,
            latency: Duration::ZERO,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Page 0 is treated as 1.
    #[must_use]
    pub fn with_last_page(mut self, last_page: u32) -> Self {
        self.last_page = last_page.max(1);
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Simulated round-trip time per request.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fails the next request for `page` with `err`. Later requests succeed.
    #[must_use]
    pub fn fail_page(self, page: u32, err: FetchError) -> Self {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(page, err);
        self
    }

    fn take_failure(&self, page: u32) -> Option<FetchError> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&page)
    }

    fn build_page(&self, request: &PageRequest) -> FetchedPage<User> {
        let page = request.page.get();
        if page > self.last_page {
            return FetchedPage::new(Vec::new(), PaginationMeta::Explicit(None))
                .with_total_count(self.total_count());
        }

        let first_id = u64::from(page - 1) * u64::from(self.page_size) + 1;
        let items = (0..u64::from(self.page_size))
            .map(|offset| mock_user(request.query.as_str(), first_id + offset))
            .collect();
        let next = if page < self.last_page {
            request.page.next()
        } else {
            None
        };
        FetchedPage::new(items, PaginationMeta::Explicit(next)).with_total_count(self.total_count())
    }

    fn total_count(&self) -> u64 {
        u64::from(self.last_page) * u64::from(self.page_size)
    }
}

#[async_trait]
impl PageFetcher for MockUserFetcher {
    type Item = User;

    async fn fetch_page(
        &self,
        request: PageRequest,
        cancel: CancellationToken,
    ) -> Result<FetchedPage<User>, FetchError> {
        debug!(
            "mock search for \"{}\", page {}",
            request.query, request.page
        );
        if !self.latency.is_zero() {
            tokio::select! {
                () = cancel.cancelled() => return Err(FetchError::Cancelled),
                () = tokio::time::sleep(self.latency) => {}
            }
        }
        if let Some(err) = self.take_failure(request.page.get()) {
            return Err(err);
        }
        Ok(self.build_page(&request))
    }
}

fn mock_user(query: &str, id: u64) -> User {
    let login = format!("{}-{id}", query.replace(char::is_whitespace, "-"));
    let api = format!("https://api.github.com/users/{login}");
    User {
        node_id: format!("MOCK{id:08}"),
        avatar_url: format!("https://avatars.githubusercontent.com/u/{id}?v=4"),
        gravatar_id: Some(String::new()),
        html_url: format!("https://github.com/{login}"),
        followers_url: format!("{api}/followers"),
        following_url: format!("{api}/following{{/other_user}}"),
        gists_url: format!("{api}/gists{{/gist_id}}"),
        starred_url: format!("{api}/starred{{/owner}}{{/repo}}"),
        subscriptions_url: format!("{api}/subscriptions"),
        organizations_url: format!("{api}/orgs"),
        repos_url: format!("{api}/repos"),
        events_url: format!("{api}/events{{/privacy}}"),
        received_events_url: format!("{api}/received_events"),
        kind: if id % 4 == 0 { "Organization" } else { "User" }.to_string(),
        user_view_type: "public".to_string(),
        site_admin: id % 10 == 0,
        score: 1.0,
        url: api,
        login,
        id,
    }
}
