use crate::{GitHubConfig, Result};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::{ACCEPT, LINK};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use usersearch_engine::{FetchError, PageFetcher, PageRequest};
use usersearch_protocol::{ApiErrorBody, FetchedPage, PaginationMeta, SearchUsersResponse, User};

const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const GITHUB_JSON: &str = "application/vnd.github+json";

/// Fetches pages of `GET /search/users`.
#[derive(Debug, Clone)]
pub struct GitHubUserFetcher {
    client: Client,
    config: GitHubConfig,
    search_url: String,
}

impl GitHubUserFetcher {
    pub fn new(config: GitHubConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()?;
        let search_url = config.search_users_url();
        Ok(Self {
            client,
            config,
            search_url,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &GitHubConfig {
        &self.config
    }

    async fn request(&self, request: &PageRequest) -> std::result::Result<FetchedPage<User>, FetchError> {
        let mut params = vec![
            ("q", request.query.as_str().to_string()),
            ("page", request.page.to_string()),
        ];
        if let Some(per_page) = self.config.per_page {
            params.push(("per_page", per_page.to_string()));
        }

        let response = self
            .client
            .get(&self.search_url)
            .header(ACCEPT, GITHUB_JSON)
            .header(API_VERSION_HEADER, &self.config.api_version)
            .query(&params)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status().as_u16();
        let link = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await.map_err(network_error)?;

        decode_search_response(status, link, &body)
    }
}

#[async_trait]
impl PageFetcher for GitHubUserFetcher {
    type Item = User;

    async fn fetch_page(
        &self,
        request: PageRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<FetchedPage<User>, FetchError> {
        info!(
            "GitHub search for \"{}\", page {}",
            request.query, request.page
        );
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("GitHub search for \"{}\" page {} aborted", request.query, request.page);
                Err(FetchError::Cancelled)
            }
            outcome = self.request(&request) => outcome,
        }
    }
}

/// Turns a raw `/search/users` response into a page for the cursor protocol.
///
/// Non-success statuses surface GitHub's `message` field. Success bodies must
/// match [`SearchUsersResponse`] exactly; anything else is malformed.
pub fn decode_search_response(
    status: u16,
    link: Option<String>,
    body: &[u8],
) -> std::result::Result<FetchedPage<User>, FetchError> {
    if !(200..300).contains(&status) {
        let message = serde_json::from_slice::<ApiErrorBody>(body)
            .map(|err| err.message)
            .unwrap_or_else(|_| format!("GitHub responded with HTTP {status}"));
        return Err(FetchError::Status { status, message });
    }

    let parsed: SearchUsersResponse =
        serde_json::from_slice(body).map_err(|err| FetchError::Malformed(err.to_string()))?;
    if parsed.incomplete_results {
        debug!("GitHub reported incomplete results for this page");
    }

    Ok(FetchedPage::new(parsed.items, PaginationMeta::LinkHeader(link))
        .with_total_count(parsed.total_count))
}

fn network_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Network(format!("request timed out: {err}"))
    } else {
        FetchError::Network(err.to_string())
    }
}
