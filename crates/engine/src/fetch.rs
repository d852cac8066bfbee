use crate::{FetchError, Query};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use usersearch_protocol::{FetchedPage, PageToken, SearchItem};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub query: Query,
    pub page: PageToken,
}

/// Performs one page fetch for the orchestrator.
///
/// Implementations should stop work once `cancel` fires. Whatever they return
/// after that point is discarded.
#[async_trait]
pub trait PageFetcher: Send + Sync + 'static {
    type Item: SearchItem;

    async fn fetch_page(
        &self,
        request: PageRequest,
        cancel: CancellationToken,
    ) -> Result<FetchedPage<Self::Item>, FetchError>;
}

/// Runs a fetch, resolving to [`FetchError::Cancelled`] as soon as `cancel`
/// fires even if the collaborator ignores the token.
pub async fn fetch_until_cancelled<F: PageFetcher + ?Sized>(
    fetcher: &F,
    request: PageRequest,
    cancel: CancellationToken,
) -> Result<FetchedPage<F::Item>, FetchError> {
    tokio::select! {
        () = cancel.cancelled() => Err(FetchError::Cancelled),
        outcome = fetcher.fetch_page(request, cancel.clone()) => outcome,
    }
}
