//! Query orchestration state machine.
//!
//! Synchronous and clock-free: every operation returns the fetch (if any) the
//! caller must issue, and fetch outcomes are fed back through
//! [`QueryOrchestrator::complete`]. [`crate::SearchSession`] drives it from a
//! tokio task.
//!
//! ```text
//! Idle ──set_query──> LoadingFirstPage ──ok──> Loaded ──load_next_page──> LoadingNextPage
//!  ^                        │                    ^                            │
//!  │                        └──err──> FirstPageError                          ├──ok──> Loaded
//!  └── set_query("") from any state                                          └──err──> NextPageError
//! ```

use crate::{FetchError, PageRequest, Query, QueryValidator, ResultSet, SearchSnapshot};
use crate::{FetchState, ValidationError};
use log::{debug, info};
use std::fmt;
use tokio_util::sync::CancellationToken;
use usersearch_protocol::{derive_next_token, FetchedPage, PageToken, SearchItem};

/// Identity of an issued fetch. Unique per orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    FirstPage,
    NextPage,
}

/// A fetch the caller must run and report back with the same `id`.
#[derive(Debug, Clone)]
pub struct FetchCommand {
    pub id: RequestId,
    pub kind: FetchKind,
    pub request: PageRequest,
    pub cancel: CancellationToken,
}

/// Whether a reported outcome changed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    /// The request had been superseded; the outcome was dropped silently.
    Discarded,
}

#[derive(Debug)]
struct InFlightRequest {
    id: RequestId,
    kind: FetchKind,
    page: PageToken,
    cancel: CancellationToken,
}

#[derive(Debug)]
pub struct QueryOrchestrator<T> {
    validator: QueryValidator,
    query: Option<Query>,
    state: FetchState<T>,
    next_page: Option<PageToken>,
    total_count: Option<u64>,
    rejected: Option<ValidationError>,
    in_flight: Option<InFlightRequest>,
    next_request_id: u64,
    revision: u64,
}

impl<T: SearchItem> QueryOrchestrator<T> {
    #[must_use]
    pub const fn new(validator: QueryValidator) -> Self {
        Self {
            validator,
            query: None,
            state: FetchState::Idle,
            next_page: None,
            total_count: None,
            rejected: None,
            in_flight: None,
            next_request_id: 1,
            revision: 0,
        }
    }

    /// Commits a query.
    ///
    /// Invalid input returns to `Idle`; an unchanged query is a no-op; anything
    /// else cancels the outstanding fetch, drops the old result set and starts
    /// over from the first page.
    pub fn set_query(&mut self, raw: &str) -> Option<FetchCommand> {
        let query = match self.validator.validate(raw) {
            Ok(query) => query,
            Err(err) => {
                debug!("query rejected: {err}");
                self.go_idle(Some(err));
                return None;
            }
        };

        if self.query.as_ref() == Some(&query) {
            debug!("query \"{query}\" unchanged, keeping current state");
            return None;
        }

        info!("searching for \"{query}\"");
        self.cancel_in_flight();
        self.query = Some(query.clone());
        self.next_page = None;
        self.total_count = None;
        self.rejected = None;
        self.transition(FetchState::LoadingFirstPage);
        Some(self.issue(FetchKind::FirstPage, query, PageToken::INITIAL))
    }

    /// Requests the page after the last loaded one. Only valid from `Loaded`
    /// with a known next token; a no-op otherwise.
    pub fn load_next_page(&mut self) -> Option<FetchCommand> {
        let FetchState::Loaded(results) = &self.state else {
            return None;
        };
        if self.in_flight.is_some() {
            return None;
        }
        let page = self.next_page?;
        let query = self.query.clone()?;

        let results = results.clone();
        self.transition(FetchState::LoadingNextPage(results));
        Some(self.issue(FetchKind::NextPage, query, page))
    }

    /// Re-issues the fetch that failed. Never called implicitly.
    pub fn retry(&mut self) -> Option<FetchCommand> {
        if self.in_flight.is_some() {
            return None;
        }
        let query = self.query.clone()?;
        match &self.state {
            FetchState::FirstPageError(_) => {
                self.transition(FetchState::LoadingFirstPage);
                Some(self.issue(FetchKind::FirstPage, query, PageToken::INITIAL))
            }
            FetchState::NextPageError(results, _) => {
                let page = self.next_page?;
                let results = results.clone();
                self.transition(FetchState::LoadingNextPage(results));
                Some(self.issue(FetchKind::NextPage, query, page))
            }
            _ => None,
        }
    }

    /// Applies the outcome of fetch `id` unless it has been superseded.
    pub fn complete(
        &mut self,
        id: RequestId,
        outcome: Result<FetchedPage<T>, FetchError>,
    ) -> Completion {
        if self.in_flight.as_ref().map(|request| request.id) != Some(id) {
            debug!("discarding stale completion {id}");
            return Completion::Discarded;
        }
        let Some(request) = self.in_flight.take() else {
            return Completion::Discarded;
        };

        match (request.kind, outcome) {
            (FetchKind::FirstPage, Ok(page)) => {
                self.next_page = derive_next_token(&page, request.page);
                self.total_count = page.total_count;
                self.transition(FetchState::Loaded(ResultSet::from_page(page.items)));
            }
            (FetchKind::NextPage, Ok(page)) => {
                self.next_page = derive_next_token(&page, request.page);
                if page.total_count.is_some() {
                    self.total_count = page.total_count;
                }
                let results = self.current_results().appended(page.items);
                self.transition(FetchState::Loaded(results));
            }
            (FetchKind::FirstPage, Err(err)) => {
                debug!("first page {id} failed: {err}");
                self.next_page = None;
                self.transition(FetchState::FirstPageError(err));
            }
            (FetchKind::NextPage, Err(err)) => {
                debug!("page {} ({id}) failed: {err}", request.page);
                let results = self.current_results();
                self.transition(FetchState::NextPageError(results, err));
            }
        }
        Completion::Applied
    }

    /// Raw input started a debounce cycle. Only an idle orchestrator shows it.
    pub fn begin_input(&mut self) -> bool {
        if matches!(self.state, FetchState::Idle) {
            self.transition(FetchState::Validating);
            return true;
        }
        false
    }

    /// The debounce cycle ended without a commit.
    pub fn abandon_input(&mut self) -> bool {
        if matches!(self.state, FetchState::Validating) {
            self.transition(FetchState::Idle);
            return true;
        }
        false
    }

    /// Cancels everything and returns to `Idle`.
    pub fn reset(&mut self) {
        self.go_idle(None);
    }

    #[must_use]
    pub fn snapshot(&self) -> SearchSnapshot<T> {
        SearchSnapshot {
            state: self.state.clone(),
            query: self.query.clone(),
            next_page: self.next_page,
            total_count: self.total_count,
            rejected: self.rejected.clone(),
            revision: self.revision,
        }
    }

    #[must_use]
    pub const fn state(&self) -> &FetchState<T> {
        &self.state
    }

    #[must_use]
    pub const fn query(&self) -> Option<&Query> {
        self.query.as_ref()
    }

    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn in_flight(&self) -> Option<(RequestId, FetchKind)> {
        self.in_flight
            .as_ref()
            .map(|request| (request.id, request.kind))
    }

    fn current_results(&self) -> ResultSet<T> {
        self.state.results().cloned().unwrap_or_default()
    }

    fn issue(&mut self, kind: FetchKind, query: Query, page: PageToken) -> FetchCommand {
        let id = RequestId(self.next_request_id);
        self.next_request_id += 1;
        let cancel = CancellationToken::new();
        debug!("issuing {kind:?} fetch {id} for \"{query}\" page {page}");
        self.in_flight = Some(InFlightRequest {
            id,
            kind,
            page,
            cancel: cancel.clone(),
        });
        FetchCommand {
            id,
            kind,
            request: PageRequest { query, page },
            cancel,
        }
    }

    fn cancel_in_flight(&mut self) {
        if let Some(request) = self.in_flight.take() {
            debug!("cancelling fetch {}", request.id);
            request.cancel.cancel();
        }
    }

    fn go_idle(&mut self, rejected: Option<ValidationError>) {
        self.cancel_in_flight();
        self.query = None;
        self.next_page = None;
        self.total_count = None;
        self.rejected = rejected;
        self.transition(FetchState::Idle);
    }

    fn transition(&mut self, state: FetchState<T>) {
        self.state = state;
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StateTag;
    use pretty_assertions::assert_eq;
    use usersearch_protocol::PaginationMeta;

    #[derive(Debug, Clone, PartialEq)]
    struct Hit(u32);

    impl SearchItem for Hit {
        type Id = u32;

        fn item_id(&self) -> u32 {
            self.0
        }
    }

    fn orchestrator() -> QueryOrchestrator<Hit> {
        QueryOrchestrator::new(QueryValidator::default())
    }

    fn page(ids: impl IntoIterator<Item = u32>, next: Option<u32>) -> FetchedPage<Hit> {
        FetchedPage::new(
            ids.into_iter().map(Hit).collect(),
            PaginationMeta::Explicit(next.and_then(PageToken::new)),
        )
    }

    fn ids(orch: &QueryOrchestrator<Hit>) -> Vec<u32> {
        orch.snapshot().items().iter().map(|hit| hit.0).collect()
    }

    fn loaded_with(ids: impl IntoIterator<Item = u32>, next: Option<u32>) -> QueryOrchestrator<Hit> {
        let mut orch = orchestrator();
        let first = orch.set_query("octocat").expect("first page fetch");
        assert_eq!(orch.complete(first.id, Ok(page(ids, next))), Completion::Applied);
        orch
    }

    #[test]
    fn first_page_then_next_page_scenario() {
        let mut orch = orchestrator();
        let first = orch.set_query("octocat").expect("fetch");
        assert_eq!(first.kind, FetchKind::FirstPage);
        assert_eq!(first.request.page, PageToken::INITIAL);
        assert_eq!(first.request.query.as_str(), "octocat");
        assert_eq!(orch.state().tag(), StateTag::LoadingFirstPage);

        orch.complete(first.id, Ok(page([1, 2], Some(2))));
        assert_eq!(orch.state().tag(), StateTag::Loaded);
        assert_eq!(ids(&orch), vec![1, 2]);
        assert_eq!(orch.snapshot().next_page, PageToken::new(2));

        let next = orch.load_next_page().expect("next page fetch");
        assert_eq!(next.kind, FetchKind::NextPage);
        assert_eq!(next.request.page, PageToken::new(2).expect("page"));
        assert_eq!(orch.state().tag(), StateTag::LoadingNextPage);
        assert_eq!(ids(&orch), vec![1, 2]);

        orch.complete(next.id, Ok(page([3], None)));
        assert_eq!(orch.state().tag(), StateTag::Loaded);
        assert_eq!(ids(&orch), vec![1, 2, 3]);

        let before = orch.snapshot();
        assert!(orch.load_next_page().is_none());
        assert!(orch.load_next_page().is_none());
        assert_eq!(orch.snapshot(), before);
    }

    #[test]
    fn same_query_twice_issues_one_fetch() {
        let mut orch = orchestrator();
        assert!(orch.set_query("octocat").is_some());
        let revision = orch.revision();
        assert!(orch.set_query("octocat").is_none());
        assert!(orch.set_query("  octocat ").is_none());
        assert_eq!(orch.revision(), revision);
    }

    #[test]
    fn superseded_first_page_is_discarded_in_any_order() {
        let mut orch = orchestrator();
        let a = orch.set_query("a").expect("a");
        let b = orch.set_query("b").expect("b");
        assert!(a.cancel.is_cancelled());
        assert!(!b.cancel.is_cancelled());

        assert_eq!(orch.complete(b.id, Ok(page([20], None))), Completion::Applied);
        assert_eq!(orch.complete(a.id, Ok(page([10], None))), Completion::Discarded);
        assert_eq!(ids(&orch), vec![20]);
        assert_eq!(orch.query().map(Query::as_str), Some("b"));

        let mut orch = orchestrator();
        let a = orch.set_query("a").expect("a");
        let b = orch.set_query("b").expect("b");
        assert_eq!(orch.complete(a.id, Ok(page([10], None))), Completion::Discarded);
        assert_eq!(orch.state().tag(), StateTag::LoadingFirstPage);
        orch.complete(b.id, Ok(page([20], None)));
        assert_eq!(ids(&orch), vec![20]);
    }

    #[test]
    fn superseded_next_page_does_not_leak_into_new_query() {
        let mut orch = loaded_with([1, 2], Some(2));
        let next = orch.load_next_page().expect("next");
        let fresh = orch.set_query("hubot").expect("fresh");
        assert!(next.cancel.is_cancelled());

        assert_eq!(orch.complete(next.id, Ok(page([3], None))), Completion::Discarded);
        assert_eq!(orch.state().tag(), StateTag::LoadingFirstPage);
        assert!(orch.snapshot().items().is_empty());

        orch.complete(fresh.id, Ok(page([7], None)));
        assert_eq!(ids(&orch), vec![7]);
    }

    #[test]
    fn append_order_is_fetch_order() {
        let mut orch = loaded_with([1, 2], Some(2));
        for (ids_in_page, next) in [(vec![3, 4], Some(3)), (vec![5], None)] {
            let cmd = orch.load_next_page().expect("next");
            orch.complete(cmd.id, Ok(page(ids_in_page, next)));
        }
        assert_eq!(ids(&orch), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn next_page_is_rejected_while_one_is_outstanding() {
        let mut orch = loaded_with([1], Some(2));
        let cmd = orch.load_next_page().expect("next");
        assert!(orch.load_next_page().is_none());
        assert_eq!(orch.in_flight(), Some((cmd.id, FetchKind::NextPage)));
    }

    #[test]
    fn next_page_failure_retains_results() {
        let mut orch = loaded_with(1..=10, Some(2));
        let cmd = orch.load_next_page().expect("next");
        orch.complete(cmd.id, Err(FetchError::Network("connection reset".into())));

        let snapshot = orch.snapshot();
        assert_eq!(snapshot.tag(), StateTag::NextPageError);
        assert_eq!(snapshot.items().len(), 10);
        assert_eq!(
            snapshot.error(),
            Some(&FetchError::Network("connection reset".into()))
        );
        assert!(orch.load_next_page().is_none());
        assert_eq!(orch.state().tag(), StateTag::NextPageError);
    }

    #[test]
    fn retry_reissues_failed_page() {
        let mut orch = loaded_with([1], Some(2));
        let cmd = orch.load_next_page().expect("next");
        orch.complete(
            cmd.id,
            Err(FetchError::Status {
                status: 403,
                message: "API rate limit exceeded".into(),
            }),
        );

        let retry = orch.retry().expect("retry");
        assert_eq!(retry.kind, FetchKind::NextPage);
        assert_eq!(retry.request.page, PageToken::new(2).expect("page"));
        assert_eq!(orch.state().tag(), StateTag::LoadingNextPage);
        assert!(orch.retry().is_none());

        orch.complete(retry.id, Ok(page([2], None)));
        assert_eq!(ids(&orch), vec![1, 2]);
    }

    #[test]
    fn first_page_failure_and_retry() {
        let mut orch = orchestrator();
        let cmd = orch.set_query("octocat").expect("fetch");
        orch.complete(cmd.id, Err(FetchError::Malformed("missing items".into())));
        assert_eq!(orch.state().tag(), StateTag::FirstPageError);
        assert!(orch.snapshot().items().is_empty());
        assert!(orch.load_next_page().is_none());
        assert!(orch.set_query("octocat").is_none());

        let retry = orch.retry().expect("retry");
        assert_eq!(retry.kind, FetchKind::FirstPage);
        assert_eq!(retry.request.page, PageToken::INITIAL);
        assert_eq!(orch.state().tag(), StateTag::LoadingFirstPage);
    }

    #[test]
    fn invalid_query_goes_idle_and_cancels() {
        let mut orch = orchestrator();
        let cmd = orch.set_query("octocat").expect("fetch");
        assert!(orch.set_query("   ").is_none());

        assert!(cmd.cancel.is_cancelled());
        let snapshot = orch.snapshot();
        assert_eq!(snapshot.tag(), StateTag::Idle);
        assert_eq!(snapshot.query, None);
        assert_eq!(snapshot.rejected, Some(ValidationError::Empty));
        assert_eq!(orch.complete(cmd.id, Ok(page([1], None))), Completion::Discarded);

        // Re-committing the earlier query after going idle fetches again.
        assert!(orch.set_query("octocat").is_some());
        assert_eq!(orch.snapshot().rejected, None);
    }

    #[test]
    fn too_long_query_never_reaches_fetch_layer() {
        let mut orch = QueryOrchestrator::<Hit>::new(QueryValidator::new(5, true));
        assert!(orch.set_query("octocat").is_none());
        assert_eq!(
            orch.snapshot().rejected,
            Some(ValidationError::TooLong { max: 5, actual: 7 })
        );
        assert_eq!(orch.in_flight(), None);
    }

    #[test]
    fn input_marks_validating_only_when_idle() {
        let mut orch = orchestrator();
        assert!(orch.begin_input());
        assert_eq!(orch.state().tag(), StateTag::Validating);
        assert!(orch.abandon_input());
        assert_eq!(orch.state().tag(), StateTag::Idle);

        let mut orch = loaded_with([1], None);
        assert!(!orch.begin_input());
        assert_eq!(orch.state().tag(), StateTag::Loaded);
    }

    #[test]
    fn empty_first_page_ends_pagination() {
        let orch = loaded_with([], None);
        assert_eq!(orch.state().tag(), StateTag::Loaded);
        assert!(orch.snapshot().items().is_empty());
        assert!(!orch.snapshot().has_next_page());
    }
}
