use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use usersearch_engine::{
    DebounceProgress, EngineConfig, EngineError, FetchError, PageFetcher, PageRequest,
    SearchSession, SearchSnapshot, StateTag,
};
use usersearch_protocol::{FetchedPage, PageToken, PaginationMeta, SearchItem};

const QUIET: Duration = Duration::from_millis(2_000);
const WAIT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
struct Hit(u32);

impl SearchItem for Hit {
    type Id = u32;

    fn item_id(&self) -> u32 {
        self.0
    }
}

type Outcome = Result<FetchedPage<Hit>, FetchError>;

struct PendingFetch {
    request: PageRequest,
    cancel: CancellationToken,
    respond: oneshot::Sender<Outcome>,
}

impl PendingFetch {
    fn resolve(self, ids: impl IntoIterator<Item = u32>, next: Option<u32>) {
        let page = FetchedPage::new(
            ids.into_iter().map(Hit).collect(),
            PaginationMeta::Explicit(next.and_then(PageToken::new)),
        );
        let _ = self.respond.send(Ok(page));
    }

    fn fail(self, err: FetchError) {
        let _ = self.respond.send(Err(err));
    }
}

/// Parks every fetch until the test resolves it, so tests pick completion order.
struct ScriptedFetcher {
    pending_tx: mpsc::UnboundedSender<PendingFetch>,
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    type Item = Hit;

    async fn fetch_page(&self, request: PageRequest, cancel: CancellationToken) -> Outcome {
        let (respond, response) = oneshot::channel();
        let _ = self.pending_tx.send(PendingFetch {
            request,
            cancel,
            respond,
        });
        response
            .await
            .unwrap_or_else(|_| Err(FetchError::Network("responder dropped".to_string())))
    }
}

struct Harness {
    session: SearchSession<Hit>,
    snapshots: watch::Receiver<SearchSnapshot<Hit>>,
    pending: mpsc::UnboundedReceiver<PendingFetch>,
}

impl Harness {
    fn start() -> Self {
        Self::with_debounce_ms(2_000)
    }

    fn with_debounce_ms(debounce_ms: u64) -> Self {
        let (pending_tx, pending) = mpsc::unbounded_channel();
        let config = EngineConfig {
            debounce_ms,
            ..EngineConfig::default()
        };
        let session =
            SearchSession::start(Arc::new(ScriptedFetcher { pending_tx }), &config).expect("start");
        let snapshots = session.subscribe();
        Self {
            session,
            snapshots,
            pending,
        }
    }

    async fn next_fetch(&mut self) -> PendingFetch {
        time::timeout(WAIT, self.pending.recv())
            .await
            .expect("timed out waiting for a fetch")
            .expect("fetcher dropped")
    }

    async fn wait_for(&mut self, tag: StateTag) -> SearchSnapshot<Hit> {
        time::timeout(WAIT, self.snapshots.wait_for(|s| s.tag() == tag))
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {tag:?}"))
            .expect("session alive")
            .clone()
    }

    /// Lets every runnable task finish before the paused clock moves.
    async fn settle(&mut self) {
        time::sleep(Duration::from_millis(1)).await;
    }

    fn assert_no_fetch(&mut self) {
        assert!(
            self.pending.try_recv().is_err(),
            "unexpected fetch was issued"
        );
    }
}

fn ids(snapshot: &SearchSnapshot<Hit>) -> Vec<u32> {
    snapshot.items().iter().map(|hit| hit.0).collect()
}

/// Returns once a debounce cycle that starts after the call has ended.
async fn debounce_cycle_finished(progress: &mut watch::Receiver<DebounceProgress>) {
    loop {
        time::timeout(WAIT, progress.changed())
            .await
            .expect("timed out waiting for debounce progress")
            .expect("session alive");
        if !progress.borrow_and_update().is_pending() {
            return;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn octocat_pages_until_exhausted() {
    let mut h = Harness::start();

    h.session.set_query("octocat").expect("set_query");
    let first = h.next_fetch().await;
    assert_eq!(first.request.query.as_str(), "octocat");
    assert_eq!(first.request.page, PageToken::INITIAL);
    h.wait_for(StateTag::LoadingFirstPage).await;

    first.resolve([1, 2], Some(2));
    let loaded = h.wait_for(StateTag::Loaded).await;
    assert_eq!(ids(&loaded), vec![1, 2]);
    assert_eq!(loaded.next_page, PageToken::new(2));

    h.session.load_next_page().expect("load_next_page");
    let second = h.next_fetch().await;
    assert_eq!(second.request.page, PageToken::new(2).expect("page 2"));
    let loading = h.wait_for(StateTag::LoadingNextPage).await;
    assert_eq!(ids(&loading), vec![1, 2]);

    second.resolve([3], None);
    let loaded = h.wait_for(StateTag::Loaded).await;
    assert_eq!(ids(&loaded), vec![1, 2, 3]);
    assert!(!loaded.has_next_page());

    h.session.load_next_page().expect("load_next_page");
    h.session.load_next_page().expect("load_next_page");
    h.settle().await;
    h.assert_no_fetch();
    assert_eq!(h.session.snapshot(), loaded);
}

#[tokio::test(start_paused = true)]
async fn recommitting_same_query_fetches_once() {
    let mut h = Harness::start();

    h.session.set_query("octocat").expect("set_query");
    h.session.set_query("octocat").expect("set_query");
    let first = h.next_fetch().await;
    first.resolve([1], None);
    h.wait_for(StateTag::Loaded).await;

    h.session.set_query("octocat").expect("set_query");
    h.settle().await;
    h.assert_no_fetch();
    assert_eq!(h.session.snapshot().tag(), StateTag::Loaded);
}

#[tokio::test(start_paused = true)]
async fn superseded_query_is_cancelled_and_never_applied() {
    let mut h = Harness::start();

    h.session.set_query("a").expect("set a");
    let a = h.next_fetch().await;
    h.session.set_query("b").expect("set b");
    let b = h.next_fetch().await;

    assert_eq!(b.request.query.as_str(), "b");
    assert!(a.cancel.is_cancelled());
    assert!(!b.cancel.is_cancelled());

    b.resolve([20, 21], None);
    let loaded = h.wait_for(StateTag::Loaded).await;
    assert_eq!(ids(&loaded), vec![20, 21]);

    a.resolve([10], None);
    h.settle().await;
    let snapshot = h.session.snapshot();
    assert_eq!(ids(&snapshot), vec![20, 21]);
    assert_eq!(snapshot.query.as_ref().map(|q| q.as_str()), Some("b"));
}

#[tokio::test(start_paused = true)]
async fn new_query_while_next_page_in_flight_starts_clean() {
    let mut h = Harness::start();

    h.session.set_query("octocat").expect("set_query");
    h.next_fetch().await.resolve([1, 2], Some(2));
    h.wait_for(StateTag::Loaded).await;

    h.session.load_next_page().expect("load_next_page");
    let stale = h.next_fetch().await;
    h.session.set_query("hubot").expect("set_query");
    let fresh = h.next_fetch().await;
    assert!(stale.cancel.is_cancelled());

    let loading = h.wait_for(StateTag::LoadingFirstPage).await;
    assert!(loading.items().is_empty());

    stale.resolve([3], None);
    fresh.resolve([9], None);
    let loaded = h.wait_for(StateTag::Loaded).await;
    assert_eq!(ids(&loaded), vec![9]);
}

#[tokio::test(start_paused = true)]
async fn debounced_input_commits_only_last_value() {
    let mut h = Harness::start();
    let mut progress = h.session.subscribe_debounce();

    for raw in ["o", "oc", "octo", "octocat"] {
        h.session.submit_input(raw).expect("submit_input");
        time::sleep(Duration::from_millis(400)).await;
    }
    let last_submit = Instant::now() - Duration::from_millis(400);

    assert_eq!(h.session.snapshot().tag(), StateTag::Validating);
    assert!(progress.borrow_and_update().is_pending());
    h.assert_no_fetch();

    let fetch = h.next_fetch().await;
    assert_eq!(fetch.request.query.as_str(), "octocat");
    assert_eq!(Instant::now(), last_submit + QUIET);
    h.wait_for(StateTag::LoadingFirstPage).await;
    assert!(!h.session.debounce_progress().is_pending());

    fetch.resolve([1], None);
    h.wait_for(StateTag::Loaded).await;
    h.settle().await;
    h.assert_no_fetch();
}

#[tokio::test(start_paused = true)]
async fn typing_over_results_keeps_them_visible() {
    let mut h = Harness::start();

    h.session.set_query("octocat").expect("set_query");
    h.next_fetch().await.resolve([1, 2], None);
    h.wait_for(StateTag::Loaded).await;

    h.session.submit_input("hub").expect("submit_input");
    h.settle().await;
    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.tag(), StateTag::Loaded);
    assert_eq!(ids(&snapshot), vec![1, 2]);

    let fetch = h.next_fetch().await;
    assert_eq!(fetch.request.query.as_str(), "hub");
}

#[tokio::test(start_paused = true)]
async fn cancelled_input_returns_to_idle_without_fetching() {
    let mut h = Harness::start();

    h.session.submit_input("octocat").expect("submit_input");
    h.wait_for(StateTag::Validating).await;
    h.session.cancel_input().expect("cancel_input");
    h.wait_for(StateTag::Idle).await;

    time::sleep(QUIET * 2).await;
    h.assert_no_fetch();
}

#[tokio::test(start_paused = true)]
async fn empty_commit_clears_results() {
    let mut h = Harness::start();

    h.session.set_query("octocat").expect("set_query");
    h.next_fetch().await.resolve([1], None);
    h.wait_for(StateTag::Loaded).await;

    h.session.submit_input("   ").expect("submit_input");
    let idle = h.wait_for(StateTag::Idle).await;
    assert!(idle.items().is_empty());
    assert_eq!(idle.query, None);
    assert!(idle.rejected.is_some());
    h.assert_no_fetch();
}

#[tokio::test(start_paused = true)]
async fn next_page_failure_keeps_results_and_waits_for_retry() {
    let mut h = Harness::start();

    h.session.set_query("octocat").expect("set_query");
    h.next_fetch().await.resolve(1..=10, Some(2));
    h.wait_for(StateTag::Loaded).await;

    h.session.load_next_page().expect("load_next_page");
    h.next_fetch()
        .await
        .fail(FetchError::Network("connection reset".to_string()));
    let failed = h.wait_for(StateTag::NextPageError).await;
    assert_eq!(failed.items().len(), 10);
    assert_eq!(
        failed.error(),
        Some(&FetchError::Network("connection reset".to_string()))
    );

    h.session.load_next_page().expect("load_next_page");
    h.settle().await;
    h.assert_no_fetch();
    assert_eq!(h.session.snapshot().tag(), StateTag::NextPageError);

    h.session.retry().expect("retry");
    let retried = h.next_fetch().await;
    assert_eq!(retried.request.page, PageToken::new(2).expect("page 2"));
    retried.resolve([11], None);
    let loaded = h.wait_for(StateTag::Loaded).await;
    assert_eq!(ids(&loaded), (1..=11).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn first_page_failure_is_reported_and_recoverable() {
    let mut h = Harness::start();

    h.session.set_query("octocat").expect("set_query");
    h.next_fetch().await.fail(FetchError::Status {
        status: 403,
        message: "API rate limit exceeded".to_string(),
    });
    let failed = h.wait_for(StateTag::FirstPageError).await;
    assert!(failed.items().is_empty());
    assert_eq!(
        failed.error().map(ToString::to_string),
        Some("API rate limit exceeded (HTTP 403)".to_string())
    );

    h.session.set_query("hubot").expect("set_query");
    h.next_fetch().await.resolve([5], None);
    let loaded = h.wait_for(StateTag::Loaded).await;
    assert_eq!(ids(&loaded), vec![5]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_the_session() {
    let mut h = Harness::start();

    h.session.set_query("octocat").expect("set_query");
    let fetch = h.next_fetch().await;
    h.session.shutdown();
    h.settle().await;

    assert!(fetch.cancel.is_cancelled());
    assert_eq!(h.session.snapshot().tag(), StateTag::Idle);
    assert!(matches!(
        h.session.set_query("hubot"),
        Err(EngineError::SessionClosed)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn direct_query_after_debounced_commit_wins() {
    for _ in 0..50 {
        let mut h = Harness::with_debounce_ms(5);
        let mut progress = h.session.subscribe_debounce();
        progress.borrow_and_update();

        h.session.submit_input("a").expect("submit_input");
        debounce_cycle_finished(&mut progress).await;
        h.session.set_query("b").expect("set_query");

        // The fetch for "a" may be cancelled before it ever reaches the fetcher.
        let mut stale = Vec::new();
        let b = loop {
            let fetch = h.next_fetch().await;
            if fetch.request.query.as_str() == "b" {
                break fetch;
            }
            assert_eq!(fetch.request.query.as_str(), "a");
            stale.push(fetch);
        };

        b.resolve([2], None);
        let loaded = h.wait_for(StateTag::Loaded).await;
        for fetch in stale.drain(..) {
            assert!(fetch.cancel.is_cancelled());
            fetch.resolve([1], None);
        }
        time::sleep(Duration::from_millis(20)).await;
        while let Ok(fetch) = h.pending.try_recv() {
            assert_eq!(fetch.request.query.as_str(), "a");
            assert!(fetch.cancel.is_cancelled());
        }

        let snapshot = h.session.snapshot();
        assert_eq!(loaded.query.as_ref().map(|q| q.as_str()), Some("b"));
        assert_eq!(snapshot.query.as_ref().map(|q| q.as_str()), Some("b"));
        assert_eq!(ids(&snapshot), vec![2]);
    }
}

#[tokio::test(start_paused = true)]
async fn reset_after_debounced_commit_stays_idle() {
    let mut h = Harness::start();
    let mut progress = h.session.subscribe_debounce();
    progress.borrow_and_update();

    h.session.submit_input("octocat").expect("submit_input");
    debounce_cycle_finished(&mut progress).await;
    h.session.reset().expect("reset");

    let idle = h.wait_for(StateTag::Idle).await;
    assert_eq!(idle.query, None);
    time::sleep(QUIET * 2).await;

    while let Ok(fetch) = h.pending.try_recv() {
        assert_eq!(fetch.request.query.as_str(), "octocat");
        assert!(fetch.cancel.is_cancelled());
        fetch.resolve([1], None);
    }
    h.settle().await;
    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.tag(), StateTag::Idle);
    assert_eq!(snapshot.query, None);
}

#[tokio::test(start_paused = true)]
async fn reset_drops_pending_input() {
    let mut h = Harness::start();

    h.session.submit_input("octocat").expect("submit_input");
    h.wait_for(StateTag::Validating).await;
    h.session.reset().expect("reset");
    h.wait_for(StateTag::Idle).await;
    assert!(!h.session.debounce_progress().is_pending());

    time::sleep(QUIET * 2).await;
    h.assert_no_fetch();
    assert_eq!(h.session.snapshot().tag(), StateTag::Idle);
}
