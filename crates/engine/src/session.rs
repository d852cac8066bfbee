use crate::fetch::fetch_until_cancelled;
use crate::{
    DebounceProgress, DebounceState, EngineConfig, EngineError, FetchCommand, FetchError,
    PageFetcher, QueryOrchestrator, QueryValidator, RequestId, Result, SearchSnapshot,
};
use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use usersearch_protocol::{FetchedPage, SearchItem};

type FetchOutcome<T> = (RequestId, std::result::Result<FetchedPage<T>, FetchError>);

enum SessionCommand {
    Input(String),
    CancelInput,
    SetQuery(String),
    LoadNextPage,
    Retry,
    Reset,
    Shutdown,
}

/// A long-lived search: raw input goes in, state snapshots come out.
///
/// Runs a debounce window in front of a [`QueryOrchestrator`] and the fetches
/// it asks for. The debounce timer, the orchestrator and fetch completions all
/// live in one task; handles only send commands, so a debounced commit and a
/// later direct call are applied in the order they happened.
pub struct SearchSession<T> {
    inner: Arc<SessionInner<T>>,
}

impl<T> Clone for SearchSession<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct SessionInner<T> {
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    snapshot_tx: watch::Sender<SearchSnapshot<T>>,
    progress_tx: watch::Sender<DebounceProgress>,
}

impl<T: SearchItem> SearchSession<T> {
    /// Spawns the session task; must be called from within a tokio runtime.
    pub fn start<F>(fetcher: Arc<F>, config: &EngineConfig) -> Result<Self>
    where
        F: PageFetcher<Item = T> + ?Sized,
    {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, _) = watch::channel(SearchSnapshot::initial());
        let (progress_tx, _) = watch::channel(DebounceProgress::idle(config.debounce()));

        spawn_session_loop(
            QueryOrchestrator::new(QueryValidator::from_config(config)),
            DebounceState::new(config.debounce()),
            fetcher,
            command_rx,
            snapshot_tx.clone(),
            progress_tx.clone(),
        );

        Ok(Self {
            inner: Arc::new(SessionInner {
                command_tx,
                snapshot_tx,
                progress_tx,
            }),
        })
    }

    /// Feeds raw input (e.g. the text field after a keystroke) to the debouncer.
    pub fn submit_input(&self, raw: impl Into<String>) -> Result<()> {
        self.send(SessionCommand::Input(raw.into()))
    }

    /// Drops pending raw input without committing it.
    pub fn cancel_input(&self) -> Result<()> {
        self.send(SessionCommand::CancelInput)
    }

    /// Commits a query directly, bypassing the debouncer.
    pub fn set_query(&self, query: impl Into<String>) -> Result<()> {
        self.send(SessionCommand::SetQuery(query.into()))
    }

    pub fn load_next_page(&self) -> Result<()> {
        self.send(SessionCommand::LoadNextPage)
    }

    pub fn retry(&self) -> Result<()> {
        self.send(SessionCommand::Retry)
    }

    pub fn reset(&self) -> Result<()> {
        self.send(SessionCommand::Reset)
    }

    pub fn shutdown(&self) {
        let _ = self.inner.command_tx.send(SessionCommand::Shutdown);
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SearchSnapshot<T>> {
        self.inner.snapshot_tx.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> SearchSnapshot<T> {
        self.inner.snapshot_tx.borrow().clone()
    }

    #[must_use]
    pub fn subscribe_debounce(&self) -> watch::Receiver<DebounceProgress> {
        self.inner.progress_tx.subscribe()
    }

    #[must_use]
    pub fn debounce_progress(&self) -> DebounceProgress {
        *self.inner.progress_tx.borrow()
    }

    fn send(&self, command: SessionCommand) -> Result<()> {
        self.inner
            .command_tx
            .send(command)
            .map_err(|_| EngineError::SessionClosed)
    }
}

impl<T> Drop for SearchSession<T> {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1 {
            let _ = self.inner.command_tx.send(SessionCommand::Shutdown);
        }
    }
}

fn spawn_session_loop<T, F>(
    mut orchestrator: QueryOrchestrator<T>,
    mut debounce: DebounceState<String>,
    fetcher: Arc<F>,
    mut command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    snapshot_tx: watch::Sender<SearchSnapshot<T>>,
    progress_tx: watch::Sender<DebounceProgress>,
) where
    T: SearchItem,
    F: PageFetcher<Item = T> + ?Sized,
{
    tokio::spawn(async move {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<FetchOutcome<T>>();

        loop {
            let next_deadline = debounce.next_deadline();

            let command = tokio::select! {
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(SessionCommand::Shutdown) | None => break,
                        Some(SessionCommand::Input(raw)) => {
                            progress_tx.send_replace(debounce.submit(raw, Instant::now()));
                            orchestrator.begin_input();
                            None
                        }
                        Some(SessionCommand::CancelInput) => {
                            if debounce.is_pending() {
                                debug!("pending input dropped");
                            }
                            progress_tx.send_replace(debounce.cancel());
                            orchestrator.abandon_input();
                            None
                        }
                        Some(SessionCommand::SetQuery(raw)) => orchestrator.set_query(&raw),
                        Some(SessionCommand::LoadNextPage) => orchestrator.load_next_page(),
                        Some(SessionCommand::Retry) => orchestrator.retry(),
                        Some(SessionCommand::Reset) => {
                            progress_tx.send_replace(debounce.cancel());
                            orchestrator.reset();
                            None
                        }
                    }
                }
                () = async {
                    if let Some(deadline) = next_deadline {
                        time::sleep_until(deadline).await;
                    }
                }, if next_deadline.is_some() => {
                    let committed = debounce.fire(Instant::now());
                    progress_tx.send_replace(debounce.progress());
                    committed.and_then(|raw| orchestrator.set_query(&raw))
                }
                Some((id, outcome)) = done_rx.recv() => {
                    if let Err(err) = &outcome {
                        if !err.is_cancelled() {
                            warn!("fetch {id} failed: {err}");
                        }
                    }
                    orchestrator.complete(id, outcome);
                    None
                }
            };

            if let Some(command) = command {
                spawn_fetch(fetcher.clone(), command, done_tx.clone());
            }
            publish(&snapshot_tx, &orchestrator);
        }

        progress_tx.send_replace(debounce.cancel());
        orchestrator.reset();
        publish(&snapshot_tx, &orchestrator);
        debug!("search session stopped");
    });
}

fn spawn_fetch<T, F>(
    fetcher: Arc<F>,
    command: FetchCommand,
    done_tx: mpsc::UnboundedSender<FetchOutcome<T>>,
) where
    T: SearchItem,
    F: PageFetcher<Item = T> + ?Sized,
{
    let FetchCommand {
        id,
        request,
        cancel,
        ..
    } = command;
    tokio::spawn(async move {
        let outcome = fetch_until_cancelled(fetcher.as_ref(), request, cancel).await;
        let _ = done_tx.send((id, outcome));
    });
}

fn publish<T: SearchItem>(
    snapshot_tx: &watch::Sender<SearchSnapshot<T>>,
    orchestrator: &QueryOrchestrator<T>,
) {
    snapshot_tx.send_if_modified(|current| {
        if current.revision == orchestrator.revision() {
            return false;
        }
        *current = orchestrator.snapshot();
        true
    });
}
