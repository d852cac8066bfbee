//! Fixed-window debounce.
//!
//! [`DebounceState`] is the pure timing core (no clock, no tasks), and
//! [`Debouncer`] drives it from a tokio task, broadcasting committed values and
//! publishing [`DebounceProgress`] for countdown indicators.

use crate::{EngineError, Result};
use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{self, Instant};

const COMMIT_CHANNEL_CAPACITY: usize = 16;

/// Where the debounce timer stands. `fires_at == None` means no timer is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceProgress {
    pub fires_at: Option<Instant>,
    pub quiet_period: Duration,
}

impl DebounceProgress {
    #[must_use]
    pub const fn idle(quiet_period: Duration) -> Self {
        Self {
            fires_at: None,
            quiet_period,
        }
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.fires_at.is_some()
    }

    #[must_use]
    pub fn remaining(&self, now: Instant) -> Duration {
        self.fires_at
            .map_or(Duration::ZERO, |at| at.saturating_duration_since(now))
    }

    /// Share of the quiet period still to go, in `[0, 1]`.
    #[must_use]
    pub fn fraction_remaining(&self, now: Instant) -> f64 {
        if self.quiet_period.is_zero() {
            return 0.0;
        }
        let fraction = self.remaining(now).as_secs_f64() / self.quiet_period.as_secs_f64();
        fraction.clamp(0.0, 1.0)
    }
}

#[derive(Debug)]
pub struct DebounceState<T> {
    quiet_period: Duration,
    candidate: Option<T>,
    deadline: Option<Instant>,
}

impl<T> DebounceState<T> {
    #[must_use]
    pub const fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            candidate: None,
            deadline: None,
        }
    }

    /// Replaces any pending candidate and restarts the quiet window at `now`.
    pub fn submit(&mut self, value: T, now: Instant) -> DebounceProgress {
        self.candidate = Some(value);
        self.deadline = Some(now + self.quiet_period);
        self.progress()
    }

    /// Drops the pending candidate without emitting it.
    pub fn cancel(&mut self) -> DebounceProgress {
        self.candidate = None;
        self.deadline = None;
        self.progress()
    }

    #[must_use]
    pub const fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Takes the candidate if its quiet window has elapsed by `now`.
    pub fn fire(&mut self, now: Instant) -> Option<T> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                self.candidate.take()
            }
            _ => None,
        }
    }

    #[must_use]
    pub const fn progress(&self) -> DebounceProgress {
        DebounceProgress {
            fires_at: self.deadline,
            quiet_period: self.quiet_period,
        }
    }
}

enum DebounceCommand<T> {
    Submit(T),
    Cancel,
    Shutdown,
}

/// Handle to a running debounce task. Clones share the same timer.
pub struct Debouncer<T> {
    inner: Arc<DebouncerInner<T>>,
}

impl<T> Clone for Debouncer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct DebouncerInner<T> {
    command_tx: mpsc::UnboundedSender<DebounceCommand<T>>,
    commit_tx: broadcast::Sender<T>,
    progress_tx: watch::Sender<DebounceProgress>,
}

impl<T: Clone + Send + 'static> Debouncer<T> {
    /// Spawns the debounce task; must be called from within a tokio runtime.
    #[must_use]
    pub fn start(quiet_period: Duration) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (commit_tx, _) = broadcast::channel(COMMIT_CHANNEL_CAPACITY);
        let (progress_tx, _) = watch::channel(DebounceProgress::idle(quiet_period));

        spawn_debounce_loop(
            DebounceState::new(quiet_period),
            command_rx,
            commit_tx.clone(),
            progress_tx.clone(),
        );

        Self {
            inner: Arc::new(DebouncerInner {
                command_tx,
                commit_tx,
                progress_tx,
            }),
        }
    }

    pub fn submit(&self, value: T) -> Result<()> {
        self.inner
            .command_tx
            .send(DebounceCommand::Submit(value))
            .map_err(|_| EngineError::SessionClosed)
    }

    pub fn cancel(&self) -> Result<()> {
        self.inner
            .command_tx
            .send(DebounceCommand::Cancel)
            .map_err(|_| EngineError::SessionClosed)
    }

    #[must_use]
    pub fn subscribe_commits(&self) -> broadcast::Receiver<T> {
        self.inner.commit_tx.subscribe()
    }

    #[must_use]
    pub fn subscribe_progress(&self) -> watch::Receiver<DebounceProgress> {
        self.inner.progress_tx.subscribe()
    }

    #[must_use]
    pub fn progress(&self) -> DebounceProgress {
        *self.inner.progress_tx.borrow()
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1 {
            let _ = self.inner.command_tx.send(DebounceCommand::Shutdown);
        }
    }
}

fn spawn_debounce_loop<T: Clone + Send + 'static>(
    mut state: DebounceState<T>,
    mut command_rx: mpsc::UnboundedReceiver<DebounceCommand<T>>,
    commit_tx: broadcast::Sender<T>,
    progress_tx: watch::Sender<DebounceProgress>,
) {
    tokio::spawn(async move {
        loop {
            let next_deadline = state.next_deadline();

            tokio::select! {
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(DebounceCommand::Submit(value)) => {
                            progress_tx.send_replace(state.submit(value, Instant::now()));
                        }
                        Some(DebounceCommand::Cancel) => {
                            if state.is_pending() {
                                debug!("debounce cancelled");
                            }
                            progress_tx.send_replace(state.cancel());
                        }
                        Some(DebounceCommand::Shutdown) | None => break,
                    }
                }
                () = async {
                    if let Some(deadline) = next_deadline {
                        time::sleep_until(deadline).await;
                    }
                }, if next_deadline.is_some() => {
                    if let Some(value) = state.fire(Instant::now()) {
                        let _ = commit_tx.send(value);
                    }
                    progress_tx.send_replace(state.progress());
                }
            }
        }
    });
}
