//! # User Search Engine
//!
//! Query orchestration for incremental, paginated search.
//!
//! ## Pipeline
//!
//! ```text
//! raw input
//!     │
//!     ├──> DebounceState (fixed quiet window, inside the session task)
//!     │      └─> committed query
//!     │
//!     ├──> QueryOrchestrator (state machine)
//!     │      ├─> first page / next page fetches (one in flight at most)
//!     │      └─> stale completions discarded by request identity
//!     │
//!     └──> SearchSnapshot (watch channel)
//!            └─> presentation layer
//! ```
//!
//! [`SearchSession`] drives all of this from one task. [`Debouncer`] is the
//! same debounce window as a standalone task for callers that only need
//! committed values.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use usersearch_engine::{EngineConfig, PageFetcher, SearchSession, StateTag};
//! use usersearch_protocol::User;
//!
//! async fn run(fetcher: Arc<dyn PageFetcher<Item = User>>) -> anyhow::Result<()> {
//!     let session = SearchSession::start(fetcher, &EngineConfig::default())?;
//!     let mut snapshots = session.subscribe();
//!
//!     session.submit_input("octocat")?;
//!     let snapshot = snapshots
//!         .wait_for(|s| matches!(s.tag(), StateTag::Loaded | StateTag::FirstPageError))
//!         .await?
//!         .clone();
//!     println!("{} users", snapshot.items().len());
//!
//!     session.load_next_page()?;
//!     Ok(())
//! }
//! ```

mod config;
mod debounce;
mod error;
mod fetch;
mod orchestrator;
mod query;
mod session;
mod state;

pub use config::{EngineConfig, DEFAULT_MAX_QUERY_CHARS};
pub use debounce::{DebounceProgress, DebounceState, Debouncer};
pub use error::{EngineError, FetchError, Result, ValidationError};
pub use fetch::{fetch_until_cancelled, PageFetcher, PageRequest};
pub use orchestrator::{Completion, FetchCommand, FetchKind, QueryOrchestrator, RequestId};
pub use query::{Query, QueryValidator};
pub use session::SearchSession;
pub use state::{FetchState, ResultSet, SearchSnapshot, StateTag};
