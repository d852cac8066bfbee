use serde::Serialize;
use tokio::time::Instant;
use usersearch_engine::{DebounceProgress, FetchState, SearchSnapshot, StateTag, ValidationError};
use usersearch_protocol::{PageToken, User, UsersMetadata};

const BAR_WIDTH: usize = 20;

/// The alert shown under the search box, if any.
#[must_use]
pub fn status_message(snapshot: &SearchSnapshot<User>) -> Option<String> {
    match &snapshot.state {
        FetchState::Idle => Some(match &snapshot.rejected {
            None | Some(ValidationError::Empty) => {
                "No user data fetched yet / Start typing to search".to_string()
            }
            Some(err) => format!("Invalid query: {err}"),
        }),
        FetchState::Validating => Some("Debouncing your search...".to_string()),
        FetchState::LoadingFirstPage => Some(format!(
            "Looking for users matching \"{}\"...",
            snapshot.query.as_ref().map(|q| q.as_str()).unwrap_or_default()
        )),
        FetchState::FirstPageError(err) => Some(format!("Error fetching user data! (Error: {err})")),
        FetchState::Loaded(results) if results.is_empty() => {
            Some("No users for the given query found".to_string())
        }
        FetchState::Loaded(_) if !snapshot.has_next_page() => {
            Some("There are no more users matching the query.".to_string())
        }
        FetchState::Loaded(_) => None,
        FetchState::LoadingNextPage(_) => Some("Loading more users...".to_string()),
        FetchState::NextPageError(_, err) => {
            Some(format!("Error fetching the next page! Error: {err}"))
        }
    }
}

#[must_use]
pub fn results_header(snapshot: &SearchSnapshot<User>) -> Option<String> {
    let query = snapshot.query.as_ref()?;
    if snapshot.items().is_empty() {
        return None;
    }
    Some(format!("Results for: \"{query}\""))
}

#[must_use]
pub fn metadata_line(metadata: &UsersMetadata) -> String {
    format!(
        "users: {} | organizations: {} | admins: {}",
        metadata.regular_users, metadata.organizations, metadata.admins
    )
}

#[must_use]
pub fn user_line(user: &User) -> String {
    let mut line = format!("{:<24} {:>10}  {}", user.login, user.id, user.html_url);
    if user.is_organization() {
        line.push_str("  [org]");
    }
    if user.site_admin {
        line.push_str("  [admin]");
    }
    line
}

/// Countdown bar for a pending debounce; empty when nothing is pending.
#[must_use]
pub fn debounce_bar(progress: &DebounceProgress, now: Instant) -> String {
    if !progress.is_pending() {
        return String::new();
    }
    let fraction = progress.fraction_remaining(now);
    let filled = (fraction * BAR_WIDTH as f64).round() as usize;
    let remaining = progress.remaining(now).as_secs_f64();
    format!(
        "[{}{}] {remaining:.1}s",
        "#".repeat(filled.min(BAR_WIDTH)),
        "-".repeat(BAR_WIDTH - filled.min(BAR_WIDTH))
    )
}

/// Machine-readable form of a finished search.
#[derive(Debug, Serialize)]
pub struct SearchReport<'a> {
    pub query: Option<&'a str>,
    pub state: StateTag,
    pub total_count: Option<u64>,
    pub next_page: Option<PageToken>,
    pub metadata: UsersMetadata,
    pub error: Option<String>,
    pub users: &'a [User],
}

impl<'a> SearchReport<'a> {
    #[must_use]
    pub fn from_snapshot(snapshot: &'a SearchSnapshot<User>) -> Self {
        Self {
            query: snapshot.query.as_ref().map(|q| q.as_str()),
            state: snapshot.tag(),
            total_count: snapshot.total_count,
            next_page: snapshot.next_page,
            metadata: UsersMetadata::from_users(snapshot.items()),
            error: snapshot.error().map(ToString::to_string),
            users: snapshot.items(),
        }
    }
}
