use crate::{FetchError, Query, ValidationError};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use usersearch_protocol::{PageToken, SearchItem};

/// Accumulated items for the current query, in fetch order.
///
/// Never mutated in place: appending produces a new set, so snapshots handed
/// out earlier keep seeing what they saw.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet<T> {
    items: Arc<Vec<T>>,
}

impl<T> Default for ResultSet<T> {
    fn default() -> Self {
        Self {
            items: Arc::new(Vec::new()),
        }
    }
}

impl<T> ResultSet<T> {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn items(&self) -> &[T] {
        &self.items
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> ResultSet<T> {
    /// A first page, kept exactly as the endpoint returned it.
    #[must_use]
    pub fn from_page(items: Vec<T>) -> Self {
        Self {
            items: Arc::new(items),
        }
    }
}

impl<T: SearchItem> ResultSet<T> {
    /// Returns a new set with `page` appended.
    ///
    /// Items whose identity is already in this set are skipped: search pages
    /// can shift between requests, and a user shown on page 1 must not show up
    /// again on page 2. This makes the result differ from a plain concatenation
    /// of pages. Repeats inside `page` itself are kept as returned.
    #[must_use]
    pub fn appended(&self, page: Vec<T>) -> Self {
        let seen: HashSet<T::Id> = self.items.iter().map(SearchItem::item_id).collect();
        let mut items = Vec::with_capacity(self.items.len() + page.len());
        items.extend(self.items.iter().cloned());
        items.extend(page.into_iter().filter(|item| !seen.contains(&item.item_id())));
        Self {
            items: Arc::new(items),
        }
    }
}

impl<'a, T> IntoIterator for &'a ResultSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateTag {
    Idle,
    Validating,
    LoadingFirstPage,
    Loaded,
    LoadingNextPage,
    FirstPageError,
    NextPageError,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchState<T> {
    Idle,
    /// Raw input is waiting out its debounce window; nothing is committed yet.
    Validating,
    LoadingFirstPage,
    Loaded(ResultSet<T>),
    LoadingNextPage(ResultSet<T>),
    FirstPageError(FetchError),
    /// Keeps the last good result set.
    NextPageError(ResultSet<T>, FetchError),
}

impl<T> FetchState<T> {
    #[must_use]
    pub const fn tag(&self) -> StateTag {
        match self {
            Self::Idle => StateTag::Idle,
            Self::Validating => StateTag::Validating,
            Self::LoadingFirstPage => StateTag::LoadingFirstPage,
            Self::Loaded(_) => StateTag::Loaded,
            Self::LoadingNextPage(_) => StateTag::LoadingNextPage,
            Self::FirstPageError(_) => StateTag::FirstPageError,
            Self::NextPageError(_, _) => StateTag::NextPageError,
        }
    }

    #[must_use]
    pub const fn results(&self) -> Option<&ResultSet<T>> {
        match self {
            Self::Loaded(results)
            | Self::LoadingNextPage(results)
            | Self::NextPageError(results, _) => Some(results),
            Self::Idle | Self::Validating | Self::LoadingFirstPage | Self::FirstPageError(_) => {
                None
            }
        }
    }

    #[must_use]
    pub const fn error(&self) -> Option<&FetchError> {
        match self {
            Self::FirstPageError(err) | Self::NextPageError(_, err) => Some(err),
            _ => None,
        }
    }
}

/// What the presentation layer renders.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSnapshot<T> {
    pub state: FetchState<T>,
    pub query: Option<Query>,
    pub next_page: Option<PageToken>,
    pub total_count: Option<u64>,
    /// Why the last committed value never reached the fetch layer.
    pub rejected: Option<ValidationError>,
    /// Bumped on every transition.
    pub revision: u64,
}

impl<T> SearchSnapshot<T> {
    #[must_use]
    pub const fn initial() -> Self {
        Self {
            state: FetchState::Idle,
            query: None,
            next_page: None,
            total_count: None,
            rejected: None,
            revision: 0,
        }
    }

    #[must_use]
    pub const fn tag(&self) -> StateTag {
        self.state.tag()
    }

    #[must_use]
    pub fn items(&self) -> &[T] {
        match self.state.results() {
            Some(results) => results.items(),
            None => &[],
        }
    }

    #[must_use]
    pub const fn error(&self) -> Option<&FetchError> {
        self.state.error()
    }

    #[must_use]
    pub const fn has_next_page(&self) -> bool {
        self.next_page.is_some()
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(
            self.state,
            FetchState::LoadingFirstPage | FetchState::LoadingNextPage(_)
        )
    }
}
