use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Page-number cursor. Pages are 1-based, mirroring GitHub's search API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageToken(u32);

impl PageToken {
    pub const INITIAL: Self = Self(1);

    /// Returns `None` for page 0, which the protocol never addresses.
    #[must_use]
    pub const fn new(page: u32) -> Option<Self> {
        if page == 0 {
            None
        } else {
            Some(Self(page))
        }
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl Default for PageToken {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for PageToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport-level pagination metadata that accompanies a fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaginationMeta {
    /// Raw `Link` header as returned by the endpoint. `None` means the endpoint
    /// answered without one, which for a link-paginated API means a single page.
    LinkHeader(Option<String>),
    /// The collaborator already knows the next token.
    Explicit(Option<PageToken>),
    /// The collaborator has no pagination metadata at all.
    Unknown,
}

/// One page as returned by a fetch collaborator, before the cursor protocol runs.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage<T> {
    pub items: Vec<T>,
    pub pagination: PaginationMeta,
    pub total_count: Option<u64>,
}

impl<T> FetchedPage<T> {
    #[must_use]
    pub const fn new(items: Vec<T>, pagination: PaginationMeta) -> Self {
        Self {
            items,
            pagination,
            total_count: None,
        }
    }

    #[must_use]
    pub fn with_total_count(mut self, total_count: u64) -> Self {
        self.total_count = Some(total_count);
        self
    }
}

/// Derives the token of the page after `requested`.
///
/// Never fails: metadata that cannot be understood means "no next page", so a
/// broken endpoint terminates pagination instead of looping. Only when the
/// collaborator supplies no metadata at all does an empty page end pagination
/// and a non-empty page imply `requested + 1`.
#[must_use]
pub fn derive_next_token<T>(page: &FetchedPage<T>, requested: PageToken) -> Option<PageToken> {
    match &page.pagination {
        PaginationMeta::Explicit(token) => *token,
        PaginationMeta::LinkHeader(Some(header)) => parse_link_next(header),
        PaginationMeta::LinkHeader(None) => None,
        PaginationMeta::Unknown => {
            if page.items.is_empty() {
                None
            } else {
                requested.next()
            }
        }
    }
}

fn link_next_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"<([^>]*)>\s*;\s*rel="next""#).ok())
        .as_ref()
}

fn page_param_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[?&]page=(\d+)(?:&|#|$)").ok())
        .as_ref()
}

/// Extracts the page number of the `rel="next"` relation from a `Link` header.
///
/// ```
/// use usersearch_protocol::{parse_link_next, PageToken};
///
/// let header = r#"<https://api.github.com/search/users?q=octocat&page=2>; rel="next", <https://api.github.com/search/users?q=octocat&page=34>; rel="last""#;
/// assert_eq!(parse_link_next(header), PageToken::new(2));
/// ```
#[must_use]
pub fn parse_link_next(header: &str) -> Option<PageToken> {
    let url = link_next_regex()?.captures(header)?.get(1)?.as_str();
    let page = page_param_regex()?.captures(url)?.get(1)?.as_str();
    page.parse::<u32>().ok().and_then(PageToken::new)
}
