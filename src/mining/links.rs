//! `Link` response-header parsing.
//!
//! GitHub expresses pagination as comma-separated `<url>; rel="name"` entries.
//! The fetch loop only cares about `rel="next"` (the cursor to follow) and
//! `rel="last"` (the final page number, useful for progress logging).

use regex::Regex;
use reqwest::header::{HeaderMap, LINK};
use std::sync::LazyLock;

/// Pattern to extract the final page number from a `Link` header
static PAGE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"page=(\d+)>; rel=.last.").expect("invalid regex"));

/// Pagination relations extracted from one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLinks {
    /// The `rel="next"` URL, if any further pages exist.
    pub next: Option<String>,
    /// The page number carried by the `rel="last"` URL, if disclosed.
    pub last_page: Option<u64>,
}

impl PageLinks {
    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.next.is_some()
    }
}

/// Extract pagination relations from response headers.
#[must_use]
pub fn parse_link_header(headers: &HeaderMap) -> PageLinks {
    headers
        .get(LINK)
        .and_then(|value| value.to_str().ok())
        .map(parse_link_value)
        .unwrap_or_default()
}

/// Parse a raw `Link` header value.
#[must_use]
pub fn parse_link_value(value: &str) -> PageLinks {
    let mut links = PageLinks::default();

    for entry in value.split(',') {
        let mut parts = entry.split(';');
        let Some(url_part) = parts.next() else {
            continue;
        };

        let url = url_part.trim().trim_start_matches('<').trim_end_matches('>');
        if parts.any(|attr| attr.trim() == r#"rel="next""#) {
            links.next = Some(url.to_owned());
        }
    }

    links.last_page = PAGE_REGEX
        .captures(value)
        .and_then(|captures| captures.get(1))
        .and_then(|page| page.as_str().parse().ok());

    links
}
