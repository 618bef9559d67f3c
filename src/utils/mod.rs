//! Utility functions and helpers.

pub mod number;
pub mod pacing;
pub mod text;

use url::Url;

pub use number::{parse_count, try_parse_count};

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// URL of a tag's content feed.
pub fn tag_feed_url(base_url: &str, tag: &str) -> String {
    format!("{}/explore/tags/{}/", base_url.trim_end_matches('/'), tag)
}

/// URL of a profile page.
pub fn profile_url(base_url: &str, identity: &str) -> String {
    format!("{}/{}/", base_url.trim_end_matches('/'), identity)
}
