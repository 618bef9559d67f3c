// src/services/extractor.rs

//! Profile attribute extraction.
//!
//! Counts come from the page source through ordered fallback chains of pure
//! functions; bio and avatar come from the rendered DOM through ordered
//! selector lists. A miss never fails extraction, it only leaves a default.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

use crate::error::Result;
use crate::session::{BrowsingSession, Locator};
use crate::utils::parse_count;
use crate::utils::text::truncate_graphemes;

/// A follower-count strategy over the page source.
pub type CountStrategy = fn(&str) -> Option<u64>;

/// Follower strategies, most reliable first.
pub const FOLLOWER_STRATEGIES: &[(&str, CountStrategy)] = &[
    ("structured metadata", followers_from_structured_data),
    ("summary", followers_from_summary),
    ("legacy counter", followers_from_legacy_counter),
];

/// Bio candidates, tried in order.
const BIO_SELECTORS: &[&str] = &["header div[dir=\"auto\"]", "h1 ~ div"];
const AVATAR_SELECTOR: &str = "header img";
/// Shorter bio text is treated as UI noise.
const MIN_BIO_CHARS: usize = 4;

static SUMMARY_FOLLOWERS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"content="([\d.,]+[KkMm]?)\s+Followers"#).ok());
static SUMMARY_FOLLOWING: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"([\d.,]+[KkMm]?)\s+Following").ok());
static SUMMARY_POSTS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"([\d.,]+[KkMm]?)\s+Posts").ok());
static LEGACY_FOLLOWERS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#""edge_followed_by":\s*\{\s*"count":\s*(\d+)"#).ok());
static VERIFIED_MARKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#""is_verified":\s*true"#).ok());
static OG_TITLE_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s*\(@").ok());

/// Attributes read before any filtering happens.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasicAttributes {
    pub followers: u64,
    pub following: u64,
    pub post_count: u64,
    pub display_name: String,
    pub biography: String,
    pub avatar_url: String,
    pub verified: bool,
    /// Name of the follower strategy that produced the count
    pub follower_source: Option<&'static str>,
}

/// Reads profile attributes from the focused profile page.
#[derive(Debug, Default, Clone, Copy)]
pub struct AttributeExtractor;

impl AttributeExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract the basic attributes of the profile page currently in focus.
    ///
    /// Only a failure to read the page source is an error.
    pub async fn extract<S>(&self, session: &mut S, identity: &str) -> Result<BasicAttributes>
    where
        S: BrowsingSession + ?Sized,
    {
        let source = session.page_source().await?;
        let mut attributes = attributes_from_source(&source);

        attributes.biography = first_text(session, BIO_SELECTORS).await.unwrap_or_default();
        attributes.avatar_url = avatar(session).await.unwrap_or_default();

        match attributes.follower_source {
            Some(source) => log::debug!(
                "@{}: {} followers via {}",
                identity,
                attributes.followers,
                source
            ),
            None => log::warn!("Failed to extract followers for @{}", identity),
        }
        if !attributes.biography.is_empty() {
            log::debug!(
                "@{} bio: {}",
                identity,
                truncate_graphemes(&attributes.biography, 50)
            );
        }

        Ok(attributes)
    }
}

/// Everything that can be read from the raw page source.
pub fn attributes_from_source(source: &str) -> BasicAttributes {
    let mut attributes = BasicAttributes::default();

    if let Some((name, followers)) = FOLLOWER_STRATEGIES
        .iter()
        .find_map(|(name, strategy)| strategy(source).filter(|n| *n > 0).map(|n| (*name, n)))
    {
        attributes.followers = followers;
        attributes.follower_source = Some(name);
    }

    attributes.following = summary_count(source, &SUMMARY_FOLLOWING).unwrap_or(0);
    attributes.post_count = summary_count(source, &SUMMARY_POSTS).unwrap_or(0);
    attributes.display_name = display_name(source).unwrap_or_default();
    attributes.verified = compiled(&VERIFIED_MARKER).is_some_and(|re| re.is_match(source));

    attributes
}

/// Follower count from JSON-LD `interactionStatistic` entries.
pub fn followers_from_structured_data(source: &str) -> Option<u64> {
    let document = Html::parse_document(source);
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;

    document.select(&selector).find_map(|script| {
        let text: String = script.text().collect();
        let data: Value = serde_json::from_str(text.trim()).ok()?;
        follow_counter(&data)
    })
}

fn follow_counter(data: &Value) -> Option<u64> {
    match data {
        Value::Array(items) => items.iter().find_map(follow_counter),
        Value::Object(map) => {
            let from_stats = map.get("interactionStatistic").and_then(|stats| {
                let entries = match stats {
                    Value::Array(items) => items.iter().collect::<Vec<_>>(),
                    other => vec![other],
                };
                entries.into_iter().find_map(|stat| {
                    let kind = stat.get("interactionType")?;
                    let kind = kind
                        .as_str()
                        .map(str::to_string)
                        .or_else(|| kind.get("@type")?.as_str().map(str::to_string))?;
                    if !kind.contains("FollowAction") {
                        return None;
                    }
                    match stat.get("userInteractionCount")? {
                        Value::Number(n) => n.as_u64(),
                        Value::String(s) => Some(parse_count(s)),
                        _ => None,
                    }
                })
            });
            from_stats.or_else(|| map.get("mainEntity").and_then(follow_counter))
        }
        _ => None,
    }
}

/// Follower count from the `"<n> Followers, <n> Following, <n> Posts"` summary.
pub fn followers_from_summary(source: &str) -> Option<u64> {
    summary_count(source, &SUMMARY_FOLLOWERS)
}

/// Follower count from the legacy `edge_followed_by` counter.
pub fn followers_from_legacy_counter(source: &str) -> Option<u64> {
    let caps = compiled(&LEGACY_FOLLOWERS)?.captures(source)?;
    caps.get(1)?.as_str().parse().ok()
}

fn compiled(pattern: &'static LazyLock<Option<Regex>>) -> Option<&'static Regex> {
    Option::as_ref(pattern)
}

fn summary_count(source: &str, pattern: &'static LazyLock<Option<Regex>>) -> Option<u64> {
    let caps = compiled(pattern)?.captures(source)?;
    Some(parse_count(caps.get(1)?.as_str()))
}

/// Display name from the `og:title` meta, `"Name (@handle) • ..."`.
pub fn display_name(source: &str) -> Option<String> {
    let document = Html::parse_document(source);
    let selector = Selector::parse(r#"meta[property="og:title"]"#).ok()?;
    let title = document.select(&selector).next()?.value().attr("content")?;
    let caps = compiled(&OG_TITLE_NAME)?.captures(title)?;
    let name = caps.get(1)?.as_str().trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Text of the first candidate selector with enough content.
async fn first_text<S>(session: &mut S, selectors: &[&str]) -> Option<String>
where
    S: BrowsingSession + ?Sized,
{
    for selector in selectors {
        let element = match session.find_one(&Locator::css(*selector)).await {
            Ok(Some(element)) => element,
            Ok(None) => continue,
            Err(e) => {
                log::debug!("Bio lookup {} failed: {}", selector, e);
                continue;
            }
        };
        if let Ok(text) = session.read_text(element).await {
            let text = text.trim();
            if text.chars().count() >= MIN_BIO_CHARS {
                return Some(text.to_string());
            }
        }
    }
    None
}

async fn avatar<S>(session: &mut S) -> Option<String>
where
    S: BrowsingSession + ?Sized,
{
    let element = session
        .find_one(&Locator::css(AVATAR_SELECTOR))
        .await
        .ok()??;
    session.read_attribute(element, "src").await.ok()?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SnapshotSession;

    const LD_JSON: &str = r#"<html><head>
        <script type="application/ld+json">
        {"@type": "ProfilePage", "mainEntity": {"@type": "Person",
          "interactionStatistic": [
            {"@type": "InteractionCounter", "interactionType": "http://schema.org/WriteAction", "userInteractionCount": 12},
            {"@type": "InteractionCounter", "interactionType": "http://schema.org/FollowAction", "userInteractionCount": 4321}
          ]}}
        </script>
        <meta name="description" content="46K Followers, 970 Following, 734 Posts - See photos">
        </head><body></body></html>"#;

    #[test]
    fn test_structured_data_wins() {
        let attributes = attributes_from_source(LD_JSON);
        assert_eq!(attributes.followers, 4321);
        assert_eq!(attributes.follower_source, Some("structured metadata"));
        assert_eq!(attributes.following, 970);
        assert_eq!(attributes.post_count, 734);
    }

    #[test]
    fn test_summary_fallback() {
        let html = r#"<meta property="og:description" content="1.2M Followers, 10 Following, 55 Posts">"#;
        assert_eq!(followers_from_structured_data(html), None);
        let attributes = attributes_from_source(html);
        assert_eq!(attributes.followers, 1_200_000);
        assert_eq!(attributes.follower_source, Some("summary"));
    }

    #[test]
    fn test_legacy_counter_fallback() {
        let html = r#"<script>{"user":{"edge_followed_by": {"count": 8812}}}</script>"#;
        let attributes = attributes_from_source(html);
        assert_eq!(attributes.followers, 8812);
        assert_eq!(attributes.follower_source, Some("legacy counter"));
    }

    #[test]
    fn test_zero_count_falls_through() {
        let html = r#"<meta content="0 Followers, 1 Following, 2 Posts">
            <script>{"edge_followed_by":{"count":77}}</script>"#;
        assert_eq!(attributes_from_source(html).followers, 77);
    }

    #[test]
    fn test_all_strategies_miss() {
        let attributes = attributes_from_source("<html><body>nothing</body></html>");
        assert_eq!(attributes.followers, 0);
        assert!(attributes.follower_source.is_none());
    }

    #[test]
    fn test_display_name_and_verified() {
        let html = r#"<head><meta property="og:title" content="Jane Doe (@jane.lifts) • Instagram photos and videos"></head>
            <script>{"is_verified":true}</script>"#;
        let attributes = attributes_from_source(html);
        assert_eq!(attributes.display_name, "Jane Doe");
        assert!(attributes.verified);
    }

    #[tokio::test]
    async fn test_extract_reads_dom_fields() {
        let url = "https://site.test/jane/";
        let mut session = SnapshotSession::new().with_page(
            url,
            r#"<html><head><meta name="description" content="3,000 Followers, 5 Following, 9 Posts"></head>
            <body><header><img src="https://cdn.test/jane.jpg">
            <div dir="auto">ok</div><h1>jane</h1></header>
            <main><h1>Jane</h1><div>Coach and lifter</div></main></body></html>"#,
        );
        session.navigate(url).await.unwrap();

        let attributes = AttributeExtractor::new()
            .extract(&mut session, "jane")
            .await
            .unwrap();
        assert_eq!(attributes.followers, 3000);
        // The header bio is too short, so the sibling selector is used.
        assert_eq!(attributes.biography, "Coach and lifter");
        assert_eq!(attributes.avatar_url, "https://cdn.test/jane.jpg");
    }
}
