// src/services/crawler.rs

//! Tag feed traversal.
//!
//! [`TagCrawler`] is a pull-based cursor: each call to [`TagCrawler::next`]
//! performs the browser work needed to produce one [`CrawlStep`]. The caller
//! may use the session between calls (for example to analyze a candidate in
//! another tab) as long as it returns focus to the feed tab.

use std::collections::{HashSet, VecDeque};

use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;
use crate::session::{BrowsingSession, ElementHandle, Key, Locator, press_key};
use crate::utils::pacing::{FEED_LOAD, POST_ADVANCE, POST_OPEN, Pacer};
use crate::utils::tag_feed_url;

const FIRST_POST: &str = r#"a[href*="/p/"]"#;
/// Author link candidates on an open post, tried in order.
const AUTHOR_SELECTORS: &[&str] = &[
    r#"article header a:not([href*="/explore/locations/"])"#,
    "div._a9zs > span > a",
];
const NEXT_BUTTON: &str = r#"button[aria-label="Next"], button[aria-label="Next post"]"#;
const NEXT_ICON: &str = r#"svg[aria-label="Next"]"#;
/// Levels searched above the next icon for its button.
const NEXT_ICON_DEPTH: usize = 5;

/// One unit of crawl progress.
#[derive(Debug)]
pub enum CrawlStep {
    /// A tag's feed is about to be opened
    TagStarted { tag: String },
    /// The feed had no post to open
    NoPosts { tag: String },
    /// An identity not seen before in this run
    Candidate { tag: String, identity: String },
    /// Reading a post failed; `abandoned` when the tag was given up
    PostError {
        tag: String,
        message: String,
        abandoned: bool,
    },
    /// The tag feed could not be opened at all
    TagFailed { tag: String, error: AppError },
}

#[derive(Debug)]
struct TagCursor {
    tag: String,
    opened: bool,
    posts_checked: usize,
    consecutive_errors: usize,
    pending_advance: bool,
}

impl TagCursor {
    fn new(tag: String) -> Self {
        Self {
            tag,
            opened: false,
            posts_checked: 0,
            consecutive_errors: 0,
            pending_advance: false,
        }
    }
}

/// Walks tag feeds post by post and yields unseen author identities.
pub struct TagCrawler {
    base_url: String,
    tags: VecDeque<String>,
    posts_per_tag: usize,
    max_consecutive_errors: usize,
    max_profiles: usize,
    seen: HashSet<String>,
    matches: usize,
    tags_started: usize,
    current: Option<TagCursor>,
}

impl TagCrawler {
    pub fn new(
        base_url: impl Into<String>,
        tags: Vec<String>,
        config: &CrawlerConfig,
        max_profiles: usize,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            tags: tags.into(),
            posts_per_tag: config.posts_per_tag,
            max_consecutive_errors: config.max_consecutive_errors,
            max_profiles,
            seen: HashSet::new(),
            matches: 0,
            tags_started: 0,
            current: None,
        }
    }

    /// Count an accepted profile toward the global cap.
    pub fn record_match(&mut self) {
        self.matches += 1;
    }

    /// Count a failure while handling the last candidate. Returns `true`
    /// when the current tag was abandoned because of it.
    pub fn record_failure(&mut self, message: &str) -> bool {
        let Some(cursor) = self.current.as_mut() else {
            return false;
        };
        cursor.consecutive_errors += 1;
        log::debug!(
            "#{}: failure {} in a row: {}",
            cursor.tag,
            cursor.consecutive_errors,
            message
        );
        if cursor.consecutive_errors > self.max_consecutive_errors {
            self.current = None;
            return true;
        }
        false
    }

    pub fn matches(&self) -> usize {
        self.matches
    }

    /// Distinct identities yielded so far.
    pub fn candidates_seen(&self) -> usize {
        self.seen.len()
    }

    pub fn tags_started(&self) -> usize {
        self.tags_started
    }

    fn limit_reached(&self) -> bool {
        self.matches >= self.max_profiles
    }

    /// Advance the crawl until it has something to report.
    ///
    /// Returns `None` when every tag is exhausted or the profile cap is hit.
    pub async fn next<S>(&mut self, session: &mut S, pacer: &mut Pacer) -> Option<CrawlStep>
    where
        S: BrowsingSession + ?Sized,
    {
        loop {
            if self.limit_reached() {
                self.current = None;
                return None;
            }

            let Some(mut cursor) = self.current.take() else {
                let tag = self.tags.pop_front()?;
                self.tags_started += 1;
                self.current = Some(TagCursor::new(tag.clone()));
                return Some(CrawlStep::TagStarted { tag });
            };

            if !cursor.opened {
                match open_feed(session, pacer, &self.base_url, &cursor.tag).await {
                    Ok(true) => {
                        cursor.opened = true;
                        self.current = Some(cursor);
                        continue;
                    }
                    Ok(false) => return Some(CrawlStep::NoPosts { tag: cursor.tag }),
                    Err(error) => {
                        return Some(CrawlStep::TagFailed {
                            tag: cursor.tag,
                            error,
                        });
                    }
                }
            }

            if cursor.posts_checked >= self.posts_per_tag {
                log::debug!("#{}: post limit reached", cursor.tag);
                continue;
            }

            if cursor.pending_advance {
                advance(session, pacer).await;
                cursor.pending_advance = false;
            }

            match author_identity(session).await {
                Ok(identity) => {
                    cursor.posts_checked += 1;
                    cursor.consecutive_errors = 0;
                    cursor.pending_advance = true;
                    let tag = cursor.tag.clone();
                    self.current = Some(cursor);

                    if let Some(identity) = identity {
                        if self.seen.insert(identity.clone()) {
                            return Some(CrawlStep::Candidate { tag, identity });
                        }
                    }
                }
                Err(e) => {
                    cursor.consecutive_errors += 1;
                    let abandoned = cursor.consecutive_errors > self.max_consecutive_errors;
                    let tag = cursor.tag.clone();
                    if !abandoned {
                        cursor.pending_advance = true;
                        self.current = Some(cursor);
                    }
                    return Some(CrawlStep::PostError {
                        tag,
                        message: e.to_string(),
                        abandoned,
                    });
                }
            }
        }
    }
}

/// Open a tag feed and its first post. `Ok(false)` when there is no post.
async fn open_feed<S>(session: &mut S, pacer: &mut Pacer, base_url: &str, tag: &str) -> Result<bool>
where
    S: BrowsingSession + ?Sized,
{
    session.navigate(&tag_feed_url(base_url, tag)).await?;
    pacer.pause(session, FEED_LOAD).await;

    let first = match session.find_one(&Locator::css(FIRST_POST)).await {
        Ok(Some(first)) => first,
        Ok(None) => return Ok(false),
        Err(e) => {
            log::debug!("#{}: first post lookup failed: {}", tag, e);
            return Ok(false);
        }
    };
    if let Err(e) = session.click(first).await {
        log::debug!("#{}: could not open first post: {}", tag, e);
        return Ok(false);
    }
    pacer.pause(session, POST_OPEN).await;
    Ok(true)
}

/// Author of the open post, from the first selector with non-empty text.
async fn author_identity<S>(session: &mut S) -> Result<Option<String>>
where
    S: BrowsingSession + ?Sized,
{
    for selector in AUTHOR_SELECTORS {
        if let Some(link) = session.find_one(&Locator::css(*selector)).await? {
            let text = session.read_text(link).await?;
            let identity = text.trim();
            if !identity.is_empty() {
                return Ok(Some(identity.to_string()));
            }
        }
    }
    Ok(None)
}

/// Move to the next post: labeled button, icon button, else the arrow key.
/// Failures are logged only; the next read reports them.
async fn advance<S>(session: &mut S, pacer: &mut Pacer)
where
    S: BrowsingSession + ?Sized,
{
    let moved = match next_control(session).await {
        Ok(Some(button)) => session.click(button).await,
        Ok(None) | Err(_) => press_key(session, Key::ArrowRight).await,
    };
    if let Err(e) = moved {
        log::debug!("Failed to advance to the next post: {}", e);
    }
    pacer.pause(session, POST_ADVANCE).await;
}

async fn next_control<S>(session: &mut S) -> Result<Option<ElementHandle>>
where
    S: BrowsingSession + ?Sized,
{
    if let Some(button) = session.find_one(&Locator::css(NEXT_BUTTON)).await? {
        return Ok(Some(button));
    }
    let Some(mut current) = session.find_one(&Locator::css(NEXT_ICON)).await? else {
        return Ok(None);
    };
    for _ in 0..NEXT_ICON_DEPTH {
        let Some(parent) = session.parent(current).await? else {
            break;
        };
        if session.tag_name(parent).await? == "button" {
            return Ok(Some(parent));
        }
        current = parent;
    }
    Ok(None)
}
