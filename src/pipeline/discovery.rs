// src/pipeline/discovery.rs

//! Tag-driven profile discovery.
//!
//! A run owns its session for its whole lifetime and reports everything,
//! failures included, through the returned event stream.

use std::sync::Arc;

use async_stream::stream;
use chrono::Utc;
use futures::Stream;

use crate::error::Result;
use crate::models::{Config, Event, FilterCriteria, ProfileRecord, RunSummary, SearchRequest};
use crate::services::{CrawlStep, ProfileAnalyzer, Rejection, RejectionPolicy, TagCrawler};
use crate::session::{BrowsingSession, SessionContext};
use crate::utils::pacing::{PROFILE_LOAD, Pacer};
use crate::utils::profile_url;
use crate::utils::text::truncate_graphemes;

/// Raw error text echoed into the stream is cut to this many graphemes.
const ERROR_PREVIEW: usize = 50;

/// One discovery run over a dedicated browsing session.
pub struct DiscoveryPipeline<S> {
    context: SessionContext<S>,
    config: Arc<Config>,
    analyzer: ProfileAnalyzer,
    pacer: Pacer,
}

impl<S> DiscoveryPipeline<S>
where
    S: BrowsingSession + 'static,
{
    pub fn new(context: SessionContext<S>, config: Arc<Config>) -> Self {
        let analyzer = ProfileAnalyzer::new(&config);
        let pacer = Pacer::new(&config.pacing);
        Self {
            context,
            config,
            analyzer,
            pacer,
        }
    }

    /// Replace the extended-criteria rejection policy.
    pub fn with_policy(mut self, policy: Box<dyn RejectionPolicy>) -> Self {
        self.analyzer.set_policy(policy);
        self
    }

    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    /// Run the search. The stream ends after exactly one terminal event:
    /// `Complete` for a run that started, `Error` for a setup failure.
    /// The session is closed once the stream is drained.
    pub fn run(self, request: SearchRequest) -> impl Stream<Item = Event> + Send + 'static {
        let Self {
            mut context,
            config,
            mut analyzer,
            mut pacer,
        } = self;

        stream! {
            if !context.is_authenticated() {
                log::warn!("Search requested on an unauthenticated session");
                yield Event::error("Not logged in");
                shutdown(&mut context).await;
                return;
            }
            if request.tags.is_empty() {
                yield Event::error("No tags provided");
                shutdown(&mut context).await;
                return;
            }
            if let Err(e) = context.activate() {
                yield Event::error(e.to_string());
                shutdown(&mut context).await;
                return;
            }

            let started_at = Utc::now();
            let SearchRequest { tags, criteria } = request;
            log::info!(
                "Search started: tags={:?} followers={}-{} max_profiles={}",
                tags,
                criteria.min_followers,
                criteria.max_followers,
                criteria.max_profiles
            );
            yield Event::log(format!("Starting search for tags: {}", tags.join(", ")));

            let base_url = config.browser.base_url.clone();
            let mut crawler = TagCrawler::new(
                base_url.clone(),
                tags,
                &config.crawler,
                criteria.max_profiles,
            );

            while let Some(step) = crawler.next(context.session_mut(), &mut pacer).await {
                match step {
                    CrawlStep::TagStarted { tag } => {
                        yield Event::log(format!("Scraping tag: #{tag}..."));
                    }
                    CrawlStep::NoPosts { tag } => {
                        yield Event::log(format!("No posts found for #{tag}"));
                    }
                    CrawlStep::TagFailed { tag, error } => {
                        log::warn!("Tag #{} failed: {}", tag, error);
                        yield Event::error(format!("Error scraping tag #{tag}: {error}"));
                    }
                    CrawlStep::PostError { tag, message, abandoned } => {
                        if abandoned {
                            log::warn!("Abandoning #{} after repeated errors", tag);
                        }
                        yield Event::log(post_error(&message));
                    }
                    CrawlStep::Candidate { tag, identity } => {
                        yield Event::log(format!("Checking @{identity}..."));

                        let outcome = inspect(
                            context.session_mut(),
                            &mut analyzer,
                            &mut pacer,
                            &base_url,
                            &identity,
                            &tag,
                            &criteria,
                        )
                        .await;
                        pacer.human_pause(context.session_mut()).await;

                        match outcome {
                            Ok(Ok(record)) => {
                                crawler.record_match();
                                yield Event::Profile(record);
                                yield Event::log(format!("✅ MATCH: @{identity}"));
                            }
                            Ok(Err(rejection)) => {
                                yield Event::log(format!("❌ Skipped @{identity}: {rejection}"));
                            }
                            Err(e) => {
                                let message = e.to_string();
                                if crawler.record_failure(&message) {
                                    log::warn!("Abandoning #{} after repeated errors", tag);
                                }
                                yield Event::log(post_error(&message));
                            }
                        }
                    }
                }
            }

            let summary = RunSummary {
                profiles_found: crawler.matches(),
                candidates_checked: crawler.candidates_seen(),
                tags_scraped: crawler.tags_started(),
                started_at,
                finished_at: Utc::now(),
            };
            log::info!(
                "Search finished: {} profiles from {} candidates across {} tags in {}s",
                summary.profiles_found,
                summary.candidates_checked,
                summary.tags_scraped,
                summary.elapsed_secs()
            );
            yield Event::Complete(summary);

            shutdown(&mut context).await;
        }
    }
}

fn post_error(message: &str) -> String {
    format!(
        "Error processing post: {}",
        truncate_graphemes(message, ERROR_PREVIEW)
    )
}

async fn shutdown<S: BrowsingSession>(context: &mut SessionContext<S>) {
    if let Err(e) = context.close().await {
        log::warn!("Failed to close browsing session: {}", e);
    }
}

/// Analyze `identity` in its own tab, then return focus to the feed tab.
///
/// Once the profile tab is open it is closed on every path, including a
/// failed switch to it.
async fn inspect<S>(
    session: &mut S,
    analyzer: &mut ProfileAnalyzer,
    pacer: &mut Pacer,
    base_url: &str,
    identity: &str,
    tag: &str,
    criteria: &FilterCriteria,
) -> Result<std::result::Result<ProfileRecord, Rejection>>
where
    S: BrowsingSession + ?Sized,
{
    let feed = session.current_tab().await?;
    let tab = session.open_new_tab(&profile_url(base_url, identity)).await?;

    let outcome = match session.switch_tab(tab).await {
        Ok(()) => {
            pacer.pause(session, PROFILE_LOAD).await;
            Ok(analyzer
                .analyze(session, pacer, identity, tag, criteria)
                .await)
        }
        Err(e) => Err(e),
    };

    let closed = session.close_tab(tab).await;
    session.switch_tab(feed).await?;
    let outcome = outcome?;
    closed?;

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    use crate::services::AcceptAll;
    use crate::session::SnapshotSession;
    use crate::session::snapshot::Fault;

    const BASE: &str = "https://site.test";

    fn profile(followers: &str, bio: &str, posts: &[&str]) -> String {
        let links: String = posts
            .iter()
            .map(|p| format!(r#"<a href="/p/{p}/">post</a>"#))
            .collect();
        format!(
            r#"<html><head><meta name="description" content="{followers} Followers, 10 Following, 4 Posts"></head>
            <body><header><div dir="auto">{bio}</div></header><main><article>{links}</article></main></body></html>"#
        )
    }

    fn liked_post(likes: &str) -> String {
        format!("<article><section><div><span><span>{likes}</span></span></div></section></article>")
    }

    fn feed_post(author: &str, next: Option<&str>) -> String {
        let next = next
            .map(|n| format!(r#"<button aria-label="Next post" data-snapshot-href="/p/{n}/">›</button>"#))
            .unwrap_or_default();
        format!(r#"<article><header><a href="/{author}/">{author}</a></header></article>{next}"#)
    }

    /// Feed for #fitness: a too-big account, then a matching one, then the big one again.
    fn fitness_session() -> SnapshotSession {
        SnapshotSession::new()
            .with_page(
                format!("{BASE}/explore/tags/fitness/"),
                r#"<article><a href="/p/a1/">first</a></article>"#,
            )
            .with_page(format!("{BASE}/p/a1/"), feed_post("bigbrand", Some("a2")))
            .with_page(format!("{BASE}/p/a2/"), feed_post("jane.lifts", Some("a3")))
            .with_page(format!("{BASE}/p/a3/"), feed_post("bigbrand", None))
            .with_page(
                format!("{BASE}/bigbrand/"),
                profile("8,000", "Official store", &["b1"]),
            )
            .with_page(
                format!("{BASE}/jane.lifts/"),
                profile("3,000", "Coach 📍 London", &["j1", "j2"]),
            )
            .with_page(format!("{BASE}/p/j1/"), liked_post("100"))
            .with_page(format!("{BASE}/p/j2/"), liked_post("200"))
    }

    fn config() -> Arc<Config> {
        let mut config = Config::default();
        config.browser.base_url = BASE.to_string();
        config.crawler.posts_per_tag = 3;
        Arc::new(config)
    }

    fn request(tags: &[&str], min: u64, max: u64) -> SearchRequest {
        SearchRequest::new(
            tags,
            FilterCriteria {
                min_followers: min,
                max_followers: max,
                location_hint: None,
                max_profiles: 20,
            },
        )
    }

    async fn run(context: SessionContext<SnapshotSession>, request: SearchRequest) -> Vec<Event> {
        DiscoveryPipeline::new(context, config())
            .with_policy(Box::new(AcceptAll))
            .with_pacer(Pacer::disabled())
            .run(request)
            .collect()
            .await
    }

    fn logs(events: &[Event]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Log(message) => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_unauthenticated_run_emits_single_error() {
        let session = fitness_session();
        let journal = session.journal();

        let events = run(SessionContext::new(session), request(&["fitness"], 0, 10)).await;

        assert_eq!(events, vec![Event::error("Not logged in")]);
        assert!(journal.lock().unwrap().navigations.is_empty());
    }

    #[tokio::test]
    async fn test_no_tags_is_fatal() {
        let context = SessionContext::authenticated(fitness_session());
        let events = run(context, request(&[" # ", ""], 0, 10)).await;
        assert_eq!(events, vec![Event::error("No tags provided")]);
    }

    #[tokio::test]
    async fn test_filter_scenario() {
        let session = fitness_session();
        let journal = session.journal();
        let context = SessionContext::authenticated(session);

        let events = run(context, request(&["#fitness"], 1000, 5000)).await;

        assert_eq!(
            logs(&events),
            vec![
                "Starting search for tags: fitness",
                "Scraping tag: #fitness...",
                "Checking @bigbrand...",
                "❌ Skipped @bigbrand: Followers (8000) not in range 1000-5000",
                "Checking @jane.lifts...",
                "✅ MATCH: @jane.lifts",
            ]
        );

        let profiles: Vec<&ProfileRecord> = events
            .iter()
            .filter_map(|e| match e {
                Event::Profile(record) => Some(record),
                _ => None,
            })
            .collect();
        assert_eq!(profiles.len(), 1);
        let jane = profiles[0];
        assert_eq!(jane.identity, "jane.lifts");
        assert_eq!(jane.followers, 3000);
        assert_eq!(jane.avg_likes, 150);
        assert_eq!(jane.engagement_rate, 5.0);
        assert_eq!(jane.location, "London");

        // The profile event comes right before its match log.
        let position = events
            .iter()
            .position(|e| matches!(e, Event::Profile(_)))
            .unwrap();
        assert_eq!(events[position + 1], Event::log("✅ MATCH: @jane.lifts"));

        match events.last() {
            Some(Event::Complete(summary)) => {
                assert_eq!(summary.profiles_found, 1);
                assert_eq!(summary.candidates_checked, 2);
                assert_eq!(summary.tags_scraped, 1);
                assert_eq!(summary.message(), "Search finished. Found 1 profiles.");
            }
            other => panic!("expected complete last, got {other:?}"),
        }
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

        // The rejected profile's posts were never opened.
        let journal = journal.lock().unwrap();
        assert!(!journal.visited(&format!("{BASE}/p/b1/")));
        assert!(journal.visited(&format!("{BASE}/p/j1/")));
        assert_eq!(journal.tabs_opened, 2);
        assert_eq!(journal.tabs_closed, 2);
    }

    #[tokio::test]
    async fn test_failed_tag_does_not_stop_run() {
        let context = SessionContext::authenticated(fitness_session());
        let events = run(context, request(&["missing", "fitness"], 1000, 5000)).await;

        assert!(matches!(
            &events[2],
            Event::Error(message) if message.starts_with("Error scraping tag #missing: ")
        ));
        assert!(events.iter().any(|e| matches!(e, Event::Profile(_))));
        assert!(events.last().is_some_and(Event::is_terminal));
    }

    #[tokio::test]
    async fn test_profile_cap_ends_run() {
        let context = SessionContext::authenticated(fitness_session());
        let mut request = request(&["fitness"], 0, 10_000);
        request.criteria.max_profiles = 1;

        let events = run(context, request).await;

        let found = events
            .iter()
            .filter(|e| matches!(e, Event::Profile(_)))
            .count();
        assert_eq!(found, 1);
        assert!(logs(&events).contains(&"✅ MATCH: @bigbrand"));
        assert!(!logs(&events).contains(&"Checking @jane.lifts..."));
    }

    #[tokio::test]
    async fn test_profile_tab_closed_when_switch_fails() {
        let session = fitness_session().with_fault(Fault::SwitchToNewTab);
        let journal = session.journal();
        let context = SessionContext::authenticated(session);

        let events = run(context, request(&["fitness"], 1000, 5000)).await;

        assert!(logs(&events).contains(&"Error processing post: Browser error: bring_to_front failed"));
        assert!(!events.iter().any(|e| matches!(e, Event::Profile(_))));
        assert!(events.last().is_some_and(Event::is_terminal));

        let journal = journal.lock().unwrap();
        assert!(journal.tabs_opened > 0);
        assert_eq!(journal.tabs_opened, journal.tabs_closed);
    }

    #[test]
    fn test_post_error_is_truncated() {
        let message = post_error(&"x".repeat(80));
        assert_eq!(message, format!("Error processing post: {}", "x".repeat(50)));
    }
}
