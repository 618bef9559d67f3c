// src/services/analyzer.rs

//! Candidate analysis: extraction, filtering, and deferred expensive work.
//!
//! Order is fixed: basic extraction, follower range, extended criteria,
//! location, engagement. Location and engagement cost several page
//! interactions each, so they only run for candidates that passed the
//! cheap filters.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::error::Result;
use crate::models::{Config, FilterCriteria, ProfileRecord};
use crate::services::engagement::EngagementEstimator;
use crate::services::extractor::{AttributeExtractor, BasicAttributes};
use crate::services::location::LocationResolver;
use crate::session::BrowsingSession;
use crate::utils::pacing::Pacer;

/// Why a candidate was not accepted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("Followers ({followers}) not in range {min}-{max}")]
    FollowersOutOfRange { followers: u64, min: u64, max: u64 },

    #[error("Does not match extended criteria")]
    ExtendedCriteria,

    #[error("Error: {0}")]
    Error(String),
}

/// Secondary filter applied after the follower range passes.
pub trait RejectionPolicy: Send {
    fn rejects(&mut self, record: &ProfileRecord) -> bool;
}

/// Rejects a fixed fraction of candidates at random.
pub struct RandomRejection {
    probability: f64,
    rng: StdRng,
}

impl RandomRejection {
    pub fn new(probability: f64) -> Self {
        Self {
            probability: bounded(probability),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(probability: f64, seed: u64) -> Self {
        Self {
            probability: bounded(probability),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

fn bounded(probability: f64) -> f64 {
    if probability.is_finite() {
        probability.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

impl RejectionPolicy for RandomRejection {
    fn rejects(&mut self, _record: &ProfileRecord) -> bool {
        self.rng.gen_bool(self.probability)
    }
}

/// Never rejects.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl RejectionPolicy for AcceptAll {
    fn rejects(&mut self, _record: &ProfileRecord) -> bool {
        false
    }
}

/// Analysis progress, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    BasicDataExtracted,
    FollowerFiltered,
    LocationResolved,
    EngagementComputed,
}

/// Analyzes one candidate profile on the focused page.
pub struct ProfileAnalyzer {
    extractor: AttributeExtractor,
    location: LocationResolver,
    engagement: EngagementEstimator,
    policy: Box<dyn RejectionPolicy>,
}

impl ProfileAnalyzer {
    /// Analyzer with the configured random extended-criteria rejection.
    pub fn new(config: &Config) -> Self {
        let policy = RandomRejection::new(config.filter.extended_rejection_probability);
        Self::with_policy(config, Box::new(policy))
    }

    pub fn with_policy(config: &Config, policy: Box<dyn RejectionPolicy>) -> Self {
        Self {
            extractor: AttributeExtractor::new(),
            location: LocationResolver::new(&config.crawler),
            engagement: EngagementEstimator::new(&config.crawler),
            policy,
        }
    }

    pub fn set_policy(&mut self, policy: Box<dyn RejectionPolicy>) {
        self.policy = policy;
    }

    /// Analyze the profile of `identity` found under `tag`.
    ///
    /// Never fails: internal errors become [`Rejection::Error`].
    pub async fn analyze<S>(
        &mut self,
        session: &mut S,
        pacer: &mut Pacer,
        identity: &str,
        tag: &str,
        criteria: &FilterCriteria,
    ) -> std::result::Result<ProfileRecord, Rejection>
    where
        S: BrowsingSession + ?Sized,
    {
        match self.evaluate(session, pacer, identity, tag, criteria).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::debug!("Analysis of @{} failed: {}", identity, e);
                Err(Rejection::Error(e.to_string()))
            }
        }
    }

    async fn evaluate<S>(
        &mut self,
        session: &mut S,
        pacer: &mut Pacer,
        identity: &str,
        tag: &str,
        criteria: &FilterCriteria,
    ) -> Result<std::result::Result<ProfileRecord, Rejection>>
    where
        S: BrowsingSession + ?Sized,
    {
        let basic = self.extractor.extract(session, identity).await?;
        trace_stage(identity, Stage::BasicDataExtracted);

        if !criteria.accepts_followers(basic.followers) {
            log::debug!("@{} skipped: followers out of range", identity);
            return Ok(Err(Rejection::FollowersOutOfRange {
                followers: basic.followers,
                min: criteria.min_followers,
                max: criteria.max_followers,
            }));
        }
        let mut record = build_record(identity, tag, basic);
        trace_stage(identity, Stage::FollowerFiltered);

        if self.policy.rejects(&record) {
            log::debug!("@{} skipped: extended criteria", identity);
            return Ok(Err(Rejection::ExtendedCriteria));
        }

        if let Some(location) = self
            .location
            .resolve(session, pacer, &record.biography)
            .await
        {
            record.location = location;
        }
        if let Some(hint) = &criteria.location_hint {
            log::debug!(
                "@{} location {:?} (requested {:?}, not enforced)",
                identity,
                record.location,
                hint
            );
        }
        trace_stage(identity, Stage::LocationResolved);

        let engagement = self
            .engagement
            .estimate(session, pacer, record.followers)
            .await;
        record.avg_likes = engagement.avg_likes;
        record.engagement_rate = engagement.rate;
        trace_stage(identity, Stage::EngagementComputed);

        log::info!(
            "@{} accepted: {} followers, {}% engagement, location {}",
            identity,
            record.followers,
            record.engagement_rate,
            record.location
        );
        Ok(Ok(record))
    }
}

fn trace_stage(identity: &str, stage: Stage) {
    log::trace!("@{} -> {:?}", identity, stage);
}

fn build_record(identity: &str, tag: &str, basic: BasicAttributes) -> ProfileRecord {
    let mut record = ProfileRecord::new(identity, tag);
    record.followers = basic.followers;
    record.following = basic.following;
    record.post_count = basic.post_count;
    record.display_name = basic.display_name;
    record.biography = basic.biography;
    record.avatar_url = basic.avatar_url;
    record.verified = basic.verified;
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SnapshotSession;
    use crate::session::snapshot::Fault;

    const PROFILE: &str = "https://site.test/jane/";

    fn profile_page(followers: &str) -> String {
        format!(
            r#"<html><head><meta name="description" content="{followers} Followers, 12 Following, 3 Posts"></head>
            <body><header><img src="/a.jpg"><div dir="auto">Coach 📍 London</div></header>
            <main><article>
              <a href="/p/one/">1</a><a href="/p/two/">2</a>
            </article></main></body></html>"#
        )
    }

    fn post_page(likes: &str) -> String {
        format!("<article><section><div><span><span>{likes}</span></span></div></section></article>")
    }

    fn session(followers: &str) -> SnapshotSession {
        SnapshotSession::new()
            .with_page(PROFILE, profile_page(followers))
            .with_page("https://site.test/p/one/", post_page("90"))
            .with_page("https://site.test/p/two/", post_page("150"))
    }

    fn criteria(min: u64, max: u64) -> FilterCriteria {
        FilterCriteria {
            min_followers: min,
            max_followers: max,
            ..FilterCriteria::default()
        }
    }

    fn analyzer() -> ProfileAnalyzer {
        ProfileAnalyzer::with_policy(&Config::default(), Box::new(AcceptAll))
    }

    #[test]
    fn test_rejection_messages() {
        let out_of_range = Rejection::FollowersOutOfRange {
            followers: 8000,
            min: 1000,
            max: 5000,
        };
        assert_eq!(out_of_range.to_string(), "Followers (8000) not in range 1000-5000");
        assert_eq!(
            Rejection::ExtendedCriteria.to_string(),
            "Does not match extended criteria"
        );
        assert_eq!(Rejection::Error("boom".into()).to_string(), "Error: boom");
    }

    #[test]
    fn test_random_rejection_bounds() {
        let record = ProfileRecord::new("a", "t");
        let mut never = RandomRejection::seeded(0.0, 7);
        let mut always = RandomRejection::seeded(1.0, 7);
        assert!((0..100).all(|_| !never.rejects(&record)));
        assert!((0..100).all(|_| always.rejects(&record)));
    }

    #[tokio::test]
    async fn test_out_of_range_skips_engagement() {
        let mut session = session("8,000");
        session.navigate(PROFILE).await.unwrap();
        let journal = session.journal();

        let result = analyzer()
            .analyze(
                &mut session,
                &mut Pacer::disabled(),
                "jane",
                "fitness",
                &criteria(1000, 5000),
            )
            .await;

        let rejection = result.unwrap_err();
        assert!(rejection.to_string().contains("not in range"));
        // No post was opened.
        let journal = journal.lock().unwrap();
        assert_eq!(journal.clicks, 0);
        assert_eq!(journal.navigations, vec![PROFILE.to_string()]);
    }

    #[tokio::test]
    async fn test_bounds_are_inclusive() {
        for followers in ["1000", "5000"] {
            let mut session = session(followers);
            session.navigate(PROFILE).await.unwrap();
            let result = analyzer()
                .analyze(
                    &mut session,
                    &mut Pacer::disabled(),
                    "jane",
                    "fitness",
                    &criteria(1000, 5000),
                )
                .await;
            assert!(result.is_ok(), "{followers} should be accepted");
        }
    }

    #[tokio::test]
    async fn test_accepted_profile_is_complete() {
        let mut session = session("3,000");
        session.navigate(PROFILE).await.unwrap();

        let record = analyzer()
            .analyze(
                &mut session,
                &mut Pacer::disabled(),
                "jane",
                "fitness",
                &criteria(1000, 5000),
            )
            .await
            .unwrap();

        assert_eq!(record.identity, "jane");
        assert_eq!(record.followers, 3000);
        assert_eq!(record.following, 12);
        assert_eq!(record.post_count, 3);
        assert_eq!(record.location, "London");
        assert_eq!(record.avg_likes, 120);
        assert_eq!(record.engagement_rate, 4.0);
        assert_eq!(record.matched_tags, vec!["fitness".to_string()]);
    }

    #[tokio::test]
    async fn test_engagement_failure_keeps_accepted_profile() {
        let mut session = session("3,000").with_fault(Fault::FindAll {
            selector: r#"article a[href*="/p/"]"#.to_string(),
            after: 0,
        });
        session.navigate(PROFILE).await.unwrap();

        let record = analyzer()
            .analyze(
                &mut session,
                &mut Pacer::disabled(),
                "jane",
                "fitness",
                &criteria(1000, 5000),
            )
            .await
            .unwrap();

        assert_eq!(record.followers, 3000);
        assert_eq!(record.location, "London");
        assert_eq!(record.avg_likes, 0);
        assert_eq!(record.engagement_rate, 0.0);
    }

    #[tokio::test]
    async fn test_policy_rejection_skips_location_and_engagement() {
        let mut session = session("3000");
        session.navigate(PROFILE).await.unwrap();
        let journal = session.journal();

        let mut analyzer =
            ProfileAnalyzer::with_policy(&Config::default(), Box::new(RandomRejection::seeded(1.0, 1)));
        let result = analyzer
            .analyze(
                &mut session,
                &mut Pacer::disabled(),
                "jane",
                "fitness",
                &criteria(0, 5000),
            )
            .await;

        assert_eq!(result, Err(Rejection::ExtendedCriteria));
        assert_eq!(journal.lock().unwrap().clicks, 0);
    }

    #[tokio::test]
    async fn test_session_failure_becomes_rejection() {
        let mut session = SnapshotSession::new();
        session.close_current_tab().await.unwrap();

        let result = analyzer()
            .analyze(
                &mut session,
                &mut Pacer::disabled(),
                "jane",
                "fitness",
                &criteria(0, 5000),
            )
            .await;

        match result {
            Err(Rejection::Error(message)) => assert!(message.contains("No active tab")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
