// src/services/engagement.rs

//! Engagement estimation from a sample of recent posts.

use crate::error::Result;
use crate::models::CrawlerConfig;
use crate::session::{BrowsingSession, ElementHandle, Key, Locator, press_key};
use crate::utils::pacing::{Pacer, SAMPLE_CLOSE, SAMPLE_OPEN};
use crate::utils::try_parse_count;

const POST_LINKS: &str = r#"article a[href*="/p/"]"#;
const LIKE_COUNT: &str = r#"section div span > span, a[href*="liked_by"] span"#;

/// Average likes and engagement rate of one profile.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Engagement {
    pub avg_likes: u64,
    /// Percentage of followers, two decimals
    pub rate: f64,
    /// Posts whose like count could be read
    pub sampled: usize,
}

/// `avg_likes / followers * 100`, rounded to two decimals; 0 without followers.
pub fn engagement_rate(avg_likes: u64, followers: u64) -> f64 {
    if followers == 0 {
        return 0.0;
    }
    let rate = avg_likes as f64 / followers as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

pub struct EngagementEstimator {
    sample_size: usize,
}

impl EngagementEstimator {
    pub fn new(config: &CrawlerConfig) -> Self {
        Self {
            sample_size: config.engagement_sample_size,
        }
    }

    /// Open up to `sample_size` recent posts of the focused profile and
    /// average their like counts. Every opened post is closed again.
    ///
    /// Never fails: a broken sample ends early and the average covers the
    /// posts read so far.
    pub async fn estimate<S>(
        &self,
        session: &mut S,
        pacer: &mut Pacer,
        followers: u64,
    ) -> Engagement
    where
        S: BrowsingSession + ?Sized,
    {
        let available = match session.find_all(&Locator::css(POST_LINKS)).await {
            Ok(posts) => posts.len(),
            Err(e) => {
                log::warn!("Post grid unavailable, engagement not sampled: {}", e);
                0
            }
        };
        let count = available.min(self.sample_size);

        let mut total_likes = 0u64;
        let mut sampled = 0usize;

        for index in 0..count {
            // Handles do not survive opening a post, so re-query the grid.
            let posts = match session.find_all(&Locator::css(POST_LINKS)).await {
                Ok(posts) => posts,
                Err(e) => {
                    log::debug!("Engagement sample stopped at post {}: {}", index, e);
                    break;
                }
            };
            let Some(post) = posts.get(index).copied() else {
                break;
            };

            match self.read_post(session, pacer, post).await {
                Ok(Some(likes)) => {
                    total_likes = total_likes.saturating_add(likes);
                    sampled += 1;
                }
                Ok(None) => log::debug!("Post {} has no readable like count", index),
                Err(e) => log::debug!("Failed to sample post {}: {}", index, e),
            }

            if let Err(e) = press_key(session, Key::Escape).await {
                log::debug!("Failed to close post {}: {}", index, e);
            }
            pacer.pause(session, SAMPLE_CLOSE).await;
        }

        let avg_likes = if sampled > 0 {
            total_likes / sampled as u64
        } else {
            0
        };
        let engagement = Engagement {
            avg_likes,
            rate: engagement_rate(avg_likes, followers),
            sampled,
        };
        log::debug!(
            "Engagement over {}/{} posts: avg {} likes, {}%",
            sampled,
            count,
            engagement.avg_likes,
            engagement.rate
        );
        engagement
    }

    async fn read_post<S>(
        &self,
        session: &mut S,
        pacer: &mut Pacer,
        post: ElementHandle,
    ) -> Result<Option<u64>>
    where
        S: BrowsingSession + ?Sized,
    {
        session.click(post).await?;
        pacer.pause(session, SAMPLE_OPEN).await;

        let Some(likes) = session.find_one(&Locator::css(LIKE_COUNT)).await? else {
            return Ok(None);
        };
        let text = session.read_text(likes).await?;
        Ok(try_parse_count(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SnapshotSession;
    use crate::session::snapshot::Fault;

    const PROFILE: &str = "https://site.test/jane/";

    fn post(likes: Option<&str>) -> String {
        let section = likes
            .map(|l| format!("<section><div><span><span>{l}</span></span></div></section>"))
            .unwrap_or_default();
        format!("<article role=\"dialog\">{section}</article>")
    }

    fn profile_with_posts(likes: &[Option<&str>]) -> SnapshotSession {
        let links: String = (0..likes.len())
            .map(|i| format!(r#"<a href="/p/post{i}/">post</a>"#))
            .collect();
        let mut session =
            SnapshotSession::new().with_page(PROFILE, format!("<main><article>{links}</article></main>"));
        for (i, l) in likes.iter().enumerate() {
            session.add_page(format!("https://site.test/p/post{i}/"), post(*l));
        }
        session
    }

    #[test]
    fn test_rate_rounding_and_zero_guard() {
        assert_eq!(engagement_rate(150, 3000), 5.0);
        assert_eq!(engagement_rate(1, 3), 33.33);
        assert_eq!(engagement_rate(500, 0), 0.0);
    }

    #[tokio::test]
    async fn test_average_over_successful_reads() {
        let mut session = profile_with_posts(&[Some("100"), None, Some("1.2K"), Some("200")]);
        session.navigate(PROFILE).await.unwrap();

        let engagement = EngagementEstimator::new(&CrawlerConfig::default())
            .estimate(&mut session, &mut Pacer::disabled(), 3000)
            .await;

        assert_eq!(engagement.sampled, 3);
        assert_eq!(engagement.avg_likes, 500);
        assert_eq!(engagement.rate, 16.67);

        // Every opened post was closed, including the one without likes.
        let journal = session.journal();
        let journal = journal.lock().unwrap();
        assert_eq!(journal.keys.len(), 4);
        assert!(journal.keys.iter().all(|k| *k == Key::Escape));
        assert_eq!(session.current_url().await.unwrap(), PROFILE);
    }

    #[tokio::test]
    async fn test_sample_is_bounded() {
        let likes = vec![Some("10"); 15];
        let mut session = profile_with_posts(&likes);
        session.navigate(PROFILE).await.unwrap();

        let engagement = EngagementEstimator::new(&CrawlerConfig::default())
            .estimate(&mut session, &mut Pacer::disabled(), 0)
            .await;

        assert_eq!(engagement.sampled, 12);
        assert_eq!(engagement.avg_likes, 10);
        assert_eq!(engagement.rate, 0.0);
    }

    #[tokio::test]
    async fn test_unreadable_likes_do_not_deflate_average() {
        let mut session =
            profile_with_posts(&[Some("300"), Some("Liked by anna and others"), Some("100")]);
        session.navigate(PROFILE).await.unwrap();

        let engagement = EngagementEstimator::new(&CrawlerConfig::default())
            .estimate(&mut session, &mut Pacer::disabled(), 1000)
            .await;

        assert_eq!(engagement.sampled, 2);
        assert_eq!(engagement.avg_likes, 200);
        assert_eq!(engagement.rate, 20.0);
    }

    #[tokio::test]
    async fn test_grid_failure_yields_empty_sample() {
        let mut session = profile_with_posts(&[Some("100")]).with_fault(Fault::FindAll {
            selector: POST_LINKS.to_string(),
            after: 0,
        });
        session.navigate(PROFILE).await.unwrap();

        let engagement = EngagementEstimator::new(&CrawlerConfig::default())
            .estimate(&mut session, &mut Pacer::disabled(), 1000)
            .await;
        assert_eq!(engagement, Engagement::default());
    }

    #[tokio::test]
    async fn test_failure_mid_sample_keeps_posts_read() {
        // Count query, then two per-post queries succeed; the third fails.
        let mut session = profile_with_posts(&[Some("100"), Some("300"), Some("900")]).with_fault(
            Fault::FindAll {
                selector: POST_LINKS.to_string(),
                after: 3,
            },
        );
        session.navigate(PROFILE).await.unwrap();

        let engagement = EngagementEstimator::new(&CrawlerConfig::default())
            .estimate(&mut session, &mut Pacer::disabled(), 2000)
            .await;

        assert_eq!(engagement.sampled, 2);
        assert_eq!(engagement.avg_likes, 200);
        assert_eq!(engagement.rate, 10.0);
    }

    #[tokio::test]
    async fn test_no_posts() {
        let mut session = profile_with_posts(&[]);
        session.navigate(PROFILE).await.unwrap();

        let engagement = EngagementEstimator::new(&CrawlerConfig::default())
            .estimate(&mut session, &mut Pacer::disabled(), 1000)
            .await;
        assert_eq!(engagement, Engagement::default());
    }
}
