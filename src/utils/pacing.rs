// src/utils/pacing.rs

//! Randomized human-pacing delays.
//!
//! Every wait goes through the browsing session's `sleep`, so test sessions
//! can record delays instead of blocking.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::PacingConfig;
use crate::session::BrowsingSession;

/// A bounded random wait, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepDelay {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl StepDelay {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub const fn fixed(ms: u64) -> Self {
        Self::new(ms, ms)
    }
}

/// Waiting for a tag feed to render.
pub const FEED_LOAD: StepDelay = StepDelay::new(4000, 6000);
/// Waiting for a post overlay to open.
pub const POST_OPEN: StepDelay = StepDelay::new(2000, 3000);
/// Moving to the next post in a feed.
pub const POST_ADVANCE: StepDelay = StepDelay::new(2000, 3000);
/// Waiting for a profile opened in a new tab.
pub const PROFILE_LOAD: StepDelay = StepDelay::new(3000, 5000);
/// Waiting for a sampled post to open.
pub const SAMPLE_OPEN: StepDelay = StepDelay::new(1000, 2000);
/// Waiting for a sampled post to close.
pub const SAMPLE_CLOSE: StepDelay = StepDelay::new(500, 1000);
/// Waiting for a menu to settle after a click.
pub const MENU_SETTLE: StepDelay = StepDelay::fixed(2000);
/// One poll of the account panel.
pub const PANEL_POLL: StepDelay = StepDelay::fixed(1000);
/// Waiting for a panel to close.
pub const PANEL_CLOSE: StepDelay = StepDelay::fixed(500);

/// Source of randomized waits for one pipeline run.
pub struct Pacer {
    human: StepDelay,
    scale: f64,
    rng: StdRng,
}

impl Pacer {
    pub fn new(config: &PacingConfig) -> Self {
        Self {
            human: StepDelay::new(config.min_delay_ms, config.max_delay_ms),
            scale: config.scale,
            rng: StdRng::from_entropy(),
        }
    }

    /// A pacer that never waits.
    pub fn disabled() -> Self {
        Self {
            human: StepDelay::fixed(0),
            scale: 0.0,
            rng: StdRng::seed_from_u64(0),
        }
    }

    /// Pick a concrete duration for `step`, after scaling.
    pub fn duration(&mut self, step: StepDelay) -> Duration {
        if self.scale <= 0.0 {
            return Duration::ZERO;
        }
        let (lo, hi) = if step.min_ms <= step.max_ms {
            (step.min_ms, step.max_ms)
        } else {
            (step.max_ms, step.min_ms)
        };
        let ms = self.rng.gen_range(lo..=hi);
        Duration::from_millis((ms as f64 * self.scale) as u64)
    }

    /// Wait a random duration within `step`.
    pub async fn pause<S>(&mut self, session: &mut S, step: StepDelay)
    where
        S: BrowsingSession + ?Sized,
    {
        let duration = self.duration(step);
        if !duration.is_zero() {
            session.sleep(duration).await;
        }
    }

    /// Wait within the configured generic human delay.
    pub async fn human_pause<S>(&mut self, session: &mut S)
    where
        S: BrowsingSession + ?Sized,
    {
        let step = self.human;
        self.pause(session, step).await;
    }
}
