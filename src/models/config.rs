//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Browser launch and target site settings
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Authentication bootstrap settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Feed traversal and sampling limits
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Default filter bounds and extended-criteria policy
    #[serde(default)]
    pub filter: FilterConfig,

    /// Human-pacing delays
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Streaming server settings
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.browser.base_url.trim().is_empty() {
            return Err(AppError::validation("browser.base_url is empty"));
        }
        Url::parse(&self.browser.base_url)
            .map_err(|e| AppError::validation(format!("browser.base_url is invalid: {e}")))?;
        if self.browser.page_load_timeout_secs == 0 {
            return Err(AppError::validation(
                "browser.page_load_timeout_secs must be > 0",
            ));
        }
        if self.crawler.posts_per_tag == 0 {
            return Err(AppError::validation("crawler.posts_per_tag must be > 0"));
        }
        if self.crawler.engagement_sample_size == 0 {
            return Err(AppError::validation(
                "crawler.engagement_sample_size must be > 0",
            ));
        }
        if self.crawler.about_panel_polls == 0 {
            return Err(AppError::validation("crawler.about_panel_polls must be > 0"));
        }
        if self.crawler.ancestor_search_depth == 0 {
            return Err(AppError::validation(
                "crawler.ancestor_search_depth must be > 0",
            ));
        }
        if self.filter.default_min_followers > self.filter.default_max_followers {
            return Err(AppError::validation(
                "filter.default_min_followers exceeds filter.default_max_followers",
            ));
        }
        let p = self.filter.extended_rejection_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(AppError::validation(
                "filter.extended_rejection_probability must be within [0, 1]",
            ));
        }
        if self.pacing.min_delay_ms > self.pacing.max_delay_ms {
            return Err(AppError::validation(
                "pacing.min_delay_ms exceeds pacing.max_delay_ms",
            ));
        }
        if !self.pacing.scale.is_finite() || self.pacing.scale < 0.0 {
            return Err(AppError::validation(
                "pacing.scale must be a non-negative number",
            ));
        }
        Ok(())
    }

    /// Resolve the cookie jar path relative to a base directory.
    pub fn cookies_path(&self, base: &Path) -> PathBuf {
        let path = Path::new(&self.session.cookies_file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        }
    }
}

/// Browser launch settings and the site being scanned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Site root that tag feeds and profiles hang off
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Run without a visible window
    #[serde(default)]
    pub headless: bool,

    /// Optional proxy server (`host:port`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,

    /// Explicit Chrome/Chromium binary; auto-detected when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_executable: Option<PathBuf>,

    /// Page load timeout in seconds
    #[serde(default = "defaults::page_load_timeout")]
    pub page_load_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            headless: false,
            proxy: None,
            chrome_executable: None,
            page_load_timeout_secs: defaults::page_load_timeout(),
        }
    }
}

/// Authentication bootstrap settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// JSON cookie jar exported from a logged-in browser
    #[serde(default = "defaults::cookies_file")]
    pub cookies_file: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookies_file: defaults::cookies_file(),
        }
    }
}

/// Feed traversal and sampling limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Posts inspected per tag before moving on
    #[serde(default = "defaults::posts_per_tag")]
    pub posts_per_tag: usize,

    /// Consecutive per-post failures tolerated before a tag is abandoned
    #[serde(default = "defaults::max_consecutive_errors")]
    pub max_consecutive_errors: usize,

    /// Result cap used when a request does not name one
    #[serde(default = "defaults::max_profiles")]
    pub default_max_profiles: usize,

    /// Recent posts opened to estimate engagement
    #[serde(default = "defaults::engagement_sample_size")]
    pub engagement_sample_size: usize,

    /// One-second polls spent waiting for the account panel
    #[serde(default = "defaults::about_panel_polls")]
    pub about_panel_polls: usize,

    /// Ancestor levels searched for a clickable menu control
    #[serde(default = "defaults::ancestor_search_depth")]
    pub ancestor_search_depth: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            posts_per_tag: defaults::posts_per_tag(),
            max_consecutive_errors: defaults::max_consecutive_errors(),
            default_max_profiles: defaults::max_profiles(),
            engagement_sample_size: defaults::engagement_sample_size(),
            about_panel_polls: defaults::about_panel_polls(),
            ancestor_search_depth: defaults::ancestor_search_depth(),
        }
    }
}

/// Default filter bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub default_min_followers: u64,

    #[serde(default = "defaults::max_followers")]
    pub default_max_followers: u64,

    /// Probability that a candidate passing the follower filter is dropped anyway
    #[serde(default = "defaults::extended_rejection_probability")]
    pub extended_rejection_probability: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            default_min_followers: 0,
            default_max_followers: defaults::max_followers(),
            extended_rejection_probability: defaults::extended_rejection_probability(),
        }
    }
}

/// Randomized human-pacing delays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Lower bound of the generic human delay
    #[serde(default = "defaults::min_delay")]
    pub min_delay_ms: u64,

    /// Upper bound of the generic human delay
    #[serde(default = "defaults::max_delay")]
    pub max_delay_ms: u64,

    /// Multiplier applied to every delay (0 disables pacing)
    #[serde(default = "defaults::scale")]
    pub scale: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: defaults::min_delay(),
            max_delay_ms: defaults::max_delay(),
            scale: defaults::scale(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

/// Streaming server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "defaults::host")]
    pub host: String,

    #[serde(default = "defaults::port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::host(),
            port: defaults::port(),
        }
    }
}

mod defaults {
    // Browser defaults
    pub fn base_url() -> String {
        "https://www.instagram.com".into()
    }
    pub fn page_load_timeout() -> u64 {
        30
    }

    // Session defaults
    pub fn cookies_file() -> String {
        "selenium_cookies.json".into()
    }

    // Crawler defaults
    pub fn posts_per_tag() -> usize {
        30
    }
    pub fn max_consecutive_errors() -> usize {
        3
    }
    pub fn max_profiles() -> usize {
        20
    }
    pub fn engagement_sample_size() -> usize {
        12
    }
    pub fn about_panel_polls() -> usize {
        10
    }
    pub fn ancestor_search_depth() -> usize {
        10
    }

    // Filter defaults
    pub fn max_followers() -> u64 {
        1_000_000_000
    }
    pub fn extended_rejection_probability() -> f64 {
        0.1
    }

    // Pacing defaults
    pub fn min_delay() -> u64 {
        2000
    }
    pub fn max_delay() -> u64 {
        5000
    }
    pub fn scale() -> f64 {
        1.0
    }

    pub fn log_level() -> String {
        "info".into()
    }

    // Server defaults
    pub fn host() -> String {
        "0.0.0.0".into()
    }
    pub fn port() -> u16 {
        5000
    }
}
