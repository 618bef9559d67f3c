//! Search request and filter criteria.

use serde::{Deserialize, Serialize};

use crate::models::Config;

/// Immutable filter applied to every candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Inclusive lower follower bound
    pub min_followers: u64,

    /// Inclusive upper follower bound
    pub max_followers: u64,

    /// Informational only; never causes a rejection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_hint: Option<String>,

    /// Stop after this many accepted profiles
    pub max_profiles: usize,
}

impl FilterCriteria {
    /// Build criteria from the configured defaults.
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_followers: config.filter.default_min_followers,
            max_followers: config.filter.default_max_followers,
            location_hint: None,
            max_profiles: config.crawler.default_max_profiles,
        }
    }

    /// Inclusive follower range check.
    pub fn accepts_followers(&self, followers: u64) -> bool {
        self.min_followers <= followers && followers <= self.max_followers
    }
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A validated search request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub tags: Vec<String>,
    pub criteria: FilterCriteria,
}

impl SearchRequest {
    /// Create a request, normalizing the tag list.
    pub fn new<I, T>(tags: I, criteria: FilterCriteria) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self {
            tags: normalize_tags(tags),
            criteria,
        }
    }
}

/// Trim tags, drop a leading `#`, and discard empties. Order is kept.
pub fn normalize_tags<I, T>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().trim_start_matches('#').trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Split a comma-separated tag list as sent by streaming clients.
pub fn split_tags(raw: &str) -> Vec<String> {
    normalize_tags(raw.split(','))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criteria(min: u64, max: u64) -> FilterCriteria {
        FilterCriteria {
            min_followers: min,
            max_followers: max,
            location_hint: None,
            max_profiles: 20,
        }
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let c = criteria(1000, 5000);
        assert!(c.accepts_followers(1000));
        assert!(c.accepts_followers(5000));
        assert!(c.accepts_followers(3000));
        assert!(!c.accepts_followers(999));
        assert!(!c.accepts_followers(5001));
    }

    #[test]
    fn test_acceptance_matches_range_for_many_values() {
        let c = criteria(10, 20);
        for followers in 0..40 {
            assert_eq!(
                c.accepts_followers(followers),
                (10..=20).contains(&followers)
            );
        }
    }

    #[test]
    fn test_default_criteria() {
        let c = FilterCriteria::default();
        assert_eq!(c.min_followers, 0);
        assert_eq!(c.max_followers, 1_000_000_000);
        assert_eq!(c.max_profiles, 20);
    }

    #[test]
    fn test_normalize_tags() {
        assert_eq!(
            split_tags(" #fitness, yoga ,,# ,#gym"),
            vec!["fitness", "yoga", "gym"]
        );
    }
}
