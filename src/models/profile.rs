//! Profile record produced for accepted candidates.

use serde::{Deserialize, Serialize};

/// Location shown when none could be resolved.
pub const UNKNOWN_LOCATION: &str = "Unknown";

/// A fully analyzed profile.
///
/// Field names on the wire follow the streaming clients' expectations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileRecord {
    /// Handle; unique within one run
    #[serde(rename = "username")]
    pub identity: String,

    /// Avatar image URL (empty when not found)
    #[serde(rename = "profile_pic_url")]
    pub avatar_url: String,

    /// Display name (empty when not found)
    #[serde(rename = "full_name")]
    pub display_name: String,

    /// Biography text (may be empty)
    pub biography: String,

    /// Follower count; 0 signals that extraction failed
    pub followers: u64,

    pub following: u64,

    #[serde(rename = "posts_count")]
    pub post_count: u64,

    #[serde(rename = "is_verified")]
    pub verified: bool,

    /// Best-effort location, advisory only
    #[serde(rename = "country")]
    pub location: String,

    /// Engagement rate as a percentage of followers
    pub engagement_rate: f64,

    pub avg_likes: u64,

    /// Always 0: comment counts are not sampled
    pub avg_comments: u64,

    /// Tags that surfaced this identity, in discovery order
    #[serde(rename = "tags_matched")]
    pub matched_tags: Vec<String>,
}

impl ProfileRecord {
    /// Create an empty record for a candidate found under `tag`.
    pub fn new(identity: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            avatar_url: String::new(),
            display_name: String::new(),
            biography: String::new(),
            followers: 0,
            following: 0,
            post_count: 0,
            verified: false,
            location: UNKNOWN_LOCATION.to_string(),
            engagement_rate: 0.0,
            avg_likes: 0,
            avg_comments: 0,
            matched_tags: vec![tag.into()],
        }
    }

    /// Whether the follower count looks like an extraction failure.
    pub fn followers_missing(&self) -> bool {
        self.followers == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_defaults() {
        let record = ProfileRecord::new("jane.lifts", "fitness");
        assert_eq!(record.location, "Unknown");
        assert_eq!(record.matched_tags, vec!["fitness".to_string()]);
        assert!(record.followers_missing());
    }

    #[test]
    fn test_wire_field_names() {
        let mut record = ProfileRecord::new("jane.lifts", "fitness");
        record.followers = 3000;
        record.verified = true;
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["username"], "jane.lifts");
        assert_eq!(json["followers"], 3000);
        assert_eq!(json["is_verified"], true);
        assert_eq!(json["country"], "Unknown");
        assert_eq!(json["tags_matched"][0], "fitness");
        assert_eq!(json["avg_comments"], 0);
        assert!(json.get("profile_pic_url").is_some());
    }
}
