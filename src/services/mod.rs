//! Service layer for profile discovery.
//!
//! This module contains the business logic for:
//! - Attribute extraction (`AttributeExtractor`)
//! - Location resolution (`LocationResolver`)
//! - Engagement sampling (`EngagementEstimator`)
//! - Candidate analysis (`ProfileAnalyzer`)
//! - Tag feed traversal (`TagCrawler`)

pub mod analyzer;
mod crawler;
pub mod engagement;
pub mod extractor;
pub mod location;

pub use analyzer::{AcceptAll, ProfileAnalyzer, RandomRejection, Rejection, RejectionPolicy};
pub use crawler::{CrawlStep, TagCrawler};
pub use engagement::{Engagement, EngagementEstimator, engagement_rate};
pub use extractor::{AttributeExtractor, BasicAttributes};
pub use location::LocationResolver;
