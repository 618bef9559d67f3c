// src/models/mod.rs

//! Domain models for the discovery pipeline.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod criteria;
mod event;
mod profile;

// Re-export all public types
pub use config::{
    BrowserConfig, Config, CrawlerConfig, FilterConfig, LoggingConfig, PacingConfig,
    ServerConfig, SessionConfig,
};
pub use criteria::{FilterCriteria, SearchRequest, normalize_tags, split_tags};
pub use event::{Event, RunSummary, WireMessage};
pub use profile::{ProfileRecord, UNKNOWN_LOCATION};
