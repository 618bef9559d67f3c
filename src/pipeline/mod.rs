//! Pipeline entry points.
//!
//! - `DiscoveryPipeline`: crawl tag feeds and stream analyzed profiles

mod discovery;

pub use discovery::DiscoveryPipeline;
