// src/lib.rs

//! tagscout: discover social-media profiles from topic tags.
//!
//! The crate drives one browsing session per search through tag feeds,
//! analyzes each newly seen author, and reports progress and accepted
//! profiles as a stream of [`models::Event`]s.

pub mod error;
pub mod models;
pub mod pipeline;
#[cfg(feature = "server")]
pub mod server;
pub mod services;
pub mod session;
pub mod utils;
