// src/error.rs

//! Unified error handling for the discovery pipeline.

use std::fmt;

use thiserror::Error;

/// Result type alias for tagscout operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// The browsing session reported a failure
    #[error("Session error: {0}")]
    Session(String),

    /// Navigation to a page failed
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    /// A required element was not present on the page
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// An element handle outlived the page it was taken from
    #[error("Stale element handle #{0}")]
    StaleElement(usize),

    /// No tab currently has focus
    #[error("No active tab")]
    NoActiveTab,

    /// Browser process or protocol error
    #[error("Browser error: {0}")]
    Browser(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a session error.
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session(message.into())
    }

    /// Create a navigation error.
    pub fn navigation(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Navigation {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a browser error.
    pub fn browser(message: impl fmt::Display) -> Self {
        Self::Browser(message.to_string())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_message() {
        let err = AppError::navigation("https://example.com/x/", "timed out");
        assert_eq!(
            err.to_string(),
            "Navigation to https://example.com/x/ failed: timed out"
        );
    }

    #[test]
    fn test_selector_message() {
        let err = AppError::selector("[[bad", "unexpected token");
        assert_eq!(err.to_string(), "Invalid selector '[[bad': unexpected token");
    }
}
