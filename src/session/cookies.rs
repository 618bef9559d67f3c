// src/session/cookies.rs

//! Stored cookie jar used to authenticate a session.
//!
//! The jar is a JSON array in the format browser cookie-export tools write:
//! `[{"name": .., "value": .., "domain": .., "path": .., "expiry": .., "secure": .., "httpOnly": ..}]`

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    /// Unix seconds
    #[serde(default, alias = "expirationDate")]
    pub expiry: Option<f64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, rename = "httpOnly")]
    pub http_only: bool,
}

/// Load a cookie jar. An empty jar is an error: authentication cannot succeed.
pub fn load_cookies(path: &Path) -> Result<Vec<StoredCookie>> {
    if !path.exists() {
        return Err(AppError::session(format!(
            "cookie file not found: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let cookies: Vec<StoredCookie> = serde_json::from_str(&content)?;

    if cookies.is_empty() {
        return Err(AppError::session(format!(
            "cookie file is empty: {}",
            path.display()
        )));
    }

    log::debug!("Loaded {} cookies from {}", cookies.len(), path.display());
    Ok(cookies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_cookies() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"name": "sessionid", "value": "abc", "domain": ".instagram.com", "path": "/", "expiry": 1893456000, "secure": true, "httpOnly": true}},
                {{"name": "csrftoken", "value": "xyz"}}
            ]"#
        )
        .unwrap();

        let cookies = load_cookies(file.path()).unwrap();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].name, "sessionid");
        assert!(cookies[0].http_only);
        assert_eq!(cookies[0].expiry, Some(1893456000.0));
        assert_eq!(cookies[1].domain, None);
        assert!(!cookies[1].secure);
    }

    #[test]
    fn test_missing_or_empty_jar() {
        assert!(load_cookies(Path::new("/nonexistent/cookies.json")).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[]").unwrap();
        assert!(matches!(
            load_cookies(file.path()),
            Err(AppError::Session(_))
        ));
    }
}
