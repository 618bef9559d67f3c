// src/session/mod.rs

//! Browsing-session abstraction.
//!
//! The pipeline drives a single stateful browser through [`BrowsingSession`].
//! Two drivers are provided:
//! - [`SnapshotSession`]: static HTML pages parsed with `scraper`
//! - `ChromeSession`: a real Chromium over CDP (`chrome` feature)

#[cfg(feature = "chrome")]
pub mod chrome;
mod context;
pub mod cookies;
pub mod snapshot;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

#[cfg(feature = "chrome")]
pub use chrome::ChromeSession;
pub use context::{SessionContext, SessionState};
pub use snapshot::SnapshotSession;

/// How to find elements on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// Elements matching a CSS selector
    Css(String),
    /// Elements matching `css` whose own text contains `contains`
    Text { css: String, contains: String },
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn text(css: impl Into<String>, contains: impl Into<String>) -> Self {
        Self::Text {
            css: css.into(),
            contains: contains.into(),
        }
    }

    /// The CSS part of the locator.
    pub fn selector(&self) -> &str {
        match self {
            Locator::Css(css) | Locator::Text { css, .. } => css,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(css) => write!(f, "{css}"),
            Locator::Text { css, contains } => write!(f, "{css} containing {contains:?}"),
        }
    }
}

/// Opaque reference to an element on the page it was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub(crate) usize);

impl ElementHandle {
    pub fn id(&self) -> usize {
        self.0
    }
}

/// Opaque reference to a browser tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TabHandle(pub(crate) usize);

/// Keys the pipeline sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    ArrowRight,
}

impl Key {
    /// DOM `KeyboardEvent.key` value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Key::Escape => "Escape",
            Key::ArrowRight => "ArrowRight",
        }
    }
}

/// A single stateful browser with one focused tab at a time.
///
/// Element handles are only valid for the page they were taken from.
#[async_trait]
pub trait BrowsingSession: Send {
    /// Load `url` in the focused tab.
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// All elements matching `locator`, in document order.
    async fn find_all(&mut self, locator: &Locator) -> Result<Vec<ElementHandle>>;

    /// First element matching `locator`.
    async fn find_one(&mut self, locator: &Locator) -> Result<Option<ElementHandle>> {
        Ok(self.find_all(locator).await?.into_iter().next())
    }

    async fn click(&mut self, element: ElementHandle) -> Result<()>;

    async fn send_keys(&mut self, element: ElementHandle, key: Key) -> Result<()>;

    /// Rendered text of the element, one line per text block.
    async fn read_text(&mut self, element: ElementHandle) -> Result<String>;

    async fn read_attribute(&mut self, element: ElementHandle, name: &str)
    -> Result<Option<String>>;

    /// Lower-case tag name.
    async fn tag_name(&mut self, element: ElementHandle) -> Result<String>;

    /// Parent element, `None` at the document root.
    async fn parent(&mut self, element: ElementHandle) -> Result<Option<ElementHandle>>;

    /// Open `url` in a new tab without moving focus.
    async fn open_new_tab(&mut self, url: &str) -> Result<TabHandle>;

    async fn switch_tab(&mut self, tab: TabHandle) -> Result<()>;

    async fn current_tab(&mut self) -> Result<TabHandle>;

    /// Close `tab`, focused or not. Closing the focused tab leaves no tab
    /// focused; focus must be moved explicitly afterwards.
    async fn close_tab(&mut self, tab: TabHandle) -> Result<()>;

    /// Close the focused tab.
    async fn close_current_tab(&mut self) -> Result<()> {
        let tab = self.current_tab().await?;
        self.close_tab(tab).await
    }

    async fn current_url(&mut self) -> Result<String>;

    async fn page_source(&mut self) -> Result<String>;

    /// Blocking wait used for pacing and UI settling.
    async fn sleep(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Release the underlying browser.
    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Send `key` to the page body.
pub async fn press_key<S>(session: &mut S, key: Key) -> Result<()>
where
    S: BrowsingSession + ?Sized,
{
    match session.find_one(&Locator::css("body")).await? {
        Some(body) => session.send_keys(body, key).await,
        None => Err(crate::error::AppError::ElementNotFound("body".to_string())),
    }
}
