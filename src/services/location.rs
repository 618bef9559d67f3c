// src/services/location.rs

//! Best-effort location resolution.
//!
//! Steps, each tried only when the previous one found nothing:
//! 1. a labeled "based in" element already on the page
//! 2. the "About this account" panel, opened through the profile menu
//! 3. location-like phrases in the bio
//!
//! Nothing here fails a candidate; a miss is `None`.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::Result;
use crate::models::CrawlerConfig;
use crate::session::{BrowsingSession, ElementHandle, Key, Locator, press_key};
use crate::utils::pacing::{MENU_SETTLE, PANEL_CLOSE, PANEL_POLL, Pacer};
use crate::utils::text::collapse_whitespace;

const BASED_IN_LABEL: &str = r#"[aria-label="Account based in"]"#;
const MENU_CONTROL: &str = r#"button[aria-label="Options"], [role="button"][aria-label="Options"]"#;
const MENU_ICON: &str = r#"svg[aria-label="Options"]"#;
const ABOUT_ENTRY: &str = "About this account";
const DIALOG: &str = r#"div[role="dialog"]"#;
const PANEL_MARKER: &str = "based in";
const BIO_BLOCKS: &str = r#"header div[dir="auto"]"#;

/// Tags that are clickable on their own.
const CLICKABLE_TAGS: &[&str] = &["button", "a"];
/// Role that makes any element clickable.
const CLICKABLE_ROLE: &str = "button";

fn pattern(re: &str) -> Option<Regex> {
    Regex::new(re).ok()
}

static LABEL_PREFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| pattern(r"(?i)^account based in\s*"));
static PANEL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?im)account based in\s+([A-Za-z\s]+?)(?:\n|date|to help|$)",
        r"(?im)based in\s+([A-Za-z\s]+?)(?:\n|date|to help|$)",
    ]
    .into_iter()
    .filter_map(pattern)
    .collect()
});
static PANEL_TRAILER: LazyLock<Option<Regex>> =
    LazyLock::new(|| pattern(r"(?i)\s+(date|to|help|keep|our)\b.*$"));
static BIO_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"📍\s*([A-Za-z ,]+)",
        r"[Bb]ased in\s+([A-Za-z ,]+)",
        r"[Ff]rom[: ]+([A-Za-z ,]+)",
        r"[Ll]ocation[: ]+([A-Za-z ,]+)",
        r"([A-Z][a-z]+,\s*[A-Z]{2})",
    ]
    .into_iter()
    .filter_map(pattern)
    .collect()
});

/// Whether an element with this tag and role can be clicked to open a menu.
pub fn is_clickable_control(tag: &str, role: Option<&str>) -> bool {
    CLICKABLE_TAGS.contains(&tag) || role == Some(CLICKABLE_ROLE)
}

/// Text of a labeled "based in" element, without its label.
pub fn location_from_labeled_text(text: &str) -> Option<String> {
    let text = text.trim();
    let stripped = match Option::as_ref(&LABEL_PREFIX) {
        Some(re) => re.replace(text, "").into_owned(),
        None => text.to_string(),
    };
    let location = collapse_whitespace(&stripped);
    (!location.is_empty()).then_some(location)
}

/// Location phrase from the free text of the about panel.
pub fn location_from_panel_text(text: &str) -> Option<String> {
    PANEL_PATTERNS.iter().find_map(|re| {
        let raw = re.captures(text)?.get(1)?.as_str();
        let mut location = collapse_whitespace(raw);
        if let Some(trailer) = Option::as_ref(&PANEL_TRAILER) {
            location = trailer.replace(&location, "").trim().to_string();
        }
        (!location.is_empty()).then_some(location)
    })
}

/// First location-like phrase in a bio.
pub fn location_from_bio(bio: &str) -> Option<String> {
    BIO_PATTERNS.iter().find_map(|re| {
        let location = re
            .captures(bio)?
            .get(1)?
            .as_str()
            .trim()
            .trim_end_matches(',')
            .trim()
            .to_string();
        (!location.is_empty()).then_some(location)
    })
}

/// Resolves a profile's advertised location.
#[derive(Debug, Clone, Copy)]
pub struct LocationResolver {
    panel_polls: usize,
    ancestor_depth: usize,
}

impl LocationResolver {
    pub fn new(config: &CrawlerConfig) -> Self {
        Self {
            panel_polls: config.about_panel_polls,
            ancestor_depth: config.ancestor_search_depth,
        }
    }

    /// Resolve the location of the focused profile. `biography` is the
    /// already-extracted bio, used when the page has no bio blocks.
    pub async fn resolve<S>(
        &self,
        session: &mut S,
        pacer: &mut Pacer,
        biography: &str,
    ) -> Option<String>
    where
        S: BrowsingSession + ?Sized,
    {
        match labeled_location(session).await {
            Ok(Some(location)) => {
                log::debug!("Location from labeled element: {}", location);
                return Some(location);
            }
            Ok(None) => {}
            Err(e) => log::debug!("Labeled location lookup failed: {}", e),
        }

        match self.panel_location(session, pacer).await {
            Ok(Some(location)) => {
                log::debug!("Location from about panel: {}", location);
                return Some(location);
            }
            Ok(None) => {}
            Err(e) => log::debug!("About panel lookup failed: {}", e),
        }

        let location = bio_location(session, biography).await;
        if let Some(location) = &location {
            log::debug!("Location from bio: {}", location);
        }
        location
    }

    /// Open the about panel, read it, and always close it again.
    async fn panel_location<S>(&self, session: &mut S, pacer: &mut Pacer) -> Result<Option<String>>
    where
        S: BrowsingSession + ?Sized,
    {
        let Some(control) = self.menu_control(session).await? else {
            log::debug!("No menu control found");
            return Ok(None);
        };

        let outcome = self.read_panel(session, pacer, control).await;

        if let Err(e) = press_key(session, Key::Escape).await {
            log::debug!("Failed to close about panel: {}", e);
        }
        pacer.pause(session, PANEL_CLOSE).await;

        outcome
    }

    async fn read_panel<S>(
        &self,
        session: &mut S,
        pacer: &mut Pacer,
        control: ElementHandle,
    ) -> Result<Option<String>>
    where
        S: BrowsingSession + ?Sized,
    {
        session.click(control).await?;
        pacer.pause(session, MENU_SETTLE).await;

        let Some(about) = session.find_one(&Locator::text("*", ABOUT_ENTRY)).await? else {
            log::debug!("Menu has no \"{}\" entry", ABOUT_ENTRY);
            return Ok(None);
        };
        session.click(about).await?;

        for _ in 0..self.panel_polls {
            pacer.pause(session, PANEL_POLL).await;

            if let Some(location) = labeled_location(session).await? {
                return Ok(Some(location));
            }
            if let Some(dialog) = session.find_one(&Locator::css(DIALOG)).await? {
                let text = session.read_text(dialog).await?;
                if text.to_lowercase().contains(PANEL_MARKER) {
                    return Ok(location_from_panel_text(&text));
                }
            }
        }
        Ok(None)
    }

    /// Menu control: labeled button, else a clickable ancestor of the menu
    /// icon, else the first icon's parent.
    async fn menu_control<S>(&self, session: &mut S) -> Result<Option<ElementHandle>>
    where
        S: BrowsingSession + ?Sized,
    {
        if let Some(control) = session.find_one(&Locator::css(MENU_CONTROL)).await? {
            return Ok(Some(control));
        }

        let icons = session.find_all(&Locator::css(MENU_ICON)).await?;
        for icon in &icons {
            if let Some(control) = self.clickable_ancestor(session, *icon).await? {
                return Ok(Some(control));
            }
        }

        match icons.first() {
            Some(icon) => session.parent(*icon).await,
            None => Ok(None),
        }
    }

    async fn clickable_ancestor<S>(
        &self,
        session: &mut S,
        start: ElementHandle,
    ) -> Result<Option<ElementHandle>>
    where
        S: BrowsingSession + ?Sized,
    {
        let mut current = start;
        for _ in 0..self.ancestor_depth {
            let Some(parent) = session.parent(current).await? else {
                return Ok(None);
            };
            let tag = session.tag_name(parent).await?;
            let role = session.read_attribute(parent, "role").await?;
            if is_clickable_control(&tag, role.as_deref()) {
                return Ok(Some(parent));
            }
            current = parent;
        }
        Ok(None)
    }
}

async fn labeled_location<S>(session: &mut S) -> Result<Option<String>>
where
    S: BrowsingSession + ?Sized,
{
    let Some(element) = session.find_one(&Locator::css(BASED_IN_LABEL)).await? else {
        return Ok(None);
    };
    let text = session.read_text(element).await?;
    Ok(location_from_labeled_text(&text))
}

async fn bio_location<S>(session: &mut S, biography: &str) -> Option<String>
where
    S: BrowsingSession + ?Sized,
{
    let mut texts = Vec::new();
    if let Ok(blocks) = session.find_all(&Locator::css(BIO_BLOCKS)).await {
        for block in blocks {
            if let Ok(text) = session.read_text(block).await {
                texts.push(text);
            }
        }
    }
    if texts.is_empty() {
        texts.push(biography.to_string());
    }
    texts.iter().find_map(|text| location_from_bio(text))
}
