// src/session/snapshot.rs

//! Browsing session over recorded HTML pages.
//!
//! Pages are registered per URL and parsed with `scraper` on demand. UI
//! interaction is reduced to navigation:
//! - clicking an element follows its `data-snapshot-href` or `href`
//!   (`data-snapshot-replace` swaps the current history entry instead of pushing)
//! - `Escape` goes back one history entry
//! - `ArrowRight` follows the page's `[data-snapshot-next]` element
//! - `sleep` is recorded, never waited
//!
//! [`Fault`]s make chosen operations fail the way a flaky driver would.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::session::{BrowsingSession, ElementHandle, Key, Locator, TabHandle};
use crate::utils::resolve_url;

const BLANK: &str = "about:blank";

/// Record of everything a [`SnapshotSession`] was asked to do.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    /// Every URL loaded, in order
    pub navigations: Vec<String>,
    pub clicks: usize,
    pub keys: Vec<Key>,
    pub slept: Duration,
    pub tabs_opened: usize,
    pub tabs_closed: usize,
}

impl Journal {
    /// Whether any load of `url` happened.
    pub fn visited(&self, url: &str) -> bool {
        self.navigations.iter().any(|u| u == url)
    }
}

/// A driver failure injected into a [`SnapshotSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Switching to any tab but the first fails
    SwitchToNewTab,
    /// `find_all` for `selector` fails once it has succeeded `after` times
    FindAll { selector: String, after: usize },
}

#[derive(Debug, Clone)]
struct SnapshotTab {
    history: Vec<String>,
}

/// A session backed by static HTML snapshots.
pub struct SnapshotSession {
    pages: HashMap<String, String>,
    tabs: Vec<Option<SnapshotTab>>,
    active: Option<usize>,
    /// (page generation, node ordinal) per handed-out element
    handles: Vec<(u64, usize)>,
    generation: u64,
    faults: Vec<Fault>,
    /// Successful `find_all` calls per selector
    finds: HashMap<String, usize>,
    journal: Arc<Mutex<Journal>>,
}

impl SnapshotSession {
    /// A session with one blank tab focused.
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            tabs: vec![Some(SnapshotTab {
                history: vec![BLANK.to_string()],
            })],
            active: Some(0),
            handles: Vec::new(),
            generation: 0,
            faults: Vec::new(),
            finds: HashMap::new(),
            journal: Arc::new(Mutex::new(Journal::default())),
        }
    }

    /// Register the HTML served for `url`.
    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.add_page(url, html);
        self
    }

    pub fn add_page(&mut self, url: impl Into<String>, html: impl Into<String>) {
        self.pages.insert(url.into(), html.into());
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.faults.push(fault);
        self
    }

    /// Shared view of the journal; stays readable after the session is moved.
    pub fn journal(&self) -> Arc<Mutex<Journal>> {
        Arc::clone(&self.journal)
    }

    fn record(&self, f: impl FnOnce(&mut Journal)) {
        if let Ok(mut journal) = self.journal.lock() {
            f(&mut journal);
        }
    }

    fn active_tab(&self) -> Result<&SnapshotTab> {
        self.active
            .and_then(|i| self.tabs.get(i))
            .and_then(Option::as_ref)
            .ok_or(AppError::NoActiveTab)
    }

    fn active_tab_mut(&mut self) -> Result<&mut SnapshotTab> {
        self.active
            .and_then(|i| self.tabs.get_mut(i))
            .and_then(Option::as_mut)
            .ok_or(AppError::NoActiveTab)
    }

    fn current_location(&self) -> Result<String> {
        self.active_tab()?
            .history
            .last()
            .cloned()
            .ok_or(AppError::NoActiveTab)
    }

    fn current_html(&self) -> Result<String> {
        let url = self.current_location()?;
        self.lookup(&url)
    }

    fn lookup(&self, url: &str) -> Result<String> {
        if url == BLANK {
            return Ok(String::new());
        }
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::navigation(url, "no snapshot recorded"))
    }

    /// Retire every handle handed out so far. Handle ids are never reused,
    /// so a retired handle cannot alias an element of the next page.
    fn invalidate(&mut self) {
        self.generation += 1;
    }

    fn load(&mut self, url: &str, replace: bool) -> Result<()> {
        self.lookup(url)?;
        let tab = self.active_tab_mut()?;
        if replace {
            tab.history.pop();
        }
        tab.history.push(url.to_string());
        self.invalidate();
        let url = url.to_string();
        self.record(|j| j.navigations.push(url));
        Ok(())
    }

    fn register(&mut self, ordinal: usize) -> ElementHandle {
        self.handles.push((self.generation, ordinal));
        ElementHandle(self.handles.len() - 1)
    }

    fn ordinal_of(&self, handle: ElementHandle) -> Result<usize> {
        match self.handles.get(handle.0) {
            Some((generation, ordinal)) if *generation == self.generation => Ok(*ordinal),
            _ => Err(AppError::StaleElement(handle.0)),
        }
    }

    /// Run `f` against the element behind `handle` on a fresh parse.
    fn with_element<T>(
        &self,
        handle: ElementHandle,
        f: impl FnOnce(&Html, ElementRef<'_>) -> T,
    ) -> Result<T> {
        let ordinal = self.ordinal_of(handle)?;
        let html = self.current_html()?;
        let document = Html::parse_document(&html);
        let element = document
            .tree
            .root()
            .descendants()
            .nth(ordinal)
            .and_then(ElementRef::wrap)
            .ok_or(AppError::StaleElement(handle.0))?;
        Ok(f(&document, element))
    }

    fn resolve_target(&self, href: &str) -> Result<String> {
        let current = self.current_location()?;
        Ok(match Url::parse(&current) {
            Ok(base) if current != BLANK => resolve_url(&base, href),
            _ => href.to_string(),
        })
    }
}

impl Default for SnapshotSession {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

fn ordinal(document: &Html, element: ElementRef<'_>) -> Option<usize> {
    document
        .tree
        .root()
        .descendants()
        .position(|node| node.id() == element.id())
}

fn own_text_contains(element: ElementRef<'_>, needle: &str) -> bool {
    element
        .children()
        .filter_map(|child| child.value().as_text())
        .any(|text| text.contains(needle))
}

/// Text blocks of an element joined by newlines.
fn rendered_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl BrowsingSession for SnapshotSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.load(url, false)
    }

    async fn find_all(&mut self, locator: &Locator) -> Result<Vec<ElementHandle>> {
        let succeeded = self.finds.get(locator.selector()).copied().unwrap_or(0);
        let failing = self.faults.iter().any(|fault| {
            matches!(fault, Fault::FindAll { selector, after }
                if selector == locator.selector() && succeeded >= *after)
        });
        if failing {
            return Err(AppError::browser(format!("lookup of {locator} failed")));
        }
        *self.finds.entry(locator.selector().to_string()).or_insert(0) += 1;

        let selector = parse_selector(locator.selector())?;
        let html = self.current_html()?;
        let ordinals: Vec<usize> = {
            let document = Html::parse_document(&html);
            document
                .select(&selector)
                .filter(|el| match locator {
                    Locator::Css(_) => true,
                    Locator::Text { contains, .. } => own_text_contains(*el, contains),
                })
                .filter_map(|el| ordinal(&document, el))
                .collect()
        };
        Ok(ordinals.into_iter().map(|o| self.register(o)).collect())
    }

    async fn click(&mut self, element: ElementHandle) -> Result<()> {
        let (target, replace) = self.with_element(element, |_, el| {
            let value = el.value();
            let target = value
                .attr("data-snapshot-href")
                .or_else(|| value.attr("href"))
                .map(str::to_string);
            (target, value.attr("data-snapshot-replace").is_some())
        })?;
        self.record(|j| j.clicks += 1);

        match target {
            Some(href) => {
                let url = self.resolve_target(&href)?;
                self.load(&url, replace)
            }
            None => Ok(()),
        }
    }

    async fn send_keys(&mut self, element: ElementHandle, key: Key) -> Result<()> {
        self.ordinal_of(element)?;
        self.record(|j| j.keys.push(key));

        match key {
            Key::Escape => {
                let tab = self.active_tab_mut()?;
                if tab.history.len() > 1 {
                    tab.history.pop();
                    self.invalidate();
                }
                Ok(())
            }
            Key::ArrowRight => {
                let html = self.current_html()?;
                let next = {
                    let document = Html::parse_document(&html);
                    let selector = parse_selector("[data-snapshot-next]")?;
                    document
                        .select(&selector)
                        .next()
                        .and_then(|el| el.value().attr("data-snapshot-next"))
                        .map(str::to_string)
                };
                match next {
                    Some(href) => {
                        let url = self.resolve_target(&href)?;
                        self.load(&url, false)
                    }
                    None => Ok(()),
                }
            }
        }
    }

    async fn read_text(&mut self, element: ElementHandle) -> Result<String> {
        self.with_element(element, |_, el| rendered_text(el))
    }

    async fn read_attribute(
        &mut self,
        element: ElementHandle,
        name: &str,
    ) -> Result<Option<String>> {
        self.with_element(element, |_, el| el.value().attr(name).map(str::to_string))
    }

    async fn tag_name(&mut self, element: ElementHandle) -> Result<String> {
        self.with_element(element, |_, el| el.value().name().to_ascii_lowercase())
    }

    async fn parent(&mut self, element: ElementHandle) -> Result<Option<ElementHandle>> {
        let parent = self.with_element(element, |document, el| {
            el.parent()
                .and_then(ElementRef::wrap)
                .and_then(|p| ordinal(document, p))
        })?;
        Ok(parent.map(|o| self.register(o)))
    }

    async fn open_new_tab(&mut self, url: &str) -> Result<TabHandle> {
        self.lookup(url)?;
        self.tabs.push(Some(SnapshotTab {
            history: vec![url.to_string()],
        }));
        let url = url.to_string();
        self.record(|j| {
            j.tabs_opened += 1;
            j.navigations.push(url);
        });
        Ok(TabHandle(self.tabs.len() - 1))
    }

    async fn switch_tab(&mut self, tab: TabHandle) -> Result<()> {
        if tab.0 != 0 && self.faults.contains(&Fault::SwitchToNewTab) {
            return Err(AppError::browser("bring_to_front failed"));
        }
        match self.tabs.get(tab.0) {
            Some(Some(_)) => {
                self.active = Some(tab.0);
                self.invalidate();
                Ok(())
            }
            _ => Err(AppError::session(format!("tab {} is not open", tab.0))),
        }
    }

    async fn current_tab(&mut self) -> Result<TabHandle> {
        self.active_tab()?;
        self.active.map(TabHandle).ok_or(AppError::NoActiveTab)
    }

    async fn close_tab(&mut self, tab: TabHandle) -> Result<()> {
        let Some(slot) = self.tabs.get_mut(tab.0).filter(|slot| slot.is_some()) else {
            return Err(AppError::session(format!("tab {} is not open", tab.0)));
        };
        *slot = None;
        if self.active == Some(tab.0) {
            self.active = None;
            self.invalidate();
        }
        self.record(|j| j.tabs_closed += 1);
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        self.current_location()
    }

    async fn page_source(&mut self) -> Result<String> {
        self.current_html()
    }

    async fn sleep(&mut self, duration: Duration) {
        self.record(|j| j.slept += duration);
    }
}
