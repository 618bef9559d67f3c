// src/session/chrome.rs

//! Chromium session over the DevTools protocol.
//!
//! Element handles index a registry kept on the page (`window.__scoutHandles`),
//! so they die with the document they were taken from.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};
use crate::models::BrowserConfig;
use crate::session::cookies::{StoredCookie, load_cookies};
use crate::session::{BrowsingSession, ElementHandle, Key, Locator, TabHandle};
use crate::utils::pacing::{Pacer, StepDelay};

const LOGIN_PATH: &str = "accounts/login";
const COOKIE_SETTLE: StepDelay = StepDelay::new(2000, 3000);
const LOGIN_SETTLE: StepDelay = StepDelay::new(3000, 5000);

/// Result of running a script against a registered element.
#[derive(Debug, Deserialize)]
struct ScriptResult<T> {
    found: bool,
    value: Option<T>,
}

pub struct ChromeSession {
    browser: Browser,
    handler: Option<JoinHandle<()>>,
    pages: Vec<Option<Page>>,
    active: Option<usize>,
    /// (page generation, registry index) per handed-out element
    handles: Vec<(u64, usize)>,
    generation: u64,
    load_timeout: Duration,
}

impl ChromeSession {
    /// Launch Chromium and open one blank tab.
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let mut builder = CdpConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled");

        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(proxy) = &config.proxy {
            builder = builder.arg(format!("--proxy-server={proxy}"));
        }
        if let Some(executable) = &config.chrome_executable {
            builder = builder.chrome_executable(executable);
        }

        let cdp_config = builder
            .build()
            .map_err(|e| AppError::browser(format!("failed to build browser config: {e}")))?;

        log::info!("Launching browser (headless: {})", config.headless);
        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(AppError::browser)?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(AppError::browser)?;

        Ok(Self {
            browser,
            handler: Some(handler),
            pages: vec![Some(page)],
            active: Some(0),
            handles: Vec::new(),
            generation: 0,
            load_timeout: Duration::from_secs(config.page_load_timeout_secs),
        })
    }

    /// Install a stored cookie jar and check the site no longer asks for a login.
    ///
    /// Cookies the browser refuses are skipped.
    pub async fn authenticate(
        &mut self,
        cookies_path: &Path,
        base_url: &str,
        pacer: &mut Pacer,
    ) -> Result<bool> {
        let cookies = load_cookies(cookies_path)?;

        self.navigate(base_url).await?;
        pacer.pause(self, COOKIE_SETTLE).await;

        let page = self.page()?;
        let mut installed = 0usize;
        for cookie in &cookies {
            match cookie_param(cookie, base_url) {
                Ok(param) => match page.set_cookie(param).await {
                    Ok(_) => installed += 1,
                    Err(e) => log::debug!("Cookie {} rejected: {}", cookie.name, e),
                },
                Err(e) => log::debug!("Cookie {} skipped: {}", cookie.name, e),
            }
        }
        log::info!("Installed {}/{} cookies", installed, cookies.len());

        self.navigate(base_url).await?;
        pacer.pause(self, LOGIN_SETTLE).await;

        let url = self.current_url().await?;
        let authenticated = !url.contains(LOGIN_PATH);
        if !authenticated {
            log::warn!("Still redirected to login after installing cookies: {}", url);
        }
        Ok(authenticated)
    }

    fn page(&self) -> Result<&Page> {
        self.active
            .and_then(|i| self.pages.get(i))
            .and_then(Option::as_ref)
            .ok_or(AppError::NoActiveTab)
    }

    /// Retire every handle handed out so far. Handle ids are never reused,
    /// so a retired handle cannot alias an element of the next page.
    fn invalidate(&mut self) {
        self.generation += 1;
    }

    fn register(&mut self, index: usize) -> ElementHandle {
        self.handles.push((self.generation, index));
        ElementHandle(self.handles.len() - 1)
    }

    fn registry_index(&self, handle: ElementHandle) -> Result<usize> {
        match self.handles.get(handle.0) {
            Some((generation, index)) if *generation == self.generation => Ok(*index),
            _ => Err(AppError::StaleElement(handle.0)),
        }
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T> {
        self.page()?
            .evaluate(script)
            .await
            .map_err(AppError::browser)?
            .into_value::<T>()
            .map_err(|e| AppError::browser(format!("unexpected script result: {e}")))
    }

    /// Run `body` with `el` bound to the registered element.
    async fn on_element<T: DeserializeOwned>(
        &self,
        handle: ElementHandle,
        body: &str,
    ) -> Result<Option<T>> {
        let index = self.registry_index(handle)?;
        let script = format!(
            "(() => {{ const reg = window.__scoutHandles || []; const el = reg[{index}]; \
             if (!el || !el.isConnected) return {{ found: false, value: null }}; \
             return {{ found: true, value: (() => {{ {body} }})() }}; }})()"
        );
        let result: ScriptResult<T> = self.eval(script).await?;
        if !result.found {
            return Err(AppError::StaleElement(handle.0));
        }
        Ok(result.value)
    }
}

fn js_string(value: &str) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn cookie_param(cookie: &StoredCookie, base_url: &str) -> std::result::Result<CookieParam, String> {
    let mut builder = CookieParam::builder()
        .name(cookie.name.clone())
        .value(cookie.value.clone())
        .secure(cookie.secure)
        .http_only(cookie.http_only);

    builder = match &cookie.domain {
        Some(domain) => builder.domain(domain.clone()),
        None => builder.url(base_url.to_string()),
    };
    if let Some(path) = &cookie.path {
        builder = builder.path(path.clone());
    }
    builder.build()
}

#[async_trait]
impl BrowsingSession for ChromeSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        let timeout = self.load_timeout;
        let page = self.page()?;
        match tokio::time::timeout(timeout, page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(AppError::navigation(url, e)),
            Err(_) => {
                return Err(AppError::navigation(
                    url,
                    format!("timed out after {}s", timeout.as_secs()),
                ));
            }
        }
        self.invalidate();
        Ok(())
    }

    async fn find_all(&mut self, locator: &Locator) -> Result<Vec<ElementHandle>> {
        let needle = match locator {
            Locator::Css(_) => "null".to_string(),
            Locator::Text { contains, .. } => js_string(contains)?,
        };
        let script = format!(
            "(() => {{ const reg = (window.__scoutHandles = window.__scoutHandles || []); \
             const needle = {needle}; \
             return Array.from(document.querySelectorAll({selector})) \
               .filter(el => needle === null || Array.from(el.childNodes) \
                 .some(n => n.nodeType === 3 && n.textContent.includes(needle))) \
               .map(el => {{ reg.push(el); return reg.length - 1; }}); }})()",
            selector = js_string(locator.selector())?,
        );
        let indices: Vec<usize> = self.eval(script).await?;
        Ok(indices.into_iter().map(|i| self.register(i)).collect())
    }

    async fn click(&mut self, element: ElementHandle) -> Result<()> {
        self.on_element::<bool>(element, "el.click(); return true;")
            .await
            .map(|_| ())
    }

    async fn send_keys(&mut self, element: ElementHandle, key: Key) -> Result<()> {
        let key = js_string(key.as_str())?;
        let body = format!(
            "for (const type of ['keydown', 'keyup']) {{ \
               el.dispatchEvent(new KeyboardEvent(type, {{ key: {key}, bubbles: true }})); \
             }} return true;"
        );
        self.on_element::<bool>(element, &body).await.map(|_| ())
    }

    async fn read_text(&mut self, element: ElementHandle) -> Result<String> {
        Ok(self
            .on_element::<String>(element, "return el.innerText || '';")
            .await?
            .unwrap_or_default())
    }

    async fn read_attribute(
        &mut self,
        element: ElementHandle,
        name: &str,
    ) -> Result<Option<String>> {
        let body = format!("return el.getAttribute({});", js_string(name)?);
        self.on_element::<String>(element, &body).await
    }

    async fn tag_name(&mut self, element: ElementHandle) -> Result<String> {
        Ok(self
            .on_element::<String>(element, "return el.tagName.toLowerCase();")
            .await?
            .unwrap_or_default())
    }

    async fn parent(&mut self, element: ElementHandle) -> Result<Option<ElementHandle>> {
        let index = self
            .on_element::<usize>(
                element,
                "const p = el.parentElement; if (!p) return null; \
                 reg.push(p); return reg.length - 1;",
            )
            .await?;
        Ok(index.map(|i| self.register(i)))
    }

    async fn open_new_tab(&mut self, url: &str) -> Result<TabHandle> {
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|e| AppError::navigation(url, e))?;
        self.pages.push(Some(page));
        Ok(TabHandle(self.pages.len() - 1))
    }

    async fn switch_tab(&mut self, tab: TabHandle) -> Result<()> {
        match self.pages.get(tab.0) {
            Some(Some(page)) => {
                page.bring_to_front().await.map_err(AppError::browser)?;
                self.active = Some(tab.0);
                self.invalidate();
                Ok(())
            }
            _ => Err(AppError::session(format!("tab {} is not open", tab.0))),
        }
    }

    async fn current_tab(&mut self) -> Result<TabHandle> {
        self.page()?;
        self.active.map(TabHandle).ok_or(AppError::NoActiveTab)
    }

    async fn close_tab(&mut self, tab: TabHandle) -> Result<()> {
        let page = self
            .pages
            .get_mut(tab.0)
            .and_then(Option::take)
            .ok_or_else(|| AppError::session(format!("tab {} is not open", tab.0)))?;
        if self.active == Some(tab.0) {
            self.active = None;
            self.invalidate();
        }
        page.close().await.map_err(AppError::browser)
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self
            .page()?
            .url()
            .await
            .map_err(AppError::browser)?
            .unwrap_or_default())
    }

    async fn page_source(&mut self) -> Result<String> {
        self.page()?.content().await.map_err(AppError::browser)
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.active = None;
        self.pages.clear();
        let closed = self.browser.close().await.map_err(AppError::browser);
        if let Some(handler) = self.handler.take() {
            let _ = handler.await;
        }
        log::info!("Browser closed");
        closed.map(|_| ())
    }
}
