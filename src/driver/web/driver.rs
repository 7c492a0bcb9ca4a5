//! Browser session implementation using Playwright
//!
//! Each `WebSession` owns its own Playwright connection, browser and page so
//! concurrent Runs never share engine state.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use playwright::api::{Browser, BrowserContext, ElementHandle, Page, Viewport};
use playwright::Playwright;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::driver::traits::{
    BrowserSession, DriverError, DriverResult, ElementRef, Locator, SessionFactory, SessionOptions,
};

/// Poll period for interactability waits
const WAIT_POLL: Duration = Duration::from_millis(250);

/// Chromium session driven through Playwright
pub struct WebSession {
    #[allow(dead_code)]
    playwright: Playwright,
    browser: Browser,
    #[allow(dead_code)]
    context: BrowserContext,
    page: Mutex<Page>,
    handles: Mutex<HandleArena<Arc<ElementHandle>>>,
    page_load_timeout: Duration,
}

impl WebSession {
    /// Launch Chromium and open a blank page
    pub async fn launch(options: &SessionOptions) -> Result<Self> {
        let playwright = Playwright::initialize()
            .await
            .context("Failed to initialize Playwright")?;

        let chromium = playwright.chromium();
        let browser = launch_chromium_browser(&chromium, options).await?;

        let context = browser
            .context_builder()
            .build()
            .await
            .context("Failed to create browser context")?;
        let page = context
            .new_page()
            .await
            .context("Failed to open page")?;

        if options.headless {
            page.set_viewport_size(Viewport {
                width: options.viewport_width as i32,
                height: options.viewport_height as i32,
            })
            .await?;
        }

        Ok(Self {
            playwright,
            browser,
            context,
            page: Mutex::new(page),
            handles: Mutex::new(HandleArena::default()),
            page_load_timeout: options.page_load_timeout,
        })
    }

    async fn register(&self, handle: ElementHandle) -> ElementRef {
        self.handles.lock().await.register(Arc::new(handle))
    }

    async fn handle(&self, element: &ElementRef) -> DriverResult<Arc<ElementHandle>> {
        self.handles.lock().await.get(element)
    }

    /// Visible and enabled element for `locator`, if any right now
    async fn clickable_now(&self, selector: &str) -> DriverResult<Option<ElementHandle>> {
        let page = self.page.lock().await;
        let Some(el) = page
            .query_selector(selector)
            .await
            .map_err(DriverError::engine)?
        else {
            return Ok(None);
        };
        let visible = el.is_visible().await.map_err(DriverError::engine)?;
        let enabled = el.is_enabled().await.map_err(DriverError::engine)?;
        Ok((visible && enabled).then_some(el))
    }
}

#[async_trait]
impl BrowserSession for WebSession {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        let page = self.page.lock().await;
        page.goto_builder(url)
            .timeout(self.page_load_timeout.as_millis() as f64)
            .goto()
            .await
            .map_err(|e| DriverError::Engine(format!("Failed to navigate to {}: {}", url, e)))?;
        // Handles from the previous document are dead now
        self.handles.lock().await.clear();
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        let page = self.page.lock().await;
        page.evaluate::<(), String>("() => window.location.href", ())
            .await
            .map_err(DriverError::engine)
    }

    async fn find_element(&self, locator: &Locator) -> DriverResult<ElementRef> {
        let found = {
            let page = self.page.lock().await;
            page.query_selector(&locator.to_playwright())
                .await
                .map_err(DriverError::engine)?
        };
        match found {
            Some(handle) => Ok(self.register(handle).await),
            None => Err(DriverError::not_found(locator)),
        }
    }

    async fn find_elements(&self, locator: &Locator) -> DriverResult<Vec<ElementRef>> {
        let found = {
            let page = self.page.lock().await;
            page.query_selector_all(&locator.to_playwright())
                .await
                .map_err(DriverError::engine)?
        };
        let mut refs = Vec::with_capacity(found.len());
        for handle in found {
            refs.push(self.register(handle).await);
        }
        Ok(refs)
    }

    async fn attribute(&self, element: &ElementRef, name: &str) -> DriverResult<Option<String>> {
        let el = self.handle(element).await?;
        el.get_attribute(name).await.map_err(DriverError::engine)
    }

    async fn scroll_into_view(&self, element: &ElementRef) -> DriverResult<()> {
        let el = self.handle(element).await?;
        el.scroll_into_view_if_needed(None)
            .await
            .map_err(DriverError::engine)
    }

    async fn click(&self, element: &ElementRef) -> DriverResult<()> {
        let el = self.handle(element).await?;
        el.click_builder().click().await.map_err(DriverError::engine)
    }

    async fn script_click(&self, element: &ElementRef) -> DriverResult<()> {
        let el = self.handle(element).await?;
        el.dispatch_event::<()>("click", None)
            .await
            .map_err(DriverError::engine)
    }

    async fn wait_until_clickable(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> DriverResult<ElementRef> {
        let selector = locator.to_playwright();
        let start = Instant::now();
        loop {
            if let Some(el) = self.clickable_now(&selector).await? {
                return Ok(self.register(el).await);
            }
            if start.elapsed() >= timeout {
                return Err(DriverError::Timeout {
                    locator: locator.to_string(),
                    waited: timeout,
                });
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }

    async fn quit(&self) -> DriverResult<()> {
        self.handles.lock().await.clear();
        self.browser.close().await.map_err(DriverError::engine)
    }
}

/// Element handles of the current document, addressed by `ElementRef`.
///
/// Indices keep growing across `clear`, so a reference taken before a
/// navigation is reported as stale instead of resolving to a newer element.
#[derive(Debug)]
struct HandleArena<H> {
    /// Index of `handles[0]`
    base: usize,
    handles: Vec<H>,
}

impl<H> Default for HandleArena<H> {
    fn default() -> Self {
        Self {
            base: 0,
            handles: Vec::new(),
        }
    }
}

impl<H: Clone> HandleArena<H> {
    fn register(&mut self, handle: H) -> ElementRef {
        self.handles.push(handle);
        ElementRef(self.base + self.handles.len() - 1)
    }

    fn get(&self, element: &ElementRef) -> DriverResult<H> {
        element
            .0
            .checked_sub(self.base)
            .and_then(|i| self.handles.get(i))
            .cloned()
            .ok_or_else(|| DriverError::Engine(format!("stale element handle #{}", element.0)))
    }

    fn clear(&mut self) {
        self.base += self.handles.len();
        self.handles.clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.handles.len()
    }
}

/// Factory launching a fresh Chromium per Run
#[derive(Debug, Default, Clone)]
pub struct WebSessionFactory;

#[async_trait]
impl SessionFactory for WebSessionFactory {
    async fn open(&self, options: &SessionOptions) -> Result<Box<dyn BrowserSession>> {
        let session = WebSession::launch(options).await?;
        info!(
            "Browser session started ({})",
            if options.headless { "headless" } else { "visible" }
        );
        Ok(Box::new(session))
    }
}

/// Chromium command-line flags for the given options
pub fn launch_args(options: &SessionOptions) -> Vec<String> {
    let mut args = vec!["--incognito".to_string()];
    if options.headless {
        args.extend(
            [
                "--disable-gpu",
                "--no-sandbox",
                "--disable-dev-shm-usage",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args.push(format!(
            "--window-size={},{}",
            options.viewport_width, options.viewport_height
        ));
    }
    args
}

async fn launch_chromium_browser(
    chromium: &playwright::api::BrowserType,
    options: &SessionOptions,
) -> Result<Browser> {
    let mut launcher = chromium.launcher();
    launcher = launcher.headless(options.headless);

    let env_path = std::env::var("PLAYWRIGHT_CHROMIUM_EXECUTABLE_PATH")
        .ok()
        .map(PathBuf::from);

    let executable = env_path.or_else(find_system_browser);
    match executable {
        Some(ref path) => {
            debug!("Using browser executable: {}", path.display());
            launcher = launcher.executable(path);
        }
        None => warn!("No browser executable found, relying on Playwright's bundled Chromium"),
    }

    let args = launch_args(options);
    launcher = launcher.args(&args);

    launcher
        .launch()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to launch Chromium: {}", e))
}

fn find_system_browser() -> Option<PathBuf> {
    for name in [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    let common_paths = [
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/snap/bin/chromium",
    ];
    common_paths
        .iter()
        .map(std::path::Path::new)
        .find(|p| p.exists())
        .map(|p| p.to_path_buf())
}
