use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Element locator understood by every session implementation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locator {
    /// Select by XPath expression
    XPath(String),
    /// Select by CSS selector
    Css(String),
}

impl Locator {
    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::XPath(expr.into())
    }

    /// Selector string in Playwright syntax
    pub fn to_playwright(&self) -> String {
        match self {
            Locator::XPath(xpath) => format!("xpath={}", xpath),
            Locator::Css(css) => css.clone(),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::XPath(xpath) => write!(f, "xpath {}", xpath),
            Locator::Css(css) => write!(f, "css {}", css),
        }
    }
}

/// Opaque handle to an element found by a session.
///
/// Handles are only meaningful for the session that produced them and stay
/// valid until its next navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementRef(pub usize);

/// Tagged failure of a single engine call
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DriverError {
    #[error("element not found: {0}")]
    NotFound(String),

    #[error("timed out after {}s waiting for {locator}", .waited.as_secs())]
    Timeout { locator: String, waited: Duration },

    #[error("{0}")]
    Engine(String),
}

impl DriverError {
    pub fn not_found(locator: &Locator) -> Self {
        DriverError::NotFound(locator.to_string())
    }

    pub fn engine(err: impl std::fmt::Display) -> Self {
        DriverError::Engine(err.to_string())
    }
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Browser automation capability consumed by the flow executors.
///
/// One implementation instance is one live browser session. The executors
/// never hold more than one at a time.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigate the current page to `url` and wait for the load event
    async fn navigate(&self, url: &str) -> DriverResult<()>;

    /// URL of the current page
    async fn current_url(&self) -> DriverResult<String>;

    /// Find the first element matching `locator`
    ///
    /// # Returns
    /// `DriverError::NotFound` when nothing matches
    async fn find_element(&self, locator: &Locator) -> DriverResult<ElementRef>;

    /// Find all elements matching `locator`, in document order
    async fn find_elements(&self, locator: &Locator) -> DriverResult<Vec<ElementRef>>;

    /// Read an attribute of an element
    async fn attribute(&self, element: &ElementRef, name: &str) -> DriverResult<Option<String>>;

    /// Scroll the element into the viewport via script
    async fn scroll_into_view(&self, element: &ElementRef) -> DriverResult<()>;

    /// Native (engine-level) click
    async fn click(&self, element: &ElementRef) -> DriverResult<()>;

    /// Click dispatched through page script on the element
    async fn script_click(&self, element: &ElementRef) -> DriverResult<()>;

    /// Wait until an element matching `locator` is visible and enabled
    ///
    /// # Arguments
    /// * `locator` - The element to wait for
    /// * `timeout` - Upper bound for the wait
    ///
    /// # Returns
    /// The element, or `DriverError::Timeout` once `timeout` elapses
    async fn wait_until_clickable(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> DriverResult<ElementRef>;

    /// Close the browser and release every engine resource
    async fn quit(&self) -> DriverResult<()>;
}

/// Options for acquiring a fresh session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub page_load_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1920,
            viewport_height: 1080,
            page_load_timeout: Duration::from_secs(30),
        }
    }
}

/// Source of fresh browser sessions, one per Run
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, options: &SessionOptions) -> anyhow::Result<Box<dyn BrowserSession>>;
}
