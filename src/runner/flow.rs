//! Flow configuration and the stages shared by both executors

use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::collector::StepCollector;
use super::interaction::attempt_click;
use super::progress::ProgressReporter;
use super::state::StepKind;
use crate::driver::{BrowserSession, DriverError, DriverResult, ElementRef, Locator};

pub const DEFAULT_CATEGORY: &str = "Categoria Exemplo";

const LOWER: &str = "translate(., 'ABCDEFGHIJKLMNOPQRSTUVWXYZ', 'abcdefghijklmnopqrstuvwxyz')";
const LOWER_TEXT: &str =
    "translate(text(), 'ABCDEFGHIJKLMNOPQRSTUVWXYZ', 'abcdefghijklmnopqrstuvwxyz')";
const PRODUCT_LINK: &str =
    "a[contains(@class, 'vtex-product-summary-2-x-clearLink') and contains(@href, '/p')]";

/// Storefront-specific element locators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Locators {
    pub cookie_accept: Locator,
    pub category_heading: Locator,
    /// First product link inside the category section
    pub category_product: Locator,
    /// Every product link the collection loop may pick from
    pub product_candidates: Locator,
    pub add_to_cart: Locator,
    pub checkout: Locator,
}

impl Locators {
    pub fn for_category(category: &str) -> Self {
        Self {
            cookie_accept: Locator::xpath(format!(
                "//button[contains({lower}, 'aceitar')] | //button[contains({lower}, 'accept')]",
                lower = LOWER
            )),
            category_heading: Locator::xpath(format!(
                "//p[contains(text(), '{c}')] | //h2[contains(text(), '{c}')]",
                c = category
            )),
            category_product: Locator::xpath(format!(
                "//p[contains(text(), '{c}')]/ancestor::section[1]//{link} | //h2[contains(text(), '{c}')]/ancestor::section[1]//{link}",
                c = category,
                link = PRODUCT_LINK
            )),
            product_candidates: Locator::xpath(format!(
                "//section[.//p[contains(@class, 'vtex-rich-text')] or .//h2]//{}",
                PRODUCT_LINK
            )),
            add_to_cart: Locator::xpath(format!(
                "//button[.//span[contains({lower}, 'comprar')] or .//span[contains({lower}, 'add to cart')]]",
                lower = LOWER_TEXT
            )),
            checkout: Locator::xpath(format!(
                "//button[@id='proceed-to-checkout'] | //button[.//div[contains({}, 'ir para o checkout')]]",
                LOWER_TEXT
            )),
        }
    }
}

impl Default for Locators {
    fn default() -> Self {
        Self::for_category(DEFAULT_CATEGORY)
    }
}

/// Delays and bounded waits, in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Pause after page transitions so asynchronous rendering catches up
    pub settle_ms: u64,
    /// Pause after an add-to-cart click while the minicart opens
    pub cart_settle_ms: u64,
    /// Pause after returning to the start page between items
    pub return_settle_ms: u64,
    pub add_to_cart_timeout_ms: u64,
    pub checkout_timeout_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            settle_ms: 2000,
            cart_settle_ms: 3000,
            return_settle_ms: 3000,
            add_to_cart_timeout_ms: 10_000,
            checkout_timeout_ms: 10_000,
        }
    }
}

impl Timings {
    /// No pauses; waits still carry their bounds
    pub fn immediate() -> Self {
        Self {
            settle_ms: 0,
            cart_settle_ms: 0,
            return_settle_ms: 0,
            ..Self::default()
        }
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn cart_settle(&self) -> Duration {
        Duration::from_millis(self.cart_settle_ms)
    }

    pub fn return_settle(&self) -> Duration {
        Duration::from_millis(self.return_settle_ms)
    }

    pub fn add_to_cart_timeout(&self) -> Duration {
        Duration::from_millis(self.add_to_cart_timeout_ms)
    }

    pub fn checkout_timeout(&self) -> Duration {
        Duration::from_millis(self.checkout_timeout_ms)
    }
}

/// Everything the executors need besides the URL and the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub category: String,
    pub locators: Locators,
    pub timings: Timings,
    /// Distinct products the collection loop tries to add
    pub target_items: u32,
    /// Consecutive failed iterations after which the collection loop gives up
    pub max_iteration_failures: u32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            category: DEFAULT_CATEGORY.to_string(),
            locators: Locators::default(),
            timings: Timings::default(),
            target_items: 10,
            max_iteration_failures: 3,
        }
    }
}

impl FlowConfig {
    /// Derive default locators from `category` when none were configured
    pub fn normalized(mut self) -> Self {
        if self.locators == Locators::default() && self.category != DEFAULT_CATEGORY {
            self.locators = Locators::for_category(&self.category);
        }
        self
    }
}

/// How a flow ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowEnd {
    Completed,
    /// Collection loop finished without adding anything
    NoItems,
    /// Terminal failure at the given stage
    Stopped(StepKind),
}

impl std::fmt::Display for FlowEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowEnd::Completed => f.write_str("checkout reached"),
            FlowEnd::NoItems => f.write_str("no items added"),
            FlowEnd::Stopped(step) => write!(f, "stopped at {}", step.label()),
        }
    }
}

/// Per-Run collector and progress, created once at Run construction
pub struct RunContext {
    pub collector: StepCollector,
    pub progress: ProgressReporter,
}

impl RunContext {
    pub fn new(collector: StepCollector, progress: ProgressReporter) -> Self {
        Self {
            collector,
            progress,
        }
    }

    /// Click through the interaction primitive, noting fallback use
    pub async fn click(
        &mut self,
        session: &dyn BrowserSession,
        element: &ElementRef,
    ) -> DriverResult<Duration> {
        let report = attempt_click(session, element).await?;
        if report.used_fallback {
            self.collector.record("Script click fallback succeeded.");
        }
        Ok(report.elapsed)
    }
}

pub async fn settle(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Navigate to the start page. Records the outcome either way.
pub async fn load(
    session: &dyn BrowserSession,
    ctx: &mut RunContext,
    url: &str,
    config: &FlowConfig,
) -> DriverResult<()> {
    let start = std::time::Instant::now();
    match session.navigate(url).await {
        Ok(()) => {
            ctx.collector
                .success(StepKind::Load, Some(start.elapsed()), format!("Loaded {}", url));
            settle(config.timings.settle()).await;
            Ok(())
        }
        Err(e) => {
            ctx.collector
                .failure(StepKind::Load, format!("Could not load {}", url), &e);
            Err(e)
        }
    }
}

/// Accept the cookie banner if one is shown. Never stops the flow.
pub async fn accept_cookies(
    session: &dyn BrowserSession,
    ctx: &mut RunContext,
    config: &FlowConfig,
) {
    let button = match session.find_element(&config.locators.cookie_accept).await {
        Ok(button) => button,
        Err(DriverError::NotFound(_)) => {
            ctx.collector.warning(
                StepKind::CookieConsent,
                "Cookie banner not found or already handled.",
            );
            return;
        }
        Err(e) => {
            ctx.collector
                .failure(StepKind::CookieConsent, "Error while accepting cookies", e);
            return;
        }
    };

    match ctx.click(session, &button).await {
        Ok(elapsed) => {
            ctx.collector
                .success(StepKind::CookieConsent, Some(elapsed), "Cookies accepted.");
            settle(config.timings.settle()).await;
        }
        Err(e) => ctx
            .collector
            .failure(StepKind::CookieConsent, "Error while accepting cookies", e),
    }
}

/// Locate the category heading and scroll it into view
pub async fn scroll_to_category(
    session: &dyn BrowserSession,
    config: &FlowConfig,
) -> DriverResult<()> {
    let heading = session
        .find_element(&config.locators.category_heading)
        .await?;
    session.scroll_into_view(&heading).await
}

/// Wait for a control to become clickable, then click it
pub async fn wait_and_click(
    session: &dyn BrowserSession,
    ctx: &mut RunContext,
    locator: &Locator,
    timeout: Duration,
) -> DriverResult<Duration> {
    if log::log_enabled!(log::Level::Debug) {
        if let Ok(url) = session.current_url().await {
            debug!("Waiting for {} on {}", locator, url);
        }
    }
    let control = session.wait_until_clickable(locator, timeout).await?;
    ctx.click(session, &control).await
}

/// Operator-facing description of why a control could not be used
pub fn describe_failure(control: &str, err: &DriverError) -> String {
    match err {
        DriverError::Timeout { .. } => format!("Timeout: '{}' button never became clickable.", control),
        DriverError::NotFound(_) => format!("'{}' button not found.", control),
        DriverError::Engine(_) => format!("Error while clicking '{}'.", control),
    }
}
