//! Single-product purchase path

use log::info;

use super::flow::{self, describe_failure, FlowConfig, FlowEnd, RunContext};
use super::state::StepKind;
use crate::driver::{BrowserSession, DriverError, DriverResult};

/// Load → CookieConsent → CategoryScroll → ProductOpen → AddToCart → Checkout.
///
/// Stages run strictly in order. Every stage records its outcome before the
/// next one starts; a terminal failure records and stops.
pub struct FastPath<'a> {
    session: &'a dyn BrowserSession,
    config: &'a FlowConfig,
    url: &'a str,
}

impl<'a> FastPath<'a> {
    pub fn new(session: &'a dyn BrowserSession, config: &'a FlowConfig, url: &'a str) -> Self {
        Self {
            session,
            config,
            url,
        }
    }

    pub async fn run(&self, ctx: &mut RunContext) -> DriverResult<FlowEnd> {
        ctx.collector.started(StepKind::Run, "Fast path started.");
        let end = self.stages(ctx).await?;
        ctx.collector
            .completed(StepKind::Run, format!("Fast path finished: {}.", end));
        ctx.progress.finish();
        info!("Fast path finished: {:?}", end);
        Ok(end)
    }

    async fn stages(&self, ctx: &mut RunContext) -> DriverResult<FlowEnd> {
        let session = self.session;
        let locators = &self.config.locators;
        let timings = &self.config.timings;

        if flow::load(session, ctx, self.url, self.config).await.is_err() {
            return Ok(FlowEnd::Stopped(StepKind::Load));
        }

        flow::accept_cookies(session, ctx, self.config).await;

        match flow::scroll_to_category(session, self.config).await {
            Ok(()) => {
                ctx.collector.success(
                    StepKind::CategoryScroll,
                    None,
                    format!("Scrolled to section '{}'.", self.config.category),
                );
                ctx.progress.advance(25);
                ctx.collector.in_progress(
                    StepKind::ProductOpen,
                    format!("Opening a product from section '{}'.", self.config.category),
                );
                flow::settle(timings.settle()).await;
            }
            Err(e) => {
                let message = match e {
                    DriverError::NotFound(_) => {
                        format!("Section '{}' not found on the start page.", self.config.category)
                    }
                    _ => format!("Error scrolling to section '{}'.", self.config.category),
                };
                ctx.collector.failure(StepKind::CategoryScroll, message, e);
                return Ok(FlowEnd::Stopped(StepKind::CategoryScroll));
            }
        }

        let link = match session.find_element(&locators.category_product).await {
            Ok(link) => link,
            Err(e) => {
                ctx.collector.failure(
                    StepKind::ProductOpen,
                    format!("No product link found in section '{}'.", self.config.category),
                    e,
                );
                return Ok(FlowEnd::Stopped(StepKind::ProductOpen));
            }
        };
        let opened = ctx.click(session, &link).await;
        ctx.progress.advance(40);
        match opened {
            Ok(elapsed) => {
                ctx.collector
                    .success(StepKind::ProductOpen, Some(elapsed), "Product page opened.");
                ctx.collector
                    .in_progress(StepKind::AddToCart, "Adding product to cart.");
                flow::settle(timings.settle()).await;
            }
            Err(e) => {
                ctx.collector
                    .failure(StepKind::ProductOpen, "Error clicking the product link.", e);
                return Ok(FlowEnd::Stopped(StepKind::ProductOpen));
            }
        }

        let added = flow::wait_and_click(
            session,
            ctx,
            &locators.add_to_cart,
            timings.add_to_cart_timeout(),
        )
        .await;
        ctx.progress.advance(60);
        match added {
            Ok(elapsed) => {
                ctx.collector
                    .success(StepKind::AddToCart, Some(elapsed), "Product added to cart.");
                ctx.collector
                    .in_progress(StepKind::Checkout, "Proceeding to checkout.");
                flow::settle(timings.cart_settle()).await;
            }
            Err(e) => {
                ctx.collector
                    .failure(StepKind::AddToCart, describe_failure("Buy", &e), e);
                return Ok(FlowEnd::Stopped(StepKind::AddToCart));
            }
        }

        match flow::wait_and_click(session, ctx, &locators.checkout, timings.checkout_timeout())
            .await
        {
            Ok(elapsed) => {
                ctx.collector.success(
                    StepKind::Checkout,
                    Some(elapsed),
                    "Proceeded to checkout.",
                );
                flow::settle(timings.settle()).await;
                Ok(FlowEnd::Completed)
            }
            Err(e) => {
                ctx.collector
                    .failure(StepKind::Checkout, describe_failure("Checkout", &e), e);
                Ok(FlowEnd::Stopped(StepKind::Checkout))
            }
        }
    }
}
