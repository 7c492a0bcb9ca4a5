//! Multi-product accumulation loop

use log::{debug, info};
use std::collections::HashSet;

use super::flow::{self, describe_failure, FlowConfig, FlowEnd, RunContext};
use super::state::StepKind;
use crate::driver::{BrowserSession, DriverResult, ElementRef};

/// Result of one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Iteration {
    Added,
    /// The picked product could not be opened or added
    ItemFailed,
    /// No unvisited product left, even after a reload
    Exhausted,
}

/// Adds up to `target_items` distinct products to the cart, then checks out once.
pub struct CollectionLoop<'a> {
    session: &'a dyn BrowserSession,
    config: &'a FlowConfig,
    url: &'a str,
}

impl<'a> CollectionLoop<'a> {
    pub fn new(session: &'a dyn BrowserSession, config: &'a FlowConfig, url: &'a str) -> Self {
        Self {
            session,
            config,
            url,
        }
    }

    pub async fn run(&self, ctx: &mut RunContext) -> DriverResult<FlowEnd> {
        ctx.collector.started(
            StepKind::Run,
            format!(
                "Collection loop started, aiming for {} products.",
                self.config.target_items
            ),
        );
        let end = self.stages(ctx).await?;
        ctx.collector
            .completed(StepKind::Run, format!("Collection loop finished: {}.", end));
        ctx.progress.finish();
        info!("Collection loop finished: {:?}", end);
        Ok(end)
    }

    async fn stages(&self, ctx: &mut RunContext) -> DriverResult<FlowEnd> {
        if flow::load(self.session, ctx, self.url, self.config)
            .await
            .is_err()
        {
            return Ok(FlowEnd::Stopped(StepKind::Load));
        }

        flow::accept_cookies(self.session, ctx, self.config).await;

        match flow::scroll_to_category(self.session, self.config).await {
            Ok(()) => {
                ctx.collector.success(
                    StepKind::CategoryScroll,
                    None,
                    format!("Scrolled to section '{}'.", self.config.category),
                );
                flow::settle(self.config.timings.settle()).await;
            }
            Err(e) => ctx.collector.warning(
                StepKind::CategoryScroll,
                format!(
                    "Section '{}' not reachable ({}); looking for products in other sections.",
                    self.config.category, e
                ),
            ),
        }

        let added = self.collect(ctx).await;

        if added == 0 {
            ctx.collector.warning(
                StepKind::Checkout,
                "No products were added to the cart; checkout skipped.",
            );
            return Ok(FlowEnd::NoItems);
        }

        ctx.progress.advance(95);
        ctx.collector.in_progress(
            StepKind::Checkout,
            format!("Proceeding to checkout with {} items.", added),
        );
        match flow::wait_and_click(
            self.session,
            ctx,
            &self.config.locators.checkout,
            self.config.timings.checkout_timeout(),
        )
        .await
        {
            Ok(elapsed) => {
                ctx.collector.success(
                    StepKind::Checkout,
                    Some(elapsed),
                    format!("Proceeded to checkout with {} items.", added),
                );
                flow::settle(self.config.timings.settle()).await;
                Ok(FlowEnd::Completed)
            }
            Err(e) => {
                ctx.collector
                    .failure(StepKind::Checkout, describe_failure("Checkout", &e), e);
                Ok(FlowEnd::Stopped(StepKind::Checkout))
            }
        }
    }

    /// Run the accumulation loop; returns the number of products added
    async fn collect(&self, ctx: &mut RunContext) -> u32 {
        let target = self.config.target_items;
        let mut visited: HashSet<String> = HashSet::new();
        let mut added = 0u32;
        let mut failures = 0u32;

        while added < target {
            ctx.collector.in_progress(
                StepKind::ProductOpen,
                format!("Adding product {} of {}.", added + 1, target),
            );
            match self.iteration(ctx, &mut visited, added + 1).await {
                Ok(Iteration::Exhausted) => break,
                Ok(outcome) => {
                    failures = 0;
                    if outcome == Iteration::Added {
                        added += 1;
                        ctx.progress.items(added);
                        ctx.collector.in_progress(
                            StepKind::AddToCart,
                            format!("{} of {} products in the cart.", added, target),
                        );
                    }
                }
                Err(e) => {
                    failures += 1;
                    ctx.collector.failure(
                        StepKind::ProductOpen,
                        format!("Error processing product {} of {}.", added + 1, target),
                        e,
                    );
                    if failures >= self.config.max_iteration_failures {
                        ctx.collector.failure(
                            StepKind::ProductOpen,
                            format!("Giving up after {} consecutive failed iterations.", failures),
                            "iteration failure limit reached",
                        );
                        break;
                    }
                }
            }

            if added < target {
                self.return_to_start(ctx).await;
            }
        }

        added
    }

    async fn iteration(
        &self,
        ctx: &mut RunContext,
        visited: &mut HashSet<String>,
        item: u32,
    ) -> DriverResult<Iteration> {
        let mut candidates = self.unvisited(visited).await?;
        if candidates.is_empty() {
            ctx.collector.warning(
                StepKind::ProductOpen,
                "No new products on the start page; reloading.",
            );
            self.session.navigate(self.url).await?;
            flow::settle(self.config.timings.return_settle()).await;

            candidates = self.unvisited(visited).await?;
            if candidates.is_empty() {
                ctx.collector.info(
                    StepKind::ProductOpen,
                    "No more distinct products available, even after reloading.",
                );
                return Ok(Iteration::Exhausted);
            }
        }

        let Some((link, reference)) = candidates.into_iter().next() else {
            return Ok(Iteration::Exhausted);
        };
        visited.insert(reference.clone());

        let opened = match self.session.scroll_into_view(&link).await {
            Ok(()) => ctx.click(self.session, &link).await,
            Err(e) => Err(e),
        };
        match opened {
            Ok(elapsed) => {
                ctx.collector.success(
                    StepKind::ProductOpen,
                    Some(elapsed),
                    format!("Product {} opened ({}).", item, reference),
                );
                flow::settle(self.config.timings.settle()).await;
            }
            Err(e) => {
                ctx.collector.failure(
                    StepKind::ProductOpen,
                    format!("Error opening product {}.", reference),
                    e,
                );
                return Ok(Iteration::ItemFailed);
            }
        }

        let added = flow::wait_and_click(
            self.session,
            ctx,
            &self.config.locators.add_to_cart,
            self.config.timings.add_to_cart_timeout(),
        )
        .await;
        let outcome = match added {
            Ok(elapsed) => {
                ctx.collector.success(
                    StepKind::AddToCart,
                    Some(elapsed),
                    format!("Product {} added to cart.", item),
                );
                Iteration::Added
            }
            Err(e) => {
                ctx.collector.failure(
                    StepKind::AddToCart,
                    format!("{} ({})", describe_failure("Buy", &e), reference),
                    e,
                );
                Iteration::ItemFailed
            }
        };
        flow::settle(self.config.timings.cart_settle()).await;
        Ok(outcome)
    }

    /// Candidate links not visited yet, with their product references
    async fn unvisited(&self, visited: &HashSet<String>) -> DriverResult<Vec<(ElementRef, String)>> {
        let links = self
            .session
            .find_elements(&self.config.locators.product_candidates)
            .await?;
        let mut fresh = Vec::new();
        for (position, link) in links.into_iter().enumerate() {
            let reference = self
                .session
                .attribute(&link, "href")
                .await?
                .unwrap_or_else(|| format!("position:{}", position));
            if !visited.contains(&reference) {
                fresh.push((link, reference));
            }
        }
        Ok(fresh)
    }

    /// Back to the start page and the category section, best-effort
    async fn return_to_start(&self, ctx: &mut RunContext) {
        if let Err(e) = self.session.navigate(self.url).await {
            ctx.collector.warning(
                StepKind::Load,
                format!("Could not return to the start page: {}", e),
            );
            return;
        }
        flow::settle(self.config.timings.return_settle()).await;

        match flow::scroll_to_category(self.session, self.config).await {
            Ok(()) => debug!("Back at section '{}'", self.config.category),
            Err(e) => ctx.collector.warning(
                StepKind::CategoryScroll,
                format!(
                    "Could not scroll to section '{}' after returning: {}",
                    self.config.category, e
                ),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::{Behavior, Lookup, MockElement, MockSession};
    use crate::runner::state::StepStatus;
    use crate::runner::testing::{
        immediate_config, recording_context, stage_outcomes, status_sequence,
    };

    /// Storefront listing `hrefs` on every page load
    fn listing(config: &FlowConfig, hrefs: &[&str]) -> (MockSession, Vec<ElementRef>) {
        let session = MockSession::new();
        let l = &config.locators;
        let heading = session.add_element(MockElement::ok());
        let buy = session.add_element(MockElement::ok());
        let checkout = session.add_element(MockElement::ok());
        let links: Vec<_> = hrefs
            .iter()
            .map(|h| session.add_element(MockElement::link(h)))
            .collect();
        session.on_find(&l.category_heading, Lookup::Found(heading));
        session.on_find_all(&l.product_candidates, vec![links.clone()]);
        session.on_wait(&l.add_to_cart, Lookup::Found(buy));
        session.on_wait(&l.checkout, Lookup::Found(checkout));
        (session, links)
    }

    #[tokio::test]
    async fn test_exhaustion_before_target() {
        let config = immediate_config();
        let (session, _) = listing(&config, &["/a/p", "/b/p", "/c/p"]);
        let (mut ctx, recorder) = recording_context();

        let end = CollectionLoop::new(&session, &config, "https://shop.example")
            .run(&mut ctx)
            .await
            .unwrap();

        assert_eq!(end, FlowEnd::Completed);
        assert_eq!(recorder.progress(), vec![9, 18, 27, 95, 100]);
        let added = ctx
            .collector
            .outcomes()
            .iter()
            .filter(|o| o.step == StepKind::AddToCart && o.status == StepStatus::Success)
            .count();
        assert_eq!(added, 3);
        // Initial load, two returns between items, one reload on exhaustion
        assert_eq!(session.count_calls("navigate"), 1 + 3 + 1);
        let stages = stage_outcomes(&ctx);
        let last = stages.last().unwrap();
        assert_eq!(last.message.as_deref(), Some("Proceeded to checkout with 3 items."));
    }

    #[tokio::test]
    async fn test_happy_path_status_sequence() {
        use StepKind::*;
        use StepStatus::*;
        let mut config = immediate_config();
        config.target_items = 2;
        let (session, _) = listing(&config, &["/a/p", "/b/p", "/c/p"]);
        let (mut ctx, _) = recording_context();

        CollectionLoop::new(&session, &config, "https://shop.example")
            .run(&mut ctx)
            .await
            .unwrap();

        assert_eq!(
            status_sequence(&ctx),
            vec![
                (Run, Started),
                (Load, Success),
                (CookieConsent, Warning),
                (CategoryScroll, Success),
                (ProductOpen, InProgress),
                (ProductOpen, Success),
                (AddToCart, Success),
                (AddToCart, InProgress),
                (ProductOpen, InProgress),
                (ProductOpen, Success),
                (AddToCart, Success),
                (AddToCart, InProgress),
                (Checkout, InProgress),
                (Checkout, Success),
                (Run, Completed),
            ]
        );
        let milestones: Vec<_> = ctx
            .collector
            .outcomes()
            .iter()
            .filter(|o| o.status == InProgress && o.step == ProductOpen)
            .filter_map(|o| o.message.clone())
            .collect();
        assert_eq!(milestones, vec!["Adding product 1 of 2.", "Adding product 2 of 2."]);
        assert_eq!(
            ctx.collector.outcomes().last().unwrap().message.as_deref(),
            Some("Collection loop finished: checkout reached.")
        );
    }

    #[tokio::test]
    async fn test_target_count_stops_loop() {
        let mut config = immediate_config();
        config.target_items = 2;
        let (session, _) = listing(&config, &["/a/p", "/b/p", "/c/p"]);
        let (mut ctx, recorder) = recording_context();

        let end = CollectionLoop::new(&session, &config, "https://shop.example")
            .run(&mut ctx)
            .await
            .unwrap();

        assert_eq!(end, FlowEnd::Completed);
        assert_eq!(recorder.progress(), vec![9, 18, 95, 100]);
        assert_eq!(session.count_calls("navigate"), 2);
    }

    #[tokio::test]
    async fn test_item_click_failure_continues_loop() {
        let config = immediate_config();
        let (session, links) = listing(&config, &["/a/p", "/b/p"]);
        let broken = session.add_element(
            MockElement::link("/broken/p")
                .native_click(Behavior::Fail("intercepted".into()))
                .script_click(Behavior::Fail("detached".into())),
        );
        session.on_find_all(
            &config.locators.product_candidates,
            vec![vec![broken, links[0], links[1]]],
        );
        let (mut ctx, _) = recording_context();

        let end = CollectionLoop::new(&session, &config, "https://shop.example")
            .run(&mut ctx)
            .await
            .unwrap();

        assert_eq!(end, FlowEnd::Completed);
        let failures: Vec<_> = ctx
            .collector
            .outcomes()
            .iter()
            .filter(|o| o.is_failure())
            .collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].step, StepKind::ProductOpen);
        assert_eq!(
            stage_outcomes(&ctx).last().unwrap().message.as_deref(),
            Some("Proceeded to checkout with 2 items.")
        );
    }

    #[tokio::test]
    async fn test_add_to_cart_failure_does_not_count() {
        let config = immediate_config();
        let (session, _) = listing(&config, &["/a/p", "/b/p"]);
        session.on_wait(&config.locators.add_to_cart, Lookup::Timeout);
        let (mut ctx, recorder) = recording_context();

        let end = CollectionLoop::new(&session, &config, "https://shop.example")
            .run(&mut ctx)
            .await
            .unwrap();

        assert_eq!(end, FlowEnd::NoItems);
        assert_eq!(session.count_calls("wait"), 2);
        assert_eq!(recorder.progress(), vec![100]);
        let stages = stage_outcomes(&ctx);
        let last = stages.last().unwrap();
        assert_eq!((last.step, last.status), (StepKind::Checkout, StepStatus::Warning));
        assert_eq!(
            ctx.collector.outcomes().last().unwrap().message.as_deref(),
            Some("Collection loop finished: no items added.")
        );
    }

    #[tokio::test]
    async fn test_empty_listing_reports_no_items() {
        let config = immediate_config();
        let (session, _) = listing(&config, &[]);
        let (mut ctx, _) = recording_context();

        let end = CollectionLoop::new(&session, &config, "https://shop.example")
            .run(&mut ctx)
            .await
            .unwrap();

        assert_eq!(end, FlowEnd::NoItems);
        assert_eq!(ctx.progress.value(), 100);
        assert_eq!(session.count_calls("wait"), 0);
    }

    #[tokio::test]
    async fn test_repeated_iteration_errors_are_bounded() {
        let config = immediate_config();
        let (session, _) = listing(&config, &["/a/p"]);
        session.fail_find_all(&config.locators.product_candidates, "target closed");
        let (mut ctx, _) = recording_context();

        let end = CollectionLoop::new(&session, &config, "https://shop.example")
            .run(&mut ctx)
            .await
            .unwrap();

        assert_eq!(end, FlowEnd::NoItems);
        assert_eq!(session.count_calls("find_all"), 3);
        // Initial load plus a reload after each of the first two failures
        assert_eq!(session.count_calls("navigate"), 3);
    }

    #[tokio::test]
    async fn test_missing_category_is_only_a_warning() {
        let config = immediate_config();
        let (session, _) = listing(&config, &["/a/p"]);
        session.on_find(&config.locators.category_heading, Lookup::NotFound);
        let (mut ctx, _) = recording_context();

        let end = CollectionLoop::new(&session, &config, "https://shop.example")
            .run(&mut ctx)
            .await
            .unwrap();

        assert_eq!(end, FlowEnd::Completed);
        assert!(ctx
            .collector
            .outcomes()
            .iter()
            .filter(|o| o.step == StepKind::CategoryScroll)
            .all(|o| o.status == StepStatus::Warning));
    }
}
