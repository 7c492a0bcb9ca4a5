//! Session lifecycle and executor dispatch for one Run

use futures::FutureExt;
use log::{error, info, warn};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use super::collection::CollectionLoop;
use super::collector::StepCollector;
use super::events::RunObserver;
use super::fast::FastPath;
use super::flow::{FlowConfig, FlowEnd, RunContext};
use super::progress::ProgressReporter;
use super::state::{RunMode, RunRequest, RunResult, RunStatus, StepKind, StepStatus};
use crate::driver::{BrowserSession, DriverResult, SessionFactory, SessionOptions};

/// Executes Runs, one fresh browser session each.
#[derive(Clone)]
pub struct RunController {
    factory: Arc<dyn SessionFactory>,
    flow: Arc<FlowConfig>,
    options: SessionOptions,
}

impl RunController {
    pub fn new(factory: Arc<dyn SessionFactory>, flow: FlowConfig, options: SessionOptions) -> Self {
        Self {
            factory,
            flow: Arc::new(flow),
            options,
        }
    }

    /// Run `request` to completion. Never fails and never panics outward:
    /// every problem ends up as an outcome in the returned result.
    pub async fn execute(&self, request: &RunRequest, observer: Arc<dyn RunObserver>) -> RunResult {
        info!("Run {} starting ({} mode, {})", request.id, request.mode, request.url);
        observer.on_run_started(request);

        let mut ctx = RunContext::new(
            StepCollector::new(observer.clone()),
            ProgressReporter::new(observer.clone()),
        );
        ctx.progress.advance(5);

        let start = Instant::now();
        let session = match self.factory.open(&self.options).await {
            Ok(session) => session,
            Err(e) => {
                error!("Run {}: browser session failed to start: {:#}", request.id, e);
                ctx.collector.failure(
                    StepKind::Session,
                    "Could not start the browser session.",
                    format!("{:#}", e),
                );
                ctx.progress.finish();
                return self.finish(request, ctx, RunStatus::FailedToStart, observer.as_ref());
            }
        };
        ctx.collector.success(
            StepKind::Session,
            Some(start.elapsed()),
            format!(
                "Browser session started ({}).",
                if self.options.headless { "headless" } else { "visible" }
            ),
        );

        let outcome = AssertUnwindSafe(self.dispatch(session.as_ref(), request, &mut ctx))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(end)) => info!("Run {} flow ended: {:?}", request.id, end),
            Ok(Err(e)) => {
                warn!("Run {} aborted: {}", request.id, e);
                ctx.collector
                    .failure(StepKind::Run, "Unexpected engine error; run aborted.", e);
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!("Run {} panicked: {}", request.id, reason);
                ctx.collector
                    .failure(StepKind::Run, "Run aborted by an internal error.", reason);
            }
        }

        match session.quit().await {
            Ok(()) => ctx.collector.record_step(
                StepKind::Session,
                StepStatus::Completed,
                None,
                Some("Browser session closed.".to_string()),
                None,
            ),
            Err(e) => ctx.collector.warning(
                StepKind::Session,
                format!("Browser session did not close cleanly: {}", e),
            ),
        }
        ctx.progress.finish();

        let status = if ctx.collector.has_failures() {
            RunStatus::CompletedWithFailures
        } else {
            RunStatus::Completed
        };
        self.finish(request, ctx, status, observer.as_ref())
    }

    async fn dispatch(
        &self,
        session: &dyn BrowserSession,
        request: &RunRequest,
        ctx: &mut RunContext,
    ) -> DriverResult<FlowEnd> {
        match request.mode {
            RunMode::Fast => FastPath::new(session, &self.flow, &request.url).run(ctx).await,
            RunMode::Collection => {
                CollectionLoop::new(session, &self.flow, &request.url)
                    .run(ctx)
                    .await
            }
        }
    }

    fn finish(
        &self,
        request: &RunRequest,
        ctx: RunContext,
        status: RunStatus,
        observer: &dyn RunObserver,
    ) -> RunResult {
        let progress = ctx.progress.value();
        let (outcomes, lines) = ctx.collector.into_parts();
        let result = RunResult {
            id: request.id.clone(),
            url: request.url.clone(),
            mode: request.mode,
            status,
            progress,
            outcomes,
            lines,
        };
        info!("Run {} finished: {:?}", result.id, result.status);
        observer.on_run_finished(&result);
        result
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
