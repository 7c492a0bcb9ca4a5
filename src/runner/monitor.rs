//! Periodic Run scheduling

use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::controller::RunController;
use super::events::RunObserver;
use super::state::{RunMode, RunRequest, RunResult, StepKind, StepOutcome, StepStatus};

/// Cooperative stop signal shared between the monitor and whoever stops it
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Repeats Runs against one storefront until stopped
pub struct Monitor {
    controller: RunController,
    url: String,
    mode: RunMode,
    interval_secs: u64,
    stop: StopFlag,
    observer: Arc<dyn RunObserver>,
}

impl Monitor {
    /// `interval_hours` is truncated to whole seconds
    pub fn new(
        controller: RunController,
        url: impl Into<String>,
        mode: RunMode,
        interval_hours: f64,
        stop: StopFlag,
        observer: Arc<dyn RunObserver>,
    ) -> Self {
        Self {
            controller,
            url: url.into(),
            mode,
            interval_secs: (interval_hours * 3600.0) as u64,
            stop,
            observer,
        }
    }

    /// Loop until stopped, calling `on_result` after every Run.
    /// Returns how many Runs were executed.
    pub async fn monitor<F>(&self, mut on_result: F) -> u32
    where
        F: FnMut(&RunResult),
    {
        let mut runs = 0u32;
        while !self.stop.is_stopped() {
            runs += 1;
            let request = RunRequest::new(format!("monitor-{}", runs), &self.url, self.mode);

            let controller = self.controller.clone();
            let observer = self.observer.clone();
            let handle =
                tokio::spawn(async move { controller.execute(&request, observer).await });
            match handle.await {
                Ok(result) => on_result(&result),
                Err(e) => warn!("Run task did not complete: {}", e),
            }

            if self.stop.is_stopped() {
                break;
            }
            let hours = self.interval_secs as f64 / 3600.0;
            info!("Next run in {:.2} hours", hours);
            self.observer.on_step(
                &StepOutcome::new(StepKind::Monitor, StepStatus::Info)
                    .message(format!("Waiting {:.2} hours until the next run.", hours)),
            );
            self.wait().await;
        }
        info!("Monitor stopped after {} runs", runs);
        runs
    }

    /// Sleep the interval in one-second slices, returning early on stop
    async fn wait(&self) {
        for _ in 0..self.interval_secs {
            if self.stop.is_stopped() {
                return;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}
