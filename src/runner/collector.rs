use std::sync::Arc;
use std::time::Duration;

use super::events::RunObserver;
use super::state::{StepKind, StepOutcome, StepStatus};

/// Ordered record of everything one Run produced.
///
/// Holds two views of the same content: structured outcomes and display
/// lines. Every structured record also appends its display line; free-form
/// lines may exist without a structured counterpart.
pub struct StepCollector {
    outcomes: Vec<StepOutcome>,
    lines: Vec<String>,
    observer: Arc<dyn RunObserver>,
}

impl StepCollector {
    pub fn new(observer: Arc<dyn RunObserver>) -> Self {
        Self {
            outcomes: Vec::new(),
            lines: Vec::new(),
            observer,
        }
    }

    /// Append a free-form display line
    pub fn record(&mut self, message: impl Into<String>) {
        self.lines.push(message.into());
    }

    /// Append a structured outcome and its display line
    pub fn record_step(
        &mut self,
        step: StepKind,
        status: StepStatus,
        duration: Option<Duration>,
        message: Option<String>,
        error: Option<String>,
    ) {
        let mut outcome = StepOutcome::new(step, status).duration(duration);
        outcome.message = message;
        outcome.error_message = error;
        self.push(outcome);
    }

    pub fn success(&mut self, step: StepKind, duration: Option<Duration>, message: impl Into<String>) {
        self.record_step(step, StepStatus::Success, duration, Some(message.into()), None);
    }

    pub fn warning(&mut self, step: StepKind, message: impl Into<String>) {
        self.record_step(step, StepStatus::Warning, None, Some(message.into()), None);
    }

    pub fn failure(&mut self, step: StepKind, message: impl Into<String>, error: impl ToString) {
        self.record_step(
            step,
            StepStatus::Failure,
            None,
            Some(message.into()),
            Some(error.to_string()),
        );
    }

    pub fn info(&mut self, step: StepKind, message: impl Into<String>) {
        self.record_step(step, StepStatus::Info, None, Some(message.into()), None);
    }

    /// Milestone reached; the step named is the one about to run
    pub fn in_progress(&mut self, step: StepKind, message: impl Into<String>) {
        self.record_step(step, StepStatus::InProgress, None, Some(message.into()), None);
    }

    pub fn started(&mut self, step: StepKind, message: impl Into<String>) {
        self.record_step(step, StepStatus::Started, None, Some(message.into()), None);
    }

    pub fn completed(&mut self, step: StepKind, message: impl Into<String>) {
        self.record_step(step, StepStatus::Completed, None, Some(message.into()), None);
    }

    fn push(&mut self, outcome: StepOutcome) {
        self.lines.push(outcome.display_line());
        self.observer.on_step(&outcome);
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[StepOutcome] {
        &self.outcomes
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(StepOutcome::is_failure)
    }

    pub fn into_parts(self) -> (Vec<StepOutcome>, Vec<String>) {
        (self.outcomes, self.lines)
    }
}
