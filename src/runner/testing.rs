use std::sync::{Arc, Mutex};

use super::collector::StepCollector;
use super::events::RunObserver;
use super::flow::{FlowConfig, RunContext, Timings};
use super::progress::ProgressReporter;
use super::state::{StepKind, StepOutcome, StepStatus};

/// Observer remembering everything it was told
#[derive(Default)]
pub struct RecordingObserver {
    steps: Mutex<Vec<StepOutcome>>,
    progress: Mutex<Vec<u8>>,
}

impl RecordingObserver {
    pub fn progress(&self) -> Vec<u8> {
        self.progress.lock().unwrap().clone()
    }

    pub fn steps(&self) -> Vec<StepOutcome> {
        self.steps.lock().unwrap().clone()
    }
}

impl RunObserver for RecordingObserver {
    fn on_step(&self, outcome: &StepOutcome) {
        self.steps.lock().unwrap().push(outcome.clone());
    }

    fn on_progress(&self, value: u8) {
        self.progress.lock().unwrap().push(value);
    }
}

pub fn recording_context() -> (RunContext, Arc<RecordingObserver>) {
    let recorder = Arc::new(RecordingObserver::default());
    let ctx = RunContext::new(
        StepCollector::new(recorder.clone()),
        ProgressReporter::new(recorder.clone()),
    );
    (ctx, recorder)
}

pub fn immediate_config() -> FlowConfig {
    FlowConfig {
        timings: Timings::immediate(),
        ..FlowConfig::default()
    }
}

/// Stage results only, without the start, milestone and completion rows
pub fn stage_outcomes(ctx: &RunContext) -> Vec<StepOutcome> {
    ctx.collector
        .outcomes()
        .iter()
        .filter(|o| !o.status.is_lifecycle())
        .cloned()
        .collect()
}

pub fn status_sequence(ctx: &RunContext) -> Vec<(StepKind, StepStatus)> {
    ctx.collector
        .outcomes()
        .iter()
        .map(|o| (o.step, o.status))
        .collect()
}
