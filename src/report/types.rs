use crate::runner::{RunMode, RunResult, RunStatus, StepOutcome};
use serde::{Deserialize, Serialize};

/// Serialisable record of one finished Run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub session_id: String,
    pub url: String,
    pub mode: RunMode,
    pub status: RunStatus,
    pub progress: u8,
    pub failures: usize,
    pub steps: Vec<StepOutcome>,
    pub generated_at: String,
}

impl From<&RunResult> for RunReport {
    fn from(result: &RunResult) -> Self {
        Self {
            session_id: result.id.clone(),
            url: result.url.clone(),
            mode: result.mode,
            status: result.status,
            progress: result.progress,
            failures: result.outcomes.iter().filter(|o| o.is_failure()).count(),
            steps: result.outcomes.clone(),
            generated_at: chrono::Local::now().to_rfc3339(),
        }
    }
}
