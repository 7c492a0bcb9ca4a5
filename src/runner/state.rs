use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Stage of a Run an outcome belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Browser session acquisition and release
    Session,
    Load,
    CookieConsent,
    CategoryScroll,
    ProductOpen,
    AddToCart,
    Checkout,
    Monitor,
    /// Whole-run lifecycle and environment-fatal errors
    Run,
}

impl StepKind {
    pub fn label(&self) -> &'static str {
        match self {
            StepKind::Session => "Browser Session",
            StepKind::Load => "Load Page",
            StepKind::CookieConsent => "Accept Cookies",
            StepKind::CategoryScroll => "Scroll to Category",
            StepKind::ProductOpen => "Open Product",
            StepKind::AddToCart => "Add to Cart",
            StepKind::Checkout => "Checkout",
            StepKind::Monitor => "Monitor",
            StepKind::Run => "Run",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Status of a single step outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Warning,
    Failure,
    Info,
    InProgress,
    Started,
    Completed,
}

impl StepStatus {
    /// Start, milestone and completion markers, as opposed to stage results
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            StepStatus::Started | StepStatus::InProgress | StepStatus::Completed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Success => "success",
            StepStatus::Warning => "warning",
            StepStatus::Failure => "failure",
            StepStatus::Info => "info",
            StepStatus::InProgress => "in_progress",
            StepStatus::Started => "started",
            StepStatus::Completed => "completed",
        }
    }
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(StepStatus::Success),
            "warning" => Ok(StepStatus::Warning),
            "failure" => Ok(StepStatus::Failure),
            "info" => Ok(StepStatus::Info),
            "in_progress" => Ok(StepStatus::InProgress),
            "started" => Ok(StepStatus::Started),
            "completed" => Ok(StepStatus::Completed),
            other => Err(format!("unknown step status: {}", other)),
        }
    }
}

/// One recorded result of a Run stage. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: StepKind,
    pub status: StepStatus,
    /// Elapsed time of the measured action, in seconds
    pub response_time: Option<f64>,
    pub message: Option<String>,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Local>,
}

impl StepOutcome {
    pub fn new(step: StepKind, status: StepStatus) -> Self {
        Self {
            step,
            status,
            response_time: None,
            message: None,
            error_message: None,
            timestamp: Local::now(),
        }
    }

    pub fn duration(mut self, elapsed: Option<Duration>) -> Self {
        self.response_time = elapsed.map(|d| d.as_secs_f64());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self
    }

    /// Display line carrying the same content as the structured record
    pub fn display_line(&self) -> String {
        let mut line = format!("[{}] {}", self.status.as_str(), self.step.label());
        if let Some(ref message) = self.message {
            line.push_str(": ");
            line.push_str(message);
        }
        if let Some(secs) = self.response_time {
            line.push_str(&format!(" ({:.2}s)", secs));
        }
        if let Some(ref error) = self.error_message {
            line.push_str(" - ");
            line.push_str(error);
        }
        line
    }

    pub fn is_failure(&self) -> bool {
        self.status == StepStatus::Failure
    }
}

/// Flow variant executed by a Run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Single fixed product path
    #[default]
    Fast,
    /// Multi-item accumulation loop
    Collection,
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fast" | "rápida" | "rapida" => Ok(RunMode::Fast),
            "collection" | "avançada" | "avancada" => Ok(RunMode::Collection),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Fast => f.write_str("fast"),
            RunMode::Collection => f.write_str("collection"),
        }
    }
}

/// Lifecycle status of a Run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    CompletedWithFailures,
    FailedToStart,
}

/// What to run
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub id: String,
    pub url: String,
    pub mode: RunMode,
}

impl RunRequest {
    pub fn new(id: impl Into<String>, url: impl Into<String>, mode: RunMode) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            mode,
        }
    }
}

/// Everything a finished Run produced
#[derive(Debug, Clone)]
pub struct RunResult {
    pub id: String,
    pub url: String,
    pub mode: RunMode,
    pub status: RunStatus,
    pub progress: u8,
    pub outcomes: Vec<StepOutcome>,
    pub lines: Vec<String>,
}

impl RunResult {
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(StepOutcome::is_failure)
    }

    pub fn steps(&self) -> Vec<(StepKind, StepStatus)> {
        self.outcomes.iter().map(|o| (o.step, o.status)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_labels() {
        assert_eq!("Rápida".parse::<RunMode>(), Ok(RunMode::Fast));
        assert_eq!("Avançada".parse::<RunMode>(), Ok(RunMode::Collection));
        assert_eq!("collection".parse::<RunMode>(), Ok(RunMode::Collection));
        assert!("slow".parse::<RunMode>().is_err());
    }

    #[test]
    fn test_display_line() {
        let outcome = StepOutcome::new(StepKind::AddToCart, StepStatus::Failure)
            .message("Buy button not clickable")
            .error("timed out after 10s");
        assert_eq!(
            outcome.display_line(),
            "[failure] Add to Cart: Buy button not clickable - timed out after 10s"
        );

        let timed = StepOutcome::new(StepKind::Checkout, StepStatus::Success)
            .duration(Some(Duration::from_millis(1250)));
        assert_eq!(timed.display_line(), "[success] Checkout (1.25s)");
    }

    #[test]
    fn test_status_round_trip_names() {
        for status in [StepStatus::InProgress, StepStatus::Warning, StepStatus::Completed] {
            assert_eq!(status.as_str().parse::<StepStatus>(), Ok(status));
        }
    }
}
