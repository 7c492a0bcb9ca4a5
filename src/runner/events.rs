use super::state::{RunMode, RunRequest, RunResult, RunStatus, StepOutcome, StepStatus};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Receiver of a Run's outcomes and progress.
///
/// Injected once when a Run is constructed; the executor is the only writer.
pub trait RunObserver: Send + Sync {
    fn on_run_started(&self, _request: &RunRequest) {}

    fn on_step(&self, outcome: &StepOutcome);

    fn on_progress(&self, value: u8);

    fn on_run_finished(&self, _result: &RunResult) {}
}

/// Observer that discards everything
pub struct NullObserver;

impl RunObserver for NullObserver {
    fn on_step(&self, _outcome: &StepOutcome) {}

    fn on_progress(&self, _value: u8) {}
}

/// Fan-out to several observers, in registration order
#[derive(Default, Clone)]
pub struct Observers {
    inner: Vec<Arc<dyn RunObserver>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.inner.push(observer);
        self
    }
}

impl RunObserver for Observers {
    fn on_run_started(&self, request: &RunRequest) {
        for o in &self.inner {
            o.on_run_started(request);
        }
    }

    fn on_step(&self, outcome: &StepOutcome) {
        for o in &self.inner {
            o.on_step(outcome);
        }
    }

    fn on_progress(&self, value: u8) {
        for o in &self.inner {
            o.on_progress(value);
        }
    }

    fn on_run_finished(&self, result: &RunResult) {
        for o in &self.inner {
            o.on_run_finished(result);
        }
    }
}

/// Run events for real-time updates
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        url: String,
        mode: RunMode,
    },
    StepRecorded {
        outcome: StepOutcome,
    },
    Progress {
        value: u8,
    },
    RunFinished {
        run_id: String,
        status: RunStatus,
        failures: usize,
    },
}

/// Event emitter for broadcasting run events
pub struct EventEmitter {
    sender: broadcast::Sender<RunEvent>,
}

impl EventEmitter {
    pub fn new() -> (Self, broadcast::Receiver<RunEvent>) {
        let (sender, receiver) = broadcast::channel(100);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }
}

impl RunObserver for EventEmitter {
    fn on_run_started(&self, request: &RunRequest) {
        self.emit(RunEvent::RunStarted {
            run_id: request.id.clone(),
            url: request.url.clone(),
            mode: request.mode,
        });
    }

    fn on_step(&self, outcome: &StepOutcome) {
        self.emit(RunEvent::StepRecorded {
            outcome: outcome.clone(),
        });
    }

    fn on_progress(&self, value: u8) {
        self.emit(RunEvent::Progress { value });
    }

    fn on_run_finished(&self, result: &RunResult) {
        self.emit(RunEvent::RunFinished {
            run_id: result.id.clone(),
            status: result.status,
            failures: result.outcomes.iter().filter(|o| o.is_failure()).count(),
        });
    }
}

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Console event listener for printing real-time updates
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    pub async fn listen(mut receiver: broadcast::Receiver<RunEvent>) {
        use colored::Colorize;
        use std::io::IsTerminal;

        let mut bar: Option<ProgressBar> = None;

        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::debug!("Console listener skipped {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match event {
                RunEvent::RunStarted { run_id, url, mode } => {
                    println!(
                        "\n{} Run {} started: {} ({})",
                        "▶".green().bold(),
                        run_id.cyan(),
                        url,
                        mode
                    );
                    let pb = if std::io::stdout().is_terminal() {
                        ProgressBar::new(100)
                    } else {
                        // Piped output gets no escape codes
                        ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::hidden())
                    };
                    if let Ok(style) =
                        ProgressStyle::default_bar().template("  [{bar:40.cyan/blue}] {pos:>3}%")
                    {
                        pb.set_style(style.progress_chars("=> "));
                    }
                    bar = Some(pb);
                }

                RunEvent::StepRecorded { outcome } => {
                    let icon = match outcome.status {
                        StepStatus::Success | StepStatus::Completed => "✓".green(),
                        StepStatus::Warning => "⚠".yellow(),
                        StepStatus::Failure => "✗".red(),
                        _ => "ℹ".blue(),
                    };
                    let line = format!("  {} {}", icon, outcome.display_line());
                    match bar {
                        Some(ref pb) => pb.println(line),
                        None => println!("{}", line),
                    }
                }

                RunEvent::Progress { value } => {
                    if let Some(ref pb) = bar {
                        pb.set_position(value as u64);
                    }
                }

                RunEvent::RunFinished {
                    run_id,
                    status,
                    failures,
                } => {
                    if let Some(pb) = bar.take() {
                        pb.finish();
                    }
                    let status_str = match status {
                        RunStatus::Completed => "COMPLETED".green().bold(),
                        RunStatus::CompletedWithFailures => {
                            format!("COMPLETED ({} failures)", failures).yellow().bold()
                        }
                        RunStatus::FailedToStart => "FAILED TO START".red().bold(),
                        RunStatus::Running => "RUNNING".white().bold(),
                    };
                    println!("{} Run {} [{}]", "■".blue().bold(), run_id, status_str);
                }
            }
        }
    }
}
