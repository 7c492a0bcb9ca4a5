//! In-memory state of web-triggered Runs

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::runner::{RunObserver, RunResult, RunStatus, StepOutcome};
use crate::store::session_id;

/// Live view of one Run, written only by that Run's observer callbacks
pub struct RunEntry {
    state: RwLock<EntryState>,
}

#[derive(Debug, Clone)]
pub struct EntryState {
    pub status: RunStatus,
    pub progress: u8,
    pub results: Vec<StepOutcome>,
}

impl RunEntry {
    fn new() -> Self {
        Self {
            state: RwLock::new(EntryState {
                status: RunStatus::Running,
                progress: 0,
                results: Vec::new(),
            }),
        }
    }

    pub fn snapshot(&self) -> EntryState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, f: impl FnOnce(&mut EntryState)) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut state);
    }
}

impl RunObserver for RunEntry {
    fn on_step(&self, outcome: &StepOutcome) {
        self.update(|s| s.results.push(outcome.clone()));
    }

    fn on_progress(&self, value: u8) {
        self.update(|s| s.progress = s.progress.max(value));
    }

    fn on_run_finished(&self, result: &RunResult) {
        self.update(|s| {
            s.status = result.status;
            s.progress = result.progress;
        });
    }
}

/// Finished entries kept in memory when there is no store to answer for them
pub const DEFAULT_FINISHED_RETAINED: usize = 256;

struct Inner {
    counter: u64,
    runs: HashMap<String, Arc<RunEntry>>,
    /// Finished, unpersisted ids, oldest first
    finished: VecDeque<String>,
}

/// Identifier counter plus id → entry map, behind one lock
pub struct RunRegistry {
    inner: Mutex<Inner>,
    retain_finished: usize,
}

impl RunRegistry {
    /// `last` is the highest identifier number already in use
    pub fn new(last: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                counter: last,
                runs: HashMap::new(),
                finished: VecDeque::new(),
            }),
            retain_finished: DEFAULT_FINISHED_RETAINED,
        }
    }

    #[cfg(test)]
    pub fn with_retention(mut self, retain_finished: usize) -> Self {
        self.retain_finished = retain_finished;
        self
    }

    /// Reserve the next `TestandoSite_<n>` and register its entry
    pub fn allocate(&self) -> (String, Arc<RunEntry>) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.counter += 1;
        let id = session_id(inner.counter);
        let entry = Arc::new(RunEntry::new());
        inner.runs.insert(id.clone(), entry.clone());
        (id, entry)
    }

    pub fn get(&self, id: &str) -> Option<Arc<RunEntry>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .runs
            .get(id)
            .cloned()
    }

    /// Release a finished Run. A persisted Run is dropped at once since the
    /// store answers for it from now on. Otherwise only the most recent
    /// `retain_finished` finished entries stay queryable.
    pub fn finish(&self, id: &str, persisted: bool) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if persisted {
            inner.runs.remove(id);
            return;
        }
        inner.finished.push_back(id.to_string());
        while inner.finished.len() > self.retain_finished {
            if let Some(oldest) = inner.finished.pop_front() {
                inner.runs.remove(&oldest);
            }
        }
    }

    /// Entries currently held, live or finished
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .runs
            .len()
    }
}
