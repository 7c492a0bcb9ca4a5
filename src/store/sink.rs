use log::{debug, warn};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{LogEntry, LogStore};
use crate::runner::{RunObserver, StepOutcome};

enum WriterMessage {
    Entry(LogEntry),
    /// Answered once every entry queued before it is written
    Flush(oneshot::Sender<()>),
}

/// Sender side of the ordered write queue feeding a [`LogStore`]
#[derive(Clone)]
pub struct LogWriter {
    sender: mpsc::UnboundedSender<WriterMessage>,
}

impl LogWriter {
    /// Start the writer task. The task ends once every `LogWriter` and
    /// `StoreSink` is dropped and the queue is drained.
    pub fn spawn(store: LogStore) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<WriterMessage>();
        let handle = tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                match message {
                    WriterMessage::Entry(entry) => {
                        if let Err(e) = store.append(&entry).await {
                            warn!("Dropping log row {}#{}: {:#}", entry.session_id, entry.seq, e);
                        }
                    }
                    WriterMessage::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("Log writer drained");
        });
        (Self { sender }, handle)
    }

    /// Wait until everything queued so far has been handed to the store.
    /// Returns false if the writer task is gone.
    pub async fn flush(&self) -> bool {
        let (done, wait) = oneshot::channel();
        if self.sender.send(WriterMessage::Flush(done)).is_err() {
            return false;
        }
        wait.await.is_ok()
    }

    /// Observer persisting one session's outcomes
    pub fn sink(&self, session_id: impl Into<String>) -> StoreSink {
        StoreSink {
            session_id: session_id.into(),
            seq: AtomicI64::new(0),
            sender: self.sender.clone(),
        }
    }
}

/// Queues every outcome of a Run for persistence without blocking the Run
pub struct StoreSink {
    session_id: String,
    seq: AtomicI64,
    sender: mpsc::UnboundedSender<WriterMessage>,
}

impl RunObserver for StoreSink {
    fn on_step(&self, outcome: &StepOutcome) {
        let entry = LogEntry {
            session_id: self.session_id.clone(),
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            outcome: outcome.clone(),
        };
        if self.sender.send(WriterMessage::Entry(entry)).is_err() {
            warn!("Log writer stopped; outcome of {} not stored", self.session_id);
        }
    }

    fn on_progress(&self, _value: u8) {}
}
