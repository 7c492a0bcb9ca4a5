use std::sync::Arc;

use super::events::RunObserver;

/// Monotone 0–100 progress signal of one Run
pub struct ProgressReporter {
    value: u8,
    observer: Arc<dyn RunObserver>,
}

impl ProgressReporter {
    pub fn new(observer: Arc<dyn RunObserver>) -> Self {
        Self { value: 0, observer }
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    /// Move progress forward to `value`; lower values are ignored
    pub fn advance(&mut self, value: u8) {
        let value = value.min(100);
        if value > self.value {
            self.value = value;
            self.observer.on_progress(value);
        }
    }

    /// Progress for `count` accumulated items, held below 100 until checkout
    pub fn items(&mut self, count: u32) {
        let value = count.saturating_mul(9).min(99);
        self.advance(value as u8);
    }

    pub fn finish(&mut self) {
        self.advance(100);
    }
}
