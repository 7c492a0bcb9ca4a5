use std::time::{Duration, Instant};

use crate::driver::{BrowserSession, DriverError, DriverResult, ElementRef};

/// Separator between the native and fallback error texts
pub const FALLBACK_SEPARATOR: &str = " | script click failed: ";

/// Timing of a successful click
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickReport {
    pub elapsed: Duration,
    pub used_fallback: bool,
}

/// Click `element`, falling back to a script click once if the native click fails.
///
/// Each attempt is timed on its own. When both fail the error carries the
/// native message first and the fallback message second.
pub async fn attempt_click(
    session: &dyn BrowserSession,
    element: &ElementRef,
) -> DriverResult<ClickReport> {
    let start = Instant::now();
    let native_err = match session.click(element).await {
        Ok(()) => {
            return Ok(ClickReport {
                elapsed: start.elapsed(),
                used_fallback: false,
            })
        }
        Err(e) => e,
    };

    let start = Instant::now();
    match session.script_click(element).await {
        Ok(()) => Ok(ClickReport {
            elapsed: start.elapsed(),
            used_fallback: true,
        }),
        Err(script_err) => Err(DriverError::Engine(format!(
            "{}{}{}",
            native_err, FALLBACK_SEPARATOR, script_err
        ))),
    }
}
