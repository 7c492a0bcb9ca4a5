use anyhow::{Context, Result};
use std::path::Path;

use super::types::RunReport;

/// Write a JSON report to `output`, or stdout when no path is given
pub fn write(report: &RunReport, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;

    if let Some(path) = output {
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("JSON report saved to: {}", path.display());
    } else {
        println!("{}", json);
    }

    Ok(())
}
