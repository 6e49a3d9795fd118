//! End-of-run JSON report. Written once, never read back.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::state::PipelineState;
use crate::io::config::write_atomic;

#[derive(Debug, Serialize)]
struct Report<'a> {
    degraded: bool,
    #[serde(flatten)]
    state: &'a PipelineState,
}

/// Write the final pipeline state as pretty JSON (temp file + rename).
pub fn write_report(path: &Path, state: &PipelineState, degraded: bool) -> Result<()> {
    let report = Report {
        degraded,
        state,
    };
    let mut buf = serde_json::to_string_pretty(&report).context("serialize run report")?;
    buf.push('\n');
    write_atomic(path, &buf)
}
