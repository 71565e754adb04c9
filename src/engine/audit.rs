//! Best-effort audit log
//!
//! Appends one JSON line per operation. A failure to write is recorded on
//! the result as a failed `audit` step and never changes `ok`.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::apply::{LinkOptions, LinkResult};
use super::plan::{Step, StepKind, StepStatus};

/// Default audit log location for a manifest: `<manifest>.log.jsonl`.
pub fn default_audit_log_path(manifest_path: &Path) -> PathBuf {
    let mut os = manifest_path.as_os_str().to_os_string();
    os.push(".log.jsonl");
    PathBuf::from(os)
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create audit directory: {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open audit log: {}", path.display()))?;
    writeln!(file, "{}", line)
        .with_context(|| format!("Failed to append audit log: {}", path.display()))?;
    Ok(())
}

/// Append a summary of `result` to the audit log and record the attempt.
pub fn try_append_audit_step(result: &mut LinkResult, manifest_path: &Path, opts: &LinkOptions) {
    let log_path = opts
        .audit_log_path
        .clone()
        .unwrap_or_else(|| default_audit_log_path(manifest_path));

    let mut step = Step::new(
        StepKind::Audit,
        format!("Append audit record to {}", log_path.display()),
    )
    .with_path("path", &log_path);

    let outcome = serde_json::to_string(&*result)
        .context("Failed to serialize audit record")
        .and_then(|line| append_line(&log_path, &line));

    match outcome {
        Ok(()) => step.status = StepStatus::Executed,
        Err(e) => {
            let error = format!("{:#}", e);
            tracing::warn!(audit_log = %log_path.display(), error = %error, "Failed to write audit record");
            step.status = StepStatus::Failed;
            step.error = Some(error);
        }
    }

    result.steps.push(step);
}
