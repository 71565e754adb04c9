//! Plan executor
//!
//! Runs a list of planned steps strictly in order against the real
//! filesystem and reports the outcome as a [`LinkResult`]. Execution stops
//! at the first failing step; steps already applied are left in place.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::manifest::MappingKind;
use super::plan::{Step, StepKind, StepStatus};

/// Options shared by all engine operations
#[derive(Debug, Default, Clone)]
pub struct LinkOptions {
    /// Audit log location (default: `<manifest>.log.jsonl`)
    pub audit_log_path: Option<PathBuf>,
    /// `remove` only: drop the manifest entry but leave the symlink in place
    pub keep_link: bool,
    /// Plan without touching the filesystem or the manifest
    pub dry_run: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Add,
    Remove,
    Install,
    Uninstall,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Add => "add",
            Operation::Remove => "remove",
            Operation::Install => "install",
            Operation::Uninstall => "uninstall",
        };
        f.write_str(name)
    }
}

/// A filesystem or manifest change that actually happened
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Change {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl Change {
    pub fn new(action: &str, source: Option<&Path>, target: Option<&Path>) -> Self {
        Self {
            action: action.to_string(),
            source: source.map(|p| p.display().to_string()),
            target: target.map(|p| p.display().to_string()),
        }
    }
}

/// Outcome of one engine operation
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LinkResult {
    pub ok: bool,
    pub operation: Operation,
    pub manifest_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub steps: Vec<Step>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub changes: Vec<Change>,
}

impl LinkResult {
    pub fn new(operation: Operation, manifest_path: &Path) -> Self {
        let now = Utc::now();
        Self {
            ok: true,
            operation,
            manifest_path: manifest_path.to_path_buf(),
            started_at: now,
            finished_at: now,
            duration_ms: 0,
            steps: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
            changes: Vec::new(),
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.ok = false;
        self.errors.push(message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
        self.duration_ms = (self.finished_at - self.started_at).num_milliseconds();
    }

    /// Steps that ran and changed something, ignoring bookkeeping steps.
    pub fn executed_fs_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Executed)
            .filter(|s| {
                !matches!(
                    s.kind,
                    StepKind::Noop | StepKind::WriteManifest | StepKind::Audit
                )
            })
            .count()
    }
}

/// Execute `steps` in order and collect the outcome.
pub fn apply_plan(
    operation: Operation,
    manifest_path: &Path,
    steps: Vec<Step>,
    opts: &LinkOptions,
) -> LinkResult {
    let mut result = LinkResult::new(operation, manifest_path);
    run_steps(&mut result, steps, opts);
    result
}

/// Execute `steps` into an existing result, stopping at the first failure.
pub fn run_steps(result: &mut LinkResult, steps: Vec<Step>, opts: &LinkOptions) {
    for mut step in steps {
        if step.status == StepStatus::Skipped {
            result.steps.push(step);
            continue;
        }

        if opts.dry_run {
            tracing::debug!(step = %step.kind, message = %step.message, "Would run step");
            step.status = StepStatus::Planned;
            result.steps.push(step);
            continue;
        }

        match execute_step(&step) {
            Ok(change) => {
                tracing::debug!(step = %step.kind, message = %step.message, "Step executed");
                step.status = StepStatus::Executed;
                if let Some(change) = change {
                    result.changes.push(change);
                }
                result.steps.push(step);
            }
            Err(e) => {
                let error = format!("{:#}", e);
                tracing::error!(step = %step.kind, error = %error, "Step failed");
                step.status = StepStatus::Failed;
                result.fail(format!("{}: {}", step.message, error));
                step.error = Some(error);
                result.steps.push(step);
                break;
            }
        }
    }
}

fn required(step: &Step, key: &str) -> Result<PathBuf> {
    step.path(key)
        .with_context(|| format!("{} step is missing '{}'", step.kind, key))
}

fn step_kind(step: &Step) -> MappingKind {
    step.value("kind")
        .and_then(|k| k.parse().ok())
        .unwrap_or_default()
}

fn execute_step(step: &Step) -> Result<Option<Change>> {
    match step.kind {
        StepKind::Noop => Ok(None),
        StepKind::Mkdirp => {
            let path = required(step, "path")?;
            if path.is_dir() {
                return Ok(None);
            }
            fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create directory: {}", path.display()))?;
            Ok(Some(Change::new("mkdirp", None, Some(&path))))
        }
        StepKind::Touch => {
            let path = required(step, "path")?;
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to create file: {}", path.display()))?;
            Ok(Some(Change::new("touch", None, Some(&path))))
        }
        StepKind::Symlink => {
            let source = required(step, "source")?;
            let at = required(step, "target")?;
            let link = required(step, "link")?;
            create_symlink(&link, &at, step_kind(step))
                .with_context(|| format!("Failed to create symlink: {}", at.display()))?;
            // Staged links only become a change once swapped into place.
            if step.paths.contains_key("final") {
                Ok(None)
            } else {
                Ok(Some(Change::new("link", Some(&source), Some(&at))))
            }
        }
        StepKind::Unlink => {
            let path = required(step, "path")?;
            remove_symlink(&path)
                .with_context(|| format!("Failed to remove symlink: {}", path.display()))?;
            Ok(Some(Change::new("unlink", None, Some(&path))))
        }
        StepKind::Rm => {
            let path = required(step, "path")?;
            let meta = fs::symlink_metadata(&path)
                .with_context(|| format!("Failed to stat: {}", path.display()))?;
            let removed = if meta.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            removed.with_context(|| format!("Failed to remove: {}", path.display()))?;
            Ok(Some(Change::new("rm", None, Some(&path))))
        }
        StepKind::Move => {
            let from = required(step, "from")?;
            let to = required(step, "to")?;
            fs::rename(&from, &to).with_context(|| {
                format!("Failed to move {} -> {}", from.display(), to.display())
            })?;
            match step.path("source") {
                Some(source) => Ok(Some(Change::new("link", Some(&source), Some(&to)))),
                None => Ok(Some(Change::new("backup", Some(&from), Some(&to)))),
            }
        }
        StepKind::Copy => {
            let from = required(step, "from")?;
            let to = required(step, "to")?;
            if fs::symlink_metadata(&from)
                .with_context(|| format!("Failed to stat: {}", from.display()))?
                .is_dir()
            {
                crate::fs::copy_dir_all(&from, &to)?;
            } else {
                fs::copy(&from, &to).with_context(|| {
                    format!("Failed to copy {} -> {}", from.display(), to.display())
                })?;
            }
            Ok(Some(Change::new("copy", Some(&from), Some(&to))))
        }
        StepKind::WriteManifest | StepKind::Audit => {
            bail!("{} steps are recorded by the operation, not executed from a plan", step.kind)
        }
    }
}

#[cfg(unix)]
fn create_symlink(link: &Path, at: &Path, _kind: MappingKind) -> std::io::Result<()> {
    std::os::unix::fs::symlink(link, at)
}

#[cfg(windows)]
fn create_symlink(link: &Path, at: &Path, kind: MappingKind) -> std::io::Result<()> {
    match kind {
        MappingKind::Dir => std::os::windows::fs::symlink_dir(link, at),
        MappingKind::File => std::os::windows::fs::symlink_file(link, at),
    }
}

#[cfg(unix)]
fn remove_symlink(path: &Path) -> std::io::Result<()> {
    fs::remove_file(path)
}

#[cfg(windows)]
fn remove_symlink(path: &Path) -> std::io::Result<()> {
    // Directory symlinks on Windows are removed as directories.
    fs::remove_file(path).or_else(|_| fs::remove_dir(path))
}
