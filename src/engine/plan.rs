//! Plan builder
//!
//! Pure functions that turn the current filesystem state and a desired
//! mapping into an ordered list of primitive [`Step`]s. Planning may probe
//! the filesystem but never mutates it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::manifest::MappingKind;

/// Primitive filesystem intentions
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Noop,
    Mkdirp,
    Touch,
    Symlink,
    Unlink,
    Rm,
    Move,
    Copy,
    WriteManifest,
    Audit,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Noop => "noop",
            StepKind::Mkdirp => "mkdirp",
            StepKind::Touch => "touch",
            StepKind::Symlink => "symlink",
            StepKind::Unlink => "unlink",
            StepKind::Rm => "rm",
            StepKind::Move => "move",
            StepKind::Copy => "copy",
            StepKind::WriteManifest => "write_manifest",
            StepKind::Audit => "audit",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Planned,
    Executed,
    Skipped,
    Failed,
}

/// A single planned filesystem action
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    pub message: String,
    pub paths: BTreeMap<String, String>,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Step {
    pub fn new(kind: StepKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            paths: BTreeMap::new(),
            status: StepStatus::Planned,
            error: None,
        }
    }

    pub fn with_path(self, key: &str, path: &Path) -> Self {
        self.with_value(key, path.display().to_string())
    }

    pub fn with_value(mut self, key: &str, value: impl Into<String>) -> Self {
        self.paths.insert(key.to_string(), value.into());
        self
    }

    /// Mark a step as bypassed so the executor records it without running it.
    pub fn skipped(mut self) -> Self {
        self.status = StepStatus::Skipped;
        self
    }

    pub fn path(&self, key: &str) -> Option<PathBuf> {
        self.paths.get(key).map(PathBuf::from)
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.paths.get(key).map(String::as_str)
    }
}

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(0);

/// Operation-scoped suffix used to derive backup and staging paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpToken(String);

impl OpToken {
    pub fn new() -> Self {
        let counter = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        Self(format!(
            "{}-{}-{}",
            Utc::now().format("%Y%m%d%H%M%S%3f"),
            std::process::id(),
            counter
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OpToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether anything (including a dangling symlink) occupies `path`.
pub fn path_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

pub fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// Detect the kind of an existing path, following symlinks.
pub fn detect_kind(path: &Path) -> Option<MappingKind> {
    fs::metadata(path).ok().map(|m| {
        if m.is_dir() {
            MappingKind::Dir
        } else {
            MappingKind::File
        }
    })
}

/// Lexically remove `.` and resolve `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize `path`, tolerating missing trailing components.
///
/// The deepest existing ancestor is canonicalized and the rest is appended
/// lexically, so paths that will only exist after a plan runs still compare
/// equal to their eventual canonical form.
pub fn canonicalize_lenient(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    for ancestor in path.ancestors().skip(1) {
        if ancestor.as_os_str().is_empty() {
            continue;
        }
        if let Ok(base) = fs::canonicalize(ancestor) {
            let rest = path.strip_prefix(ancestor).unwrap_or(path);
            return normalize(&base.join(rest));
        }
    }
    normalize(path)
}

/// Where `path` lives, without following a symlink at `path` itself.
pub fn location(path: &Path) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => canonicalize_lenient(parent).join(name),
        _ => canonicalize_lenient(path),
    }
}

/// True only when `target` is a symlink whose reference resolves to `source`.
pub fn is_symlink_to(target: &Path, source: &Path) -> bool {
    if !is_symlink(target) {
        return false;
    }
    let Ok(link) = fs::read_link(target) else {
        return false;
    };
    let resolved = if link.is_absolute() {
        link
    } else {
        target.parent().unwrap_or_else(|| Path::new(".")).join(link)
    };
    canonicalize_lenient(&resolved) == canonicalize_lenient(source)
}

/// Link text for a symlink at `target` pointing to `source`, relative to the
/// target's directory.
pub fn link_text(source: &Path, target: &Path) -> PathBuf {
    let source_abs = canonicalize_lenient(source);
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    let parent_abs = canonicalize_lenient(parent);
    pathdiff::diff_paths(&source_abs, &parent_abs).unwrap_or(source_abs)
}

fn first_free(candidate: impl Fn(usize) -> PathBuf) -> PathBuf {
    let mut n = 0;
    loop {
        let path = candidate(n);
        if !path_exists(&path) {
            return path;
        }
        n += 1;
    }
}

/// Sibling path the original target is moved to during migration.
pub fn backup_path_for_target(target: &Path, token: &OpToken) -> PathBuf {
    first_free(|n| {
        let suffix = if n == 0 {
            format!(".bak.{}", token.as_str())
        } else {
            format!(".bak.{}.{}", token.as_str(), n)
        };
        let mut os = target.as_os_str().to_os_string();
        os.push(suffix);
        PathBuf::from(os)
    })
}

/// Hidden sibling path a symlink is staged at before being renamed into place.
pub fn tmp_path_for_target(target: &Path, token: &OpToken) -> PathBuf {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "target".to_string());
    first_free(|n| {
        let file = if n == 0 {
            format!(".{}.linkany-tmp.{}", name, token.as_str())
        } else {
            format!(".{}.linkany-tmp.{}.{}", name, token.as_str(), n)
        };
        parent.join(file)
    })
}

fn mkdirp(dir: &Path) -> Step {
    Step::new(
        StepKind::Mkdirp,
        format!("Ensure directory {}", dir.display()),
    )
    .with_path("path", dir)
}

/// Create an empty placeholder for a missing source.
pub fn plan_ensure_source(source: &Path, kind: MappingKind) -> Vec<Step> {
    if path_exists(source) {
        return Vec::new();
    }

    match kind {
        MappingKind::Dir => vec![mkdirp(source)],
        MappingKind::File => {
            let mut steps = Vec::new();
            if let Some(parent) = source.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                steps.push(mkdirp(parent));
            }
            steps.push(
                Step::new(
                    StepKind::Touch,
                    format!("Create empty source file {}", source.display()),
                )
                .with_path("path", source),
            );
            steps
        }
    }
}

/// Remove whatever occupies `target`: `unlink` for a symlink, `rm` otherwise.
pub fn plan_unlink(target: &Path) -> Vec<Step> {
    let Ok(meta) = fs::symlink_metadata(target) else {
        return Vec::new();
    };

    if meta.file_type().is_symlink() {
        vec![
            Step::new(
                StepKind::Unlink,
                format!("Remove symlink {}", target.display()),
            )
            .with_path("path", target),
        ]
    } else {
        let kind = if meta.is_dir() {
            MappingKind::Dir
        } else {
            MappingKind::File
        };
        vec![
            Step::new(StepKind::Rm, format!("Remove {} {}", kind, target.display()))
                .with_path("path", target)
                .with_value("kind", kind.as_str()),
        ]
    }
}

/// Duplicate `from` at `to`, recursively for directories.
pub fn plan_copy(from: &Path, to: &Path, kind: MappingKind) -> Vec<Step> {
    let mut steps = Vec::new();
    if let Some(parent) = to.parent()
        && !parent.as_os_str().is_empty()
    {
        steps.push(mkdirp(parent));
    }
    steps.push(
        Step::new(
            StepKind::Copy,
            format!("Copy {} {} -> {}", kind, from.display(), to.display()),
        )
        .with_path("from", from)
        .with_path("to", to)
        .with_value("kind", kind.as_str()),
    );
    steps
}

/// Move `target` aside to a backup path.
pub fn plan_backup(target: &Path, backup: &Path) -> Vec<Step> {
    vec![
        Step::new(
            StepKind::Move,
            format!("Back up {} -> {}", target.display(), backup.display()),
        )
        .with_path("from", target)
        .with_path("to", backup),
    ]
}

/// Steps creating the `source -> target` symlink.
///
/// In atomic mode the link is staged at a temp sibling and renamed over
/// `target`, so observers never see a half-created link.
pub fn link_steps(
    source: &Path,
    target: &Path,
    kind: MappingKind,
    atomic: bool,
    token: &OpToken,
) -> Vec<Step> {
    let link = link_text(source, target);
    let mut steps = Vec::new();

    if let Some(parent) = target.parent()
        && !parent.as_os_str().is_empty()
    {
        steps.push(mkdirp(parent));
    }

    let symlink = |at: &Path| {
        Step::new(
            StepKind::Symlink,
            format!("Link {} -> {}", at.display(), link.display()),
        )
        .with_path("source", source)
        .with_path("target", at)
        .with_path("link", &link)
        .with_value("kind", kind.as_str())
    };

    if atomic {
        let tmp = tmp_path_for_target(target, token);
        steps.push(symlink(&tmp).with_path("final", target));
        steps.push(
            Step::new(
                StepKind::Move,
                format!("Swap staged link into {}", target.display()),
            )
            .with_path("from", &tmp)
            .with_path("to", target)
            .with_path("source", source),
        );
    } else {
        steps.push(symlink(target));
    }

    steps
}
