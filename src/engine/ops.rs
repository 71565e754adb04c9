//! Engine operations
//!
//! `add`, `remove`, `install` and `uninstall` compose planning, execution
//! and manifest persistence. Every safety refusal and filesystem failure is
//! reported through the returned [`LinkResult`]; only invalid arguments
//! produce an `Err`.

use std::path::{Path, PathBuf};

use super::apply::{Change, LinkOptions, LinkResult, Operation, apply_plan};
use super::audit::try_append_audit_step;
use super::error::LinkError;
use super::manifest::{self, Manifest, ManifestEntry, MappingKind, resolve_path};
use super::plan::{
    OpToken, Step, StepKind, StepStatus, backup_path_for_target, canonicalize_lenient,
    detect_kind, is_symlink, is_symlink_to, link_steps, location, path_exists, plan_backup,
    plan_copy, plan_ensure_source, plan_unlink,
};

/// A desired `source -> target` symlink
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mapping {
    pub id: Option<String>,
    /// Source path (absolute, or relative to the manifest's directory)
    pub source: PathBuf,
    /// Target path (absolute, or relative to the manifest's directory)
    pub target: PathBuf,
    /// Detected from whichever side exists when unset
    pub kind: Option<MappingKind>,
    /// Defaults to `true`
    pub atomic: Option<bool>,
}

impl Mapping {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_kind(mut self, kind: MappingKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_atomic(mut self, atomic: bool) -> Self {
        self.atomic = Some(atomic);
        self
    }
}

fn absolute_manifest_path(manifest_path: &Path) -> Result<PathBuf, LinkError> {
    if manifest_path.as_os_str().is_empty() {
        return Err(LinkError::InvalidManifestPath("path is empty".into()));
    }
    std::path::absolute(manifest_path)
        .map_err(|e| LinkError::InvalidManifestPath(format!("{}: {}", manifest_path.display(), e)))
}

fn validate_mapping(mapping: &Mapping) -> Result<(), LinkError> {
    if mapping.source.as_os_str().is_empty() {
        return Err(LinkError::InvalidMapping("source is empty".into()));
    }
    if mapping.target.as_os_str().is_empty() {
        return Err(LinkError::InvalidMapping("target is empty".into()));
    }
    if let Some(id) = &mapping.id
        && id.trim().is_empty()
    {
        return Err(LinkError::InvalidMapping("id is empty".into()));
    }
    Ok(())
}

/// Stamp the finish time and emit the summary log line.
fn close(result: &mut LinkResult, manifest_path: &Path, opts: &LinkOptions) {
    result.finish();

    if result.ok {
        tracing::info!(
            operation = %result.operation,
            manifest = %manifest_path.display(),
            changes = result.changes.len(),
            dry_run = opts.dry_run,
            "Operation complete"
        );
    } else {
        tracing::warn!(
            operation = %result.operation,
            manifest = %manifest_path.display(),
            errors = ?result.errors,
            "Operation failed"
        );
    }
}

/// Close out a result that reached the executor and append its audit record.
fn finalize(mut result: LinkResult, manifest_path: &Path, opts: &LinkOptions) -> LinkResult {
    close(&mut result, manifest_path, opts);
    if !opts.dry_run {
        try_append_audit_step(&mut result, manifest_path, opts);
    }
    result
}

/// A safety refusal: nothing is planned, executed or written, the audit log
/// included.
fn refuse(
    operation: Operation,
    manifest_path: &Path,
    message: String,
    opts: &LinkOptions,
) -> LinkResult {
    let mut result = LinkResult::new(operation, manifest_path);
    result.fail(message);
    close(&mut result, manifest_path, opts);
    result
}

/// Persist the manifest and record the write as a step.
///
/// A failed write flips the result to failed even though filesystem steps
/// already ran, and says so in `warnings`.
fn persist(result: &mut LinkResult, manifest_path: &Path, manifest: &Manifest) {
    let mut step = Step::new(
        StepKind::WriteManifest,
        format!("Write manifest {}", manifest_path.display()),
    )
    .with_path("path", manifest_path);

    match manifest::save(manifest_path, manifest) {
        Ok(()) => step.status = StepStatus::Executed,
        Err(e) => {
            let error = format!("{:#}", e);
            tracing::error!(manifest = %manifest_path.display(), error = %error, "Failed to write manifest");
            step.status = StepStatus::Failed;
            result.fail(format!("manifest write failed: {}", error));
            if !result.changes.is_empty() {
                result.warn(
                    "filesystem changes were applied but are not recorded in the manifest; \
                     retry the operation to record them",
                );
            }
            step.error = Some(error);
        }
    }

    result.steps.push(step);
}

/// Steps that take a managed link down without touching user data.
///
/// Only symlinks are removed; anything else at `target` is left in place
/// with a warning.
fn plan_remove_link(target: &Path, warnings: &mut Vec<String>) -> Vec<Step> {
    if !path_exists(target) {
        return vec![
            Step::new(
                StepKind::Noop,
                format!("{} is already absent", target.display()),
            )
            .with_path("path", target)
            .skipped(),
        ];
    }

    if is_symlink(target) {
        return plan_unlink(target);
    }

    warnings.push(format!(
        "{} is not a symlink; left in place",
        target.display()
    ));
    vec![
        Step::new(
            StepKind::Noop,
            format!("{} is not a symlink, leaving it", target.display()),
        )
        .with_path("path", target)
        .skipped(),
    ]
}

/// Record a mapping in the manifest and link `target` to `source`.
///
/// Decision order:
/// 1. `target` already links to `source`: nothing to do on disk.
/// 2. both exist: refuse rather than pick a side.
/// 3. `target` is a symlink elsewhere: refuse to adopt it.
/// 4. only `target` exists: adopt it as the new source, keeping a backup.
/// 5. otherwise: ensure `source` exists and link.
pub fn add(
    manifest_path: &Path,
    mapping: &Mapping,
    opts: &LinkOptions,
) -> Result<LinkResult, LinkError> {
    let manifest_path = absolute_manifest_path(manifest_path)?;
    validate_mapping(mapping)?;

    let source = resolve_path(&manifest_path, &mapping.source);
    let target = resolve_path(&manifest_path, &mapping.target);

    if location(&target).starts_with(canonicalize_lenient(&source)) {
        return Err(LinkError::InvalidMapping(format!(
            "target {} is inside source {}",
            target.display(),
            source.display()
        )));
    }

    let mut manifest = manifest::load(&manifest_path);
    let kind = mapping
        .kind
        .or_else(|| detect_kind(&source))
        .or_else(|| detect_kind(&target))
        .unwrap_or_default();
    let atomic = mapping.atomic.unwrap_or(true);
    let token = OpToken::new();

    let source_exists = path_exists(&source);
    let target_exists = path_exists(&target);

    let steps = if is_symlink_to(&target, &source) {
        vec![
            Step::new(
                StepKind::Noop,
                format!("{} already links to {}", target.display(), source.display()),
            )
            .with_path("source", &source)
            .with_path("target", &target)
            .skipped(),
        ]
    } else if source_exists && target_exists {
        return Ok(refuse(
            Operation::Add,
            &manifest_path,
            format!(
                "source and target both exist: {} and {}; move one aside before adding",
                source.display(),
                target.display()
            ),
            opts,
        ));
    } else if is_symlink(&target) {
        return Ok(refuse(
            Operation::Add,
            &manifest_path,
            format!(
                "target {} is a symlink to another location; refusing to migrate it",
                target.display()
            ),
            opts,
        ));
    } else if target_exists {
        tracing::info!(target = %target.display(), source = %source.display(), "Adopting existing target as source");
        let backup = backup_path_for_target(&target, &token);
        let mut steps = plan_copy(&target, &source, kind);
        steps.extend(plan_backup(&target, &backup));
        steps.extend(link_steps(&source, &target, kind, atomic, &token));
        steps
    } else {
        let mut steps = plan_ensure_source(&source, kind);
        steps.extend(plan_unlink(&target));
        steps.extend(link_steps(&source, &target, kind, atomic, &token));
        steps
    };

    let mut result = apply_plan(Operation::Add, &manifest_path, steps, opts);

    if result.ok && !opts.dry_run {
        manifest::upsert(
            &mut manifest,
            &manifest_path,
            ManifestEntry {
                id: mapping.id.clone(),
                source: mapping.source.clone(),
                target: mapping.target.clone(),
                kind,
                atomic,
            },
        );
        persist(&mut result, &manifest_path, &manifest);
        if result.ok {
            result.changes.push(Change::new(
                "manifest_upsert",
                Some(&mapping.source),
                Some(&mapping.target),
            ));
        }
    }

    Ok(finalize(result, &manifest_path, opts))
}

/// Stop managing a mapping: unlink its target and drop the manifest entry.
///
/// The source is never inspected or removed.
pub fn remove(
    manifest_path: &Path,
    key: &str,
    opts: &LinkOptions,
) -> Result<LinkResult, LinkError> {
    let manifest_path = absolute_manifest_path(manifest_path)?;
    if key.trim().is_empty() {
        return Err(LinkError::InvalidKey("key is empty".into()));
    }

    let mut manifest = manifest::load(&manifest_path);
    let Some(entry) = manifest::find_at(&manifest, &manifest_path, key).cloned() else {
        return Ok(refuse(
            Operation::Remove,
            &manifest_path,
            format!("no manifest entry matches '{}'", key),
            opts,
        ));
    };

    let target = resolve_path(&manifest_path, &entry.target);

    let mut warnings = Vec::new();
    let steps = if opts.keep_link {
        vec![
            Step::new(
                StepKind::Noop,
                format!("Keep link at {}", target.display()),
            )
            .with_path("path", &target)
            .skipped(),
        ]
    } else {
        plan_remove_link(&target, &mut warnings)
    };

    let mut result = apply_plan(Operation::Remove, &manifest_path, steps, opts);
    result.warnings.extend(warnings);

    if result.ok && !opts.dry_run {
        manifest::remove(&mut manifest, &manifest_path, key);
        persist(&mut result, &manifest_path, &manifest);
        if result.ok {
            result.changes.push(Change::new(
                "manifest_remove",
                Some(&entry.source),
                Some(&entry.target),
            ));
        }
    }

    Ok(finalize(result, &manifest_path, opts))
}

/// Make the filesystem match the manifest without adopting anything.
///
/// Every entry is checked before anything runs: a target occupied by
/// anything other than the expected link aborts the whole run.
pub fn install(manifest_path: &Path, opts: &LinkOptions) -> Result<LinkResult, LinkError> {
    let manifest_path = absolute_manifest_path(manifest_path)?;
    let manifest = manifest::load(&manifest_path);
    let token = OpToken::new();

    let mut steps = Vec::new();
    for entry in &manifest.installs {
        let source = resolve_path(&manifest_path, &entry.source);
        let target = resolve_path(&manifest_path, &entry.target);

        if is_symlink_to(&target, &source) {
            steps.push(
                Step::new(
                    StepKind::Noop,
                    format!("{} already links to {}", target.display(), source.display()),
                )
                .with_path("source", &source)
                .with_path("target", &target)
                .skipped(),
            );
            continue;
        }

        if path_exists(&target) {
            let reason = if is_symlink(&target) {
                "is a symlink to another location"
            } else {
                "is occupied by an unmanaged file or directory"
            };
            return Ok(refuse(
                Operation::Install,
                &manifest_path,
                format!(
                    "install aborted at entry '{}': target {} {}",
                    entry.identity(),
                    target.display(),
                    reason
                ),
                opts,
            ));
        }

        steps.extend(plan_ensure_source(&source, entry.kind));
        steps.extend(link_steps(&source, &target, entry.kind, entry.atomic, &token));
    }

    let result = apply_plan(Operation::Install, &manifest_path, steps, opts);
    Ok(finalize(result, &manifest_path, opts))
}

/// Remove every managed link while keeping the manifest intact.
pub fn uninstall(manifest_path: &Path, opts: &LinkOptions) -> Result<LinkResult, LinkError> {
    let manifest_path = absolute_manifest_path(manifest_path)?;
    let manifest = manifest::load(&manifest_path);

    let mut warnings = Vec::new();
    let steps: Vec<Step> = manifest
        .installs
        .iter()
        .flat_map(|entry| {
            plan_remove_link(&resolve_path(&manifest_path, &entry.target), &mut warnings)
        })
        .collect();

    let mut result = apply_plan(Operation::Uninstall, &manifest_path, steps, opts);
    result.warnings.extend(warnings);
    Ok(finalize(result, &manifest_path, opts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn quiet() -> LinkOptions {
        LinkOptions::default()
    }

    #[test]
    fn test_add_rejects_empty_paths() {
        let temp_dir = TempDir::new().unwrap();
        let manifest_path = temp_dir.path().join("m.json");

        let err = add(&manifest_path, &Mapping::new("", "t"), &quiet()).unwrap_err();
        assert!(matches!(err, LinkError::InvalidMapping(_)));
        let err = add(&manifest_path, &Mapping::new("s", ""), &quiet()).unwrap_err();
        assert!(matches!(err, LinkError::InvalidMapping(_)));
    }

    #[test]
    fn test_add_rejects_target_inside_source() {
        let temp_dir = TempDir::new().unwrap();
        let manifest_path = temp_dir.path().join("m.json");
        let mapping = Mapping::new("repo", "repo/inner").with_kind(MappingKind::Dir);

        let err = add(&manifest_path, &mapping, &quiet()).unwrap_err();
        assert!(matches!(err, LinkError::InvalidMapping(_)));
    }

    #[test]
    fn test_add_rejects_blank_id() {
        let temp_dir = TempDir::new().unwrap();
        let manifest_path = temp_dir.path().join("m.json");
        let mapping = Mapping::new("s", "t").with_id("  ");

        assert!(add(&manifest_path, &mapping, &quiet()).is_err());
    }

    #[test]
    fn test_remove_rejects_empty_key() {
        let temp_dir = TempDir::new().unwrap();
        let manifest_path = temp_dir.path().join("m.json");

        let err = remove(&manifest_path, " ", &quiet()).unwrap_err();
        assert!(matches!(err, LinkError::InvalidKey(_)));
    }

    #[test]
    fn test_empty_manifest_path_is_rejected() {
        assert!(matches!(
            install(Path::new(""), &quiet()),
            Err(LinkError::InvalidManifestPath(_))
        ));
    }

    #[test]
    #[cfg(unix)]
    fn test_add_relative_paths_resolve_against_manifest_dir() {
        let temp_dir = TempDir::new().unwrap();
        let manifest_path = temp_dir.path().join("m.json");
        fs::write(temp_dir.path().join("source.md"), "# Source").unwrap();

        let result = add(&manifest_path, &Mapping::new("source.md", "out/target.md"), &quiet())
            .unwrap();

        assert!(result.ok, "{:?}", result.errors);
        let target = temp_dir.path().join("out").join("target.md");
        assert!(target.is_symlink());
        assert_eq!(fs::read_link(&target).unwrap(), Path::new("../source.md"));

        let manifest = manifest::load(&manifest_path);
        assert_eq!(manifest.installs[0].source, PathBuf::from("source.md"));
        assert_eq!(manifest.installs[0].target, PathBuf::from("out/target.md"));
    }

    #[test]
    #[cfg(unix)]
    fn test_add_detects_directory_kind() {
        let temp_dir = TempDir::new().unwrap();
        let manifest_path = temp_dir.path().join("m.json");
        fs::create_dir_all(temp_dir.path().join("skills")).unwrap();

        let result = add(&manifest_path, &Mapping::new("skills", "project/skills"), &quiet())
            .unwrap();

        assert!(result.ok, "{:?}", result.errors);
        assert_eq!(manifest::load(&manifest_path).installs[0].kind, MappingKind::Dir);
    }

    #[test]
    #[cfg(unix)]
    fn test_add_dry_run_changes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let manifest_path = temp_dir.path().join("m.json");
        let opts = LinkOptions {
            dry_run: true,
            ..Default::default()
        };

        let result = add(&manifest_path, &Mapping::new("s.md", "t.md"), &opts).unwrap();

        assert!(result.ok);
        assert!(!result.steps.is_empty());
        assert!(result.steps.iter().all(|s| s.status == StepStatus::Planned));
        assert!(!temp_dir.path().join("s.md").exists());
        assert!(!manifest_path.exists());
        assert!(!crate::engine::audit::default_audit_log_path(&manifest_path).exists());
    }

    #[test]
    #[cfg(unix)]
    fn test_add_non_atomic_links_directly() {
        let temp_dir = TempDir::new().unwrap();
        let manifest_path = temp_dir.path().join("m.json");
        fs::write(temp_dir.path().join("s.md"), "s").unwrap();

        let mapping = Mapping::new("s.md", "t.md").with_atomic(false);
        let result = add(&manifest_path, &mapping, &quiet()).unwrap();

        assert!(result.ok);
        assert!(!result.steps.iter().any(|s| s.kind == StepKind::Move));
        assert!(!manifest::load(&manifest_path).installs[0].atomic);
    }

    #[test]
    #[cfg(unix)]
    fn test_manifest_write_failure_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        // The manifest path is a directory, so the final rename fails.
        let manifest_path = temp_dir.path().join("m.json");
        fs::create_dir_all(manifest_path.join("occupied")).unwrap();
        fs::write(temp_dir.path().join("s.md"), "s").unwrap();

        let result = add(&manifest_path, &Mapping::new("s.md", "t.md"), &quiet()).unwrap();

        assert!(!result.ok);
        assert!(temp_dir.path().join("t.md").is_symlink(), "filesystem steps ran");
        let write = result
            .steps
            .iter()
            .find(|s| s.kind == StepKind::WriteManifest)
            .unwrap();
        assert_eq!(write.status, StepStatus::Failed);
        assert!(result.errors[0].contains("manifest write failed"));
        assert!(!result.warnings.is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn test_remove_by_id_and_keep_link() {
        let temp_dir = TempDir::new().unwrap();
        let manifest_path = temp_dir.path().join("m.json");
        fs::write(temp_dir.path().join("s.md"), "s").unwrap();
        let mapping = Mapping::new("s.md", "t.md").with_id("rules");
        assert!(add(&manifest_path, &mapping, &quiet()).unwrap().ok);

        let opts = LinkOptions {
            keep_link: true,
            ..Default::default()
        };
        let result = remove(&manifest_path, "rules", &opts).unwrap();

        assert!(result.ok);
        assert_eq!(result.steps[0].status, StepStatus::Skipped);
        assert!(temp_dir.path().join("t.md").is_symlink());
        assert!(manifest::load(&manifest_path).installs.is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn test_remove_by_absolute_target_matches_relative_entry() {
        let temp_dir = TempDir::new().unwrap();
        let manifest_path = temp_dir.path().join("m.json");
        fs::write(temp_dir.path().join("s.md"), "s").unwrap();
        assert!(add(&manifest_path, &Mapping::new("s.md", "t.md"), &quiet()).unwrap().ok);

        let absolute = temp_dir.path().join("t.md");
        let result = remove(&manifest_path, &absolute.display().to_string(), &quiet()).unwrap();

        assert!(result.ok, "{:?}", result.errors);
        assert!(!absolute.exists());
        assert!(!absolute.is_symlink());
    }

    #[test]
    fn test_remove_leaves_plain_file_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let manifest_path = temp_dir.path().join("m.json");
        let mut m = Manifest::default();
        manifest::upsert(
            &mut m,
            &manifest_path,
            ManifestEntry {
                id: None,
                source: PathBuf::from("s.md"),
                target: PathBuf::from("t.md"),
                kind: MappingKind::File,
                atomic: true,
            },
        );
        manifest::save(&manifest_path, &m).unwrap();
        fs::write(temp_dir.path().join("t.md"), "user data").unwrap();

        let result = remove(&manifest_path, "t.md", &quiet()).unwrap();

        assert!(result.ok);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("t.md")).unwrap(),
            "user data"
        );
        assert!(manifest::load(&manifest_path).installs.is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn test_install_creates_missing_source_placeholder() {
        let temp_dir = TempDir::new().unwrap();
        let manifest_path = temp_dir.path().join("m.json");
        let mut m = Manifest::default();
        manifest::upsert(
            &mut m,
            &manifest_path,
            ManifestEntry {
                id: None,
                source: PathBuf::from("repo/skills"),
                target: PathBuf::from("project/skills"),
                kind: MappingKind::Dir,
                atomic: true,
            },
        );
        manifest::save(&manifest_path, &m).unwrap();

        let result = install(&manifest_path, &quiet()).unwrap();

        assert!(result.ok, "{:?}", result.errors);
        assert!(temp_dir.path().join("repo/skills").is_dir());
        assert!(temp_dir.path().join("project/skills").is_symlink());
        assert_eq!(manifest::load(&manifest_path), m, "install never edits the manifest");
    }

    #[test]
    fn test_install_and_uninstall_empty_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let manifest_path = temp_dir.path().join("m.json");

        let result = install(&manifest_path, &quiet()).unwrap();
        assert!(result.ok);
        let result = uninstall(&manifest_path, &quiet()).unwrap();
        assert!(result.ok);
        assert!(!manifest_path.exists());
    }
}
