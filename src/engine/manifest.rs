//! Manifest store
//!
//! The manifest is the durable JSON record of every mapping the engine
//! manages. It is read fully, mutated in memory and written back fully for
//! each operation.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::plan::location;

/// Current manifest schema version
pub const MANIFEST_VERSION: u32 = 1;

/// Whether a mapping links a single file or a whole directory
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MappingKind {
    #[default]
    File,
    #[serde(alias = "directory")]
    Dir,
}

impl MappingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingKind::File => "file",
            MappingKind::Dir => "dir",
        }
    }
}

impl std::fmt::Display for MappingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MappingKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(MappingKind::File),
            "dir" | "directory" => Ok(MappingKind::Dir),
            other => Err(format!("unknown mapping kind: {}", other)),
        }
    }
}

fn default_true() -> bool {
    true
}

/// One managed source -> target mapping
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: PathBuf,
    pub target: PathBuf,
    #[serde(default)]
    pub kind: MappingKind,
    #[serde(default = "default_true")]
    pub atomic: bool,
}

impl ManifestEntry {
    /// The key this entry is known by: its id, or its target when no id is set.
    pub fn identity(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => self.target.to_string_lossy().into_owned(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Manifest {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub installs: Vec<ManifestEntry>,
}

fn default_version() -> u32 {
    MANIFEST_VERSION
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            installs: Vec::new(),
        }
    }
}

/// Load a manifest from disk.
///
/// A missing or unparseable file yields an empty manifest: corruption is
/// treated as "no prior state".
pub fn load(path: &Path) -> Manifest {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Manifest::default(),
        Err(e) => {
            tracing::warn!(manifest = %path.display(), error = %e, "Failed to read manifest, starting empty");
            return Manifest::default();
        }
    };

    match serde_json::from_str::<Manifest>(&content) {
        Ok(manifest) => manifest,
        Err(e) => {
            tracing::warn!(manifest = %path.display(), error = %e, "Manifest is not valid JSON, starting empty");
            Manifest::default()
        }
    }
}

/// Write the full manifest atomically (temp file in the same directory, then rename).
pub fn save(path: &Path, manifest: &Manifest) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .with_context(|| format!("Failed to create manifest directory: {}", parent.display()))?;

    let mut body = serde_json::to_string_pretty(manifest)?;
    body.push('\n');

    let mut tmp = NamedTempFile::new_in(&parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    tmp.write_all(body.as_bytes())
        .with_context(|| format!("Failed to write manifest: {}", path.display()))?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace manifest: {}", path.display()))?;
    Ok(())
}

/// Find the index of the entry known by `key`.
///
/// Lookup runs in three tiers so that manifests written with only one of
/// `id`/`target` populated keep resolving: exact `id`, then exact `target`,
/// then the `(id || target)` composite.
pub fn position(manifest: &Manifest, key: &str) -> Option<usize> {
    let installs = &manifest.installs;
    installs
        .iter()
        .position(|e| e.id.as_deref() == Some(key))
        .or_else(|| installs.iter().position(|e| e.target == Path::new(key)))
        .or_else(|| installs.iter().position(|e| e.identity() == key))
}

pub fn find<'a>(manifest: &'a Manifest, key: &str) -> Option<&'a ManifestEntry> {
    position(manifest, key).map(|idx| &manifest.installs[idx])
}

/// Like [`position`], but a key that names a target path also matches an
/// entry whose stored target resolves to the same location.
pub fn position_at(manifest: &Manifest, manifest_path: &Path, key: &str) -> Option<usize> {
    position(manifest, key).or_else(|| {
        let wanted = target_location(manifest_path, Path::new(key));
        manifest
            .installs
            .iter()
            .position(|e| target_location(manifest_path, &e.target) == wanted)
    })
}

pub fn find_at<'a>(
    manifest: &'a Manifest,
    manifest_path: &Path,
    key: &str,
) -> Option<&'a ManifestEntry> {
    position_at(manifest, manifest_path, key).map(|idx| &manifest.installs[idx])
}

fn target_location(manifest_path: &Path, target: &Path) -> PathBuf {
    location(&resolve_path(manifest_path, target))
}

/// Insert `entry`, replacing any entry with the same id or a target at the
/// same location, however it is spelled.
///
/// The replacement keeps the position of the first entry it displaces.
pub fn upsert(manifest: &mut Manifest, manifest_path: &Path, entry: ManifestEntry) {
    let wanted = target_location(manifest_path, &entry.target);
    let same_identity = |e: &ManifestEntry| {
        target_location(manifest_path, &e.target) == wanted
            || (entry.id.is_some() && e.id == entry.id)
    };

    let slot = manifest.installs.iter().position(same_identity);
    manifest.installs.retain(|e| !same_identity(e));

    match slot {
        Some(idx) => manifest.installs.insert(idx.min(manifest.installs.len()), entry),
        None => manifest.installs.push(entry),
    }
}

/// Remove the entry known by `key`, returning it.
pub fn remove(manifest: &mut Manifest, manifest_path: &Path, key: &str) -> Option<ManifestEntry> {
    position_at(manifest, manifest_path, key).map(|idx| manifest.installs.remove(idx))
}

/// The directory manifest-relative paths are resolved against.
pub fn base_dir(manifest_path: &Path) -> PathBuf {
    match manifest_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Resolve a stored path relative to the manifest's directory unless absolute.
pub fn resolve_path(manifest_path: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir(manifest_path).join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MANIFEST: &str = "/repo/m.json";

    fn entry(id: Option<&str>, source: &str, target: &str) -> ManifestEntry {
        ManifestEntry {
            id: id.map(String::from),
            source: PathBuf::from(source),
            target: PathBuf::from(target),
            kind: MappingKind::File,
            atomic: true,
        }
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let temp_dir = TempDir::new().unwrap();
        let manifest = load(&temp_dir.path().join("missing.json"));
        assert_eq!(manifest, Manifest::default());
        assert_eq!(manifest.version, 1);
    }

    #[test]
    fn test_load_corrupt_file_returns_default() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("manifest.json");
        fs::write(&path, "{ not json").unwrap();

        assert_eq!(load(&path), Manifest::default());
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("manifest.json");

        let mut manifest = Manifest::default();
        upsert(&mut manifest, &path, entry(Some("claude"), "repo/CLAUDE.md", "CLAUDE.md"));
        save(&path, &manifest).unwrap();

        assert_eq!(load(&path), manifest);
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path() != path)
            .collect();
        assert!(leftovers.is_empty(), "temp file should be renamed away");
    }

    #[test]
    fn test_entry_defaults_when_fields_missing() {
        let json = r#"{"version":1,"installs":[{"source":"a","target":"b"}]}"#;
        let manifest: Manifest = serde_json::from_str(json).unwrap();
        let e = &manifest.installs[0];
        assert_eq!(e.kind, MappingKind::File);
        assert!(e.atomic);
        assert!(e.id.is_none());
    }

    #[test]
    fn test_kind_accepts_directory_alias() {
        let json = r#"{"source":"a","target":"b","kind":"directory"}"#;
        let e: ManifestEntry = serde_json::from_str(json).unwrap();
        assert_eq!(e.kind, MappingKind::Dir);
        assert!(serde_json::to_string(&e).unwrap().contains(r#""kind":"dir""#));
    }

    #[test]
    fn test_find_prefers_id_over_target() {
        let mut manifest = Manifest::default();
        manifest.installs.push(entry(None, "s1", "shared"));
        manifest.installs.push(entry(Some("shared"), "s2", "other"));

        let found = find(&manifest, "shared").unwrap();
        assert_eq!(found.source, PathBuf::from("s2"));
    }

    #[test]
    fn test_find_by_target() {
        let mut manifest = Manifest::default();
        manifest.installs.push(entry(Some("x"), "s", "/t"));

        assert!(find(&manifest, "/t").is_some());
        assert!(find(&manifest, "/missing").is_none());
    }

    #[test]
    fn test_upsert_replaces_same_target() {
        let mut manifest = Manifest::default();
        upsert(&mut manifest, Path::new(MANIFEST), entry(None, "a", "t1"));
        upsert(&mut manifest, Path::new(MANIFEST), entry(None, "b", "t2"));
        upsert(&mut manifest, Path::new(MANIFEST), entry(Some("new"), "c", "t1"));

        assert_eq!(manifest.installs.len(), 2);
        assert_eq!(manifest.installs[0].source, PathBuf::from("c"));
        assert_eq!(manifest.installs[0].id.as_deref(), Some("new"));
    }

    #[test]
    fn test_upsert_replaces_same_id_with_new_target() {
        let mut manifest = Manifest::default();
        upsert(&mut manifest, Path::new(MANIFEST), entry(Some("id"), "a", "t1"));
        upsert(&mut manifest, Path::new(MANIFEST), entry(Some("id"), "a", "t2"));

        assert_eq!(manifest.installs.len(), 1);
        assert_eq!(manifest.installs[0].target, PathBuf::from("t2"));
    }

    #[test]
    fn test_upsert_allows_fan_out() {
        let mut manifest = Manifest::default();
        upsert(&mut manifest, Path::new(MANIFEST), entry(None, "src", "t1"));
        upsert(&mut manifest, Path::new(MANIFEST), entry(None, "src", "t2"));

        assert_eq!(manifest.installs.len(), 2);
    }

    #[test]
    fn test_remove_by_key() {
        let mut manifest = Manifest::default();
        upsert(&mut manifest, Path::new(MANIFEST), entry(Some("a"), "s", "t"));

        let removed = remove(&mut manifest, Path::new(MANIFEST), "a").unwrap();
        assert_eq!(removed.target, PathBuf::from("t"));
        assert!(manifest.installs.is_empty());
        assert!(remove(&mut manifest, Path::new(MANIFEST), "a").is_none());
    }

    #[test]
    fn test_upsert_treats_relative_and_absolute_target_as_one() {
        let temp_dir = TempDir::new().unwrap();
        let manifest_path = temp_dir.path().join("m.json");
        let absolute = temp_dir.path().join("t.md").display().to_string();

        let mut manifest = Manifest::default();
        upsert(&mut manifest, &manifest_path, entry(None, "s.md", "t.md"));
        upsert(&mut manifest, &manifest_path, entry(None, "s.md", &absolute));

        assert_eq!(manifest.installs.len(), 1);
        assert_eq!(manifest.installs[0].target, PathBuf::from(&absolute));
    }

    #[test]
    fn test_remove_by_differently_spelled_target() {
        let temp_dir = TempDir::new().unwrap();
        let manifest_path = temp_dir.path().join("m.json");

        let mut manifest = Manifest::default();
        upsert(&mut manifest, &manifest_path, entry(Some("a"), "s.md", "sub/../t.md"));

        let absolute = temp_dir.path().join("t.md").display().to_string();
        assert!(remove(&mut manifest, &manifest_path, &absolute).is_some());
        assert!(manifest.installs.is_empty());
    }

    #[test]
    fn test_resolve_path_relative_to_manifest_dir() {
        let manifest_path = Path::new("/repo/.linkany/manifest.json");
        assert_eq!(
            resolve_path(manifest_path, Path::new("CLAUDE.md")),
            PathBuf::from("/repo/.linkany/CLAUDE.md")
        );
        assert_eq!(
            resolve_path(manifest_path, Path::new("/abs/path")),
            PathBuf::from("/abs/path")
        );
    }
}
