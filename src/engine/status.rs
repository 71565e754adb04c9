//! Read-only view of how the filesystem compares to the manifest.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::error::LinkError;
use super::manifest::{self, MappingKind, resolve_path};
use super::plan::{is_symlink, is_symlink_to, path_exists};

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Target links to the source and the source exists
    Linked,
    /// Nothing at the target
    Missing,
    /// Target links to the source, but the source is gone
    SourceMissing,
    /// Target is a symlink to somewhere else
    ForeignLink,
    /// Target is a real file or directory
    Occupied,
}

impl EntryState {
    pub fn is_problem(&self) -> bool {
        !matches!(self, EntryState::Linked)
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct EntryStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: PathBuf,
    pub target: PathBuf,
    pub kind: MappingKind,
    pub state: EntryState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points_to: Option<String>,
}

fn entry_state(source: &Path, target: &Path) -> EntryState {
    if is_symlink_to(target, source) {
        if path_exists(source) {
            EntryState::Linked
        } else {
            EntryState::SourceMissing
        }
    } else if is_symlink(target) {
        EntryState::ForeignLink
    } else if path_exists(target) {
        EntryState::Occupied
    } else {
        EntryState::Missing
    }
}

/// Report the state of every manifest entry without changing anything.
pub fn status(manifest_path: &Path) -> Result<Vec<EntryStatus>, LinkError> {
    let manifest_path = std::path::absolute(manifest_path)
        .map_err(|e| LinkError::InvalidManifestPath(format!("{}: {}", manifest_path.display(), e)))?;
    let manifest = manifest::load(&manifest_path);

    Ok(manifest
        .installs
        .iter()
        .map(|entry| {
            let source = resolve_path(&manifest_path, &entry.source);
            let target = resolve_path(&manifest_path, &entry.target);
            let state = entry_state(&source, &target);
            let points_to = fs::read_link(&target)
                .ok()
                .map(|link| link.display().to_string());
            EntryStatus {
                id: entry.id.clone(),
                source,
                target,
                state,
                kind: entry.kind,
                points_to,
            }
        })
        .collect())
}
