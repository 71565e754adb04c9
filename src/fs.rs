//! File system utilities.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Copy a directory tree, preserving symbolic links instead of following them.
pub fn copy_dir_all(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> Result<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    // Guard against infinite recursion if dst is inside src.
    let src_canon = fs::canonicalize(src)
        .with_context(|| format!("Failed to resolve copy source: {}", src.display()))?;
    let dst_canon = crate::engine::plan::canonicalize_lenient(dst);
    if dst_canon.starts_with(&src_canon) {
        anyhow::bail!(
            "Cannot copy directory into itself: {} is inside {}",
            dst_canon.display(),
            src_canon.display()
        );
    }

    fs::create_dir_all(dst)
        .with_context(|| format!("Failed to create directory: {}", dst.display()))?;

    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src)?;
        let dst_path = dst.join(relative);
        let ty = entry.file_type();

        if ty.is_dir() {
            fs::create_dir_all(&dst_path)
                .with_context(|| format!("Failed to create directory: {}", dst_path.display()))?;
        } else if ty.is_symlink() {
            let target = fs::read_link(entry.path())?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&target, &dst_path)?;
            #[cfg(windows)]
            {
                // fs::metadata() follows the link, telling us which flavour to create.
                let is_dir = fs::metadata(entry.path())
                    .map(|m| m.is_dir())
                    .unwrap_or(false);
                if is_dir {
                    std::os::windows::fs::symlink_dir(&target, &dst_path)?;
                } else {
                    std::os::windows::fs::symlink_file(&target, &dst_path)?;
                }
            }
        } else {
            fs::copy(entry.path(), &dst_path).with_context(|| {
                format!(
                    "Failed to copy {} -> {}",
                    entry.path().display(),
                    dst_path.display()
                )
            })?;
        }
    }
    Ok(())
}
