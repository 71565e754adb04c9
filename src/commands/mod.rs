//! CLI command implementations

pub mod ops;
pub mod report;
pub mod status;

use anyhow::Result;
use colored::Colorize;
use linkany::config::{Config, DEFAULT_MANIFEST_NAME};
use linkany::LinkOptions;
use std::path::{Path, PathBuf};

/// Everything a command needs once flags and config are resolved
#[derive(Debug)]
pub struct CommandContext {
    pub manifest_path: PathBuf,
    pub config: Option<(Config, PathBuf)>,
    pub audit_log_path: Option<PathBuf>,
    pub json: bool,
    pub verbose: bool,
}

impl CommandContext {
    /// Resolve the manifest location.
    ///
    /// Priority: `--manifest` flag > manifest named by the config file >
    /// `linkany.manifest.json` in the working directory.
    pub fn resolve(
        manifest: Option<PathBuf>,
        config: Option<PathBuf>,
        audit_log: Option<PathBuf>,
        json: bool,
        verbose: bool,
        cwd: &Path,
    ) -> Result<Self> {
        let config_path = match config {
            Some(p) => Some(p),
            None => Config::find_config(cwd).ok(),
        };
        let config = match config_path {
            Some(path) => Some((Config::load(&path)?, path)),
            None => None,
        };

        let manifest_path = manifest
            .or_else(|| config.as_ref().map(|(c, p)| c.manifest_path(p)))
            .unwrap_or_else(|| cwd.join(DEFAULT_MANIFEST_NAME));

        let audit_log_path =
            audit_log.or_else(|| config.as_ref().and_then(|(c, p)| c.audit_log_path(p)));

        if verbose && !json {
            if let Some((_, path)) = &config {
                println!("Using config: {}", path.display().to_string().dimmed());
            }
            println!(
                "Using manifest: {}\n",
                manifest_path.display().to_string().dimmed()
            );
        }

        Ok(Self {
            manifest_path,
            config,
            audit_log_path,
            json,
            verbose,
        })
    }

    pub fn options(&self, dry_run: bool, keep_link: bool) -> LinkOptions {
        LinkOptions {
            audit_log_path: self.audit_log_path.clone(),
            keep_link,
            dry_run,
        }
    }
}
