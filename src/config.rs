//! Configuration parsing for linkany
//!
//! Handles the TOML configuration file that locates the manifest and
//! describes, per tool, where its files live in the managed repository and
//! where they are linked to.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::MappingKind;

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "linkany.toml";

/// Directory the configuration may live in, below the repository root
pub const DEFAULT_CONFIG_DIR: &str = ".linkany";

/// Default manifest file name
pub const DEFAULT_MANIFEST_NAME: &str = "linkany.manifest.json";

/// Root configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Manifest path (relative to the config file)
    #[serde(default = "default_manifest")]
    pub manifest: String,

    /// Audit log path (relative to the config file); defaults next to the manifest
    #[serde(default)]
    pub audit_log: Option<String>,

    /// Per-tool link conventions
    #[serde(default)]
    pub tools: BTreeMap<String, ToolConfig>,
}

fn default_manifest() -> String {
    DEFAULT_MANIFEST_NAME.to_string()
}

fn default_true() -> bool {
    true
}

/// Where one tool's files come from and where they are linked to
#[derive(Debug, Deserialize, Clone)]
pub struct ToolConfig {
    /// Directory holding the tool's sources (relative to the config file)
    pub source_dir: String,

    /// Directory links are created in (relative to the config file unless absolute)
    pub target_dir: String,

    /// Whether entries are single files or whole directories
    #[serde(default)]
    pub kind: MappingKind,

    /// Suffix appended to names that lack it (e.g. ".md")
    #[serde(default)]
    pub suffix: Option<String>,

    /// Create links via temp path + rename
    #[serde(default = "default_true")]
    pub atomic: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manifest: default_manifest(),
            audit_log: None,
            tools: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Find configuration file by searching up from the start directory
    pub fn find_config(start_dir: &Path) -> Result<PathBuf> {
        let mut current = start_dir.to_path_buf();

        loop {
            // Check for .linkany/linkany.toml
            let config_path = current.join(DEFAULT_CONFIG_DIR).join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Ok(config_path);
            }

            // Check for linkany.toml in root
            let root_config = current.join(CONFIG_FILE_NAME);
            if root_config.exists() {
                return Ok(root_config);
            }

            // Move up to parent directory
            if !current.pop() {
                anyhow::bail!(
                    "Could not find {} in {} or any parent directory",
                    CONFIG_FILE_NAME,
                    start_dir.display()
                );
            }
        }
    }

    /// Directory config-relative paths are resolved against
    pub fn config_dir(config_path: &Path) -> PathBuf {
        match config_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Get the manifest path
    pub fn manifest_path(&self, config_path: &Path) -> PathBuf {
        Self::config_dir(config_path).join(&self.manifest)
    }

    /// Get the audit log path, if one is configured
    pub fn audit_log_path(&self, config_path: &Path) -> Option<PathBuf> {
        self.audit_log
            .as_ref()
            .map(|p| Self::config_dir(config_path).join(p))
    }

    /// Look up a tool by name (case-insensitive)
    pub fn tool(&self, name: &str) -> Option<(&String, &ToolConfig)> {
        self.tools
            .iter()
            .find(|(tool, _)| tool.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.manifest, DEFAULT_MANIFEST_NAME);
        assert!(config.audit_log.is_none());
        assert!(config.tools.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            manifest = "state/manifest.json"
            audit_log = "state/audit.jsonl"

            [tools.claude]
            source_dir = "claude"
            target_dir = "/home/me/.claude"
            suffix = ".md"

            [tools.cursor]
            source_dir = "cursor/rules"
            target_dir = "project/.cursor/rules"
            kind = "dir"
            atomic = false
        "#;

        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.manifest, "state/manifest.json");
        assert_eq!(config.tools["claude"].kind, MappingKind::File);
        assert!(config.tools["claude"].atomic);
        assert_eq!(config.tools["claude"].suffix.as_deref(), Some(".md"));
        assert_eq!(config.tools["cursor"].kind, MappingKind::Dir);
        assert!(!config.tools["cursor"].atomic);
    }

    #[test]
    fn test_manifest_and_audit_paths_are_config_relative() {
        let config: Config = toml::from_str(
            r#"
            manifest = "m.json"
            audit_log = "logs/audit.jsonl"
        "#,
        )
        .unwrap();
        let config_path = Path::new("/repo/.linkany/linkany.toml");

        assert_eq!(
            config.manifest_path(config_path),
            PathBuf::from("/repo/.linkany/m.json")
        );
        assert_eq!(
            config.audit_log_path(config_path),
            Some(PathBuf::from("/repo/.linkany/logs/audit.jsonl"))
        );
    }

    #[test]
    fn test_tool_lookup_is_case_insensitive() {
        let config: Config = toml::from_str(
            r#"
            [tools.Claude]
            source_dir = "claude"
            target_dir = "out"
        "#,
        )
        .unwrap();

        assert!(config.tool("claude").is_some());
        assert!(config.tool("CLAUDE").is_some());
        assert!(config.tool("cursor").is_none());
    }

    #[test]
    fn test_find_config_searches_parents() {
        let temp_dir = TempDir::new().unwrap();
        let config_dir = temp_dir.path().join(DEFAULT_CONFIG_DIR);
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join(CONFIG_FILE_NAME), "").unwrap();
        let nested = temp_dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let found = Config::find_config(&nested).unwrap();
        assert_eq!(found, config_dir.join(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_find_config_prefers_root_file_when_no_dir_config() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "").unwrap();

        let found = Config::find_config(temp_dir.path()).unwrap();
        assert_eq!(found, temp_dir.path().join(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "manifest = [").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
