//! Name resolution for tool-specific mappings
//!
//! Turns a short name such as `rules` for the `claude` tool into a fully
//! resolved [`Mapping`]. The engine itself only ever sees the result.

use anyhow::{Result, bail};
use std::path::{Path, PathBuf};

use crate::config::{Config, ToolConfig};
use crate::engine::Mapping;

/// Resolves a name into a source/target mapping
pub trait MappingResolver {
    fn resolve(&self, name: &str) -> Result<Mapping>;
}

/// Resolver driven by one `[tools.<name>]` config section
#[derive(Debug, Clone)]
pub struct ToolResolver {
    tool_name: String,
    tool: ToolConfig,
    config_dir: PathBuf,
}

impl ToolResolver {
    pub fn new(tool_name: impl Into<String>, tool: ToolConfig, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool,
            config_dir: config_dir.into(),
        }
    }

    /// Build the resolver for `tool_name` from a loaded config.
    pub fn from_config(config: &Config, config_path: &Path, tool_name: &str) -> Result<Self> {
        let Some((name, tool)) = config.tool(tool_name) else {
            let known: Vec<&str> = config.tools.keys().map(String::as_str).collect();
            bail!(
                "Unknown tool '{}' (configured: {})",
                tool_name,
                if known.is_empty() {
                    "none".to_string()
                } else {
                    known.join(", ")
                }
            );
        };
        Ok(Self::new(name.clone(), tool.clone(), Config::config_dir(config_path)))
    }

    fn file_name(&self, name: &str) -> String {
        match &self.tool.suffix {
            Some(suffix) if !name.ends_with(suffix.as_str()) => format!("{}{}", name, suffix),
            _ => name.to_string(),
        }
    }

    fn dir(&self, dir: &str) -> PathBuf {
        let dir = Path::new(dir);
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.config_dir.join(dir)
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        bail!(
            "Invalid name '{}': must be non-empty and must not contain path separators",
            name
        );
    }
    Ok(())
}

impl MappingResolver for ToolResolver {
    fn resolve(&self, name: &str) -> Result<Mapping> {
        validate_name(name)?;
        let file_name = self.file_name(name);

        Ok(Mapping::new(
            self.dir(&self.tool.source_dir).join(&file_name),
            self.dir(&self.tool.target_dir).join(&file_name),
        )
        .with_id(format!("{}:{}", self.tool_name, file_name))
        .with_kind(self.tool.kind)
        .with_atomic(self.tool.atomic))
    }
}
