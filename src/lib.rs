//! linkany - manifest-driven symlink synchronization
//!
//! Links files and directories from a managed repository into projects.
//! The manifest records every mapping, and the engine converges the
//! filesystem to it with four operations: `add`, `remove`, `install` and
//! `uninstall`.

pub mod config;
pub mod engine;
pub mod fs;
pub mod resolver;

pub use config::Config;
pub use engine::{
    LinkError, LinkOptions, LinkResult, Mapping, MappingKind, add, install, remove, status,
    uninstall,
};
pub use resolver::{MappingResolver, ToolResolver};
