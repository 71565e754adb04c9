//! Symlink manifest engine
//!
//! Records intended `source -> target` symlinks in a JSON manifest and
//! converges the filesystem to match it, without ever destroying a source or
//! silently overwriting user data.

pub mod apply;
pub mod audit;
pub mod error;
pub mod manifest;
pub mod ops;
pub mod plan;
pub mod status;

pub use apply::{Change, LinkOptions, LinkResult, Operation, apply_plan};
pub use audit::try_append_audit_step;
pub use error::LinkError;
pub use manifest::{Manifest, ManifestEntry, MappingKind};
pub use ops::{Mapping, add, install, remove, uninstall};
pub use plan::{Step, StepKind, StepStatus};
pub use status::{EntryState, EntryStatus, status};
