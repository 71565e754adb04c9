use anyhow::{Context, Result};
use linkany::engine::manifest;
use linkany::{Mapping, MappingKind, MappingResolver, ToolResolver};
use std::path::{Path, PathBuf};

use super::CommandContext;
use super::report::print_result;

/// Arguments for `add`, as parsed from the command line
#[derive(Debug)]
pub struct AddArgs {
    pub source: PathBuf,
    pub target: PathBuf,
    pub id: Option<String>,
    pub kind: Option<MappingKind>,
    pub no_atomic: bool,
    pub dry_run: bool,
}

/// Command-line paths are relative to the working directory, not the manifest.
fn absolute(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

pub fn run_add(ctx: &CommandContext, args: AddArgs, cwd: &Path) -> Result<bool> {
    let mut mapping = Mapping::new(absolute(&args.source, cwd), absolute(&args.target, cwd));
    mapping.id = args.id;
    mapping.kind = args.kind;
    if args.no_atomic {
        mapping.atomic = Some(false);
    }

    let result = linkany::add(&ctx.manifest_path, &mapping, &ctx.options(args.dry_run, false))?;
    print_result(&result, ctx.json, ctx.verbose)
}

pub fn run_remove(
    ctx: &CommandContext,
    key: &str,
    keep_link: bool,
    dry_run: bool,
    cwd: &Path,
) -> Result<bool> {
    let key = remove_key(ctx, key, cwd);
    let result = linkany::remove(&ctx.manifest_path, &key, &ctx.options(dry_run, keep_link))?;
    print_result(&result, ctx.json, ctx.verbose)
}

/// A relative path typed by the user names something below the working
/// directory; ids and stored targets are passed through untouched.
fn remove_key(ctx: &CommandContext, key: &str, cwd: &Path) -> String {
    let manifest = manifest::load(&ctx.manifest_path);
    let on_disk = cwd.join(key);
    if manifest::find(&manifest, key).is_none()
        && !Path::new(key).is_absolute()
        && std::fs::symlink_metadata(&on_disk).is_ok()
    {
        on_disk.display().to_string()
    } else {
        key.to_string()
    }
}

pub fn run_install(ctx: &CommandContext, dry_run: bool) -> Result<bool> {
    let result = linkany::install(&ctx.manifest_path, &ctx.options(dry_run, false))?;
    print_result(&result, ctx.json, ctx.verbose)
}

pub fn run_uninstall(ctx: &CommandContext, dry_run: bool) -> Result<bool> {
    let result = linkany::uninstall(&ctx.manifest_path, &ctx.options(dry_run, false))?;
    print_result(&result, ctx.json, ctx.verbose)
}

/// Resolve `name` through the tool's config section, then add it.
pub fn run_link(ctx: &CommandContext, tool: &str, name: &str, dry_run: bool) -> Result<bool> {
    let (config, config_path) = ctx
        .config
        .as_ref()
        .context("The link command needs a linkany.toml with [tools] sections")?;

    let resolver = ToolResolver::from_config(config, config_path, tool)?;
    let mapping = resolver.resolve(name)?;
    tracing::debug!(
        tool = %tool,
        source = %mapping.source.display(),
        target = %mapping.target.display(),
        "Resolved mapping"
    );

    let result = linkany::add(&ctx.manifest_path, &mapping, &ctx.options(dry_run, false))?;
    print_result(&result, ctx.json, ctx.verbose)
}
