use anyhow::Result;
use colored::Colorize;
use linkany::engine::{EntryState, EntryStatus};

use super::CommandContext;

fn print_entry(e: &EntryStatus) {
    let target = e.target.display();
    let source = e.source.display();
    match e.state {
        EntryState::Linked => println!("{} OK: {} -> {}", "✔".green(), target, source),
        EntryState::Missing => println!("{} Missing: {}", "!".yellow(), target),
        EntryState::SourceMissing => println!(
            "{} Link points to missing source: {} -> {}",
            "!".yellow(),
            target,
            source
        ),
        EntryState::ForeignLink => println!(
            "{} Incorrect link: {} -> {} (expected: {})",
            "✗".red(),
            target,
            e.points_to.as_deref().unwrap_or("<unknown>"),
            source
        ),
        EntryState::Occupied => println!(
            "{} Exists but not a symlink: {}",
            "·".dimmed(),
            target
        ),
    }
}

/// Print the state of every manifest entry; returns the number of problems.
pub fn run_status(ctx: &CommandContext) -> Result<usize> {
    let entries = linkany::status(&ctx.manifest_path)?;
    let problems = entries.iter().filter(|e| e.state.is_problem()).count();

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(problems);
    }

    if entries.is_empty() {
        println!("No mappings in {}", ctx.manifest_path.display());
        return Ok(0);
    }

    for e in &entries {
        print_entry(e);
    }

    if problems > 0 {
        println!("\nStatus: {} problems found", problems);
    } else {
        println!("\nStatus: All good");
    }

    Ok(problems)
}
