use anyhow::Result;
use colored::Colorize;
use linkany::LinkResult;
use linkany::engine::{StepKind, StepStatus};

/// Print an operation result; returns whether it succeeded.
pub fn print_result(result: &LinkResult, json: bool, verbose: bool) -> Result<bool> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(result.ok);
    }

    for step in &result.steps {
        let bookkeeping = matches!(step.kind, StepKind::WriteManifest | StepKind::Audit);
        if bookkeeping && !verbose && step.status != StepStatus::Failed {
            continue;
        }
        match step.status {
            StepStatus::Executed => println!("  {} {}", "✔".green(), step.message),
            StepStatus::Planned => println!("  {} Would {}", "→".cyan(), lowercase_first(&step.message)),
            StepStatus::Skipped => println!("  {} {}", "○".yellow(), step.message.dimmed()),
            StepStatus::Failed => println!(
                "  {} {}: {}",
                "✗".red(),
                step.message,
                step.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    for warning in &result.warnings {
        println!("  {} {}", "!".yellow(), warning);
    }
    for error in &result.errors {
        eprintln!("  {} {}", "✘".red(), error);
    }

    let verb = result.operation.to_string();
    if result.ok {
        println!(
            "\n{} ({} changes, {} ms)",
            format!("✨ {} complete!", capitalize(&verb)).green().bold(),
            result.changes.len().to_string().green(),
            result.duration_ms
        );
    } else {
        println!("\n{}", format!("✘ {} failed", capitalize(&verb)).red().bold());
    }

    Ok(result.ok)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn lowercase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
