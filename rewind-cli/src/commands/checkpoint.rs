use super::rollback::{self, Flags};
use crate::display::short;
use anyhow::Result;
use colored::Colorize;
use rewind_core::{RollbackEngine, RollbackScope, RollbackTarget};
use std::path::Path;

pub async fn create(
    engine: &RollbackEngine,
    cwd: &Path,
    name: &str,
    issue: Option<u64>,
    description: Option<String>,
) -> Result<()> {
    let checkpoint = engine.create_checkpoint(name, issue, cwd, description).await?;

    println!(
        "{} Checkpoint {} at {}",
        "✓".green(),
        checkpoint.name.bold(),
        short(&checkpoint.commit_hash).yellow()
    );
    println!("  {}: {}", "ID".bold(), checkpoint.id);

    Ok(())
}

pub async fn list(engine: &RollbackEngine, cwd: &Path) -> Result<()> {
    let checkpoints = engine.list_checkpoints(cwd).await?;

    if checkpoints.is_empty() {
        println!("{}", "No checkpoints".yellow());
        return Ok(());
    }

    println!("{}", "Checkpoints".bold().cyan());
    println!();
    for checkpoint in &checkpoints {
        let issue = checkpoint
            .issue_number
            .map(|n| format!(" #{}", n))
            .unwrap_or_default();
        println!(
            "{} {}{} {}",
            short(&checkpoint.commit_hash).yellow(),
            checkpoint.name.bold(),
            issue.cyan(),
            checkpoint
                .created_at
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
                .dimmed()
        );
        println!("    {}: {}", "ID".dimmed(), checkpoint.id.dimmed());
        if let Some(description) = &checkpoint.description {
            println!("    {}", description);
        }
    }

    Ok(())
}

pub async fn delete(engine: &RollbackEngine, cwd: &Path, id: &str) -> Result<()> {
    let checkpoint = engine.delete_checkpoint(id, cwd).await?;
    println!("{} Deleted checkpoint {}", "✓".green(), checkpoint.name.bold());
    Ok(())
}

pub async fn restore(engine: &RollbackEngine, cwd: &Path, id: &str, flags: Flags) -> Result<()> {
    // Resolve first so an unknown id fails before any preview output.
    let checkpoint = engine.get_checkpoint(id, cwd).await?;
    println!(
        "Restoring checkpoint {} ({})",
        checkpoint.name.bold(),
        short(&checkpoint.commit_hash).yellow()
    );
    println!();

    rollback::run(
        engine,
        cwd,
        RollbackScope::Checkpoint,
        RollbackTarget::checkpoint(checkpoint.id),
        flags,
    )
    .await
}
