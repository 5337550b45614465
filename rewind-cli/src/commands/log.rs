use crate::display::short;
use anyhow::Result;
use colored::Colorize;
use rewind_core::{CommitSource, RollbackEngine};
use std::path::Path;

pub async fn run(engine: &RollbackEngine, cwd: &Path, issue: Option<u64>, phase: Option<u32>) -> Result<()> {
    let commits = match (issue, phase) {
        (Some(issue), Some(phase)) => engine.get_commits_for_phase(cwd, issue, phase).await?,
        (Some(issue), None) => engine.get_commits_for_issue(cwd, issue).await?,
        _ => engine.all_commits(cwd).await?,
    };

    if commits.is_empty() {
        println!("{}", "No tracked commits".yellow());
        return Ok(());
    }

    println!("{}", "Tracked Commits".bold().cyan());
    println!();

    for record in &commits {
        let phase = record
            .phase_number
            .map(|p| format!(" phase {}", p))
            .unwrap_or_default();
        let source = match record.source {
            CommitSource::SelfOriginated => String::new(),
            other => format!(" ({})", other.as_str()),
        };
        println!(
            "{} {} {}{}{}",
            short(&record.commit_hash).yellow(),
            format!("#{}", record.issue_number).cyan(),
            phase.cyan(),
            source.magenta(),
            if record.is_merge_commit { " merge".magenta() } else { "".normal() }
        );
        println!(
            "    {} {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            record.message
        );
        if let Some(superseded) = &record.superseded {
            println!(
                "    {} {}",
                "rolled back, backup".red(),
                superseded.backup_branch.dimmed()
            );
        }
    }

    let active = commits.iter().filter(|r| r.is_active()).count();
    println!();
    println!(
        "{}",
        format!("{} commit(s), {} active", commits.len(), active).dimmed()
    );

    Ok(())
}
