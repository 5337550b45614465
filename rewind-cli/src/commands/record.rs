use crate::display::short;
use anyhow::Result;
use colored::Colorize;
use rewind_core::{CommitRecord, CommitSource, RollbackEngine};
use std::path::Path;

pub async fn run(
    engine: &RollbackEngine,
    cwd: &Path,
    issue: u64,
    phase: Option<u32>,
    commit: Option<String>,
    source: CommitSource,
) -> Result<()> {
    let (record, inserted) = match commit {
        None => engine.record_head_commit(cwd, issue, phase, source).await?,
        Some(hash) => {
            let mut record = CommitRecord::new(hash, issue, "").with_source(source);
            if let Some(phase) = phase {
                record = record.with_phase(phase);
            }
            engine.record_commit(cwd, record).await?
        }
    };

    if !inserted {
        println!(
            "{} {} is already tracked",
            "•".dimmed(),
            short(&record.commit_hash).yellow()
        );
        return Ok(());
    }

    let phase = record
        .phase_number
        .map(|p| format!(" phase {}", p))
        .unwrap_or_default();
    let merge = if record.is_merge_commit { " (merge)" } else { "" };
    println!(
        "{} Recorded {} for issue #{}{}{}",
        "✓".green(),
        short(&record.commit_hash).yellow(),
        record.issue_number,
        phase,
        merge.magenta()
    );
    if !record.message.is_empty() {
        println!("  {}", record.message.dimmed());
    }

    Ok(())
}
