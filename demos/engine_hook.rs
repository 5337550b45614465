//! Drives the engine in-process the way an orchestrator would: record the
//! commit each phase produced, then preview and undo the latest phase.
//!
//! Run inside a git repository whose HEAD belongs to issue 1, phase 1:
//!
//! ```text
//! cargo run --example engine_hook -- /path/to/repo [--apply]
//! ```

use async_trait::async_trait;
use rewind::core::{IssueStatusHook, IssueStatusUpdate};
use rewind::{RewindConfig, RollbackEngine, RollbackMethod, RollbackOptions, RollbackScope, RollbackTarget};
use std::path::PathBuf;
use std::sync::Arc;

/// Stands in for an issue tracker integration.
struct PrintingHook;

#[async_trait]
impl IssueStatusHook for PrintingHook {
    async fn on_rollback(&self, update: &IssueStatusUpdate) -> anyhow::Result<()> {
        println!(
            "hook: issue {:?} phase {:?} rolled back by {} (backup {})",
            update.issue_number,
            update.phase_number,
            update.method.as_str(),
            update.backup_branch
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let repo = PathBuf::from(args.next().unwrap_or_else(|| ".".to_string()));
    let apply = args.any(|a| a == "--apply");

    let config = RewindConfig::load(&repo)?;
    let engine = RollbackEngine::builder(config)
        .status_hook(Arc::new(PrintingHook))
        .build();

    let (record, new) = engine
        .record_head_commit(&repo, 1, Some(1), rewind::core::CommitSource::SelfOriginated)
        .await?;
    let verb = if new { "recorded" } else { "already tracked" };
    println!("{verb} {} for issue 1 phase 1", record.commit_hash);

    let target = RollbackTarget::phase(1, 1);
    let preview = engine
        .preview_rollback(RollbackScope::Phase, &target, &repo)
        .await?;
    println!(
        "{} commit(s), {} file(s), +{} -{}",
        preview.commits.len(),
        preview.files_affected.len(),
        preview.lines_changed.added,
        preview.lines_changed.removed
    );
    for warning in &preview.warnings {
        println!("warning: {}", warning.message);
    }

    if !preview.can_rollback {
        println!("blocked: {}", preview.blocking_reasons.join("; "));
        return Ok(());
    }
    if !apply {
        println!("pass --apply to revert it");
        return Ok(());
    }

    let options = RollbackOptions::new(RollbackMethod::Revert)
        .with_issue_status_update()
        .with_expected_fingerprint(preview.fingerprint());
    let result = engine
        .execute_rollback(RollbackScope::Phase, &target, options, &repo)
        .await?;
    println!("success: {}, backup: {:?}", result.success, result.backup_branch);

    // The hook runs detached; give it a moment before the runtime exits.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    Ok(())
}
