use super::ScopeArgs;
use crate::display;
use anyhow::Result;
use colored::Colorize;
use rewind_core::{RollbackEngine, RollbackMethod};
use std::path::Path;

pub async fn run(
    engine: &RollbackEngine,
    cwd: &Path,
    scope: &ScopeArgs,
    method: RollbackMethod,
    file: Option<String>,
) -> Result<()> {
    let (scope, target) = scope.resolve()?;

    if let Some(path) = file {
        let diff = engine.preview_file(scope, &target, &path, cwd).await?;
        if !diff.has_changes() {
            println!("{}", format!("{} is unchanged by this rollback", path).yellow());
            return Ok(());
        }
        display::print_file_diff(&diff);
        return Ok(());
    }

    let preview = engine
        .preview_rollback_with_method(scope, &target, method, cwd)
        .await?;
    display::print_preview(&preview);

    println!();
    println!("{}: {}", "Fingerprint".bold(), preview.fingerprint().dimmed());
    if preview.can_rollback {
        println!(
            "This is a preview only. Run {} to apply it",
            "rewind rollback".cyan()
        );
    }

    Ok(())
}
