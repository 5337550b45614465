use crate::display::{self, ProgressDisplay};
use anyhow::Result;
use colored::Colorize;
use dialoguer::Confirm;
use rewind_core::{
    CancellationToken, RollbackEngine, RollbackMethod, RollbackOptions, RollbackResult, RollbackScope,
    RollbackTarget,
};
use std::path::Path;

#[derive(Debug, Clone, Copy)]
pub struct Flags {
    pub method: RollbackMethod,
    pub push: bool,
    pub update_status: bool,
    pub yes: bool,
}

impl Flags {
    fn options(&self) -> RollbackOptions {
        let mut options = RollbackOptions::new(self.method);
        if self.push {
            options = options.with_push_after();
        }
        if self.update_status {
            options = options.with_issue_status_update();
        }
        options
    }
}

/// Previews, asks for confirmation and executes against the approved preview.
pub async fn run(
    engine: &RollbackEngine,
    cwd: &Path,
    scope: RollbackScope,
    target: RollbackTarget,
    flags: Flags,
) -> Result<()> {
    let preview = engine
        .preview_rollback_with_method(scope, &target, flags.method, cwd)
        .await?;
    display::print_preview(&preview);
    println!();

    if !preview.can_rollback {
        anyhow::bail!("rollback of {} is blocked", target.describe(scope));
    }

    if !flags.yes {
        let prompt = match flags.method {
            RollbackMethod::Reset => format!(
                "Reset HEAD and discard {} commit(s)? A backup branch is created first",
                preview.commits.len()
            ),
            RollbackMethod::Revert => format!("Revert {} commit(s)?", preview.commits.len()),
        };
        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(flags.method == RollbackMethod::Revert)
            .interact()?;
        if !confirmed {
            println!("{}", "Aborted".yellow());
            return Ok(());
        }
    }

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let options = flags
        .options()
        .with_expected_fingerprint(preview.fingerprint())
        .with_cancel(cancel);

    let progress = ProgressDisplay::attach(engine.subscribe_progress(cwd));
    let result = engine.execute_rollback(scope, &target, options, cwd).await;
    progress.finish();
    ctrl_c.abort();

    finish(result?)
}

pub(crate) fn finish(result: RollbackResult) -> Result<()> {
    display::print_result(&result);
    if !result.success {
        anyhow::bail!(
            "{}",
            result.error.unwrap_or_else(|| "rollback failed".to_string())
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_build_options() {
        let flags = Flags {
            method: RollbackMethod::Revert,
            push: true,
            update_status: true,
            yes: true,
        };
        let options = flags.options();

        assert_eq!(options.method, RollbackMethod::Revert);
        assert!(options.push_after);
        assert!(options.update_issue_status);
        assert!(options.expected_fingerprint.is_none());
    }

    #[test]
    fn test_finish_reports_failure() {
        assert!(finish(RollbackResult {
            success: true,
            ..Default::default()
        })
        .is_ok());

        let err = finish(RollbackResult::failed("merge conflict in a.txt", "rewind/backup/x")).unwrap_err();
        assert!(err.to_string().contains("merge conflict"));
    }
}
