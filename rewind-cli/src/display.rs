use colored::{ColoredString, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use rewind_core::diff::{DiffLineType, FileDiff};
use rewind_core::{
    FileOutcome, FileStatus, ProgressStage, RollbackPreview, RollbackProgress, RollbackResult, Severity,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

pub fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

fn severity_label(severity: Severity) -> ColoredString {
    match severity {
        Severity::High => "high".red().bold(),
        Severity::Medium => "medium".yellow().bold(),
        Severity::Low => "low".dimmed(),
    }
}

fn file_label(status: FileStatus, will_be: FileOutcome) -> ColoredString {
    let status = match status {
        FileStatus::Added => "added",
        FileStatus::Modified => "modified",
        FileStatus::Deleted => "deleted",
        FileStatus::Renamed => "renamed",
    };
    match will_be {
        FileOutcome::Deleted => format!("{status}, will be removed").red(),
        FileOutcome::Restored => format!("{status}, will be restored").green(),
        FileOutcome::Modified => format!("{status}, will be partially restored").yellow(),
    }
}

pub fn print_preview(preview: &RollbackPreview) {
    println!(
        "{} {}",
        "Rollback Preview".bold().cyan(),
        format!("({}, {})", preview.target.describe(preview.scope), preview.method.as_str()).dimmed()
    );
    println!("  {}: {}", "HEAD".bold(), short(&preview.head));
    if let Some(base) = &preview.reset_target {
        println!("  {}: {}", "Range base".bold(), short(base));
    }
    println!();

    println!("{}", "Commits:".bold());
    if preview.commits.is_empty() {
        println!("  {}", "nothing to roll back".dimmed());
    }
    for commit in &preview.commits {
        let phase = commit
            .phase_number
            .map(|p| format!(" [phase {p}]"))
            .unwrap_or_default();
        let merge = if commit.is_merge_commit { " (merge)" } else { "" };
        println!(
            "  {} {}{}{}",
            short(&commit.commit_hash).yellow(),
            commit.message,
            phase.dimmed(),
            merge.magenta()
        );
    }
    for skipped in &preview.skipped_commits {
        println!("  {} {} {}", "?".dimmed(), short(skipped).dimmed(), "no longer in history".dimmed());
    }
    println!();

    if !preview.files_affected.is_empty() {
        println!("{}", "Files:".bold());
        for file in &preview.files_affected {
            let binary = if file.preview_available { "" } else { " (binary)" };
            println!(
                "  {} {}{}",
                file.path,
                file_label(file.status, file.will_be),
                binary.dimmed()
            );
        }
        println!(
            "  {} {}",
            format!("+{}", preview.lines_changed.added).green(),
            format!("-{}", preview.lines_changed.removed).red()
        );
        println!();
    }

    if !preview.warnings.is_empty() {
        println!("{}", "Warnings:".bold());
        for warning in &preview.warnings {
            println!("  [{}] {}", severity_label(warning.severity), warning.message);
        }
        println!();
    }

    if preview.can_rollback {
        println!("{}", "✓ Rollback can proceed".green().bold());
    } else {
        println!("{}", "✗ Rollback is blocked".red().bold());
        for reason in &preview.blocking_reasons {
            println!("  • {}", reason);
        }
    }
}

pub fn print_result(result: &RollbackResult) {
    println!();
    if result.success {
        println!("{}", "✓ Rollback complete".green().bold());
    } else {
        println!("{}", "✗ Rollback failed".red().bold());
        if let Some(error) = &result.error {
            println!("  {}", error.red());
        }
    }

    for commit in &result.revert_commits {
        println!("  {}: {}", "Revert commit".bold(), short(commit).yellow());
    }
    if let Some(head) = &result.head {
        println!("  {}: {}", "HEAD".bold(), short(head));
    }
    if let Some(backup) = &result.backup_branch {
        println!("  {}: {}", "Backup branch".bold(), backup.cyan());
        println!(
            "  {}",
            format!("Restore with: git reset --hard {backup}").dimmed()
        );
    }
    if result.push_skipped {
        println!(
            "  {}",
            "Not pushed: a reset rewrites history, push it yourself if intended".yellow()
        );
    }
}

pub fn print_file_diff(diff: &FileDiff) {
    println!("{} {}", "diff".bold(), diff.path);
    for line in &diff.diff_lines {
        let text = line.content.trim_end_matches('\n');
        match line.line_type {
            DiffLineType::Addition => println!("{}", format!("+{text}").green()),
            DiffLineType::Deletion => println!("{}", format!("-{text}").red()),
            DiffLineType::Context => println!(" {text}"),
        }
    }
}

fn stage_label(stage: ProgressStage) -> &'static str {
    match stage {
        ProgressStage::Preparing => "preparing",
        ProgressStage::Reverting => "reverting",
        ProgressStage::Resetting => "resetting",
        ProgressStage::Completing => "completing",
    }
}

/// Progress bar fed from the engine's progress channel.
pub struct ProgressDisplay {
    bar: ProgressBar,
    task: JoinHandle<()>,
}

impl ProgressDisplay {
    pub fn attach(mut rx: broadcast::Receiver<RollbackProgress>) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:20.cyan/dim}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█░"),
        );

        let updates = bar.clone();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(progress) => {
                        updates.set_length(progress.total as u64);
                        updates.set_position(progress.current as u64);
                        updates.set_message(format!("{}: {}", stage_label(progress.stage), progress.message));
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Self { bar, task }
    }

    pub fn finish(self) {
        self.task.abort();
        self.bar.finish_and_clear();
    }
}
