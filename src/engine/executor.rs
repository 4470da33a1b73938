//! Execution with terminal UI integration

use anyhow::Result;
use colored::Colorize;
use declarative::{
    ApplyResult, AutoConfirm, ConfirmCallback, Engine, ExecuteOptions, ExecuteReport,
    ExecuteSummary, ExecutionPlan, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};

use super::differ::display_diff;
use crate::ui;

/// Options for a run (adds `yes` to skip confirmation)
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Number of parallel jobs
    pub jobs: usize,
    /// Skip confirmation prompts
    pub yes: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
            yes: false,
        }
    }
}

/// Progress bar over the resources being applied
#[derive(Default)]
pub struct BarProgress {
    bar: Option<ProgressBar>,
}

impl ProgressCallback for BarProgress {
    fn on_batch_start(&mut self, count: usize) {
        let bar = ProgressBar::new(count as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        self.bar = Some(bar);
    }

    fn on_resource_start(&mut self, _address: &str, description: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(ui::truncate(description, 50));
        }
    }

    fn on_resource_complete(&mut self, address: &str, result: &ApplyResult) {
        if let Some(bar) = &self.bar {
            bar.set_message(format!("{} {}", result_symbol(result), ui::truncate(address, 50)));
            bar.inc(1);
        }
    }

    fn on_batch_complete(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Interactive yes/no prompt
pub struct PromptConfirm;

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        use dialoguer::Confirm;

        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()?;

        Ok(confirmed)
    }
}

fn result_symbol(result: &ApplyResult) -> &'static str {
    match result {
        ApplyResult::NoChange => "○",
        ApplyResult::Created
        | ApplyResult::Modified
        | ApplyResult::Replaced
        | ApplyResult::Removed => "✓",
        ApplyResult::Failed { .. } => "✗",
        ApplyResult::Skipped { .. } => "⊘",
    }
}

/// Show the plan, confirm and apply it.
///
/// Returns `None` when nothing ran: no changes, or a dry run.
pub fn run(engine: &Engine, plan: &ExecutionPlan, opts: &RunOptions) -> Result<Option<ExecuteReport>> {
    display_diff(plan.changes.iter().map(|c| &c.diff));

    if plan.total_changes() == 0 {
        return Ok(None);
    }

    if opts.dry_run {
        println!();
        println!("  {} Dry run - no changes made", "ℹ".blue());
        return Ok(None);
    }

    println!();
    let changing = ExecutionPlan {
        changes: plan.pending().cloned().collect(),
    };
    let exec_opts = ExecuteOptions {
        dry_run: false,
        jobs: opts.jobs,
    };
    let mut progress = BarProgress::default();
    let report = if opts.yes {
        declarative::execute(engine, &changing, exec_opts, &mut progress, &mut AutoConfirm)?
    } else {
        declarative::execute(engine, &changing, exec_opts, &mut progress, &mut PromptConfirm)?
    };

    let declined = report.outcomes.iter().all(|(_, outcome)| {
        matches!(&outcome.result, ApplyResult::Skipped { reason } if reason == "declined")
    });
    if declined {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(Some(report));
    }

    for (address, outcome) in &report.outcomes {
        if let Some(err) = &outcome.error {
            ui::error(&format!("{}: {err}", address.bold()));
            let category = err.source.category();
            ui::dim(&format!("{}: {}", category.description(), category.advice()));
        }
    }

    print_summary(&report.summary);
    Ok(Some(report))
}

/// Print final summary
pub fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!(
            "  {} Configuration applied successfully!",
            "✓".green().bold()
        );
    } else {
        println!(
            "  {} Configuration applied with errors",
            "⚠".yellow().bold()
        );
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} resources modified", summary.modified);
    }
    if summary.replaced > 0 {
        println!("    • {} resources replaced", summary.replaced);
    }
    if summary.removed > 0 {
        println!("    • {} resources removed", summary.removed);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::build_registry;
    use crate::resource::testing::engine;
    use armclient::{Method, MockReply, MockTransport};
    use declarative::{Change, InstanceState};
    use serde_json::json;

    const QUOTA_ID: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/providers/Microsoft.Compute/locations/westeurope/providers/Microsoft.Quota/quotas/standardDSv3Family";

    fn quota_plan(engine: &Engine, prior: Option<&InstanceState>, limit: u64) -> ExecutionPlan {
        let registry = build_registry().unwrap();
        let kind = registry.get("azurerm_quota").unwrap().clone();
        let config = json!({
            "name": "standardDSv3Family",
            "resource_provider": "Microsoft.Compute",
            "location": "westeurope",
            "limit_value": limit,
        });
        let diff = engine
            .plan(
                kind.as_ref(),
                "azurerm_quota.cores",
                prior,
                config.as_object(),
                &kind.timeouts(),
            )
            .unwrap();
        let mut plan = ExecutionPlan::new();
        plan.push(Change::new(kind, diff));
        plan
    }

    #[test]
    fn test_result_symbols() {
        assert_eq!(result_symbol(&ApplyResult::Created), "✓");
        assert_eq!(result_symbol(&ApplyResult::Replaced), "✓");
        assert_eq!(result_symbol(&ApplyResult::Failed { error: "boom".into() }), "✗");
        assert_eq!(result_symbol(&ApplyResult::Skipped { reason: "declined".into() }), "⊘");
    }

    #[test]
    fn test_progress_without_batch_is_noop() {
        let mut progress = BarProgress::default();
        progress.on_resource_start("azurerm_quota.cores", "create azurerm_quota.cores");
        progress.on_resource_complete("azurerm_quota.cores", &ApplyResult::Created);
        progress.on_batch_complete();
        assert!(progress.bar.is_none());
    }

    #[test]
    fn test_dry_run_makes_no_requests() {
        let mock = MockTransport::new();
        let engine = engine(&mock);
        let plan = quota_plan(&engine, None, 100);

        let opts = RunOptions {
            dry_run: true,
            ..RunOptions::default()
        };
        assert!(run(&engine, &plan, &opts).unwrap().is_none());
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_no_changes_skips_execution() {
        let mock = MockTransport::new();
        let engine = engine(&mock);
        let attributes = json!({
            "name": "standardDSv3Family",
            "resource_provider": "Microsoft.Compute",
            "location": "westeurope",
            "limit_value": 100,
        });
        let prior = InstanceState::new(QUOTA_ID, attributes.as_object().cloned().unwrap());
        let plan = quota_plan(&engine, Some(&prior), 100);

        assert!(run(&engine, &plan, &RunOptions::default()).unwrap().is_none());
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_failed_apply_reported() {
        let mock = MockTransport::new();
        mock.reply(
            Method::Patch,
            QUOTA_ID,
            MockReply::json(400, json!({"error": {"code": "QuotaExceeded", "message": "limit too high"}})),
        );
        let engine = engine(&mock);
        let plan = quota_plan(&engine, None, 100);

        let opts = RunOptions {
            yes: true,
            ..RunOptions::default()
        };
        let report = run(&engine, &plan, &opts).unwrap().unwrap();
        assert_eq!(report.summary.failed, 1);
        assert!(report.outcomes[0].1.error.is_some());
    }
}
