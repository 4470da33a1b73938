//! `apply` - make remote resources match the configuration

use anyhow::{Result, bail};

use super::Session;
use super::plan::check;
use super::refresh::refresh_state;
use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine::executor::{RunOptions, run as execute};
use crate::engine::planner::plan_apply;
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let mut session = Session::open(ctx)?;
    let target = args.target.as_deref();

    if args.refresh {
        let summary = refresh_state(&mut session, target);
        for (address, message) in &summary.failed {
            ui::error(&format!("{address}: {message}"));
        }
        if !summary.failed.is_empty() {
            bail!("{} resources could not be refreshed", summary.failed.len());
        }
        if !args.dry_run {
            session.save()?;
        }
    }

    let planned = plan_apply(
        &session.engine,
        session.registry,
        &session.config,
        &session.state,
        target,
    );
    check(&planned)?;

    let opts = RunOptions {
        dry_run: args.dry_run,
        jobs: args.jobs.max(1),
        yes: args.yes,
    };
    let Some(report) = execute(&session.engine, &planned.plan, &opts)? else {
        return Ok(());
    };

    session.record(&planned.plan, &report);
    session.save()?;

    if !report.summary.is_success() {
        bail!("{} resources failed", report.summary.failed);
    }
    Ok(())
}
