//! `destroy` - delete every resource recorded in state

use anyhow::{Result, bail};

use super::Session;
use super::plan::check;
use crate::Context;
use crate::cli::DestroyArgs;
use crate::engine::executor::{RunOptions, run as execute};
use crate::engine::planner::plan_destroy;
use crate::ui;

pub fn run(ctx: &Context, args: DestroyArgs) -> Result<()> {
    let mut session = Session::open(ctx)?;
    if session.state.resources.is_empty() {
        ui::info("No resources in state");
        return Ok(());
    }

    let planned = plan_destroy(
        &session.engine,
        session.registry,
        &session.config,
        &session.state,
        args.target.as_deref(),
    );
    check(&planned)?;

    let opts = RunOptions {
        dry_run: false,
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
