//! `plan` - validate the configuration and show what apply would change

use anyhow::{Result, bail};

use super::Session;
use crate::Context;
use crate::cli::TargetArgs;
use crate::engine::differ::{display_diff, display_errors};
use crate::engine::planner::{Planned, plan_apply};

pub fn run(ctx: &Context, args: TargetArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let planned = plan_apply(
        &session.engine,
        session.registry,
        &session.config,
        &session.state,
        args.target.as_deref(),
    );
    check(&planned)?;
    display_diff(planned.plan.changes.iter().map(|c| &c.diff));
    Ok(())
}

/// Fail when any resource could not be planned, after printing why.
pub fn check(planned: &Planned) -> Result<()> {
    if planned.is_valid() {
        return Ok(());
    }
    display_errors(&planned.errors);
    bail!("{} resources failed validation", planned.errors.len())
}
