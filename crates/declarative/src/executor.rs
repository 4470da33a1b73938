//! Execution engine - applies planned changes in parallel

use crate::context::{ConfirmCallback, ProgressCallback};
use crate::engine::{Engine, Outcome};
use crate::planner::{Change, ExecutionPlan};
use crate::types::{ExecuteOptions, ExecuteSummary};
use anyhow::Result;
use rayon::prelude::*;
use std::sync::{Arc, Mutex};

/// What a run did: counts plus the outcome of every applied change.
#[derive(Debug, Default)]
pub struct ExecuteReport {
    pub summary: ExecuteSummary,
    /// `(address, outcome)` in plan order
    pub outcomes: Vec<(String, Outcome)>,
}

impl ExecuteReport {
    fn record(&mut self, address: String, outcome: Outcome) {
        self.summary.add_result(&outcome.result);
        self.outcomes.push((address, outcome));
    }
}

/// Execute a plan with the given options and callbacks
///
/// # Type Parameters
/// * `P` - Progress callback type
/// * `C` - Confirm callback type
///
/// # Arguments
/// * `engine` - Runs the lifecycle hooks
/// * `plan` - The execution plan to run
/// * `opts` - Execution options (dry_run, jobs)
/// * `progress` - Progress callback
/// * `confirm` - Confirmation callback
///
/// # Returns
/// Summary of execution results and every change's outcome
pub fn execute<P, C>(
    engine: &Engine,
    plan: &ExecutionPlan,
    opts: ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ExecuteReport>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let pending: Vec<&Change> = plan.pending().collect();
    if pending.is_empty() {
        return Ok(ExecuteReport::default());
    }

    if opts.dry_run {
        return Ok(ExecuteReport::default());
    }

    // Confirm before proceeding
    if !confirm.confirm("Apply changes?")? {
        let mut report = ExecuteReport::default();
        for change in pending {
            report.record(change.address.clone(), Outcome::skipped(&change.diff, "declined"));
        }
        return Ok(report);
    }

    progress.on_batch_start(pending.len());
    let outcomes = if opts.jobs <= 1 || pending.len() == 1 {
        execute_sequential(engine, &pending, progress)
    } else {
        execute_parallel(engine, &pending, opts.jobs, progress)?
    };
    progress.on_batch_complete();

    let mut report = ExecuteReport::default();
    for (address, outcome) in outcomes {
        report.record(address, outcome);
    }
    Ok(report)
}

fn execute_sequential<P: ProgressCallback>(
    engine: &Engine,
    changes: &[&Change],
    progress: &mut P,
) -> Vec<(String, Outcome)> {
    let mut outcomes = Vec::with_capacity(changes.len());
    for change in changes {
        progress.on_resource_start(&change.address, &change.description());
        let outcome = apply_change(engine, change);
        progress.on_resource_complete(&change.address, &outcome.result);
        outcomes.push((change.address.clone(), outcome));
    }
    outcomes
}

/// Execute changes in parallel using rayon
fn execute_parallel<P: ProgressCallback>(
    engine: &Engine,
    changes: &[&Change],
    jobs: usize,
    progress: &mut P,
) -> Result<Vec<(String, Outcome)>> {
    // The progress callback is not thread-safe; results are reported after.
    let results: Arc<Mutex<Vec<(usize, Outcome)>>> = Arc::new(Mutex::new(Vec::new()));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {}", e))?;

    pool.install(|| {
        changes.par_iter().enumerate().for_each(|(index, change)| {
            let outcome = apply_change(engine, change);
            push_outcome(&results, index, outcome);
        });
    });

    let mut results = into_outcomes(results)?;
    results.sort_by_key(|(index, _)| *index);

    let mut outcomes = Vec::with_capacity(results.len());
    for (index, outcome) in results {
        let address = changes[index].address.clone();
        progress.on_resource_complete(&address, &outcome.result);
        outcomes.push((address, outcome));
    }
    Ok(outcomes)
}

fn push_outcome(results: &Mutex<Vec<(usize, Outcome)>>, index: usize, outcome: Outcome) {
    results
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .push((index, outcome));
}

fn into_outcomes(results: Arc<Mutex<Vec<(usize, Outcome)>>>) -> Result<Vec<(usize, Outcome)>> {
    Ok(Arc::try_unwrap(results)
        .map_err(|_| anyhow::anyhow!("Failed to unwrap results"))?
        .into_inner()
        .unwrap_or_else(std::sync::PoisonError::into_inner))
}

/// Apply a single change, unless the run was cancelled
fn apply_change(engine: &Engine, change: &Change) -> Outcome {
    if engine.token().is_cancelled() {
        return Outcome::skipped(&change.diff, "cancelled");
    }
    let outcome = engine.apply(change.kind.as_ref(), &change.diff, &change.timeouts);
    if let Some(err) = &outcome.error {
        log::error!("{}: {err}", change.address);
    }
    outcome
}

/// Simple execution without callbacks
///
/// For basic use cases where you don't need progress or confirmation.
pub fn execute_simple(
    engine: &Engine,
    plan: &ExecutionPlan,
    opts: ExecuteOptions,
) -> Result<ExecuteReport> {
    use crate::context::{AutoConfirm, NoProgress};

    execute(engine, plan, opts, &mut NoProgress, &mut AutoConfirm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AutoConfirm, AutoDecline, NoProgress};
    use crate::diff::ResourceDiff;
    use crate::resource::ResourceKind;
    use crate::testing::{FakeKind, engine};
    use crate::types::{ApplyResult, InstanceState, LifecycleState};
    use armclient::{Method, MockReply, MockTransport};
    use serde_json::{Map, Value, json};

    fn path(name: &str) -> String {
        format!("/subscriptions/s1/resourceGroups/rg/providers/Microsoft.Fake/widgets/{name}")
    }

    fn config(name: &str) -> Map<String, Value> {
        json!({"name": name, "resource_group_name": "rg", "size": 1})
            .as_object()
            .cloned()
            .unwrap()
    }

    fn create_plan(names: &[&str]) -> ExecutionPlan {
        let kind = Arc::new(FakeKind::new("fake_widget"));
        let mut plan = ExecutionPlan::new();
        for name in names {
            let config = config(name);
            let diff = ResourceDiff::compute(
                &format!("fake_widget.{name}"),
                "fake_widget",
                kind.schema(),
                None,
                Some(&config),
            );
            plan.push(Change::new(kind.clone(), diff));
        }
        plan
    }

    fn script_create(mock: &MockTransport, name: &str) {
        mock.reply(Method::Get, &path(name), MockReply::not_found());
        mock.reply(
            Method::Get,
            &path(name),
            MockReply::json(200, json!({"name": name, "properties": {"size": 1}})),
        );
        mock.reply(Method::Put, &path(name), MockReply::json(200, json!({})));
    }

    struct Recorder(Vec<String>);

    impl ProgressCallback for Recorder {
        fn on_batch_start(&mut self, count: usize) {
            self.0.push(format!("batch {count}"));
        }
        fn on_resource_start(&mut self, address: &str, _description: &str) {
            self.0.push(format!("start {address}"));
        }
        fn on_resource_complete(&mut self, address: &str, _result: &ApplyResult) {
            self.0.push(format!("done {address}"));
        }
        fn on_batch_complete(&mut self) {
            self.0.push("complete".into());
        }
    }

    #[test]
    fn test_execute_empty_plan() {
        let mock = MockTransport::new();
        let report = execute_simple(&engine(&mock), &ExecutionPlan::new(), ExecuteOptions::default())
            .unwrap();
        assert_eq!(report.summary.total(), 0);
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_execute_no_changes() {
        let kind = Arc::new(FakeKind::new("fake_widget"));
        let prior = InstanceState::new(path("a"), config("a"));
        let diff = ResourceDiff::compute("fake_widget.a", "fake_widget", kind.schema(), Some(&prior), Some(&config("a")));
        let mut plan = ExecutionPlan::new();
        plan.push(Change::new(kind, diff));

        let mock = MockTransport::new();
        let report = execute_simple(&engine(&mock), &plan, ExecuteOptions::default()).unwrap();

        // No diff means no execution
        assert_eq!(report.summary.total(), 0);
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_execute_sequential_with_progress() {
        let mock = MockTransport::new();
        script_create(&mock, "a");
        script_create(&mock, "b");

        let mut progress = Recorder(Vec::new());
        let opts = ExecuteOptions { dry_run: false, jobs: 1 };
        let report = execute(&engine(&mock), &create_plan(&["a", "b"]), opts, &mut progress, &mut AutoConfirm)
            .unwrap();

        assert_eq!(report.summary.created, 2);
        assert_eq!(
            progress.0,
            vec!["batch 2", "start fake_widget.a", "done fake_widget.a", "start fake_widget.b", "done fake_widget.b", "complete"]
        );
        let (_, outcome) = &report.outcomes[1];
        assert_eq!(outcome.lifecycle, LifecycleState::Present);
        assert_eq!(outcome.state.as_ref().unwrap().id, path("b"));
    }

    #[test]
    fn test_execute_parallel_keeps_plan_order() {
        let mock = MockTransport::new();
        let names = ["a", "b", "c", "d", "e"];
        for name in names {
            script_create(&mock, name);
        }

        let opts = ExecuteOptions { dry_run: false, jobs: 3 };
        let report = execute_simple(&engine(&mock), &create_plan(&names), opts).unwrap();

        assert_eq!(report.summary.created, 5);
        let addresses: Vec<&str> = report.outcomes.iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(
            addresses,
            vec!["fake_widget.a", "fake_widget.b", "fake_widget.c", "fake_widget.d", "fake_widget.e"]
        );
    }

    #[test]
    fn test_failures_do_not_stop_other_changes() {
        let mock = MockTransport::new();
        script_create(&mock, "a");
        mock.reply(
            Method::Get,
            &path("b"),
            MockReply::json(200, json!({"name": "b"})),
        );

        let opts = ExecuteOptions { dry_run: false, jobs: 2 };
        let report = execute_simple(&engine(&mock), &create_plan(&["a", "b"]), opts).unwrap();

        assert_eq!(report.summary.created, 1);
        assert_eq!(report.summary.failed, 1);
        let (_, failed) = &report.outcomes[1];
        assert_eq!(failed.lifecycle, LifecycleState::CreateFailed);
        assert!(failed.state.is_none());
    }

    #[test]
    fn test_declined_and_dry_run_make_no_requests() {
        let mock = MockTransport::new();
        let e = engine(&mock);
        let plan = create_plan(&["a"]);

        let report = execute(&e, &plan, ExecuteOptions::default(), &mut NoProgress, &mut AutoDecline)
            .unwrap();
        assert_eq!(report.summary.skipped, 1);

        let opts = ExecuteOptions { dry_run: true, jobs: 1 };
        let report = execute_simple(&e, &plan, opts).unwrap();
        assert_eq!(report.summary.total(), 0);
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_cancelled_run_skips_changes() {
        let mock = MockTransport::new();
        let e = engine(&mock);
        e.token().cancel();

        let report = execute_simple(&e, &create_plan(&["a", "b"]), ExecuteOptions::default()).unwrap();
        assert_eq!(report.summary.skipped, 2);
        assert!(mock.requests().is_empty());
    }
}
