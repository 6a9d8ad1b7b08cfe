use anyhow::Context;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use convoy_core::{
    coordinator, docker, docker::SystemDocker, prune, ComposeExecutor, ExecutionPlan, Operation,
    PruneScope, Registry, RunOptions, StackDefinition,
};

use crate::cmd::RunArgs;
use crate::output::print_json;

/// Drive one lifecycle operation across the selected part of the fleet:
/// load → plan → preflight → coordinate → report.
///
/// Returns the process exit code: 0 all good, 1 stack failures or an aborted
/// run. Configuration errors propagate as `Err` and exit 2 in `main`.
pub async fn run(
    root: &Path,
    operation: Operation,
    args: RunArgs,
    prune_after: bool,
    json: bool,
) -> anyhow::Result<i32> {
    let registry = Registry::load(root).context("failed to load fleet")?;
    let targets = args.select.resolve()?;

    let plan = ExecutionPlan::build(&registry, targets.as_deref())?;
    let plan = if operation.is_teardown() {
        plan.reversed()
    } else {
        plan
    };

    if args.dry_run {
        return dry_run(&plan, operation, json);
    }

    let engine = SystemDocker::locate()?;
    docker::daemon_ready(&engine).await?;
    if operation == Operation::Up {
        let networks: BTreeSet<String> = plan
            .stacks()
            .flat_map(|s| s.external_networks.iter().cloned())
            .collect();
        docker::ensure_networks(&engine, &networks).await?;
    }

    // Operator interrupt: stop dispatching, let in-flight stacks finish.
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; finishing in-flight stacks");
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    let executor = ComposeExecutor::new(Duration::from_secs(args.timeout));
    let opts = RunOptions {
        parallelism: args.parallelism,
        continue_on_error: args.continue_on_error,
    };
    let report = coordinator::execute(&plan, operation, &executor, &opts, &cancel).await;

    // Post-cycle cleanup, scoped to the stacks just acted on. Only after a
    // fully successful cycle: a half-failed fleet keeps its old images around
    // for rollback.
    let prune_report = if prune_after && report.exit_code() == 0 {
        let stacks: Vec<StackDefinition> = plan.stacks().cloned().collect();
        Some(prune::prune(&engine, &PruneScope::Stacks(stacks)).await?)
    } else {
        None
    };

    if json {
        print_json(&serde_json::json!({
            "report": report,
            "prune": prune_report,
        }))?;
    } else {
        print!("{}", report.render());
        if let Some(p) = &prune_report {
            println!(
                "pruned {} superseded image(s), {} kept",
                p.removed.len(),
                p.protected.len()
            );
        }
    }

    Ok(report.exit_code())
}

fn dry_run(plan: &ExecutionPlan, operation: Operation, json: bool) -> anyhow::Result<i32> {
    if json {
        print_json(&serde_json::json!({
            "operation": operation,
            "waves": plan.wave_names(),
        }))?;
    } else {
        for (i, wave) in plan.wave_names().iter().enumerate() {
            println!("wave {}: {}", i + 1, wave.join(", "));
        }
        println!(
            "{} stack(s) in {} wave(s); nothing executed",
            plan.stack_count(),
            plan.waves().len()
        );
    }
    Ok(0)
}
