//! Execution coordinator: drives a plan through an executor, wave by wave.
//!
//! Waves are strict barriers — every member reaches a terminal state before
//! the next wave starts. Within a wave, members run concurrently up to the
//! parallelism bound. The completion/failure set is run-scoped state owned by
//! this function's task; workers communicate results back through the wave
//! stream, so there is a single writer by construction.

use chrono::Utc;
use futures::{stream, StreamExt};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::exec::StackExecutor;
use crate::plan::ExecutionPlan;
use crate::report::{RunReport, SkipReason, StackResult};
use crate::types::{Operation, StackDefinition};

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Maximum simultaneous executor invocations within a wave.
    pub parallelism: usize,
    /// When off, a failed wave halts dispatch of all later waves; when on,
    /// later waves proceed and only dependents of failures are skipped.
    pub continue_on_error: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            parallelism: 4,
            continue_on_error: false,
        }
    }
}

/// Drive `plan` to completion for `operation`.
///
/// `cancel` is the operator-interrupt signal: once set, no new stack is
/// dispatched, in-flight invocations finish (or hit their timeout), and the
/// report comes back marked aborted.
pub async fn execute<E: StackExecutor>(
    plan: &ExecutionPlan,
    operation: Operation,
    executor: &E,
    opts: &RunOptions,
    cancel: &AtomicBool,
) -> RunReport {
    let started = Utc::now();
    let mut results: BTreeMap<String, StackResult> = BTreeMap::new();
    // Failed stacks map to themselves; skipped dependents map to the root
    // failure, which makes skip propagation transitive by induction.
    let mut tainted: BTreeMap<String, String> = BTreeMap::new();
    let mut halted = false;

    for (index, wave) in plan.waves().iter().enumerate() {
        let mut runnable: Vec<StackDefinition> = Vec::new();

        for def in wave {
            if cancel.load(Ordering::SeqCst) {
                results.insert(
                    def.name.clone(),
                    StackResult::skipped(&def.name, operation, SkipReason::Aborted),
                );
                continue;
            }

            if let Some(cause) = predecessor_failure(plan, def, operation, &tainted) {
                tainted.insert(def.name.clone(), cause.clone());
                results.insert(
                    def.name.clone(),
                    StackResult::skipped(
                        &def.name,
                        operation,
                        SkipReason::DependencyFailed { dependency: cause },
                    ),
                );
                continue;
            }

            if halted {
                results.insert(
                    def.name.clone(),
                    StackResult::skipped(&def.name, operation, SkipReason::RunHalted),
                );
                continue;
            }

            runnable.push(def.clone());
        }

        if runnable.is_empty() {
            continue;
        }

        tracing::info!(
            wave = index + 1,
            stacks = runnable.len(),
            op = %operation,
            "dispatching wave"
        );

        let wave_results: Vec<StackResult> = stream::iter(runnable.into_iter().map(|def| {
            async move {
                // Late cancellation check: queued behind the parallelism
                // bound when the interrupt arrived.
                if cancel.load(Ordering::SeqCst) {
                    return StackResult::skipped(&def.name, operation, SkipReason::Aborted);
                }
                executor.execute(def, operation).await
            }
        }))
        .buffer_unordered(opts.parallelism.max(1))
        .collect()
        .await;

        for result in wave_results {
            if result.outcome.is_failure() {
                tainted.insert(result.stack.clone(), result.stack.clone());
                if !opts.continue_on_error {
                    halted = true;
                }
            }
            results.insert(result.stack.clone(), result);
        }
    }

    RunReport {
        operation,
        started,
        finished: Utc::now(),
        aborted: cancel.load(Ordering::SeqCst),
        results,
    }
}

/// Root failure behind any of this stack's plan-predecessors, if one exists.
///
/// For startup-oriented plans the predecessors are the stack's dependencies;
/// for teardown they are its dependents — a stack that failed to come down
/// protects the things it depends on from being torn down underneath it.
fn predecessor_failure(
    plan: &ExecutionPlan,
    def: &StackDefinition,
    operation: Operation,
    tainted: &BTreeMap<String, String>,
) -> Option<String> {
    if operation.is_teardown() {
        plan.stacks()
            .filter(|s| s.depends_on.contains(&def.name))
            .find_map(|s| tainted.get(&s.name))
            .cloned()
    } else {
        def.depends_on.iter().find_map(|d| tainted.get(d)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Registry;
    use crate::report::Outcome;
    use std::collections::HashSet;
    use std::future::Future;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    fn def(name: &str, deps: &[&str]) -> StackDefinition {
        StackDefinition {
            name: name.into(),
            dir: PathBuf::from(format!("/fleet/{name}")),
            compose_file: PathBuf::from(format!("/fleet/{name}/compose.yaml")),
            env_file: None,
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            external_networks: Vec::new(),
        }
    }

    fn plan(defs: Vec<StackDefinition>) -> ExecutionPlan {
        let reg = Registry::from_stacks(defs).unwrap();
        ExecutionPlan::build(&reg, None).unwrap()
    }

    /// Scripted executor: named stacks fail or time out, everything else
    /// succeeds after an optional delay. Records dispatch order and the peak
    /// number of concurrent invocations.
    #[derive(Default)]
    struct ScriptedExecutor {
        fail: HashSet<String>,
        time_out: HashSet<String>,
        delay: Option<Duration>,
        calls: Mutex<Vec<String>>,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedExecutor {
        fn failing(names: &[&str]) -> Self {
            Self {
                fail: names.iter().map(|n| n.to_string()).collect(),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl StackExecutor for ScriptedExecutor {
        fn execute(
            &self,
            stack: StackDefinition,
            operation: Operation,
        ) -> impl Future<Output = StackResult> + Send {
            async move {
                self.calls.lock().unwrap().push(stack.name.clone());
                let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                self.active.fetch_sub(1, Ordering::SeqCst);

                let outcome = if self.fail.contains(&stack.name) {
                    Outcome::Failed {
                        detail: "exit code 1".into(),
                    }
                } else if self.time_out.contains(&stack.name) {
                    Outcome::TimedOut { limit_secs: 1 }
                } else {
                    Outcome::Succeeded
                };
                StackResult::new(stack.name, operation, outcome, Duration::from_millis(5))
            }
        }
    }

    fn no_cancel() -> AtomicBool {
        AtomicBool::new(false)
    }

    fn serial() -> RunOptions {
        RunOptions {
            parallelism: 1,
            continue_on_error: false,
        }
    }

    #[tokio::test]
    async fn failed_dependency_skips_dependent_and_spares_the_rest() {
        let plan = plan(vec![def("net", &[]), def("db", &["net"]), def("app", &["db"])]);
        let exec = ScriptedExecutor::failing(&["db"]);
        let cancel = no_cancel();
        let report = execute(&plan, Operation::Up, &exec, &serial(), &cancel).await;

        assert_eq!(report.result("net").unwrap().outcome, Outcome::Succeeded);
        assert!(report.result("db").unwrap().outcome.is_failure());
        assert_eq!(
            report.result("app").unwrap().outcome,
            Outcome::Skipped {
                reason: SkipReason::DependencyFailed {
                    dependency: "db".into()
                }
            }
        );
        assert_eq!(report.exit_code(), 1);
        // app was never dispatched.
        assert_eq!(exec.calls(), vec!["net".to_string(), "db".into()]);
    }

    #[tokio::test]
    async fn skip_propagation_is_transitive_and_names_the_root_failure() {
        let plan = plan(vec![def("a", &[]), def("b", &["a"]), def("c", &["b"])]);
        let exec = ScriptedExecutor::failing(&["a"]);
        let cancel = no_cancel();
        let report = execute(&plan, Operation::Up, &exec, &serial(), &cancel).await;

        for name in ["b", "c"] {
            assert_eq!(
                report.result(name).unwrap().outcome,
                Outcome::Skipped {
                    reason: SkipReason::DependencyFailed {
                        dependency: "a".into()
                    }
                }
            );
        }
    }

    #[tokio::test]
    async fn waves_run_in_order_and_teardown_reverses_them() {
        let defs = vec![def("net", &[]), def("db", &["net"]), def("app", &["db"])];
        let up_plan = plan(defs.clone());
        let exec = ScriptedExecutor::default();
        let cancel = no_cancel();
        execute(&up_plan, Operation::Up, &exec, &serial(), &cancel).await;
        assert_eq!(
            exec.calls(),
            vec!["net".to_string(), "db".into(), "app".into()]
        );

        let down_plan = plan(defs).reversed();
        let exec = ScriptedExecutor::default();
        execute(&down_plan, Operation::Down, &exec, &serial(), &cancel).await;
        assert_eq!(
            exec.calls(),
            vec!["app".to_string(), "db".into(), "net".into()]
        );
    }

    #[tokio::test]
    async fn teardown_failure_protects_the_layers_below() {
        let down_plan = plan(vec![def("net", &[]), def("db", &["net"]), def("app", &["db"])])
            .reversed();
        let exec = ScriptedExecutor::failing(&["app"]);
        let cancel = no_cancel();
        let report = execute(&down_plan, Operation::Down, &exec, &serial(), &cancel).await;

        assert!(report.result("app").unwrap().outcome.is_failure());
        // db and net stay up rather than being torn down under a live app.
        assert_eq!(
            report.result("db").unwrap().outcome,
            Outcome::Skipped {
                reason: SkipReason::DependencyFailed {
                    dependency: "app".into()
                }
            }
        );
        assert!(report.result("net").unwrap().outcome.is_skipped());
    }

    #[tokio::test]
    async fn halt_on_failure_skips_unrelated_later_waves() {
        // Two independent chains: a->b and c->d. Waves: [a, c], [b, d].
        let plan = plan(vec![
            def("a", &[]),
            def("b", &["a"]),
            def("c", &[]),
            def("d", &["c"]),
        ]);
        let exec = ScriptedExecutor::failing(&["a"]);
        let cancel = no_cancel();
        let report = execute(&plan, Operation::Up, &exec, &serial(), &cancel).await;

        // c shares the failed wave and still completes.
        assert_eq!(report.result("c").unwrap().outcome, Outcome::Succeeded);
        assert_eq!(
            report.result("b").unwrap().outcome,
            Outcome::Skipped {
                reason: SkipReason::DependencyFailed {
                    dependency: "a".into()
                }
            }
        );
        assert_eq!(
            report.result("d").unwrap().outcome,
            Outcome::Skipped {
                reason: SkipReason::RunHalted
            }
        );
    }

    #[tokio::test]
    async fn continue_on_error_runs_unrelated_stacks() {
        let plan = plan(vec![
            def("a", &[]),
            def("b", &["a"]),
            def("c", &[]),
            def("d", &["c"]),
        ]);
        let exec = ScriptedExecutor::failing(&["a"]);
        let cancel = no_cancel();
        let opts = RunOptions {
            parallelism: 1,
            continue_on_error: true,
        };
        let report = execute(&plan, Operation::Up, &exec, &opts, &cancel).await;

        assert_eq!(report.result("d").unwrap().outcome, Outcome::Succeeded);
        assert!(report.result("b").unwrap().outcome.is_skipped());
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn parallelism_is_bounded_within_a_wave() {
        let plan = plan(vec![def("a", &[]), def("b", &[]), def("c", &[]), def("d", &[])]);
        let exec = ScriptedExecutor {
            delay: Some(Duration::from_millis(20)),
            ..ScriptedExecutor::default()
        };
        let cancel = no_cancel();
        let opts = RunOptions {
            parallelism: 2,
            continue_on_error: false,
        };
        execute(&plan, Operation::Pull, &exec, &opts, &cancel).await;
        assert!(exec.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(exec.calls().len(), 4);
    }

    #[tokio::test]
    async fn cancellation_skips_everything_not_yet_dispatched() {
        let plan = plan(vec![def("net", &[]), def("db", &["net"])]);
        let exec = ScriptedExecutor::default();
        let cancel = AtomicBool::new(true);
        let report = execute(&plan, Operation::Up, &exec, &serial(), &cancel).await;

        assert!(report.aborted);
        assert_eq!(report.exit_code(), 1);
        assert!(exec.calls().is_empty());
        for name in ["net", "db"] {
            assert_eq!(
                report.result(name).unwrap().outcome,
                Outcome::Skipped {
                    reason: SkipReason::Aborted
                }
            );
        }
    }

    #[tokio::test]
    async fn repeated_runs_over_unchanged_fleet_agree() {
        let defs = vec![def("net", &[]), def("db", &["net"]), def("app", &["db"])];
        let cancel = no_cancel();

        let mut success_sets = Vec::new();
        for _ in 0..2 {
            let exec = ScriptedExecutor::failing(&["db"]);
            let report = execute(&plan(defs.clone()), Operation::Up, &exec, &serial(), &cancel).await;
            let set: Vec<String> = report
                .results
                .values()
                .filter(|r| r.outcome == Outcome::Succeeded)
                .map(|r| r.stack.clone())
                .collect();
            success_sets.push(set);
        }
        assert_eq!(success_sets[0], success_sets[1]);
    }

    #[tokio::test]
    async fn timeout_outcome_taints_dependents() {
        let plan = plan(vec![def("db", &[]), def("app", &["db"])]);
        let exec = ScriptedExecutor {
            time_out: ["db".to_string()].into(),
            ..ScriptedExecutor::default()
        };
        let cancel = no_cancel();
        let report = execute(&plan, Operation::Up, &exec, &serial(), &cancel).await;

        assert!(report.result("db").unwrap().outcome.is_failure());
        assert!(report.result("app").unwrap().outcome.is_skipped());
    }
}
