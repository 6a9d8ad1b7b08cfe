//! Per-stack results and the per-run report.
//!
//! A `RunReport` is built once at the end of a run and never mutated; the CLI
//! layer only reads it — rendering one line per stack plus a fleet summary,
//! and deriving the process exit code.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::types::Operation;

// ---------------------------------------------------------------------------
// Outcome / SkipReason
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// A direct or transitive plan-predecessor failed.
    DependencyFailed { dependency: String },
    /// An earlier wave failed and continue-on-error is off.
    RunHalted,
    /// The operator interrupted the run before this stack was dispatched.
    Aborted,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::DependencyFailed { dependency } => {
                write!(f, "dependency '{dependency}' failed")
            }
            SkipReason::RunHalted => f.write_str("run halted after earlier failure"),
            SkipReason::Aborted => f.write_str("run aborted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    /// The external lifecycle action returned a nonzero status.
    Failed { detail: String },
    /// The action exceeded its bound and the process was terminated.
    TimedOut { limit_secs: u64 },
    Skipped { reason: SkipReason },
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. } | Outcome::TimedOut { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped { .. })
    }

    fn label(&self) -> &'static str {
        match self {
            Outcome::Succeeded => "ok",
            Outcome::Failed { .. } => "FAIL",
            Outcome::TimedOut { .. } => "TIME",
            Outcome::Skipped { .. } => "skip",
        }
    }
}

// ---------------------------------------------------------------------------
// StackResult
// ---------------------------------------------------------------------------

/// The terminal record for one stack in one run. Immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct StackResult {
    pub stack: String,
    pub operation: Operation,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub duration_ms: u64,
}

impl StackResult {
    pub fn new(stack: impl Into<String>, operation: Operation, outcome: Outcome, duration: Duration) -> Self {
        Self {
            stack: stack.into(),
            operation,
            outcome,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn skipped(stack: impl Into<String>, operation: Operation, reason: SkipReason) -> Self {
        Self::new(stack, operation, Outcome::Skipped { reason }, Duration::ZERO)
    }
}

// ---------------------------------------------------------------------------
// RunReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub operation: Operation,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    /// True when the operator interrupted the run; remaining stacks were
    /// skipped rather than silently dropped.
    pub aborted: bool,
    pub results: BTreeMap<String, StackResult>,
}

impl RunReport {
    pub fn result(&self, stack: &str) -> Option<&StackResult> {
        self.results.get(stack)
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Succeeded))
    }

    pub fn failed(&self) -> usize {
        self.count(Outcome::is_failure)
    }

    pub fn skipped(&self) -> usize {
        self.count(Outcome::is_skipped)
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.results.values().filter(|r| pred(&r.outcome)).count()
    }

    /// Zero only if every non-skipped stack succeeded and the run was not
    /// aborted. Validation errors never reach a report; the CLI maps those
    /// to exit code 2 before execution starts.
    pub fn exit_code(&self) -> i32 {
        if self.failed() > 0 || self.aborted {
            1
        } else {
            0
        }
    }

    /// Human-readable summary: one line per stack, then fleet totals.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let width = self
            .results
            .keys()
            .map(String::len)
            .max()
            .unwrap_or(0)
            .max(5);

        for r in self.results.values() {
            let detail = match &r.outcome {
                Outcome::Succeeded => String::new(),
                Outcome::Failed { detail } => {
                    format!("  {}", detail.lines().next().unwrap_or_default())
                }
                Outcome::TimedOut { limit_secs } => format!("  timed out after {limit_secs}s"),
                Outcome::Skipped { reason } => format!("  {reason}"),
            };
            out.push_str(&format!(
                " {:<4} {:<width$}  {:>8}{}\n",
                r.outcome.label(),
                r.stack,
                format_duration(Duration::from_millis(r.duration_ms)),
                detail,
            ));
        }

        let wall = (self.finished - self.started)
            .to_std()
            .unwrap_or(Duration::ZERO);
        out.push_str(&format!(
            "{} {}: {} succeeded, {} failed, {} skipped in {}\n",
            self.results.len(),
            if self.results.len() == 1 { "stack" } else { "stacks" },
            self.succeeded(),
            self.failed(),
            self.skipped(),
            format_duration(wall),
        ));
        if self.aborted {
            out.push_str("run aborted by operator\n");
        }
        out
    }
}

/// Compact `1.2s` / `2m 03s` / `1h 02m` formatting for report lines.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(results: Vec<StackResult>, aborted: bool) -> RunReport {
        let now = Utc::now();
        RunReport {
            operation: Operation::Up,
            started: now,
            finished: now,
            aborted,
            results: results.into_iter().map(|r| (r.stack.clone(), r)).collect(),
        }
    }

    fn ok(stack: &str) -> StackResult {
        StackResult::new(stack, Operation::Up, Outcome::Succeeded, Duration::from_millis(1200))
    }

    fn failed(stack: &str) -> StackResult {
        StackResult::new(
            stack,
            Operation::Up,
            Outcome::Failed {
                detail: "exit code 1: no such image".into(),
            },
            Duration::from_millis(400),
        )
    }

    #[test]
    fn all_success_exits_zero() {
        let r = report(vec![ok("net"), ok("db")], false);
        assert_eq!(r.exit_code(), 0);
        assert_eq!(r.succeeded(), 2);
    }

    #[test]
    fn any_failure_exits_one() {
        let r = report(
            vec![
                ok("net"),
                failed("db"),
                StackResult::skipped(
                    "app",
                    Operation::Up,
                    SkipReason::DependencyFailed {
                        dependency: "db".into(),
                    },
                ),
            ],
            false,
        );
        assert_eq!(r.exit_code(), 1);
        assert_eq!(r.failed(), 1);
        assert_eq!(r.skipped(), 1);
    }

    #[test]
    fn skips_alone_do_not_fail_the_run() {
        let r = report(
            vec![
                ok("net"),
                StackResult::skipped("app", Operation::Up, SkipReason::RunHalted),
            ],
            false,
        );
        assert_eq!(r.exit_code(), 0);
    }

    #[test]
    fn aborted_run_exits_one() {
        let r = report(vec![ok("net")], true);
        assert_eq!(r.exit_code(), 1);
        assert!(r.render().contains("run aborted by operator"));
    }

    #[test]
    fn timeout_counts_as_failure() {
        let r = report(
            vec![StackResult::new(
                "db",
                Operation::Pull,
                Outcome::TimedOut { limit_secs: 30 },
                Duration::from_secs(30),
            )],
            false,
        );
        assert_eq!(r.exit_code(), 1);
        assert!(r.render().contains("timed out after 30s"));
    }

    #[test]
    fn render_emits_one_line_per_stack_plus_summary() {
        let r = report(vec![ok("net"), failed("db")], false);
        let text = r.render();
        assert!(text.contains("net"));
        assert!(text.contains("db"));
        assert!(text.contains("2 stacks: 1 succeeded, 1 failed, 0 skipped"));
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(Duration::from_millis(1234)), "1.2s");
        assert_eq!(format_duration(Duration::from_secs(123)), "2m 03s");
        assert_eq!(format_duration(Duration::from_secs(3720)), "1h 02m");
    }
}
