//! Result envelopes and the exit-code policy.
use crate::classify::{OutdatedResult, OutdatedStatus};
use crate::update::{UpdateResult, UpdateStatus};
use indexmap::IndexMap;
use serde::Serialize;

/// Process exit codes, the run's outward contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// No failures.
    Success = 0,
    /// At least one package succeeded, at least one failed, and
    /// `--continue-on-fail` was set.
    PartialFailure = 1,
    /// One or more failures without the partial-success qualifier.
    Failure = 2,
    /// Configuration, preflight, or validation failure.
    ConfigError = 3,
}

impl ExitCode {
    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Log the chosen code and reason on every exit path.
    pub fn log(self, reason: &str) -> Self {
        tracing::debug!(code = self.code(), reason, "exit");
        self
    }
}

/// Derive the exit code from success/failure counts.
///
/// `succeeded` is deliberately strict for update runs: only `Updated`
/// results qualify, so a dry run with failures always degrades to a
/// complete failure.
#[must_use]
pub fn exit_code(succeeded: usize, failed: usize, continue_on_fail: bool) -> ExitCode {
    if failed == 0 {
        ExitCode::Success
    } else if succeeded > 0 && continue_on_fail {
        ExitCode::PartialFailure
    } else {
        ExitCode::Failure
    }
}

/// The single structured document emitted for a run.
#[derive(Debug, Clone, Serialize)]
pub struct Report<T: Serialize> {
    /// Per-status counts.
    pub summary: IndexMap<String, usize>,
    pub packages: Vec<T>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

fn count<T>(items: &[T], label: &str, matches: impl Fn(&T) -> bool) -> (String, usize) {
    (label.to_string(), items.iter().filter(|i| matches(i)).count())
}

/// Envelope for `outdated` runs.
#[must_use]
pub fn outdated_report(results: Vec<OutdatedResult>, warnings: Vec<String>) -> Report<OutdatedResult> {
    let summary = IndexMap::from_iter([
        count(&results, "outdated", |r| r.status == OutdatedStatus::Outdated),
        count(&results, "up_to_date", |r| r.status == OutdatedStatus::UpToDate),
        count(&results, "failed", |r| r.status.is_failure()),
        count(&results, "floating", |r| r.status == OutdatedStatus::Floating),
        count(&results, "ignored", |r| r.status == OutdatedStatus::Ignored),
        count(&results, "not_configured", |r| {
            r.status == OutdatedStatus::NotConfigured
        }),
    ]);
    let errors = results
        .iter()
        .filter(|result| result.status.is_failure())
        .filter_map(|result| result.error.clone())
        .collect();
    Report {
        summary,
        packages: results,
        warnings,
        errors,
    }
}

/// Envelope for `update` runs.
#[must_use]
pub fn update_report(results: Vec<UpdateResult>, warnings: Vec<String>) -> Report<UpdateResult> {
    let summary = IndexMap::from_iter([
        count(&results, "updated", |r| r.status == UpdateStatus::Updated),
        count(&results, "planned", |r| r.status == UpdateStatus::Planned),
        count(&results, "up_to_date", |r| r.status == UpdateStatus::UpToDate),
        count(&results, "skipped", |r| r.status == UpdateStatus::Skipped),
        count(&results, "failed", |r| r.status == UpdateStatus::Failed),
    ]);
    let errors = results
        .iter()
        .filter(|result| result.status == UpdateStatus::Failed)
        .filter_map(|result| result.error.clone())
        .collect();
    Report {
        summary,
        packages: results,
        warnings,
        errors,
    }
}

/// Exit code for an `outdated` run: a successfully checked package counts
/// as a success.
#[must_use]
pub fn outdated_exit(results: &[OutdatedResult], continue_on_fail: bool) -> ExitCode {
    let failed = results.iter().filter(|r| r.status.is_failure()).count();
    let succeeded = results
        .iter()
        .filter(|r| {
            matches!(
                r.status,
                OutdatedStatus::Outdated | OutdatedStatus::UpToDate
            )
        })
        .count();
    exit_code(succeeded, failed, continue_on_fail)
}

/// Exit code for an `update` run: only `Updated` results count as
/// successes, so dry runs cannot reach partial success.
#[must_use]
pub fn update_exit(results: &[UpdateResult], continue_on_fail: bool) -> ExitCode {
    let failed = results
        .iter()
        .filter(|r| r.status == UpdateStatus::Failed)
        .count();
    let succeeded = results
        .iter()
        .filter(|r| r.status == UpdateStatus::Updated)
        .count();
    exit_code(succeeded, failed, continue_on_fail)
}
