//! Update planning and the per-package apply loop.
//!
//! Plans are processed in planning order; plans sharing a group are
//! contiguous and atomic with respect to after-each validation. The
//! executor is the sole mutator of a plan's result.
use crate::classify::{OutdatedResult, OutdatedStatus};
use crate::command::{CommandLine, CommandRunner, Error as CommandError, ExecContext};
use crate::config::rule::UpdateCfg;
use crate::config::system_tests::RunMode;
use crate::config::Config;
use crate::logging::{Log, Verbosity, WarningSink};
use crate::package::Package;
use crate::resolve;
use crate::systest::{self, SuiteOutcome};
use crate::template;
use crate::version::Version;

/// Status of one applied (or planned) update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// The update command ran successfully.
    Updated,
    /// Dry-run: the update would have been applied.
    Planned,
    /// Nothing newer to apply.
    UpToDate,
    /// The package was not actionable (no permissible target, floating,
    /// ignored, or unsupported).
    Skipped,
    /// The update or lock command failed.
    Failed,
}

impl std::fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Updated => "Updated",
            Self::Planned => "Planned",
            Self::UpToDate => "UpToDate",
            Self::Skipped => "Skipped",
            Self::Failed => "Failed",
        };
        write!(f, "{text}")
    }
}

impl serde::Serialize for UpdateStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

/// One package's update outcome, streamed to the output writer as soon as
/// it is known.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UpdateResult {
    #[serde(flatten)]
    pub package: Package,
    /// The selected target version, when one existed.
    pub target: Option<Version>,
    /// Installed version from the baseline snapshot.
    pub before: Option<String>,
    /// Installed version observed after the update.
    pub after: Option<String>,
    pub status: UpdateStatus,
    pub error: Option<String>,
}

/// A package together with its resolved update configuration and target.
#[derive(Debug, Clone)]
pub struct UpdatePlan {
    /// The classified outcome the plan is based on.
    pub outcome: OutdatedResult,
    /// The rule's update commands, when the rule has any.
    pub update: Option<UpdateCfg>,
    /// Group label; plans of the same group run contiguously.
    pub group: Option<String>,
}

impl UpdatePlan {
    /// Whether the executor has a command to run for this plan.
    #[must_use]
    pub fn actionable(&self) -> bool {
        self.outcome.status == OutdatedStatus::Outdated
            && self.outcome.target.is_some()
            && self.update.is_some()
    }

    #[must_use]
    pub fn package(&self) -> &Package {
        &self.outcome.package
    }

    /// A result row describing what this plan would do, used for the plan
    /// preview and for reserving table column widths before the run.
    #[must_use]
    pub fn provisional_result(&self) -> UpdateResult {
        let package = self.package().clone();
        let before = package.installed.clone();
        let status = if self.actionable() {
            UpdateStatus::Planned
        } else {
            match self.outcome.status {
                OutdatedStatus::UpToDate => UpdateStatus::UpToDate,
                OutdatedStatus::Failed(_) => UpdateStatus::Failed,
                _ => UpdateStatus::Skipped,
            }
        };
        UpdateResult {
            package,
            target: self.outcome.target.clone(),
            before: before.clone(),
            after: self.outcome.target.as_ref().map(|t| t.raw.clone()).or(before),
            status,
            error: self.outcome.error.clone(),
        }
    }
}

/// Plans in planning order with same-group plans placed contiguously.
#[derive(Debug, Clone, Default)]
pub struct GroupedPlans {
    groups: Vec<(Option<String>, Vec<UpdatePlan>)>,
}

impl GroupedPlans {
    /// Build plans from classified results, preserving input ordering while
    /// pulling plans of the same group together at the group's first
    /// occurrence.
    #[must_use]
    pub fn new(results: Vec<OutdatedResult>, config: &Config) -> Self {
        let mut groups: Vec<(Option<String>, Vec<UpdatePlan>)> = Vec::new();
        for outcome in results {
            let update = config
                .rules
                .get(&outcome.package.rule)
                .and_then(|rule| rule.update.clone());
            let group = outcome.package.group.clone();
            let plan = UpdatePlan {
                outcome,
                update,
                group: group.clone(),
            };
            match group {
                Some(label) => {
                    if let Some((_, members)) = groups
                        .iter_mut()
                        .find(|(key, _)| key.as_deref() == Some(label.as_str()))
                    {
                        members.push(plan);
                    } else {
                        groups.push((Some(label), vec![plan]));
                    }
                }
                None => groups.push((None, vec![plan])),
            }
        }
        Self { groups }
    }

    /// Iterate all plans in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &UpdatePlan> {
        self.groups.iter().flat_map(|(_, plans)| plans.iter())
    }

    /// Iterate contiguous groups in execution order.
    pub fn groups(&self) -> impl Iterator<Item = &[UpdatePlan]> {
        self.groups.iter().map(|(_, plans)| plans.as_slice())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, plans)| plans.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many plans will actually run a command.
    #[must_use]
    pub fn actionable_count(&self) -> usize {
        self.iter().filter(|plan| plan.actionable()).count()
    }
}

/// Executor switches resolved from CLI flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    pub dry_run: bool,
    pub skip_lock: bool,
    pub continue_on_fail: bool,
    pub skip_system_tests: bool,
}

/// Everything the executor learned during one run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub results: Vec<UpdateResult>,
    /// System-test suites executed after groups.
    pub suites: Vec<SuiteOutcome>,
    /// The run stopped early (failure without `--continue-on-fail`,
    /// critical system-test failure, or cancellation).
    pub aborted: bool,
}

impl ExecutionReport {
    #[must_use]
    pub fn updated_count(&self) -> usize {
        self.results
            .iter()
            .filter(|result| result.status == UpdateStatus::Updated)
            .count()
    }
}

/// Apply grouped plans in order, streaming each result through `on_result`.
///
/// Per-package failures become `Failed` results; without
/// `continue_on_fail` the run aborts after finishing the in-flight group.
pub async fn execute(
    plans: &GroupedPlans,
    config: &Config,
    runner: &dyn CommandRunner,
    ctx: &ExecContext,
    logger: &dyn Log,
    warnings: &WarningSink,
    options: UpdateOptions,
    mut on_result: impl FnMut(&UpdateResult),
) -> ExecutionReport {
    let mut report = ExecutionReport::default();

    'groups: for group in plans.groups() {
        let mut group_updated = false;
        let mut abort_after_group = false;
        for plan in group {
            let (mut result, cancelled) = apply_plan(plan, runner, ctx, logger, options).await;
            group_updated |= result.status == UpdateStatus::Updated;
            let failed = result.status == UpdateStatus::Failed;

            // reload the installed version before the row is streamed, so
            // `after` reflects what the ecosystem actually wrote
            if result.status == UpdateStatus::Updated {
                reload_installed(&mut result, config, runner, ctx, warnings).await;
            }
            on_result(&result);
            report.results.push(result);

            if cancelled {
                report.aborted = true;
                break 'groups;
            }
            if failed && !options.continue_on_fail {
                // the in-flight group still finishes; nothing after it runs
                abort_after_group = true;
            }
        }

        // plans within a group are atomic with respect to after-each
        // validation
        if group_updated && !options.dry_run && !options.skip_system_tests {
            let suite = systest::run(
                config.system_tests.as_ref(),
                RunMode::AfterEach,
                runner,
                ctx,
                logger,
            )
            .await;
            if !suite.outcomes.is_empty() {
                let stop = config
                    .system_tests
                    .as_ref()
                    .is_some_and(|cfg| cfg.stop_on_fail)
                    && suite.critical_failure().is_some();
                if let Some(failure) = suite.critical_failure() {
                    warnings.warn(format!(
                        "system test {:?} failed after group; consider rolling back the last update",
                        failure.name
                    ));
                }
                report.suites.push(suite);
                if stop {
                    report.aborted = true;
                    break 'groups;
                }
            }
        }

        if abort_after_group {
            report.aborted = true;
            break 'groups;
        }
    }

    report
}

/// Apply one plan. The second value reports whether a child process was
/// interrupted by the run's cancellation token; the typed error carries it,
/// the stringified `error` field does not.
async fn apply_plan(
    plan: &UpdatePlan,
    runner: &dyn CommandRunner,
    ctx: &ExecContext,
    logger: &dyn Log,
    options: UpdateOptions,
) -> (UpdateResult, bool) {
    let package = plan.package().clone();
    let before = package.installed.clone();
    let target = plan.outcome.target.clone();

    let mut result = UpdateResult {
        package,
        target: target.clone(),
        before: before.clone(),
        after: before.clone(),
        status: UpdateStatus::Skipped,
        error: plan.outcome.error.clone(),
    };

    match plan.outcome.status {
        OutdatedStatus::UpToDate => {
            result.status = UpdateStatus::UpToDate;
            return (result, false);
        }
        OutdatedStatus::Failed(_) => {
            result.status = UpdateStatus::Failed;
            return (result, false);
        }
        OutdatedStatus::Floating
        | OutdatedStatus::Ignored
        | OutdatedStatus::NotConfigured => {
            return (result, false);
        }
        OutdatedStatus::Outdated => {}
    }

    let (Some(target), Some(update)) = (target, plan.update.as_ref()) else {
        // outdated but nothing permissible to do
        return (result, false);
    };

    if before.as_deref() == Some(target.raw.as_str()) {
        result.status = UpdateStatus::UpToDate;
        return (result, false);
    }

    if options.dry_run {
        logger.log(
            Verbosity::Low,
            &format!(
                "would update {} {} -> {}",
                result.package.name,
                before.as_deref().unwrap_or("?"),
                target.raw
            ),
        );
        result.status = UpdateStatus::Planned;
        result.after = Some(target.raw.clone());
        return (result, false);
    }

    if let Err(err) = run_update_command(&update.command, &result.package, &target, runner, ctx).await
    {
        let cancelled = err.is_cancelled();
        result.status = UpdateStatus::Failed;
        result.error = Some(err.to_string());
        return (result, cancelled);
    }

    if !options.skip_lock {
        if let Some(lock_command) = &update.lock_command {
            if let Err(err) =
                run_update_command(lock_command, &result.package, &target, runner, ctx).await
            {
                let cancelled = err.is_cancelled();
                result.status = UpdateStatus::Failed;
                result.error = Some(err.to_string());
                return (result, cancelled);
            }
        }
    }

    result.status = UpdateStatus::Updated;
    result.after = Some(target.raw.clone());
    logger.log(
        Verbosity::Low,
        &format!(
            "updated {} {} -> {}",
            result.package.name,
            before.as_deref().unwrap_or("?"),
            target.raw
        ),
    );
    (result, false)
}

async fn run_update_command(
    script: &str,
    package: &Package,
    target: &Version,
    runner: &dyn CommandRunner,
    ctx: &ExecContext,
) -> Result<(), CommandError> {
    let script = template::substitute_update(script, &package.name, &target.raw);
    let command = CommandLine::parse(&script)?;
    tracing::debug!(package = %package.name, command = %command, "applying update");
    runner.run(&command, ctx).await.map(|_| ())
}

/// Re-read the installed version for one updated package so `after`
/// reflects what the ecosystem actually wrote, not the requested target.
async fn reload_installed(
    result: &mut UpdateResult,
    config: &Config,
    runner: &dyn CommandRunner,
    ctx: &ExecContext,
    warnings: &WarningSink,
) {
    let reloaded =
        resolve::resolve(vec![result.package.clone()], config, runner, ctx, warnings).await;
    if let Some(installed) = reloaded
        .into_iter()
        .next()
        .and_then(|package| package.installed)
    {
        result.after = Some(installed);
    }
}
