#![forbid(unsafe_code)]

//! Multi-ecosystem dependency update orchestration.
//!
//! The pipeline: config, manifest discovery and parsing, installed-version
//! resolution, filtering, preflight, version query, classification, update
//! planning and execution, result reporting. Every ecosystem is described
//! by a configuration rule; the engine itself hard-codes none.

pub mod classify;
pub mod command;
pub mod config;
pub mod filter;
pub mod logging;
pub mod manifest;
pub mod output;
pub mod package;
pub mod preflight;
pub mod query;
pub mod report;
pub mod resolve;
pub mod systest;
pub mod template;
pub mod update;
pub mod version;

use crate::classify::{OutdatedResult, OutdatedStatus, Selection};
use crate::command::{CommandRunner, ExecContext};
use crate::config::system_tests::RunMode;
use crate::config::{Config, Rule};
use crate::filter::Filters;
use crate::logging::{Log, Verbosity, WarningSink};
use crate::manifest::ManifestFile;
use crate::package::Package;
use crate::systest::SuiteOutcome;
use crate::update::{ExecutionReport, GroupedPlans, UpdateOptions, UpdateResult};
use crate::version::Scheme;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default per-command deadline.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
/// Bound on concurrently running version-query child processes.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Errors surfaced by the orchestrator.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::Error),
    #[error(transparent)]
    Manifest(#[from] manifest::Error),
    #[error(transparent)]
    Preflight(#[from] preflight::Error),
    /// A critical system-test failure during preflight.
    #[error("system test {name:?} failed during preflight")]
    PreflightTest {
        /// The failing test.
        name: String,
    },
    #[error(transparent)]
    Output(#[from] output::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Map an orchestrator error onto the exit-code contract.
    #[must_use]
    pub fn exit_code(&self) -> report::ExitCode {
        match self {
            Self::Config(_) | Self::Preflight(_) | Self::PreflightTest { .. } => {
                report::ExitCode::ConfigError
            }
            Self::Manifest(_) | Self::Output(_) | Self::Io(_) => report::ExitCode::Failure,
        }
    }
}

/// Confirmation seam: the executor asks before applying updates.
pub trait Prompt {
    /// Ask for a y/N confirmation. Any answer but `y`/`yes` declines.
    ///
    /// # Errors
    /// When the input stream cannot be read; callers treat this as a
    /// declined confirmation.
    fn confirm(&mut self, message: &str) -> std::io::Result<bool>;
}

/// Reads confirmations from standard input.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinPrompt {}

impl Prompt for StdinPrompt {
    fn confirm(&mut self, message: &str) -> std::io::Result<bool> {
        use std::io::{BufRead, Write};
        let mut stderr = std::io::stderr();
        write!(stderr, "{message}")?;
        stderr.flush()?;
        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer)?;
        let answer = answer.trim();
        Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
    }
}

/// Always answers yes; used for `--yes` and structured-output runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes {}

impl Prompt for AssumeYes {
    fn confirm(&mut self, _: &str) -> std::io::Result<bool> {
        Ok(true)
    }
}

/// Flags shared by the pipeline commands.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub selection: Selection,
    pub filters: Filters,
    pub no_timeout: bool,
    pub skip_preflight: bool,
    pub continue_on_fail: bool,
    pub incremental: bool,
    pub dry_run: bool,
    pub skip_lock: bool,
    /// Skip the plan preview and confirmation.
    pub yes: bool,
    pub skip_system_tests: bool,
    /// Bound on parallel version queries; the default when zero.
    pub concurrency: usize,
}

impl RunOptions {
    fn concurrency(&self) -> usize {
        if self.concurrency == 0 {
            DEFAULT_CONCURRENCY
        } else {
            self.concurrency
        }
    }
}

/// Outcome of an `update` run, streamed results included.
#[derive(Debug, Clone, Default)]
pub struct UpdateRun {
    pub results: Vec<UpdateResult>,
    pub suites: Vec<SuiteOutcome>,
    /// The user declined the confirmation prompt.
    pub declined: bool,
    /// The run stopped before processing every plan.
    pub aborted: bool,
    /// The after-all validation suite failed critically.
    pub validation_failed: bool,
}

/// The orchestration engine with its explicit dependency set.
///
/// Collaborators are passed at construction: the command runner executes
/// child processes, the prompter reads confirmations, the logger carries
/// progress output. Tests substitute any of them.
pub struct Orchestrator<P, L> {
    pub config: Config,
    pub working_dir: PathBuf,
    pub options: RunOptions,
    pub runner: Arc<dyn CommandRunner>,
    pub prompter: P,
    pub logger: L,
    pub warnings: WarningSink,
    pub cancel: CancellationToken,
}

impl<P, L> Orchestrator<P, L>
where
    P: Prompt,
    L: Log,
{
    /// Execution context with the pipeline-wide deadline.
    fn base_ctx(&self) -> ExecContext {
        let timeout = if self.options.no_timeout {
            None
        } else {
            Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        };
        ExecContext::new(&self.working_dir)
            .with_timeout(timeout)
            .with_cancel(self.cancel.clone())
    }

    /// Execution context honoring a rule's own deadline.
    fn rule_ctx(&self, rule: Option<&Rule>) -> ExecContext {
        let ctx = self.base_ctx();
        match rule.and_then(|rule| rule.timeout_seconds) {
            Some(seconds) if !self.options.no_timeout => {
                ctx.with_timeout(Some(Duration::from_secs(seconds)))
            }
            _ => ctx,
        }
    }

    /// List manifest files matched by the enabled rules, restricted by the
    /// positional file patterns.
    ///
    /// # Errors
    /// When glob expansion fails.
    pub fn scan(&self) -> Result<Vec<ManifestFile>, Error> {
        let manifests = manifest::discover(&self.config, &self.working_dir)?;
        Ok(manifests
            .into_iter()
            .filter(|m| self.options.filters.matches_file(&m.path))
            .collect())
    }

    /// Discover, parse, and resolve all packages, filters applied.
    ///
    /// A malformed manifest aborts only that file; the failure degrades to
    /// a warning and the remaining files continue.
    ///
    /// # Errors
    /// When discovery fails.
    pub async fn list(&self) -> Result<Vec<Package>, Error> {
        let manifests = self.scan()?;
        let mut packages = Vec::new();
        for found in &manifests {
            let Some(rule) = self.config.rules.get(&found.rule) else {
                continue;
            };
            let ctx = self.rule_ctx(Some(rule));
            match manifest::parse_manifest(&found.rule, rule, &found.path, self.runner.as_ref(), &ctx)
                .await
            {
                Ok(parsed) => packages.extend(parsed),
                Err(err) => self
                    .warnings
                    .warn(format!("skipping {}: {err}", found.path.display())),
            }
        }

        let packages = resolve::resolve(
            packages,
            &self.config,
            self.runner.as_ref(),
            &self.base_ctx(),
            &self.warnings,
        )
        .await;

        Ok(filter::apply(packages, &self.options.filters))
    }

    /// Verify required binaries and run the preflight system-test scope.
    ///
    /// # Errors
    /// `Error::Preflight` for missing binaries, `Error::PreflightTest` for
    /// a critical system-test failure with `stop_on_fail`.
    async fn run_preflight(&self, packages: &[Package]) -> Result<(), Error> {
        if !self.options.skip_preflight {
            let rules: std::collections::BTreeSet<&str> =
                packages.iter().map(|p| p.rule.as_str()).collect();
            preflight::check(&self.config, rules)?;
        }

        if self.options.skip_system_tests {
            return Ok(());
        }
        let suite = systest::run(
            self.config.system_tests.as_ref(),
            RunMode::Preflight,
            self.runner.as_ref(),
            &self.base_ctx(),
            &self.logger,
        )
        .await;
        if let Some(failure) = suite.critical_failure() {
            let stop = self
                .config
                .system_tests
                .as_ref()
                .is_some_and(|cfg| cfg.stop_on_fail);
            if stop {
                return Err(Error::PreflightTest {
                    name: failure.name.clone(),
                });
            }
            self.warnings
                .warn(format!("preflight system test {:?} failed", failure.name));
        }
        Ok(())
    }

    /// Version-check every operable package, streaming each classified
    /// result through `on_result` in package order.
    ///
    /// Queries run in parallel, bounded by the pipeline's concurrency
    /// limit; result order still equals package order.
    ///
    /// # Errors
    /// On discovery, preflight, or critical preflight-test failures.
    pub async fn outdated(
        &self,
        mut on_result: impl FnMut(&OutdatedResult),
    ) -> Result<Vec<OutdatedResult>, Error> {
        let packages = self.list().await?;
        self.run_preflight(&packages).await?;

        // compile each rule's versioning descriptor once
        let mut schemes: HashMap<String, Scheme> = HashMap::new();
        for (id, rule) in &self.config.rules {
            if let Some(outdated) = &rule.outdated {
                match Scheme::new(&outdated.versioning) {
                    Ok(scheme) => {
                        schemes.insert(id.clone(), scheme);
                    }
                    Err(err) => self.warnings.warn(format!("rule {id}: {err}")),
                }
            }
        }

        let selection = self.options.selection;
        let incremental = self.options.incremental;
        let runner = self.runner.as_ref();
        let jobs = packages.into_iter().map(|package| {
            let rule = self.config.rules.get(&package.rule);
            let scheme = schemes.get(&package.rule).cloned().unwrap_or_default();
            let ctx = self.rule_ctx(rule);
            async move {
                match rule {
                    Some(rule) => {
                        query::check_package(
                            package,
                            rule,
                            &scheme,
                            runner,
                            &ctx,
                            selection,
                            incremental,
                        )
                        .await
                    }
                    None => OutdatedResult::without_candidates(
                        package,
                        OutdatedStatus::NotConfigured,
                        None,
                    ),
                }
            }
        });

        let stream = futures::stream::iter(jobs).buffered(self.options.concurrency());
        futures::pin_mut!(stream);
        let mut results = Vec::new();
        while let Some(result) = stream.next().await {
            on_result(&result);
            results.push(result);
        }
        Ok(results)
    }

    /// Run the outdated pipeline and fold the classified results into
    /// grouped update plans.
    ///
    /// # Errors
    /// On discovery, preflight, or critical preflight-test failures.
    pub async fn plan(&self) -> Result<GroupedPlans, Error> {
        let outcomes = self.outdated(|_| {}).await?;
        Ok(GroupedPlans::new(outcomes, &self.config))
    }

    /// Plan and apply updates, streaming each result through `on_result`.
    ///
    /// # Errors
    /// See [`Orchestrator::plan`] and [`Orchestrator::apply`].
    pub async fn update(
        &mut self,
        preview: impl FnMut(&GroupedPlans) -> Result<(), Error>,
        on_result: impl FnMut(&UpdateResult),
    ) -> Result<UpdateRun, Error> {
        let plans = self.plan().await?;
        self.apply(&plans, preview, on_result).await
    }

    /// Apply grouped plans, streaming each result through `on_result`.
    ///
    /// In non-dry-run mode without `--yes`, `preview` renders the plan
    /// table and the prompter is asked for confirmation; declining (or a
    /// read failure) cancels the run with success.
    ///
    /// # Errors
    /// On preview failures.
    pub async fn apply(
        &mut self,
        plans: &GroupedPlans,
        mut preview: impl FnMut(&GroupedPlans) -> Result<(), Error>,
        mut on_result: impl FnMut(&UpdateResult),
    ) -> Result<UpdateRun, Error> {
        let mut run = UpdateRun::default();
        if !self.options.dry_run && !self.options.yes {
            preview(plans)?;
            let message = format!(
                "apply {} update(s)? [y/N] ",
                plans.actionable_count()
            );
            let confirmed = self.prompter.confirm(&message).unwrap_or(false);
            if !confirmed {
                self.logger.log(Verbosity::Low, "cancelled");
                run.declined = true;
                return Ok(run);
            }
        }

        let exec_options = UpdateOptions {
            dry_run: self.options.dry_run,
            skip_lock: self.options.skip_lock,
            continue_on_fail: self.options.continue_on_fail,
            skip_system_tests: self.options.skip_system_tests,
        };
        let ctx = self.base_ctx();
        let report: ExecutionReport = update::execute(
            plans,
            &self.config,
            self.runner.as_ref(),
            &ctx,
            &self.logger,
            &self.warnings,
            exec_options,
            &mut on_result,
        )
        .await;

        // after-all validation runs only when something was actually updated
        if report.updated_count() > 0 && !self.options.skip_system_tests {
            let suite = systest::run(
                self.config.system_tests.as_ref(),
                RunMode::AfterAll,
                self.runner.as_ref(),
                &ctx,
                &self.logger,
            )
            .await;
            if let Some(failure) = suite.critical_failure() {
                self.warnings.warn(format!(
                    "system test {:?} failed after updates; consider rolling back",
                    failure.name
                ));
                if self
                    .config
                    .system_tests
                    .as_ref()
                    .is_some_and(|cfg| cfg.stop_on_fail)
                {
                    run.validation_failed = true;
                }
            }
            if !suite.outcomes.is_empty() {
                run.suites.push(suite);
            }
        }

        run.aborted = report.aborted;
        run.suites.extend(report.suites.clone());
        run.results = report.results;
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::FakeRunner;
    use crate::config::defaults;
    use crate::logging::NoOpLogger;
    use indoc::indoc;
    use std::fs;

    struct DenyingPrompt {
        asked: bool,
    }

    impl Prompt for DenyingPrompt {
        fn confirm(&mut self, _: &str) -> std::io::Result<bool> {
            self.asked = true;
            Ok(false)
        }
    }

    fn orchestrator(
        dir: &std::path::Path,
        runner: FakeRunner,
        options: RunOptions,
    ) -> Orchestrator<AssumeYes, NoOpLogger> {
        Orchestrator {
            config: defaults::config(),
            working_dir: dir.to_path_buf(),
            options,
            runner: Arc::new(runner),
            prompter: AssumeYes::default(),
            logger: NoOpLogger::default(),
            warnings: WarningSink::new(),
            cancel: CancellationToken::new(),
        }
    }

    fn write_npm_tree(dir: &std::path::Path) {
        fs::write(
            dir.join("package.json"),
            indoc! {r#"
                { "dependencies": { "left-pad": "^1.0.0" } }
            "#},
        )
        .unwrap();
        fs::write(
            dir.join("package-lock.json"),
            indoc! {r#"
                { "dependencies": { "left-pad": { "version": "1.0.0" } } }
            "#},
        )
        .unwrap();
    }

    #[tokio::test]
    async fn scan_and_list_find_packages() {
        let dir = tempfile::tempdir().unwrap();
        write_npm_tree(dir.path());
        let orchestrator = orchestrator(dir.path(), FakeRunner::new(vec![]), RunOptions::default());

        let manifests = orchestrator.scan().unwrap();
        assert!(manifests.iter().any(|m| m.rule == "npm"));

        let packages = orchestrator.list().await.unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].name, "left-pad");
        assert_eq!(packages[0].installed.as_deref(), Some("1.0.0"));
    }

    #[tokio::test]
    async fn outdated_streams_results_in_package_order() {
        let dir = tempfile::tempdir().unwrap();
        write_npm_tree(dir.path());
        let runner = FakeRunner::new(vec![FakeRunner::stdout("1.0.1\n1.2.0\n2.0.0\n")]);
        let options = RunOptions {
            skip_preflight: true,
            ..RunOptions::default()
        };
        let orchestrator = orchestrator(dir.path(), runner, options);

        let mut streamed = Vec::new();
        let results = orchestrator
            .outdated(|result| streamed.push(result.package.name.clone()))
            .await
            .unwrap();

        assert_eq!(streamed, vec!["left-pad"]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, OutdatedStatus::Outdated);
        // caret constraint caps the fallback target below the major bump
        assert_eq!(results[0].target.as_ref().unwrap().raw, "1.2.0");
    }

    #[tokio::test]
    async fn declined_confirmation_cancels_with_success() {
        let dir = tempfile::tempdir().unwrap();
        write_npm_tree(dir.path());
        let runner = FakeRunner::new(vec![FakeRunner::stdout("1.2.0\n")]);
        let mut orchestrator = Orchestrator {
            config: defaults::config(),
            working_dir: dir.path().to_path_buf(),
            options: RunOptions {
                skip_preflight: true,
                ..RunOptions::default()
            },
            runner: Arc::new(runner),
            prompter: DenyingPrompt { asked: false },
            logger: NoOpLogger::default(),
            warnings: WarningSink::new(),
            cancel: CancellationToken::new(),
        };

        let run = orchestrator.update(|_| Ok(()), |_| {}).await.unwrap();
        assert!(run.declined);
        assert!(orchestrator.prompter.asked);
        assert!(run.results.is_empty());
        assert_eq!(report::update_exit(&run.results, false), report::ExitCode::Success);
    }

    #[tokio::test]
    async fn dry_run_plans_and_exit_code_degrades() {
        let dir = tempfile::tempdir().unwrap();
        write_npm_tree(dir.path());
        // the version query fails for this package
        let runner = FakeRunner::new(vec![FakeRunner::failure("npm view left-pad versions", 7)]);
        let options = RunOptions {
            dry_run: true,
            continue_on_fail: true,
            skip_preflight: true,
            ..RunOptions::default()
        };
        let mut orchestrator = orchestrator(dir.path(), runner, options);

        let run = orchestrator.update(|_| Ok(()), |_| {}).await.unwrap();
        assert_eq!(run.results.len(), 1);
        assert_eq!(run.results[0].status, update::UpdateStatus::Failed);
        // dry run: nothing reaches Updated, partial success cannot qualify
        assert_eq!(
            report::update_exit(&run.results, true),
            report::ExitCode::Failure
        );
    }
}
