//! Execution of the user-supplied system-test suite.
//!
//! Tests run in declaration order in `preflight`, `after_each`, or
//! `after_all` scope. A failing test not marked `continue_on_fail` is
//! critical; with `stop_on_fail` the suite stops at the first critical
//! failure and the caller aborts the surrounding run.
use crate::command::{CommandLine, CommandRunner, ExecContext};
use crate::config::system_tests::{RunMode, SystemTest, SystemTestsCfg};
use crate::logging::{Log, Verbosity};
use std::time::Duration;

/// Outcome of a single test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub name: String,
    pub passed: bool,
    /// A failure that the suite may not continue past.
    pub critical: bool,
    /// Failure detail, when the test failed.
    pub detail: Option<String>,
}

/// Outcome of one suite execution.
#[derive(Debug, Clone, Default)]
pub struct SuiteOutcome {
    pub mode: RunMode,
    pub outcomes: Vec<TestOutcome>,
}

impl SuiteOutcome {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.passed)
    }

    /// The first critical failure, when one occurred.
    #[must_use]
    pub fn critical_failure(&self) -> Option<&TestOutcome> {
        self.outcomes
            .iter()
            .find(|outcome| !outcome.passed && outcome.critical)
    }
}

/// Run the suite in the given scope.
///
/// Returns an empty outcome when the configuration does not schedule the
/// suite for `mode`. With `stop_on_fail`, execution stops after the first
/// critical failure; otherwise every test runs and failures accumulate.
pub async fn run(
    cfg: Option<&SystemTestsCfg>,
    mode: RunMode,
    runner: &dyn CommandRunner,
    ctx: &ExecContext,
    logger: &dyn Log,
) -> SuiteOutcome {
    let mut suite = SuiteOutcome {
        mode,
        outcomes: Vec::new(),
    };
    let Some(cfg) = cfg else {
        return suite;
    };
    if !cfg.runs_in(mode) {
        return suite;
    }

    for test in &cfg.tests {
        logger.log(Verbosity::Medium, &format!("system test: {}", test.name));
        let outcome = run_test(test, runner, ctx).await;
        if outcome.passed {
            tracing::debug!(test = %test.name, "system test passed");
        } else {
            tracing::warn!(test = %test.name, detail = ?outcome.detail, "system test failed");
        }
        let stop = cfg.stop_on_fail && !outcome.passed && outcome.critical;
        suite.outcomes.push(outcome);
        if stop {
            break;
        }
    }
    suite
}

async fn run_test(test: &SystemTest, runner: &dyn CommandRunner, ctx: &ExecContext) -> TestOutcome {
    let timeout = test
        .timeout_seconds
        .map(Duration::from_secs)
        .or(ctx.timeout);
    let ctx = ctx.clone().with_timeout(timeout);

    for script in &test.commands {
        let command = match CommandLine::parse(script) {
            Ok(command) => command,
            Err(err) => {
                return TestOutcome {
                    name: test.name.clone(),
                    passed: false,
                    critical: !test.continue_on_fail,
                    detail: Some(err.to_string()),
                };
            }
        };
        if let Err(err) = runner.run(&command, &ctx).await {
            return TestOutcome {
                name: test.name.clone(),
                passed: false,
                critical: !test.continue_on_fail,
                detail: Some(err.to_string()),
            };
        }
    }
    TestOutcome {
        name: test.name.clone(),
        passed: true,
        critical: false,
        detail: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::FakeRunner;
    use crate::logging::NoOpLogger;

    fn cfg(stop_on_fail: bool, tests: Vec<SystemTest>) -> SystemTestsCfg {
        SystemTestsCfg {
            run_mode: RunMode::AfterAll,
            run_preflight: false,
            stop_on_fail,
            tests,
        }
    }

    fn test(name: &str, commands: &[&str], continue_on_fail: bool) -> SystemTest {
        SystemTest {
            name: name.into(),
            commands: commands.iter().map(|s| (*s).to_string()).collect(),
            timeout_seconds: None,
            continue_on_fail,
        }
    }

    #[tokio::test]
    async fn unscheduled_mode_runs_nothing() {
        let runner = FakeRunner::new(vec![]);
        let ctx = ExecContext::new(std::env::temp_dir());
        let suite = run(
            Some(&cfg(true, vec![test("unit", &["make test"], false)])),
            RunMode::AfterEach,
            &runner,
            &ctx,
            &NoOpLogger::default(),
        )
        .await;
        assert!(suite.outcomes.is_empty());
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stop_on_fail_halts_after_critical_failure() {
        let runner = FakeRunner::new(vec![
            FakeRunner::failure("make test", 2),
            FakeRunner::stdout(""),
        ]);
        let ctx = ExecContext::new(std::env::temp_dir());
        let suite = run(
            Some(&cfg(
                true,
                vec![
                    test("unit", &["make test"], false),
                    test("lint", &["make lint"], false),
                ],
            )),
            RunMode::AfterAll,
            &runner,
            &ctx,
            &NoOpLogger::default(),
        )
        .await;
        assert_eq!(suite.outcomes.len(), 1);
        assert!(suite.critical_failure().is_some());
    }

    #[tokio::test]
    async fn continue_on_fail_is_not_critical() {
        let runner = FakeRunner::new(vec![
            FakeRunner::failure("make flaky", 1),
            FakeRunner::stdout(""),
        ]);
        let ctx = ExecContext::new(std::env::temp_dir());
        let suite = run(
            Some(&cfg(
                true,
                vec![
                    test("flaky", &["make flaky"], true),
                    test("unit", &["make test"], false),
                ],
            )),
            RunMode::AfterAll,
            &runner,
            &ctx,
            &NoOpLogger::default(),
        )
        .await;
        assert_eq!(suite.outcomes.len(), 2);
        assert!(suite.critical_failure().is_none());
        assert!(!suite.passed());
    }

    #[tokio::test]
    async fn commands_within_a_test_run_in_order() {
        let runner = FakeRunner::new(vec![FakeRunner::stdout(""), FakeRunner::stdout("")]);
        let ctx = ExecContext::new(std::env::temp_dir());
        let suite = run(
            Some(&cfg(
                true,
                vec![test("build", &["make clean", "make build"], false)],
            )),
            RunMode::AfterAll,
            &runner,
            &ctx,
            &NoOpLogger::default(),
        )
        .await;
        assert!(suite.passed());
        assert_eq!(
            runner.calls.lock().unwrap().as_slice(),
            ["make clean", "make build"]
        );
    }
}
