//! Version query: run a rule's outdated-command and classify the result.
use crate::classify::{self, OutdatedResult, OutdatedStatus, Selection};
use crate::command::{CommandLine, CommandRunner, Error as CommandError, ExecContext};
use crate::config::rule::Rule;
use crate::package::{Constraint, InstallStatus, Package};
use crate::template;
use crate::version::Scheme;

/// Errors surfaced by the version query.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The outdated-command failed with no parseable output.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// The rule declares no outdated-command. Informational, not counted
    /// as a failure; displayed as `NotConfigured`.
    #[error("rule {rule} does not support version queries")]
    Unsupported {
        /// The rule id.
        rule: String,
    },
}

/// Run the version check for one package.
///
/// Floating and ignored packages pass through untouched; rules without an
/// outdated-command yield `NotConfigured`. Command failures become `Failed`
/// results carrying the child's exit code when one is available.
pub async fn check_package(
    package: Package,
    rule: &Rule,
    scheme: &Scheme,
    runner: &dyn CommandRunner,
    ctx: &ExecContext,
    selection: Selection,
    incremental_flag: bool,
) -> OutdatedResult {
    match package.status {
        InstallStatus::Floating => {
            return OutdatedResult::without_candidates(package, OutdatedStatus::Floating, None);
        }
        InstallStatus::Ignored => {
            return OutdatedResult::without_candidates(package, OutdatedStatus::Ignored, None);
        }
        _ => {}
    }

    // a package whose requirement cannot be pinned down (e.g. `*` with no
    // resolved install) has nothing to compare against
    let Some(installed) = scheme.parse(package.effective_version()) else {
        return OutdatedResult::without_candidates(package, OutdatedStatus::Floating, None);
    };

    let candidates = match list_newer_versions(&package, rule, scheme, runner, ctx).await {
        Ok(candidates) => candidates,
        Err(Error::Unsupported { rule }) => {
            tracing::debug!(package = %package.name, rule = %rule, "no outdated command");
            return OutdatedResult::without_candidates(package, OutdatedStatus::NotConfigured, None);
        }
        Err(Error::Command(err)) => {
            let status = OutdatedStatus::Failed(err.exit_code());
            return OutdatedResult::without_candidates(package, status, Some(err.to_string()));
        }
    };

    let constraint = if matches_latest(&package, rule) {
        Constraint::None
    } else {
        package.constraint
    };
    let incremental = incremental_flag || rule.is_incremental(&package.name);

    classify::classify(
        package,
        &installed,
        candidates,
        scheme,
        constraint,
        selection,
        incremental,
    )
}

/// Execute the rule's outdated-command and extract candidate versions.
///
/// # Errors
/// `Error::Unsupported` when the rule declares no outdated-command;
/// `Error::Command` when the command fails with no parseable output.
pub async fn list_newer_versions(
    package: &Package,
    rule: &Rule,
    scheme: &Scheme,
    runner: &dyn CommandRunner,
    ctx: &ExecContext,
) -> Result<Vec<crate::version::Version>, Error> {
    let Some(outdated) = &rule.outdated else {
        return Err(Error::Unsupported {
            rule: package.rule.clone(),
        });
    };

    let command = CommandLine::parse(&template::substitute_name(
        &outdated.command,
        &package.name,
    ))?;

    let stdout = match runner.run(&command, ctx).await {
        Ok(output) => output.stdout,
        Err(err) => {
            // non-zero exits still count as answers when the output parses
            let parseable = err
                .output()
                .map(|output| !scheme.extract(&output.stdout).is_empty())
                .unwrap_or(false);
            if parseable {
                err.output().map(|o| o.stdout.clone()).unwrap_or_default()
            } else {
                return Err(err.into());
            }
        }
    };

    Ok(scheme.extract(&stdout))
}

/// A declared version matching a latest indicator carries no constraint.
fn matches_latest(package: &Package, rule: &Rule) -> bool {
    rule.latest_indicators
        .iter()
        .any(|indicator| package.declared == *indicator)
}
