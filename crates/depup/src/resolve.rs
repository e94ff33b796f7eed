//! Overlay of actually-installed versions onto parsed packages.
//!
//! Per rule, installed versions come from a lockfile next to the manifest or
//! from a probe command. Resolution failures degrade to warnings; a package
//! without a resolved version simply stays `Missing`.
use crate::command::{CommandLine, CommandRunner, ExecContext};
use crate::config::rule::{InstalledCfg, ParserCfg, Rule};
use crate::config::Config;
use crate::logging::WarningSink;
use crate::manifest;
use crate::package::{InstallStatus, Package};
use std::collections::HashMap;
use std::path::PathBuf;

/// Does a declared version match an indicator entry?
///
/// Indicators match exactly or as a prefix, so `git+` covers every git URL.
fn matches_indicator(declared: &str, indicators: &[String]) -> bool {
    indicators
        .iter()
        .any(|indicator| declared == indicator || declared.starts_with(indicator.as_str()))
}

/// Resolve installed versions and refine install statuses.
///
/// Packages whose declared version matches an ignore indicator become
/// `Ignored`; floating indicators yield `Floating`. Rules without a
/// configured resolution source mark their packages `NotConfigured`.
pub async fn resolve(
    packages: Vec<Package>,
    config: &Config,
    runner: &dyn CommandRunner,
    ctx: &ExecContext,
    warnings: &WarningSink,
) -> Vec<Package> {
    let mut lockfile_cache: HashMap<PathBuf, Option<HashMap<String, String>>> = HashMap::new();
    let mut probe_cache: HashMap<(String, PathBuf), Option<HashMap<String, String>>> =
        HashMap::new();

    let mut resolved = Vec::with_capacity(packages.len());
    for mut package in packages {
        let Some(rule) = config.rules.get(&package.rule) else {
            resolved.push(package);
            continue;
        };

        if matches_indicator(&package.declared, &rule.ignore_indicators) {
            package.status = InstallStatus::Ignored;
            resolved.push(package);
            continue;
        }
        if matches_indicator(&package.declared, &rule.floating_indicators) {
            package.status = InstallStatus::Floating;
            resolved.push(package);
            continue;
        }

        let Some(installed_cfg) = rule.installed.as_ref().filter(|cfg| cfg.is_configured())
        else {
            package.status = InstallStatus::NotConfigured;
            resolved.push(package);
            continue;
        };

        let versions = installed_versions(
            rule,
            installed_cfg,
            &package,
            runner,
            ctx,
            warnings,
            &mut lockfile_cache,
            &mut probe_cache,
        )
        .await;

        match versions.and_then(|map| map.get(&package.name).cloned()) {
            Some(version) => {
                package.installed = Some(version);
                package.status = InstallStatus::Installed;
            }
            None => package.status = InstallStatus::Missing,
        }
        resolved.push(package);
    }
    resolved
}

#[allow(clippy::too_many_arguments)]
async fn installed_versions(
    rule: &Rule,
    cfg: &InstalledCfg,
    package: &Package,
    runner: &dyn CommandRunner,
    ctx: &ExecContext,
    warnings: &WarningSink,
    lockfile_cache: &mut HashMap<PathBuf, Option<HashMap<String, String>>>,
    probe_cache: &mut HashMap<(String, PathBuf), Option<HashMap<String, String>>>,
) -> Option<HashMap<String, String>> {
    let manifest_dir = ctx
        .working_dir
        .join(&package.file)
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| ctx.working_dir.clone());

    if let Some(lockfile) = &cfg.lockfile {
        let path = manifest_dir.join(lockfile);
        if let Some(cached) = lockfile_cache.get(&path) {
            return cached.clone();
        }
        let versions = read_lockfile(cfg, &path, warnings).await;
        lockfile_cache.insert(path, versions.clone());
        return versions;
    }

    if let Some(command) = &cfg.command {
        let key = (command.clone(), manifest_dir.clone());
        if let Some(cached) = probe_cache.get(&key) {
            return cached.clone();
        }
        let versions = run_probe(rule, command, &manifest_dir, runner, ctx, warnings).await;
        probe_cache.insert(key, versions.clone());
        return versions;
    }

    None
}

async fn read_lockfile(
    cfg: &InstalledCfg,
    path: &PathBuf,
    warnings: &WarningSink,
) -> Option<HashMap<String, String>> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(err) => {
            warnings.warn(format!("lockfile {path:?} not readable: {err}"));
            return None;
        }
    };
    let parser = ParserCfg {
        format: cfg.format,
        fields: cfg.fields.clone(),
        name_field: cfg.name_field.clone(),
        version_field: cfg.version_field.clone(),
        command: None,
    };
    match manifest::structured_text_entries(&text, &parser) {
        Ok(entries) => Some(entries.into_iter().collect()),
        Err(message) => {
            warnings.warn(format!("lockfile {path:?} not parseable: {message}"));
            None
        }
    }
}

async fn run_probe(
    rule: &Rule,
    command: &str,
    dir: &PathBuf,
    runner: &dyn CommandRunner,
    ctx: &ExecContext,
    warnings: &WarningSink,
) -> Option<HashMap<String, String>> {
    let command = match CommandLine::parse(command) {
        Ok(command) => command,
        Err(err) => {
            warnings.warn(format!("rule {}: {err}", rule.manager));
            return None;
        }
    };
    match runner.run(&command, &ctx.in_dir(dir)).await {
        Ok(output) => Some(
            manifest::name_version_lines(&output.stdout)
                .into_iter()
                .map(|(name, version, _)| (name, version))
                .collect(),
        ),
        Err(err) => {
            warnings.warn(format!("installed-version probe failed: {err}"));
            None
        }
    }
}
