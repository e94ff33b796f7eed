//! The built-in rule set used when no config file is present.
//!
//! One rule per supported ecosystem family; every entry is plain data and
//! can be overridden or replaced from a config file.
use super::{Config, Security};
use crate::config::rule::{InstalledCfg, OutdatedCfg, ParserCfg, ParserFormat, Rule, UpdateCfg};
use crate::package::PackageType;
use indexmap::IndexMap;

fn fields(entries: &[(&str, PackageType)]) -> IndexMap<String, PackageType> {
    entries
        .iter()
        .map(|(path, kind)| ((*path).to_string(), *kind))
        .collect()
}

fn strings(entries: &[&str]) -> Vec<String> {
    entries.iter().map(|s| (*s).to_string()).collect()
}

fn npm() -> Rule {
    Rule {
        manager: "js".into(),
        include: strings(&["**/package.json"]),
        exclude: strings(&["**/node_modules/**"]),
        parser: ParserCfg {
            format: ParserFormat::Json,
            fields: fields(&[
                ("dependencies", PackageType::Prod),
                ("devDependencies", PackageType::Dev),
                ("peerDependencies", PackageType::Peer),
                ("optionalDependencies", PackageType::Optional),
            ]),
            ..ParserCfg::default()
        },
        installed: Some(InstalledCfg {
            lockfile: Some("package-lock.json".into()),
            format: ParserFormat::Json,
            fields: fields(&[("dependencies", PackageType::Prod)]),
            ..InstalledCfg::default()
        }),
        outdated: Some(OutdatedCfg {
            command: "npm view ${name} versions".into(),
            ..OutdatedCfg::default()
        }),
        update: Some(UpdateCfg {
            command: "npm install ${name}@${version}".into(),
            lock_command: Some("npm install --package-lock-only".into()),
        }),
        latest_indicators: strings(&["*", "latest"]),
        floating_indicators: strings(&["file:", "link:", "git+", "workspace:"]),
        requires: strings(&["npm"]),
        ..Rule::default()
    }
}

fn composer() -> Rule {
    Rule {
        manager: "php".into(),
        include: strings(&["**/composer.json"]),
        exclude: strings(&["**/vendor/**"]),
        parser: ParserCfg {
            format: ParserFormat::Json,
            fields: fields(&[
                ("require", PackageType::Prod),
                ("require-dev", PackageType::Dev),
            ]),
            ..ParserCfg::default()
        },
        installed: Some(InstalledCfg {
            lockfile: Some("composer.lock".into()),
            format: ParserFormat::Json,
            fields: fields(&[
                ("packages", PackageType::Prod),
                ("packages-dev", PackageType::Dev),
            ]),
            ..InstalledCfg::default()
        }),
        outdated: Some(OutdatedCfg {
            command: "composer show --all ${name}".into(),
            ..OutdatedCfg::default()
        }),
        update: Some(UpdateCfg {
            command: "composer require ${name}:${version}".into(),
            lock_command: Some("composer update --lock".into()),
        }),
        latest_indicators: strings(&["*"]),
        floating_indicators: strings(&["dev-"]),
        requires: strings(&["composer"]),
        ..Rule::default()
    }
}

fn gomod() -> Rule {
    Rule {
        manager: "mod".into(),
        include: strings(&["**/go.mod"]),
        exclude: strings(&["**/vendor/**"]),
        parser: ParserCfg {
            format: ParserFormat::Raw,
            command: Some("go list -m all".into()),
            ..ParserCfg::default()
        },
        installed: Some(InstalledCfg {
            command: Some("go list -m all".into()),
            ..InstalledCfg::default()
        }),
        outdated: Some(OutdatedCfg {
            command: "go list -m -versions ${name}".into(),
            ..OutdatedCfg::default()
        }),
        update: Some(UpdateCfg {
            command: "go get ${name}@${version}".into(),
            lock_command: Some("go mod tidy".into()),
        }),
        requires: strings(&["go"]),
        ..Rule::default()
    }
}

fn pip() -> Rule {
    Rule {
        manager: "py".into(),
        include: strings(&["**/pyproject.toml"]),
        exclude: strings(&["**/.venv/**"]),
        parser: ParserCfg {
            format: ParserFormat::Toml,
            fields: fields(&[
                ("tool.poetry.dependencies", PackageType::Prod),
                ("tool.poetry.group.dev.dependencies", PackageType::Dev),
            ]),
            ..ParserCfg::default()
        },
        installed: Some(InstalledCfg {
            command: Some("python -m pip list".into()),
            ..InstalledCfg::default()
        }),
        outdated: Some(OutdatedCfg {
            command: "python -m pip index versions ${name}".into(),
            ..OutdatedCfg::default()
        }),
        update: Some(UpdateCfg {
            command: "python -m pip install ${name}==${version}".into(),
            lock_command: None,
        }),
        latest_indicators: strings(&["*"]),
        requires: strings(&["python"]),
        ..Rule::default()
    }
}

fn cargo() -> Rule {
    Rule {
        manager: "rust".into(),
        include: strings(&["**/Cargo.toml"]),
        exclude: strings(&["**/target/**"]),
        parser: ParserCfg {
            format: ParserFormat::Toml,
            fields: fields(&[
                ("dependencies", PackageType::Prod),
                ("dev-dependencies", PackageType::Dev),
            ]),
            ..ParserCfg::default()
        },
        installed: Some(InstalledCfg {
            lockfile: Some("Cargo.lock".into()),
            format: ParserFormat::Toml,
            fields: fields(&[("package", PackageType::Prod)]),
            ..InstalledCfg::default()
        }),
        outdated: Some(OutdatedCfg {
            command: "cargo search ${name} --limit 1".into(),
            ..OutdatedCfg::default()
        }),
        update: Some(UpdateCfg {
            command: "cargo add ${name}@${version}".into(),
            lock_command: Some("cargo update -p ${name}".into()),
        }),
        latest_indicators: strings(&["*"]),
        floating_indicators: strings(&["path:", "git:"]),
        requires: strings(&["cargo"]),
        ..Rule::default()
    }
}

/// The effective configuration when no config file exists.
#[must_use]
pub fn config() -> Config {
    Config {
        working_dir: None,
        rules: [
            ("npm".to_string(), npm()),
            ("composer".to_string(), composer()),
            ("gomod".to_string(), gomod()),
            ("pip".to_string(), pip()),
            ("cargo".to_string(), cargo()),
        ]
        .into_iter()
        .collect(),
        security: Security::default(),
        system_tests: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_are_complete() {
        let config = config();
        assert_eq!(config.rules.len(), 5);
        for (id, rule) in &config.rules {
            assert!(rule.enabled, "{id} disabled");
            assert!(!rule.manager.is_empty(), "{id} has no manager tag");
            assert!(!rule.include.is_empty(), "{id} has no include globs");
            assert!(rule.outdated.is_some(), "{id} cannot check versions");
            assert!(rule.update.is_some(), "{id} cannot update");
            assert!(!rule.requires.is_empty(), "{id} has no required binaries");
        }
    }

    #[test]
    fn update_templates_carry_both_placeholders() {
        for rule in config().rules.values() {
            let update = rule.update.as_ref().unwrap();
            assert!(update.command.contains("${name}"));
            assert!(update.command.contains("${version}"));
        }
    }
}
