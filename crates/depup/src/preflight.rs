//! Preflight validation: required external binaries must exist.
use crate::config::Config;
use std::collections::BTreeSet;

/// One or more rules cannot operate because their binaries are absent.
#[derive(thiserror::Error, Debug)]
#[error("missing required binaries: {}", missing.join(", "))]
pub struct Error {
    /// `rule: binary` entries, deduplicated and sorted.
    pub missing: Vec<String>,
}

/// Verify that every rule in use can find its required binaries on `PATH`.
///
/// Only rules named in `rules_in_use` are checked; a rule that matched no
/// manifests costs nothing.
///
/// # Errors
/// When any required binary is missing.
pub fn check<'a>(
    config: &Config,
    rules_in_use: impl IntoIterator<Item = &'a str>,
) -> Result<(), Error> {
    let mut missing = BTreeSet::new();
    for id in rules_in_use {
        let Some(rule) = config.rules.get(id) else {
            continue;
        };
        for binary in &rule.requires {
            if which::which(binary).is_err() {
                tracing::debug!(rule = %id, binary = %binary, "required binary not found");
                missing.insert(format!("{id}: {binary}"));
            }
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error {
            missing: missing.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::rule::Rule;
    use crate::config::Config;

    fn config_with(requires: &[&str]) -> Config {
        let rule = Rule {
            manager: "js".into(),
            requires: requires.iter().map(|s| (*s).to_string()).collect(),
            ..Rule::default()
        };
        Config {
            rules: [("npm".to_string(), rule)].into_iter().collect(),
            ..Config::default()
        }
    }

    #[test]
    fn present_binary_passes() {
        let config = config_with(&["sh"]);
        assert!(check(&config, ["npm"]).is_ok());
    }

    #[test]
    fn absent_binary_fails_with_rule_and_name() {
        let config = config_with(&["definitely-not-a-real-binary-xyz"]);
        let err = check(&config, ["npm"]).unwrap_err();
        assert!(err.to_string().contains("npm: definitely-not-a-real-binary-xyz"));
    }

    #[test]
    fn unused_rules_are_not_checked() {
        let config = config_with(&["definitely-not-a-real-binary-xyz"]);
        assert!(check(&config, []).is_ok());
    }
}
