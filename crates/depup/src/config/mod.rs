//! Configuration loading, `extends` inheritance, and validation.
//!
//! A config file may extend other files; inheritance is a deep merge where
//! maps merge by key (child wins) and lists are replaced. Included paths are
//! subject to the security policy of the file naming them, and the extends
//! graph must be acyclic.
pub mod defaults;
pub mod rule;
pub mod system_tests;

pub use rule::Rule;
pub use system_tests::{RunMode, SystemTest, SystemTestsCfg};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Well-known config filename probed in the working directory.
pub const CONFIG_FILE_NAME: &str = ".depup.yml";

/// Errors that can occur while reading, merging, or validating config files.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O error accessing a config file.
    #[error("failed to read config file {path:?}")]
    Io {
        /// Path to the problematic config file.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Strict-parse failure, including unknown fields.
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        /// Path to the problematic config file.
        path: PathBuf,
        #[source]
        source: serde_norway::Error,
    },
    /// An `extends` path escapes the including file's directory.
    #[error("path traversal not allowed: {path:?}")]
    PathTraversal {
        /// The offending extends entry.
        path: PathBuf,
    },
    /// An `extends` path is absolute.
    #[error("absolute paths not allowed: {path:?}")]
    AbsolutePath {
        /// The offending extends entry.
        path: PathBuf,
    },
    /// The extends graph revisited a file already on the load stack.
    #[error("cyclic extends: {path:?}")]
    CyclicExtends {
        /// The revisited file.
        path: PathBuf,
    },
    /// Structural validation failed.
    #[error("invalid configuration:\n{}", errors.join("\n"))]
    Validation {
        /// Fatal findings.
        errors: Vec<String>,
        /// Non-fatal findings collected alongside.
        warnings: Vec<String>,
    },
    /// The effective config could not be serialized.
    #[error("failed to serialize configuration")]
    Serialize(#[source] serde_norway::Error),
}

/// Path-security switches governing `extends` resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Security {
    pub allow_path_traversal: bool,
    pub allow_absolute_paths: bool,
}

/// The effective configuration: inheritance applied, defaults materialized.
///
/// Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Working directory override; the CLI directory flag or the current
    /// directory when absent.
    pub working_dir: Option<PathBuf>,
    /// Rules keyed by rule id, in declaration order.
    pub rules: IndexMap<String, Rule>,
    pub security: Security,
    pub system_tests: Option<SystemTestsCfg>,
}

impl Config {
    /// Serialize the effective config as YAML.
    ///
    /// # Errors
    /// When serialization fails.
    pub fn to_yaml(&self) -> Result<String, Error> {
        serde_norway::to_string(self).map_err(Error::Serialize)
    }
}

/// On-disk shape of a single config file, before inheritance.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct RawConfig {
    /// Paths merged underneath this file, in order, resolved relative to
    /// this file's directory.
    extends: Vec<String>,
    working_dir: Option<PathBuf>,
    rules: IndexMap<String, Rule>,
    security: Option<RawSecurity>,
    system_tests: Option<SystemTestsCfg>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct RawSecurity {
    allow_path_traversal: Option<bool>,
    allow_absolute_paths: Option<bool>,
}

impl RawSecurity {
    fn finalize(self) -> Security {
        Security {
            allow_path_traversal: self.allow_path_traversal.unwrap_or(false),
            allow_absolute_paths: self.allow_absolute_paths.unwrap_or(false),
        }
    }
}

/// Deep-merge `child` over `base`: maps merge by key with the child entry
/// winning, everything else is replaced when the child sets it.
fn merge(mut base: RawConfig, child: RawConfig) -> RawConfig {
    if child.working_dir.is_some() {
        base.working_dir = child.working_dir;
    }
    for (id, rule) in child.rules {
        base.rules.insert(id, rule);
    }
    base.security = match (base.security, child.security) {
        (Some(parent), Some(child)) => Some(RawSecurity {
            allow_path_traversal: child.allow_path_traversal.or(parent.allow_path_traversal),
            allow_absolute_paths: child.allow_absolute_paths.or(parent.allow_absolute_paths),
        }),
        (parent, child) => child.or(parent),
    };
    if child.system_tests.is_some() {
        base.system_tests = child.system_tests;
    }
    base
}

fn finalize(raw: RawConfig) -> Config {
    Config {
        working_dir: raw.working_dir,
        rules: raw.rules,
        security: raw.security.unwrap_or_default().finalize(),
        system_tests: raw.system_tests,
    }
}

/// A loaded configuration together with its provenance and any
/// validation warnings.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub config: Config,
    /// The file the config came from; `None` for built-in defaults.
    pub path: Option<PathBuf>,
    pub warnings: Vec<String>,
}

/// Load the effective configuration.
///
/// With no explicit path, the well-known filename is probed in `base_dir`;
/// when that is absent the built-in defaults are returned. Validation
/// warnings never fail the load, validation errors do.
///
/// # Errors
/// On I/O or parse failures, security policy violations, cyclic extends,
/// or validation errors.
pub fn load(explicit: Option<&Path>, base_dir: &Path) -> Result<Loaded, Error> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let probe = base_dir.join(CONFIG_FILE_NAME);
            probe.is_file().then_some(probe)
        }
    };

    let config = match &path {
        None => {
            tracing::debug!("no config file found, using built-in defaults");
            defaults::config()
        }
        Some(path) => {
            let mut stack = Vec::new();
            finalize(load_file(path, &mut stack)?)
        }
    };

    let validation = validate(&config);
    if !validation.errors.is_empty() {
        return Err(Error::Validation {
            errors: validation.errors,
            warnings: validation.warnings,
        });
    }
    Ok(Loaded {
        config,
        path,
        warnings: validation.warnings,
    })
}

/// Read one file, recursively folding its `extends` chain underneath it.
fn load_file(path: &Path, stack: &mut Vec<PathBuf>) -> Result<RawConfig, Error> {
    let canonical = path.canonicalize().map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if stack.contains(&canonical) {
        return Err(Error::CyclicExtends {
            path: path.to_path_buf(),
        });
    }
    stack.push(canonical);

    let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: RawConfig = serde_norway::from_str(&text).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    // The including file's own switches govern its extends entries.
    let security = raw.security.unwrap_or_default().finalize();

    let mut merged = RawConfig::default();
    for entry in &raw.extends {
        let entry_path = Path::new(entry);
        check_path_policy(entry_path, security)?;
        let resolved = if entry_path.is_absolute() {
            entry_path.to_path_buf()
        } else {
            dir.join(entry_path)
        };
        tracing::debug!(from = ?path, extends = ?resolved, "loading parent config");
        let parent = load_file(&resolved, stack)?;
        merged = merge(merged, parent);
    }
    stack.pop();

    Ok(merge(merged, raw))
}

fn check_path_policy(path: &Path, security: Security) -> Result<(), Error> {
    if !security.allow_path_traversal
        && path
            .components()
            .any(|component| component == Component::ParentDir)
    {
        return Err(Error::PathTraversal {
            path: path.to_path_buf(),
        });
    }
    if !security.allow_absolute_paths && path.is_absolute() {
        return Err(Error::AbsolutePath {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Outcome of structural validation. Success with warnings is a distinct,
/// reportable state.
#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Validation {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Enumerate every rule and check it for structural problems.
#[must_use]
pub fn validate(config: &Config) -> Validation {
    let mut validation = Validation::default();

    for (id, rule) in &config.rules {
        if rule.manager.is_empty() {
            validation.errors.push(format!("rule {id}: missing manager tag"));
        }
        if rule.enabled && rule.include.is_empty() {
            validation
                .warnings
                .push(format!("rule {id}: enabled but has no include globs"));
        }
        for pattern in rule.include.iter().chain(&rule.exclude) {
            if let Err(err) = glob::Pattern::new(pattern) {
                validation
                    .errors
                    .push(format!("rule {id}: invalid glob {pattern:?}: {err}"));
            }
        }
        if rule.parser.format == rule::ParserFormat::Raw && rule.parser.command.is_none() {
            validation
                .errors
                .push(format!("rule {id}: raw parser without extraction command"));
        }
        if let Some(outdated) = &rule.outdated {
            if let Err(err) = crate::version::Scheme::new(&outdated.versioning) {
                validation.errors.push(format!("rule {id}: {err}"));
            }
        }
        for pattern in &rule.incremental_patterns {
            if let Err(err) = regex::Regex::new(pattern) {
                validation
                    .errors
                    .push(format!("rule {id}: invalid incremental pattern {pattern:?}: {err}"));
            }
        }
        for (label, members) in &rule.groups {
            if members.is_empty() {
                validation
                    .warnings
                    .push(format!("rule {id}: group {label} is empty"));
            }
        }
    }

    if let Some(system_tests) = &config.system_tests {
        if system_tests.run_mode != RunMode::None && system_tests.tests.is_empty() {
            validation
                .warnings
                .push("system_tests: run mode set but no tests declared".to_string());
        }
        for test in &system_tests.tests {
            if test.commands.is_empty() {
                validation
                    .warnings
                    .push(format!("system_tests: test {:?} has no commands", test.name));
            }
        }
    }

    validation
}
