//! The rule: a data-driven description of one ecosystem's manifests.
//!
//! Rules are configuration, not code. Adding support for a new package
//! manager means adding a rule entry, never a new parser implementation.
use crate::package::PackageType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How a rule's manifest (or lockfile) content is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParserFormat {
    /// JSON documents (`package.json`, `composer.json`, lockfiles).
    #[default]
    Json,
    /// TOML documents (`Cargo.toml`, `pyproject.toml`).
    Toml,
    /// YAML documents (`pubspec.yaml` and friends).
    Yaml,
    /// XML documents (`pom.xml`).
    Xml,
    /// A rule-declared extraction command printing
    /// whitespace-separated `name version [type]` lines.
    Raw,
}

/// Parser descriptor: format plus the field map locating dependency
/// sections inside the document.
///
/// For the structured formats, `fields` maps a dot-separated section path
/// (e.g. `dependencies`, `project.dependencies.dependency`) to the package
/// type its entries receive. For `raw`, `command` supplies the extraction
/// command and `fields` is unused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct ParserCfg {
    pub format: ParserFormat,
    pub fields: IndexMap<String, PackageType>,
    /// Element or key holding the package name, for formats where entries
    /// are records rather than `name: version` maps. Defaults to `name`.
    pub name_field: Option<String>,
    /// Key holding the version inside record-shaped entries.
    /// Defaults to `version`.
    pub version_field: Option<String>,
    /// Extraction command for the `raw` format.
    pub command: Option<String>,
}

impl ParserCfg {
    #[must_use]
    pub fn name_field(&self) -> &str {
        self.name_field.as_deref().unwrap_or("name")
    }

    #[must_use]
    pub fn version_field(&self) -> &str {
        self.version_field.as_deref().unwrap_or("version")
    }
}

/// Ordering scheme for version strings extracted from command output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Numeric component triple, pre-releases before their release.
    #[default]
    Semantic,
    /// Plain string comparison of the raw version text.
    Lexical,
}

/// Versioning descriptor: how to extract and order version strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Versioning {
    /// Regex with named groups `major`, `minor`, `patch`, `pre`; the
    /// built-in semver pattern when absent.
    pub pattern: Option<String>,
    pub order: SortOrder,
    /// Whether pre-release candidates are offered for stable installs.
    pub include_prereleases: bool,
}

/// The outdated-command and its versioning descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct OutdatedCfg {
    /// Command template; `${name}` is substituted.
    pub command: String,
    pub versioning: Versioning,
}

/// The update-command pair applied per package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct UpdateCfg {
    /// Command template; `${name}` and `${version}` are substituted.
    pub command: String,
    /// Optional lockfile-refresh command run after a successful update.
    pub lock_command: Option<String>,
}

/// How installed versions are resolved for a rule's packages.
///
/// Either a lockfile next to the manifest (parsed with the same table-driven
/// formats, entries mapped `name -> version`) or a probe command printing
/// whitespace-separated `name version` lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct InstalledCfg {
    /// Lockfile name, resolved relative to the manifest's directory.
    pub lockfile: Option<String>,
    pub format: ParserFormat,
    /// Section paths inside the lockfile holding `name -> version` entries.
    pub fields: IndexMap<String, PackageType>,
    pub name_field: Option<String>,
    pub version_field: Option<String>,
    /// Probe command; used when no lockfile is configured.
    pub command: Option<String>,
}

impl InstalledCfg {
    /// A rule with neither lockfile nor probe command cannot resolve
    /// installed versions.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.lockfile.is_some() || self.command.is_some()
    }
}

/// The unit of ecosystem support.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Rule {
    /// Ecosystem family label (`js`, `php`, `mod`, `py`, `rust`, ...).
    pub manager: String,
    pub enabled: bool,
    /// Manifest include globs, relative to the working directory.
    pub include: Vec<String>,
    /// Globs subtracted from the include set.
    pub exclude: Vec<String>,
    pub parser: ParserCfg,
    pub installed: Option<InstalledCfg>,
    /// Absent when the rule cannot check for newer versions; such rules
    /// surface as `NotConfigured`.
    pub outdated: Option<OutdatedCfg>,
    pub update: Option<UpdateCfg>,
    /// Declared versions that mean "track the newest release". The package
    /// stays operable but carries no constraint.
    pub latest_indicators: Vec<String>,
    /// Declared versions that cannot be resolved to a concrete version
    /// (git URLs, local paths, wildcards). Such packages are `Floating`.
    pub floating_indicators: Vec<String>,
    /// Declared versions excluded from the run entirely.
    pub ignore_indicators: Vec<String>,
    /// Package-name regexes forced into incremental stepping.
    pub incremental_patterns: Vec<String>,
    /// Group label -> member list. Entries match exact names first, then as
    /// regexes on miss.
    pub groups: IndexMap<String, Vec<String>>,
    /// Binaries that must exist on `PATH` before the rule can operate.
    pub requires: Vec<String>,
    /// Per-command deadline in seconds; the pipeline default when absent.
    pub timeout_seconds: Option<u64>,
}

impl Default for Rule {
    fn default() -> Self {
        Self {
            manager: String::new(),
            enabled: true,
            include: Vec::new(),
            exclude: Vec::new(),
            parser: ParserCfg::default(),
            installed: None,
            outdated: None,
            update: None,
            latest_indicators: Vec::new(),
            floating_indicators: Vec::new(),
            ignore_indicators: Vec::new(),
            incremental_patterns: Vec::new(),
            groups: IndexMap::new(),
            requires: Vec::new(),
            timeout_seconds: None,
        }
    }
}

impl Rule {
    /// Group label for a package name: exact member names match first
    /// across all groups, then regex members on miss. First group in
    /// insertion order wins when several match.
    #[must_use]
    pub fn group_for(&self, package: &str) -> Option<&str> {
        for (label, members) in &self.groups {
            if members.iter().any(|member| member == package) {
                return Some(label.as_str());
            }
        }
        for (label, members) in &self.groups {
            for member in members {
                if let Ok(re) = regex::Regex::new(member) {
                    if re.is_match(package) {
                        return Some(label.as_str());
                    }
                }
            }
        }
        None
    }

    /// Whether a package name is tagged for forced incremental stepping.
    #[must_use]
    pub fn is_incremental(&self, package: &str) -> bool {
        self.incremental_patterns.iter().any(|pattern| {
            regex::Regex::new(pattern)
                .map(|re| re.is_match(package))
                .unwrap_or(false)
        })
    }
}
