//! The engine's unit of work: a single declared dependency edge in a manifest.
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Classification of a dependency edge within its manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    /// Production dependency.
    #[default]
    Prod,
    /// Development-only dependency.
    Dev,
    /// Peer dependency (npm-style).
    Peer,
    /// Optional dependency.
    Optional,
}

impl PackageType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prod => "prod",
            Self::Dev => "dev",
            Self::Peer => "peer",
            Self::Optional => "optional",
        }
    }
}

impl std::str::FromStr for PackageType {
    type Err = UnknownPackageType;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            s if s.eq_ignore_ascii_case("prod") => Ok(Self::Prod),
            s if s.eq_ignore_ascii_case("dev") => Ok(Self::Dev),
            s if s.eq_ignore_ascii_case("peer") => Ok(Self::Peer),
            s if s.eq_ignore_ascii_case("optional") => Ok(Self::Optional),
            other => Err(UnknownPackageType(other.to_string())),
        }
    }
}

/// Error for unrecognized package type names.
#[derive(thiserror::Error, Debug)]
#[error("unknown package type: {0:?}")]
pub struct UnknownPackageType(pub String);

/// Whether a resolved, installed version is known for a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum InstallStatus {
    /// An installed version was resolved from a lockfile or probe command.
    Installed,
    /// The package is declared but no installed version was found.
    #[default]
    Missing,
    /// The declared version matches a floating indicator and cannot be
    /// resolved to a concrete version.
    Floating,
    /// The declared version matches an ignore indicator.
    Ignored,
    /// The rule has no means of resolving installed versions.
    NotConfigured,
}

impl InstallStatus {
    /// Floating and ignored packages never reach the version query or the
    /// executor and never count toward failures.
    #[must_use]
    pub fn is_operable(&self) -> bool {
        matches!(self, Self::Installed | Self::Missing | Self::NotConfigured)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Installed => "Installed",
            Self::Missing => "Missing",
            Self::Floating => "Floating",
            Self::Ignored => "Ignored",
            Self::NotConfigured => "NotConfigured",
        }
    }
}

/// The leading operator or sigil of a declared version requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Constraint {
    /// No marker. The declared version does not restrict target selection.
    #[default]
    None,
    /// `^` marker. Target selection may not cross the major boundary.
    Caret,
    /// `~` marker. Target selection may not cross the minor boundary.
    Tilde,
    /// `=` marker. The version is pinned and target selection yields nothing
    /// unless an explicit selection flag overrides it.
    Pinned,
    /// A range operator (`>=`, `>`, `<=`, `<`, `!=`). Treated as
    /// unrestricted; the ecosystem's own resolver enforces the range.
    Range,
}

impl Constraint {
    /// Extract the constraint marker from a declared version string and
    /// return it together with the remaining version text.
    #[must_use]
    pub fn split(declared: &str) -> (Self, &str) {
        let declared = declared.trim();
        for (prefix, constraint) in [
            (">=", Self::Range),
            ("<=", Self::Range),
            ("!=", Self::Range),
            (">", Self::Range),
            ("<", Self::Range),
            ("^", Self::Caret),
            ("~", Self::Tilde),
            ("=", Self::Pinned),
        ] {
            if let Some(rest) = declared.strip_prefix(prefix) {
                return (constraint, rest.trim_start());
            }
        }
        (Self::None, declared)
    }
}

/// A single declared dependency, the transient unit of work flowing through
/// the pipeline. Produced by the manifest parser, refined by the
/// installed-version resolver, consumed by query, classifier, and executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Rule id; always keys a rule in the effective config.
    pub rule: String,
    /// Ecosystem family label of the rule (`js`, `php`, `mod`, ...).
    pub manager: String,
    /// Manifest file this dependency was parsed from.
    pub file: PathBuf,
    /// Package name.
    pub name: String,
    /// Declared version requirement, verbatim from the manifest.
    pub declared: String,
    /// Resolved installed version, when the resolver found one.
    pub installed: Option<String>,
    /// Leading operator of the declared requirement.
    pub constraint: Constraint,
    /// Prod/dev/peer/optional classification.
    pub kind: PackageType,
    /// Group label assigned from the rule's groups map.
    pub group: Option<String>,
    /// Install status after the resolver pass.
    pub status: InstallStatus,
}

impl Package {
    /// The version the classifier compares candidates against: the installed
    /// version when known, otherwise the declared version stripped of its
    /// constraint marker.
    #[must_use]
    pub fn effective_version(&self) -> &str {
        match self.installed.as_deref() {
            Some(installed) if !installed.is_empty() => installed,
            _ => Constraint::split(&self.declared).1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_markers() {
        assert_eq!(Constraint::split("^1.2.3"), (Constraint::Caret, "1.2.3"));
        assert_eq!(Constraint::split("~1.2"), (Constraint::Tilde, "1.2"));
        assert_eq!(Constraint::split("=1.2.3"), (Constraint::Pinned, "1.2.3"));
        assert_eq!(Constraint::split(">= 1.0"), (Constraint::Range, "1.0"));
        assert_eq!(Constraint::split("1.2.3"), (Constraint::None, "1.2.3"));
        assert_eq!(Constraint::split("*"), (Constraint::None, "*"));
    }

    #[test]
    fn effective_version_prefers_installed() {
        let mut package = Package {
            rule: "npm".into(),
            manager: "js".into(),
            file: "package.json".into(),
            name: "left-pad".into(),
            declared: "^1.0.0".into(),
            installed: Some("1.0.3".into()),
            constraint: Constraint::Caret,
            kind: PackageType::Prod,
            group: None,
            status: InstallStatus::Installed,
        };
        assert_eq!(package.effective_version(), "1.0.3");
        package.installed = None;
        assert_eq!(package.effective_version(), "1.0.0");
    }

    #[test]
    fn floating_and_ignored_are_not_operable() {
        assert!(InstallStatus::Installed.is_operable());
        assert!(InstallStatus::Missing.is_operable());
        assert!(InstallStatus::NotConfigured.is_operable());
        assert!(!InstallStatus::Floating.is_operable());
        assert!(!InstallStatus::Ignored.is_operable());
    }
}
