//! Version parsing and ordering under a rule's versioning descriptor.
//!
//! A descriptor supplies the regex extracting version components from
//! command output, the ordering scheme, and the pre-release policy. The
//! default pattern handles semver-style strings with an optional `v` prefix.
use crate::config::rule::{SortOrder, Versioning};
use std::cmp::Ordering;

/// Default version pattern: semver triple with optional pre-release tag.
///
/// Named groups: `major` (required), `minor`, `patch`, `pre`.
pub const DEFAULT_PATTERN: &str =
    r"v?(?P<major>\d+)(?:\.(?P<minor>\d+))?(?:\.(?P<patch>\d+))?(?:-(?P<pre>[0-9A-Za-z][0-9A-Za-z.-]*))?";

/// Errors applying a versioning descriptor.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The descriptor's version pattern is not a valid regex.
    #[error("invalid version pattern {pattern:?}")]
    Pattern {
        /// The offending pattern.
        pattern: String,
        #[source]
        source: Box<regex::Error>,
    },
    /// The pattern lacks the required `major` capture group.
    #[error("version pattern {0:?} has no `major` capture group")]
    MissingMajorGroup(String),
}

/// A parsed version: numeric components plus optional pre-release tag.
///
/// Equality and ordering ignore the raw text; two spellings of the same
/// version compare equal.
#[derive(Debug, Clone, Eq)]
pub struct Version {
    /// Major component.
    pub major: u64,
    /// Minor component, 0 when absent.
    pub minor: u64,
    /// Patch component, 0 when absent.
    pub patch: u64,
    /// Pre-release tag without its leading separator.
    pub pre: Option<String>,
    /// The version text as it appeared in the source.
    pub raw: String,
}

impl Version {
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }

    /// The numeric triple, for distance classification.
    #[must_use]
    pub fn triple(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.triple() == other.triple() && self.pre == other.pre
    }
}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.triple().hash(state);
        self.pre.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    /// Semantic ordering: numeric triple, then pre-release. A release
    /// orders after any pre-release of the same triple.
    fn cmp(&self, other: &Self) -> Ordering {
        self.triple()
            .cmp(&other.triple())
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl serde::Serialize for Version {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.raw)
    }
}

/// A compiled versioning descriptor.
#[derive(Debug, Clone)]
pub struct Scheme {
    regex: regex::Regex,
    order: SortOrder,
    include_prereleases: bool,
}

impl Scheme {
    /// Compile a rule's versioning descriptor.
    ///
    /// # Errors
    /// When the pattern is not a valid regex or lacks a `major` group.
    pub fn new(versioning: &Versioning) -> Result<Self, Error> {
        let pattern = versioning
            .pattern
            .as_deref()
            .unwrap_or(DEFAULT_PATTERN)
            .to_string();
        let regex = regex::RegexBuilder::new(&pattern)
            .build()
            .map_err(|source| Error::Pattern {
                pattern: pattern.clone(),
                source: Box::new(source),
            })?;
        if !regex
            .capture_names()
            .any(|name| name == Some("major"))
        {
            return Err(Error::MissingMajorGroup(pattern));
        }
        Ok(Self {
            regex,
            order: versioning.order,
            include_prereleases: versioning.include_prereleases,
        })
    }

    /// Whether pre-release candidates are considered for stable installs.
    #[must_use]
    pub fn include_prereleases(&self) -> bool {
        self.include_prereleases
    }

    /// Parse a single version string; `None` when the pattern does not match.
    #[must_use]
    pub fn parse(&self, text: &str) -> Option<Version> {
        let text = text.trim();
        let captures = self.regex.captures(text)?;
        let mut version = self.from_captures(&captures)?;
        version.raw = text.to_string();
        Some(version)
    }

    /// Compare two versions under this scheme's sort order.
    #[must_use]
    pub fn compare(&self, a: &Version, b: &Version) -> Ordering {
        match self.order {
            SortOrder::Semantic => a.cmp(b),
            SortOrder::Lexical => a.raw.cmp(&b.raw),
        }
    }

    /// Extract candidate versions from command output.
    ///
    /// Every match anywhere in the output contributes a candidate; commands
    /// like `go list -m -versions` print them all on one line. The result is
    /// deduplicated and sorted descending, so the newest candidate under
    /// this scheme comes first.
    #[must_use]
    pub fn extract(&self, output: &str) -> Vec<Version> {
        let mut versions: Vec<Version> = Vec::new();
        for captures in self.regex.captures_iter(output) {
            let Some(version) = self.from_captures(&captures) else {
                continue;
            };
            if !versions.contains(&version) {
                versions.push(version);
            }
        }
        versions.sort_by(|a, b| self.compare(b, a));
        versions
    }

    fn from_captures(&self, captures: &regex::Captures<'_>) -> Option<Version> {
        let component = |name: &str| {
            captures
                .name(name)
                .and_then(|m| m.as_str().parse::<u64>().ok())
                .unwrap_or(0)
        };
        captures.name("major")?;
        Some(Version {
            major: component("major"),
            minor: component("minor"),
            patch: component("patch"),
            pre: captures.name("pre").map(|m| m.as_str().to_string()),
            raw: captures.get(0).map(|m| m.as_str().to_string())?,
        })
    }
}

impl Default for Scheme {
    fn default() -> Self {
        Self::new(&Versioning::default()).unwrap_or_else(|_| unreachable!("default pattern compiles"))
    }
}
