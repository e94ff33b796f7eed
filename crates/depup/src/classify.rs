//! Candidate classification: slot partitioning, incremental stepping, and
//! constraint-restricted target selection.
use crate::package::{Constraint, Package};
use crate::version::{Scheme, Version};
use std::cmp::Ordering;

/// Sentinel rendered for a slot with no fitting candidate.
pub const NOT_AVAILABLE: &str = "#N/A";

/// User intent: which version slots may become the update target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    pub major: bool,
    pub minor: bool,
    pub patch: bool,
}

/// The classified outcome for one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutdatedStatus {
    /// At least one newer candidate fits a slot.
    Outdated,
    /// No candidate is newer than the installed version.
    UpToDate,
    /// The version query failed, with the child exit code when known.
    Failed(Option<i32>),
    /// Pass-through of the floating install status.
    Floating,
    /// Pass-through of the ignored install status.
    Ignored,
    /// The rule cannot check this package.
    NotConfigured,
}

impl OutdatedStatus {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl std::fmt::Display for OutdatedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Outdated => write!(f, "Outdated"),
            Self::UpToDate => write!(f, "UpToDate"),
            Self::Failed(None) => write!(f, "Failed"),
            Self::Failed(Some(code)) => write!(f, "Failed({code})"),
            Self::Floating => write!(f, "Floating"),
            Self::Ignored => write!(f, "Ignored"),
            Self::NotConfigured => write!(f, "NotConfigured"),
        }
    }
}

impl serde::Serialize for OutdatedStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

/// The classified outcome for one package: slot summaries, the selected
/// target, and the candidate list actually considered.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OutdatedResult {
    #[serde(flatten)]
    pub package: Package,
    pub major: Option<Version>,
    pub minor: Option<Version>,
    pub patch: Option<Version>,
    pub target: Option<Version>,
    pub status: OutdatedStatus,
    pub error: Option<String>,
    pub candidates: Vec<Version>,
}

impl OutdatedResult {
    /// Render a slot for tabular output, `#N/A` when empty.
    #[must_use]
    pub fn slot_text(slot: Option<&Version>) -> String {
        slot.map_or_else(|| NOT_AVAILABLE.to_string(), ToString::to_string)
    }

    /// A result that never reached classification (floating, ignored,
    /// not-configured, or failed).
    #[must_use]
    pub fn without_candidates(package: Package, status: OutdatedStatus, error: Option<String>) -> Self {
        Self {
            package,
            major: None,
            minor: None,
            patch: None,
            target: None,
            status,
            error,
            candidates: Vec::new(),
        }
    }
}

/// Distance of a candidate from the installed version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Major,
    Minor,
    Patch,
}

fn slot_of(installed: &Version, candidate: &Version) -> Slot {
    if candidate.major != installed.major {
        Slot::Major
    } else if candidate.minor != installed.minor {
        Slot::Minor
    } else {
        Slot::Patch
    }
}

/// Classify candidates against the installed version and select a target.
///
/// `constraint` is the package's marker, already widened to
/// `Constraint::None` when the declared version matches a latest indicator.
/// `incremental` selects the next version per slot instead of the latest,
/// and makes the fallback target the lowest permitted slot.
#[must_use]
pub fn classify(
    package: Package,
    installed: &Version,
    candidates: Vec<Version>,
    scheme: &Scheme,
    constraint: Constraint,
    selection: Selection,
    incremental: bool,
) -> OutdatedResult {
    // 1. drop candidates at or below the installed version, and
    //    pre-releases excluded by the scheme's policy
    let considered: Vec<Version> = candidates
        .into_iter()
        .filter(|candidate| scheme.compare(candidate, installed) == Ordering::Greater)
        .filter(|candidate| {
            if !candidate.is_prerelease() || scheme.include_prereleases() {
                return true;
            }
            // a stable install only steps through a pre-release when it is
            // finishing off the same triple it already runs
            installed.is_prerelease() && candidate.triple() == installed.triple()
        })
        .collect();

    // 2./3./4. partition by distance and pick each slot's representative
    let mut major: Option<&Version> = None;
    let mut minor: Option<&Version> = None;
    let mut patch: Option<&Version> = None;
    for candidate in &considered {
        let slot = match slot_of(installed, candidate) {
            Slot::Major => &mut major,
            Slot::Minor => &mut minor,
            Slot::Patch => &mut patch,
        };
        *slot = Some(match slot.take() {
            None => candidate,
            Some(current) => {
                let newer = scheme.compare(candidate, current) == Ordering::Greater;
                // incremental keeps the minimum of the partition, the next
                // step; otherwise the maximum, the latest
                if newer == incremental {
                    current
                } else {
                    candidate
                }
            }
        });
    }

    let major = major.cloned();
    let minor = minor.cloned();
    let patch = patch.cloned();

    let target = select_target(
        major.as_ref(),
        minor.as_ref(),
        patch.as_ref(),
        constraint,
        selection,
        incremental,
    )
    .cloned();

    let status = if major.is_some() || minor.is_some() || patch.is_some() {
        OutdatedStatus::Outdated
    } else {
        OutdatedStatus::UpToDate
    };

    OutdatedResult {
        package,
        major,
        minor,
        patch,
        target,
        status,
        error: None,
        candidates: considered,
    }
}

fn select_target<'a>(
    major: Option<&'a Version>,
    minor: Option<&'a Version>,
    patch: Option<&'a Version>,
    constraint: Constraint,
    selection: Selection,
    incremental: bool,
) -> Option<&'a Version> {
    // the constraint marker bounds which slots may be targeted at all; a
    // selection flag whose slot is empty or forbidden falls through
    let (major_ok, minor_ok, patch_ok) = match constraint {
        Constraint::Pinned => (false, false, false),
        Constraint::Tilde => (false, false, true),
        Constraint::Caret => (false, true, true),
        Constraint::None | Constraint::Range => (true, true, true),
    };
    let major = major.filter(|_| major_ok);
    let minor = minor.filter(|_| minor_ok);
    let patch = patch.filter(|_| patch_ok);

    if selection.patch && patch.is_some() {
        return patch;
    }
    if selection.minor && minor.is_some() {
        return minor;
    }
    if selection.major && major.is_some() {
        return major;
    }

    if incremental {
        // the next version overall: lowest permitted slot first
        patch.or(minor).or(major)
    } else {
        major.or(minor).or(patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{InstallStatus, PackageType};
    use crate::version::Scheme;

    fn package(constraint: Constraint) -> Package {
        Package {
            rule: "npm".into(),
            manager: "js".into(),
            file: "package.json".into(),
            name: "left-pad".into(),
            declared: "^1.0.0".into(),
            installed: Some("1.0.0".into()),
            constraint,
            kind: PackageType::Prod,
            group: None,
            status: InstallStatus::Installed,
        }
    }

    fn versions(scheme: &Scheme, raws: &[&str]) -> Vec<Version> {
        raws.iter().map(|raw| scheme.parse(raw).unwrap()).collect()
    }

    #[test]
    fn caret_caps_target_at_major_boundary() {
        let scheme = Scheme::default();
        let installed = scheme.parse("1.0.0").unwrap();
        let result = classify(
            package(Constraint::Caret),
            &installed,
            versions(&scheme, &["1.0.1", "1.2.0", "2.0.0"]),
            &scheme,
            Constraint::Caret,
            Selection::default(),
            false,
        );
        assert_eq!(result.major.as_ref().unwrap().raw, "2.0.0");
        assert_eq!(result.minor.as_ref().unwrap().raw, "1.2.0");
        assert_eq!(result.patch.as_ref().unwrap().raw, "1.0.1");
        assert_eq!(result.target.as_ref().unwrap().raw, "1.2.0");
        assert_eq!(result.status, OutdatedStatus::Outdated);
    }

    #[test]
    fn incremental_targets_the_next_version() {
        let scheme = Scheme::default();
        let installed = scheme.parse("1.0.0").unwrap();
        let result = classify(
            package(Constraint::Caret),
            &installed,
            versions(&scheme, &["1.0.1", "1.2.0", "2.0.0"]),
            &scheme,
            Constraint::Caret,
            Selection::default(),
            true,
        );
        assert_eq!(result.target.as_ref().unwrap().raw, "1.0.1");
    }

    #[test]
    fn incremental_major_is_the_lowest_major_above_installed() {
        let scheme = Scheme::default();
        let installed = scheme.parse("1.0.0").unwrap();
        let result = classify(
            package(Constraint::None),
            &installed,
            versions(&scheme, &["2.0.0", "2.4.0", "3.0.0"]),
            &scheme,
            Constraint::None,
            Selection::default(),
            true,
        );
        // all candidates land in the major slot; incremental keeps the minimum
        assert_eq!(result.target.as_ref().unwrap().raw, "2.0.0");
        assert!(result.target.as_ref().unwrap().major - installed.major <= 1);
    }

    #[test]
    fn explicit_selection_picks_its_slot() {
        let scheme = Scheme::default();
        let installed = scheme.parse("1.0.0").unwrap();
        let result = classify(
            package(Constraint::None),
            &installed,
            versions(&scheme, &["1.0.1", "1.2.0", "2.0.0"]),
            &scheme,
            Constraint::None,
            Selection {
                patch: true,
                ..Selection::default()
            },
            false,
        );
        assert_eq!(result.target.as_ref().unwrap().raw, "1.0.1");
    }

    #[test]
    fn major_selection_forbidden_by_caret_falls_back() {
        let scheme = Scheme::default();
        let installed = scheme.parse("1.0.0").unwrap();
        let result = classify(
            package(Constraint::Caret),
            &installed,
            versions(&scheme, &["1.0.1", "1.2.0", "2.0.0"]),
            &scheme,
            Constraint::Caret,
            Selection {
                major: true,
                ..Selection::default()
            },
            false,
        );
        // the caret forbids crossing the major boundary; the highest
        // permitted slot wins instead
        assert_eq!(result.target.as_ref().unwrap().raw, "1.2.0");
    }

    #[test]
    fn empty_selected_slot_falls_back() {
        let scheme = Scheme::default();
        let installed = scheme.parse("1.0.0").unwrap();
        let result = classify(
            package(Constraint::None),
            &installed,
            versions(&scheme, &["1.2.0"]),
            &scheme,
            Constraint::None,
            Selection {
                patch: true,
                ..Selection::default()
            },
            false,
        );
        assert_eq!(result.target.as_ref().unwrap().raw, "1.2.0");
        assert_eq!(result.status, OutdatedStatus::Outdated);
    }

    #[test]
    fn pinned_constraint_allows_no_change() {
        let scheme = Scheme::default();
        let installed = scheme.parse("1.0.0").unwrap();
        let result = classify(
            package(Constraint::Pinned),
            &installed,
            versions(&scheme, &["1.0.1", "2.0.0"]),
            &scheme,
            Constraint::Pinned,
            Selection::default(),
            false,
        );
        assert!(result.target.is_none());
        assert_eq!(result.status, OutdatedStatus::Outdated);
    }

    #[test]
    fn tilde_constraint_permits_only_patch() {
        let scheme = Scheme::default();
        let installed = scheme.parse("1.0.0").unwrap();
        let result = classify(
            package(Constraint::Tilde),
            &installed,
            versions(&scheme, &["1.0.4", "1.2.0"]),
            &scheme,
            Constraint::Tilde,
            Selection::default(),
            false,
        );
        assert_eq!(result.target.as_ref().unwrap().raw, "1.0.4");
    }

    #[test]
    fn candidates_at_or_below_installed_are_dropped() {
        let scheme = Scheme::default();
        let installed = scheme.parse("1.2.0").unwrap();
        let result = classify(
            package(Constraint::None),
            &installed,
            versions(&scheme, &["0.9.0", "1.2.0"]),
            &scheme,
            Constraint::None,
            Selection::default(),
            false,
        );
        assert!(result.candidates.is_empty());
        assert_eq!(result.status, OutdatedStatus::UpToDate);
        assert!(result.target.is_none());
    }

    #[test]
    fn prereleases_are_dropped_for_stable_installs() {
        let scheme = Scheme::default();
        let installed = scheme.parse("1.0.0").unwrap();
        let result = classify(
            package(Constraint::None),
            &installed,
            versions(&scheme, &["2.0.0-rc.1"]),
            &scheme,
            Constraint::None,
            Selection::default(),
            false,
        );
        assert_eq!(result.status, OutdatedStatus::UpToDate);
    }

    #[test]
    fn prerelease_install_may_finish_its_triple() {
        let scheme = Scheme::default();
        let installed = scheme.parse("1.0.0-rc.1").unwrap();
        let result = classify(
            package(Constraint::None),
            &installed,
            versions(&scheme, &["1.0.0-rc.2", "2.0.0-beta.1"]),
            &scheme,
            Constraint::None,
            Selection::default(),
            false,
        );
        // same-triple pre-release is allowed, the 2.0.0 beta is not
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.target.as_ref().unwrap().raw, "1.0.0-rc.2");
    }

    #[test]
    fn failed_status_formats_exit_code() {
        assert_eq!(OutdatedStatus::Failed(Some(2)).to_string(), "Failed(2)");
        assert_eq!(OutdatedStatus::Failed(None).to_string(), "Failed");
    }
}
