//! Package and file filters applied between parsing and planning.
use crate::package::{Package, PackageType};
use std::path::Path;

/// Filter set assembled from CLI flags and positional file patterns.
///
/// An empty dimension passes everything; within one dimension the entries
/// are alternatives.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    /// Package names, matched exactly or as glob patterns.
    pub names: Vec<String>,
    pub types: Vec<PackageType>,
    /// Ecosystem family labels.
    pub managers: Vec<String>,
    /// Rule ids.
    pub rules: Vec<String>,
    /// Group labels.
    pub groups: Vec<String>,
    /// Manifest path patterns (positional arguments).
    pub files: Vec<String>,
}

fn name_matches(filter: &str, name: &str) -> bool {
    if filter == name {
        return true;
    }
    glob::Pattern::new(filter)
        .map(|pattern| pattern.matches(name))
        .unwrap_or(false)
}

fn path_matches(filter: &str, path: &Path) -> bool {
    if Path::new(filter) == path {
        return true;
    }
    glob::Pattern::new(filter)
        .map(|pattern| pattern.matches_path(path))
        .unwrap_or(false)
}

impl Filters {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
            && self.types.is_empty()
            && self.managers.is_empty()
            && self.rules.is_empty()
            && self.groups.is_empty()
            && self.files.is_empty()
    }

    /// Does a package survive every filter dimension?
    #[must_use]
    pub fn matches(&self, package: &Package) -> bool {
        if !self.names.is_empty()
            && !self
                .names
                .iter()
                .any(|filter| name_matches(filter, &package.name))
        {
            return false;
        }
        if !self.types.is_empty() && !self.types.contains(&package.kind) {
            return false;
        }
        if !self.managers.is_empty() && !self.managers.contains(&package.manager) {
            return false;
        }
        if !self.rules.is_empty() && !self.rules.contains(&package.rule) {
            return false;
        }
        if !self.groups.is_empty() {
            let Some(group) = &package.group else {
                return false;
            };
            if !self.groups.contains(group) {
                return false;
            }
        }
        if !self.files.is_empty() && !self.matches_file(&package.file) {
            return false;
        }
        true
    }

    /// Does a manifest path survive the positional file patterns?
    #[must_use]
    pub fn matches_file(&self, path: &Path) -> bool {
        self.files.is_empty()
            || self
                .files
                .iter()
                .any(|filter| path_matches(filter, path))
    }
}

/// Apply filters, preserving input order.
#[must_use]
pub fn apply(packages: Vec<Package>, filters: &Filters) -> Vec<Package> {
    if filters.is_empty() {
        return packages;
    }
    packages
        .into_iter()
        .filter(|package| filters.matches(package))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{Constraint, InstallStatus};
    use std::path::PathBuf;

    fn package(name: &str, rule: &str, manager: &str, kind: PackageType, group: Option<&str>) -> Package {
        Package {
            rule: rule.into(),
            manager: manager.into(),
            file: PathBuf::from(format!("{rule}/manifest")),
            name: name.into(),
            declared: "1.0.0".into(),
            installed: None,
            constraint: Constraint::None,
            kind,
            group: group.map(String::from),
            status: InstallStatus::Missing,
        }
    }

    #[test]
    fn empty_filters_pass_everything() {
        let packages = vec![package("a", "npm", "js", PackageType::Prod, None)];
        assert_eq!(apply(packages.clone(), &Filters::default()), packages);
    }

    #[test]
    fn name_globs_match() {
        let filters = Filters {
            names: vec!["eslint-*".into()],
            ..Filters::default()
        };
        assert!(filters.matches(&package(
            "eslint-plugin-react",
            "npm",
            "js",
            PackageType::Dev,
            None
        )));
        assert!(!filters.matches(&package("react", "npm", "js", PackageType::Prod, None)));
    }

    #[test]
    fn dimensions_combine_conjunctively() {
        let filters = Filters {
            rules: vec!["npm".into()],
            types: vec![PackageType::Dev],
            ..Filters::default()
        };
        assert!(filters.matches(&package("eslint", "npm", "js", PackageType::Dev, None)));
        assert!(!filters.matches(&package("eslint", "npm", "js", PackageType::Prod, None)));
        assert!(!filters.matches(&package("eslint", "pnpm", "js", PackageType::Dev, None)));
    }

    #[test]
    fn group_filter_requires_a_label() {
        let filters = Filters {
            groups: vec!["tooling".into()],
            ..Filters::default()
        };
        assert!(filters.matches(&package("a", "npm", "js", PackageType::Prod, Some("tooling"))));
        assert!(!filters.matches(&package("a", "npm", "js", PackageType::Prod, None)));
    }

    #[test]
    fn file_patterns_restrict_manifests() {
        let filters = Filters {
            files: vec!["npm/*".into()],
            ..Filters::default()
        };
        assert!(filters.matches_file(Path::new("npm/manifest")));
        assert!(!filters.matches_file(Path::new("cargo/manifest")));
    }
}
