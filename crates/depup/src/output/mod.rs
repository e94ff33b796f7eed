//! Result emission: streamed table, or a single JSON/XML/CSV document.
//!
//! When the primary stream carries a structured document, all progress and
//! informational text is routed to the secondary stream so the primary
//! contains exactly one well-formed document.
pub mod structured;
pub mod table;

use crate::classify::{OutdatedResult, OutdatedStatus};
use crate::update::{UpdateResult, UpdateStatus};

/// Selected output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Streamed ASCII table with a summary footer.
    #[default]
    Table,
    Json,
    Csv,
    Xml,
}

impl OutputFormat {
    /// Structured formats own the primary stream exclusively.
    #[must_use]
    pub fn is_structured(self) -> bool {
        !matches!(self, Self::Table)
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            s if s.eq_ignore_ascii_case("table") => Ok(Self::Table),
            s if s.eq_ignore_ascii_case("json") => Ok(Self::Json),
            s if s.eq_ignore_ascii_case("csv") => Ok(Self::Csv),
            s if s.eq_ignore_ascii_case("xml") => Ok(Self::Xml),
            other => Err(format!("unknown output format: {other:?}")),
        }
    }
}

/// Errors raised while writing results.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to serialize output: {0}")]
    Csv(#[from] csv::Error),
}

/// Tabular projection of a result row, shared by the table, CSV, and XML
/// writers.
pub trait Row {
    /// Column names, in emission order.
    fn columns() -> &'static [&'static str];
    /// Cell values matching `columns()`.
    fn cells(&self) -> Vec<String>;
}

fn opt(value: Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

impl Row for crate::package::Package {
    fn columns() -> &'static [&'static str] {
        &[
            "name", "rule", "manager", "file", "type", "declared", "installed", "group", "status",
        ]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.rule.clone(),
            self.manager.clone(),
            self.file.display().to_string(),
            self.kind.as_str().to_string(),
            self.declared.clone(),
            opt(self.installed.as_deref()),
            opt(self.group.as_deref()),
            self.status.as_str().to_string(),
        ]
    }
}

impl Row for OutdatedResult {
    fn columns() -> &'static [&'static str] {
        &[
            "name", "rule", "manager", "file", "type", "installed", "major", "minor", "patch",
            "target", "status", "error",
        ]
    }

    fn cells(&self) -> Vec<String> {
        let slot = |slot: Option<&crate::version::Version>| {
            // only checked packages carry slot summaries
            if matches!(
                self.status,
                OutdatedStatus::Outdated | OutdatedStatus::UpToDate
            ) {
                Self::slot_text(slot)
            } else {
                String::new()
            }
        };
        vec![
            self.package.name.clone(),
            self.package.rule.clone(),
            self.package.manager.clone(),
            self.package.file.display().to_string(),
            self.package.kind.as_str().to_string(),
            opt(self.package.installed.as_deref()),
            slot(self.major.as_ref()),
            slot(self.minor.as_ref()),
            slot(self.patch.as_ref()),
            self.target
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            self.status.to_string(),
            opt(self.error.as_deref()),
        ]
    }
}

impl Row for UpdateResult {
    fn columns() -> &'static [&'static str] {
        &[
            "name", "rule", "manager", "file", "type", "group", "before", "target", "after",
            "status", "error",
        ]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.package.name.clone(),
            self.package.rule.clone(),
            self.package.manager.clone(),
            self.package.file.display().to_string(),
            self.package.kind.as_str().to_string(),
            opt(self.package.group.as_deref()),
            opt(self.before.as_deref()),
            self.target
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            if self.status == UpdateStatus::Planned {
                // a planned update has not happened; the after column shows
                // what would be installed
                self.after.clone().map(|a| format!("({a})")).unwrap_or_default()
            } else {
                opt(self.after.as_deref())
            },
            self.status.to_string(),
            opt(self.error.as_deref()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("CSV".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert!("yaml".parse::<OutputFormat>().is_err());
        assert!(OutputFormat::Json.is_structured());
        assert!(!OutputFormat::Table.is_structured());
    }
}
