//! Single-document JSON, CSV, and XML emitters.
use super::{Error, Row};
use crate::report::Report;
use serde::Serialize;
use std::io::Write;

/// Emit the report as one pretty-printed JSON document.
///
/// # Errors
/// On serialization or write failure.
pub fn write_json<T, W>(out: &mut W, report: &Report<T>) -> Result<(), Error>
where
    T: Serialize,
    W: Write,
{
    serde_json::to_writer_pretty(&mut *out, report)?;
    writeln!(out)?;
    Ok(())
}

/// Emit the report rows as CSV with a header record.
///
/// Summary counts and warnings have no place in a flat table; CSV carries
/// the per-package rows only.
///
/// # Errors
/// On serialization or write failure.
pub fn write_csv<T, W>(out: &mut W, report: &Report<T>) -> Result<(), Error>
where
    T: Row + Serialize,
    W: Write,
{
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(T::columns())?;
    for row in &report.packages {
        writer.write_record(row.cells())?;
    }
    writer.flush()?;
    Ok(())
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn write_xml_element<W: Write>(out: &mut W, indent: usize, name: &str, text: &str) -> Result<(), Error> {
    writeln!(
        out,
        "{:indent$}<{name}>{}</{name}>",
        "",
        escape_xml(text),
        indent = indent
    )?;
    Ok(())
}

/// Emit the report as one XML document.
///
/// # Errors
/// On write failure.
pub fn write_xml<T, W>(out: &mut W, report: &Report<T>) -> Result<(), Error>
where
    T: Row + Serialize,
    W: Write,
{
    writeln!(out, "<report>")?;

    writeln!(out, "  <summary>")?;
    for (label, count) in &report.summary {
        write_xml_element(out, 4, label, &count.to_string())?;
    }
    writeln!(out, "  </summary>")?;

    writeln!(out, "  <packages>")?;
    for row in &report.packages {
        writeln!(out, "    <package>")?;
        for (column, cell) in T::columns().iter().zip(row.cells()) {
            write_xml_element(out, 6, column, &cell)?;
        }
        writeln!(out, "    </package>")?;
    }
    writeln!(out, "  </packages>")?;

    writeln!(out, "  <warnings>")?;
    for warning in &report.warnings {
        write_xml_element(out, 4, "warning", warning)?;
    }
    writeln!(out, "  </warnings>")?;

    writeln!(out, "  <errors>")?;
    for error in &report.errors {
        write_xml_element(out, 4, "error", error)?;
    }
    writeln!(out, "  </errors>")?;

    writeln!(out, "</report>")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{OutdatedResult, OutdatedStatus};
    use crate::package::{Constraint, InstallStatus, Package, PackageType};
    use crate::report;
    use crate::version::Scheme;

    fn sample_report() -> Report<OutdatedResult> {
        let scheme = Scheme::default();
        let package = Package {
            rule: "npm".into(),
            manager: "js".into(),
            file: "package.json".into(),
            name: "left-pad".into(),
            declared: "^1.0.0".into(),
            installed: Some("1.0.0".into()),
            constraint: Constraint::Caret,
            kind: PackageType::Prod,
            group: None,
            status: InstallStatus::Installed,
        };
        let result = OutdatedResult {
            target: scheme.parse("1.2.0"),
            minor: scheme.parse("1.2.0"),
            ..OutdatedResult::without_candidates(package, OutdatedStatus::Outdated, None)
        };
        report::outdated_report(vec![result], vec!["careful".into()])
    }

    #[test]
    fn json_is_one_well_formed_document() {
        let mut buffer = Vec::new();
        write_json(&mut buffer, &sample_report()).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["summary"]["outdated"], 1);
        assert_eq!(value["packages"][0]["name"], "left-pad");
        assert_eq!(value["packages"][0]["target"], "1.2.0");
        assert_eq!(value["warnings"][0], "careful");
    }

    #[test]
    fn csv_has_header_and_rows() {
        let mut buffer = Vec::new();
        write_csv(&mut buffer, &sample_report()).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("name,rule,manager"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("left-pad,npm,js,package.json,prod,1.0.0"));
        assert!(row.contains("#N/A"));
    }

    #[test]
    fn xml_is_one_well_formed_document() {
        let mut buffer = Vec::new();
        write_xml(&mut buffer, &sample_report()).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("<report>"));
        assert!(text.contains("<name>left-pad</name>"));
        assert!(text.contains("<outdated>1</outdated>"));
        assert!(text.contains("<warning>careful</warning>"));
        assert!(text.trim_end().ends_with("</report>"));
    }
}
