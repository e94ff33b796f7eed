//! Streamed ASCII table output.
//!
//! Column widths are reserved from the expected row set before the run, so
//! rows can stream as results complete without the table shifting.
use super::Row;
use indexmap::IndexMap;
use std::io::Write;

/// A table streaming rows to a writer as they arrive.
pub struct TableSink<W: Write> {
    out: W,
    widths: Vec<usize>,
}

impl<W: Write> TableSink<W> {
    /// Reserve widths from the rows expected to stream and print the
    /// header. Cells arriving later that are wider than the reservation are
    /// not truncated; the table merely shifts for that row.
    ///
    /// # Errors
    /// On write failure.
    pub fn begin<R: Row>(mut out: W, expected: &[&R]) -> Result<Self, std::io::Error> {
        let columns = R::columns();
        let mut widths: Vec<usize> = columns.iter().map(|name| name.len()).collect();
        for row in expected {
            for (index, cell) in row.cells().iter().enumerate() {
                if cell.len() > widths[index] {
                    widths[index] = cell.len();
                }
            }
        }

        let header: Vec<String> = columns
            .iter()
            .zip(&widths)
            .map(|(name, width)| format!("{name:<width$}", name = name.to_uppercase()))
            .collect();
        writeln!(out, "{}", header.join("  ").trim_end())?;

        Ok(Self { out, widths })
    }

    /// Write one result row.
    ///
    /// # Errors
    /// On write failure.
    pub fn row<R: Row>(&mut self, row: &R) -> Result<(), std::io::Error> {
        let cells = row.cells();
        let line: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(index, cell)| {
                let width = self.widths.get(index).copied().unwrap_or(0);
                format!("{cell:<width$}")
            })
            .collect();
        writeln!(self.out, "{}", line.join("  ").trim_end())?;
        Ok(())
    }

    /// Write the summary footer and any collected warnings.
    ///
    /// # Errors
    /// On write failure.
    pub fn finish(
        mut self,
        summary: &IndexMap<String, usize>,
        warnings: &[String],
    ) -> Result<(), std::io::Error> {
        writeln!(self.out)?;
        let parts: Vec<String> = summary
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(label, count)| format!("{label}: {count}"))
            .collect();
        if parts.is_empty() {
            writeln!(self.out, "nothing to report")?;
        } else {
            writeln!(self.out, "{}", parts.join(", "))?;
        }
        for warning in warnings {
            writeln!(self.out, "warning: {warning}")?;
        }
        Ok(())
    }
}
