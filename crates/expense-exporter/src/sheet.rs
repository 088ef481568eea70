//! Spreadsheet reading and writing
//!
//! The input artifact is a CSV file whose schema is collaborator-defined;
//! the only expectation this crate has is that the configured link-bearing
//! column exists. Rows are kept as ordered column/value pairs so the full
//! row context can be carried into the detail ledger unchanged.
//!
//! Reading is tolerant of ragged rows: a row whose value count does not
//! match the header is still surfaced (so it can be reported in the output
//! artifact) but flagged with a structural error instead of aborting the run.

use exporter_common::{ExporterError, Result};
use std::path::Path;
use std::sync::Arc;

/// A parsed input spreadsheet: header plus all rows, in input order.
#[derive(Debug, Clone)]
pub struct Sheet {
    headers: Arc<Vec<String>>,
    rows: Vec<InputRow>,
}

impl Sheet {
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[InputRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One spreadsheet record: an ordered mapping of column name to scalar
/// value. Immutable once read.
#[derive(Debug, Clone)]
pub struct InputRow {
    index: usize,
    headers: Arc<Vec<String>>,
    values: Vec<String>,
}

impl InputRow {
    pub fn new(index: usize, headers: Arc<Vec<String>>, values: Vec<String>) -> Self {
        Self {
            index,
            headers,
            values,
        }
    }

    /// Zero-based position of this row in the input artifact.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Look up a cell by column name.
    pub fn get(&self, column: &str) -> Option<&str> {
        let position = self.headers.iter().position(|h| h == column)?;
        self.values.get(position).map(String::as_str)
    }

    /// The full row as a JSON object of column name to cell value, for the
    /// detail ledger's row-context document.
    pub fn context_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (header, value) in self.headers.iter().zip(self.values.iter()) {
            map.insert(header.clone(), serde_json::Value::String(value.clone()));
        }
        serde_json::Value::Object(map)
    }

    /// Structural check: a row whose value count differs from the header
    /// cannot be addressed by column name and is reported, not processed.
    pub fn structural_error(&self) -> Option<String> {
        if self.values.len() == self.headers.len() {
            None
        } else {
            Some(format!(
                "row has {} values but the header has {} columns",
                self.values.len(),
                self.headers.len()
            ))
        }
    }
}

/// Read the input artifact. Any failure here is fatal to the run.
pub fn read_sheet(path: impl AsRef<Path>) -> Result<Sheet> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| ExporterError::artifact(format!("failed to open {}", path.display()), e))?;

    let headers: Arc<Vec<String>> = Arc::new(
        reader
            .headers()
            .map_err(|e| ExporterError::artifact(format!("failed to read header of {}", path.display()), e))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect(),
    );

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| {
            ExporterError::artifact(format!("failed to read row {} of {}", index + 1, path.display()), e)
        })?;
        let values = record.iter().map(|v| v.to_string()).collect();
        rows.push(InputRow::new(index, Arc::clone(&headers), values));
    }

    Ok(Sheet { headers, rows })
}

/// Per-link cells appended to an output row, one group per candidate.
#[derive(Debug, Clone, Default)]
pub struct LinkCells {
    pub link: String,
    pub hash: String,
    pub s3_link: String,
    pub status: String,
}

/// One enriched output row: the original columns plus per-link cells and an
/// overall row status.
#[derive(Debug, Clone)]
pub struct OutputRow {
    pub values: Vec<String>,
    pub link_cells: Vec<LinkCells>,
    pub status: String,
}

/// Write the output artifact in one pass. `link_width` is the largest
/// candidate count across all rows; rows with fewer links get empty cells
/// so every row has the same shape.
pub fn write_sheet(
    path: impl AsRef<Path>,
    headers: &[String],
    rows: &[OutputRow],
    link_width: usize,
) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| ExporterError::artifact(format!("failed to create {}", path.display()), e))?;

    let mut header_row: Vec<String> = headers.to_vec();
    for i in 1..=link_width {
        header_row.push(format!("link_{i}"));
        header_row.push(format!("hash_{i}"));
        header_row.push(format!("s3_link_{i}"));
        header_row.push(format!("status_{i}"));
    }
    header_row.push("status".to_string());

    writer
        .write_record(&header_row)
        .map_err(|e| ExporterError::artifact(format!("failed to write {}", path.display()), e))?;

    let empty = LinkCells::default();
    for row in rows {
        let mut record: Vec<&str> = row.values.iter().map(String::as_str).collect();
        for i in 0..link_width {
            let cells = row.link_cells.get(i).unwrap_or(&empty);
            record.push(&cells.link);
            record.push(&cells.hash);
            record.push(&cells.s3_link);
            record.push(&cells.status);
        }
        record.push(&row.status);

        writer
            .write_record(&record)
            .map_err(|e| ExporterError::artifact(format!("failed to write {}", path.display()), e))?;
    }

    writer
        .flush()
        .map_err(|e| ExporterError::artifact(format!("failed to flush {}", path.display()), e))?;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sheet_from(content: &str) -> Sheet {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        read_sheet(file.path()).unwrap()
    }

    #[test]
    fn test_read_sheet_basic() {
        let sheet = sheet_from("BOOKING_ID,HOTEL_INVOICE_PATH\nB-1,docs/a.pdf\nB-2,docs/b.pdf\n");
        assert_eq!(sheet.headers(), &["BOOKING_ID", "HOTEL_INVOICE_PATH"]);
        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet.rows()[0].get("BOOKING_ID"), Some("B-1"));
        assert_eq!(sheet.rows()[1].get("HOTEL_INVOICE_PATH"), Some("docs/b.pdf"));
        assert_eq!(sheet.rows()[1].index(), 1);
    }

    #[test]
    fn test_read_sheet_missing_file_is_fatal() {
        let err = read_sheet("/nonexistent/input.csv").unwrap_err();
        assert!(matches!(err, ExporterError::Artifact(_)));
    }

    #[test]
    fn test_ragged_row_is_structural_error_not_read_failure() {
        let sheet = sheet_from("A,B,C\n1,2,3\n1,2\n");
        assert!(sheet.rows()[0].structural_error().is_none());
        let problem = sheet.rows()[1].structural_error().unwrap();
        assert!(problem.contains("2 values"));
        assert!(problem.contains("3 columns"));
    }

    #[test]
    fn test_context_json_preserves_columns() {
        let sheet = sheet_from("CLIENT_GST_NO,AMOUNT\n29ABC,1200.50\n");
        let context = sheet.rows()[0].context_json();
        assert_eq!(context["CLIENT_GST_NO"], "29ABC");
        assert_eq!(context["AMOUNT"], "1200.50");
    }

    #[test]
    fn test_write_sheet_pads_to_link_width() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let rows = vec![
            OutputRow {
                values: vec!["B-1".into()],
                link_cells: vec![LinkCells {
                    link: "http://a/doc.pdf".into(),
                    hash: "abc".into(),
                    s3_link: "https://s3/doc".into(),
                    status: "SUCCESS".into(),
                }],
                status: "all-succeeded".into(),
            },
            OutputRow {
                values: vec!["B-2".into()],
                link_cells: vec![],
                status: "no-links".into(),
            },
        ];

        write_sheet(&path, &["BOOKING_ID".to_string()], &rows, 2).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let mut lines = written.lines();
        assert_eq!(
            lines.next().unwrap(),
            "BOOKING_ID,link_1,hash_1,s3_link_1,status_1,link_2,hash_2,s3_link_2,status_2,status"
        );
        assert_eq!(
            lines.next().unwrap(),
            "B-1,http://a/doc.pdf,abc,https://s3/doc,SUCCESS,,,,,all-succeeded"
        );
        assert_eq!(lines.next().unwrap(), "B-2,,,,,,,,,no-links");
    }
}
