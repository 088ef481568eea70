//! Row-to-link-candidate expansion
//!
//! A single cell may encode several document links separated by commas,
//! semicolons, or pipes. The expander turns one input row into an ordered
//! sequence of candidates, one per non-empty link; candidate order drives
//! the `link_1`, `link_2`, ... output column naming.

use crate::sheet::InputRow;
use url::Url;

/// Default separator set: commas, semicolons, and pipes all occur in the
/// wild within one export.
pub const DEFAULT_LINK_DELIMITERS: &str = ",;|";

/// One resolved link extracted from a row, the unit of independent
/// processing. Consumed by exactly one link-processor invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCandidate {
    /// Zero-based index of the owning row in the input artifact.
    pub row_index: usize,
    /// Zero-based position of this link within the row's link field.
    pub link_index: usize,
    /// The cell text as written in the spreadsheet.
    pub raw: String,
    /// The URL actually retrieved (raw text resolved against the base URL
    /// when it is not already absolute).
    pub url: String,
}

/// Splits the designated link field of a row into candidates.
#[derive(Debug, Clone)]
pub struct RowExpander {
    link_field: String,
    delimiters: Vec<char>,
    base_url: Option<Url>,
}

impl RowExpander {
    pub fn new(link_field: impl Into<String>, delimiters: &str, base_url: Option<Url>) -> Self {
        Self {
            link_field: link_field.into(),
            delimiters: delimiters.chars().collect(),
            base_url,
        }
    }

    pub fn link_field(&self) -> &str {
        &self.link_field
    }

    /// Expand a row into candidates, preserving original link order. A row
    /// with no resolvable links yields an empty vector; that is not an
    /// error, the row is later marked `no-links`.
    pub fn expand(&self, row: &InputRow) -> Vec<LinkCandidate> {
        let Some(cell) = row.get(&self.link_field) else {
            return Vec::new();
        };

        cell.split(self.delimiters.as_slice())
            .map(str::trim)
            .filter(|link| !link.is_empty())
            .enumerate()
            .map(|(link_index, raw)| LinkCandidate {
                row_index: row.index(),
                link_index,
                raw: raw.to_string(),
                url: self.resolve(raw),
            })
            .collect()
    }

    /// Absolute links pass through untouched; anything else is joined onto
    /// the configured base URL (when present).
    fn resolve(&self, raw: &str) -> String {
        if Url::parse(raw).is_ok() {
            return raw.to_string();
        }

        match &self.base_url {
            Some(base) => base
                .join(raw.trim_start_matches('/'))
                .map(|joined| joined.to_string())
                .unwrap_or_else(|_| raw.to_string()),
            None => raw.to_string(),
        }
    }
}
