//! Column-convention detection.
//!
//! Uploaders disagree on column naming. Every supported convention is an
//! entry in [`KNOWN_MAPPINGS`], tried in order; supporting a new export format
//! means adding a row to that table.

use crate::error::{AnalysisError, Result};
use crate::types::Field;
use std::collections::HashSet;
use tracing::debug;

/// Association between canonical fields and the source column names of one
/// column convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaMapping {
    /// Human-readable convention name.
    pub name: &'static str,
    /// Source column for each canonical field, in [`Field::ALL`] order.
    columns: [&'static str; 6],
}

impl SchemaMapping {
    /// Source column name for a canonical field.
    pub fn column(&self, field: Field) -> &'static str {
        match field {
            Field::Date => self.columns[0],
            Field::Open => self.columns[1],
            Field::High => self.columns[2],
            Field::Low => self.columns[3],
            Field::Close => self.columns[4],
            Field::Volume => self.columns[5],
        }
    }

    /// All required source columns.
    pub fn required_columns(&self) -> &[&'static str] {
        &self.columns
    }

    /// Required columns that are absent from `present`.
    fn missing<'a>(&self, present: &HashSet<&'a str>) -> Vec<&'static str> {
        self.columns
            .iter()
            .copied()
            .filter(|c| !present.contains(c))
            .collect()
    }
}

/// Plain export: `Date,Open,High,Low,Close,Volume`.
pub const STANDARD: SchemaMapping = SchemaMapping {
    name: "standard",
    columns: ["Date", "Open", "High", "Low", "Close", "Volume"],
};

/// Nasdaq historical-quotes export: `Date,Close/Last,Volume,Open,High,Low`.
pub const NASDAQ: SchemaMapping = SchemaMapping {
    name: "nasdaq",
    columns: ["Date", "Open", "High", "Low", "Close/Last", "Volume"],
};

/// Supported conventions in priority order.
pub const KNOWN_MAPPINGS: [SchemaMapping; 2] = [STANDARD, NASDAQ];

/// Trim padding and a byte-order mark from a header name.
pub fn normalize_header(name: &str) -> &str {
    name.trim_start_matches('\u{feff}').trim()
}

/// Pick the first known mapping whose columns all appear in `headers`.
pub fn resolve<S: AsRef<str>>(headers: &[S]) -> Result<SchemaMapping> {
    let present: HashSet<&str> = headers
        .iter()
        .map(|h| normalize_header(h.as_ref()))
        .collect();

    for mapping in KNOWN_MAPPINGS.iter() {
        if mapping.missing(&present).is_empty() {
            debug!("Resolved column convention '{}'", mapping.name);
            return Ok(*mapping);
        }
    }

    // Report against the convention that came closest.
    let closest = KNOWN_MAPPINGS
        .iter()
        .min_by_key(|m| m.missing(&present).len())
        .unwrap_or(&STANDARD);
    let mut found: Vec<&str> = headers.iter().map(|h| normalize_header(h.as_ref())).collect();
    found.retain(|h| !h.is_empty());

    Err(AnalysisError::Schema(format!(
        "no supported column convention matches header [{}]; missing for '{}': [{}]",
        found.join(", "),
        closest.name,
        closest.missing(&present).join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_standard() {
        let mapping = resolve(&["Date", "Open", "High", "Low", "Close", "Volume"]).unwrap();
        assert_eq!(mapping, STANDARD);
        assert_eq!(mapping.column(Field::Close), "Close");
    }

    #[test]
    fn test_resolve_nasdaq_any_order() {
        let mapping = resolve(&["Date", "Close/Last", "Volume", "Open", "High", "Low"]).unwrap();
        assert_eq!(mapping, NASDAQ);
        assert_eq!(mapping.column(Field::Close), "Close/Last");
    }

    #[test]
    fn test_resolve_padded_headers() {
        let mapping =
            resolve(&["\u{feff}Date", " Close/Last", " Volume ", " Open", " High", " Low"]).unwrap();
        assert_eq!(mapping, NASDAQ);
    }

    #[test]
    fn test_priority_when_both_close_columns_present() {
        let mapping =
            resolve(&["Date", "Open", "High", "Low", "Close", "Close/Last", "Volume"]).unwrap();
        assert_eq!(mapping, STANDARD);
    }

    #[test]
    fn test_extra_columns_are_ignored() {
        let mapping =
            resolve(&["Date", "Open", "High", "Low", "Close", "Adj Close", "Volume"]).unwrap();
        assert_eq!(mapping, STANDARD);
    }

    #[test]
    fn test_missing_volume_is_rejected() {
        let err = resolve(&["Date", "Open", "High", "Low", "Close"]).unwrap_err();
        match err {
            AnalysisError::Schema(msg) => {
                assert!(msg.contains("Volume"), "message was: {}", msg);
                assert!(msg.contains("standard"));
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_case_sensitive_columns() {
        assert!(resolve(&["date", "open", "high", "low", "close", "volume"]).is_err());
    }

    #[test]
    fn test_empty_header() {
        let headers: [&str; 0] = [];
        assert!(matches!(resolve(&headers), Err(AnalysisError::Schema(_))));
    }
}
