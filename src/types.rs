//! Core data types for the analytics pipeline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One canonical daily price record.
///
/// Field relationships are kept exactly as uploaded: a record whose `low`
/// exceeds its `high` is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl PriceRecord {
    /// Create a new record.
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: u64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Whether `low > high`, which the source data is allowed to contain.
    pub fn is_inverted(&self) -> bool {
        self.low > self.high
    }
}

/// Canonical field names every supported column convention maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Date,
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl Field {
    /// All canonical fields in schema order.
    pub const ALL: [Field; 6] = [
        Field::Date,
        Field::Open,
        Field::High,
        Field::Low,
        Field::Close,
        Field::Volume,
    ];

    /// Canonical lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Field::Date => "date",
            Field::Open => "open",
            Field::High => "high",
            Field::Low => "low",
            Field::Close => "close",
            Field::Volume => "volume",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverted_record() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let normal = PriceRecord::new(date, 10.0, 12.0, 9.0, 11.0, 100);
        let inverted = PriceRecord::new(date, 10.0, 9.0, 12.0, 11.0, 100);
        assert!(!normal.is_inverted());
        assert!(inverted.is_inverted());
    }

    #[test]
    fn test_field_names() {
        let names: Vec<&str> = Field::ALL.iter().map(|f| f.name()).collect();
        assert_eq!(names, ["date", "open", "high", "low", "close", "volume"]);
        assert_eq!(Field::Close.to_string(), "close");
    }
}
