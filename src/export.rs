//! Export utilities for insight sets.
//!
//! | Format | Use Case |
//! |--------|----------|
//! | CSV | Archival summary stored next to the input (one header row, one data row) |
//! | JSON | CLI and API consumers, structured data |

use crate::analytics::InsightSet;
use crate::chart::Granularity;
use crate::error::{AnalysisError, Result};
use crate::metadata::SourceMetadata;
use csv::WriterBuilder;
use serde::Serialize;

/// Content type of the serialized summary.
pub const SUMMARY_CONTENT_TYPE: &str = "text/csv";

/// Encode an insight set as a single-row CSV table.
pub fn insights_to_csv(insights: &InsightSet) -> Result<Vec<u8>> {
    let values = insights.formatted_values();
    let mut writer = WriterBuilder::new().from_writer(Vec::new());

    writer.write_record(values.iter().map(|(name, _)| *name))?;
    writer.write_record(values.iter().map(|(_, value)| value.as_str()))?;

    writer
        .into_inner()
        .map_err(|e| AnalysisError::Io(e.into_error()))
}

/// JSON report combining the insights with optional processing context.
#[derive(Debug, Clone, Serialize)]
pub struct InsightReport<'a> {
    pub insights: &'a InsightSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granularity: Option<Granularity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<&'a SourceMetadata>,
}

impl<'a> InsightReport<'a> {
    pub fn new(insights: &'a InsightSet) -> Self {
        Self {
            insights,
            granularity: None,
            records: None,
            source: None,
        }
    }

    pub fn with_chart(mut self, granularity: Granularity, records: usize) -> Self {
        self.granularity = Some(granularity);
        self.records = Some(records);
        self
    }

    pub fn with_source(mut self, source: &'a SourceMetadata) -> Self {
        self.source = Some(source);
        self
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Pretty-printed JSON of the insights alone.
pub fn insights_to_json(insights: &InsightSet) -> Result<String> {
    InsightReport::new(insights).to_json()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::compute_insights;
    use crate::types::PriceRecord;
    use chrono::NaiveDate;

    fn sample_insights() -> InsightSet {
        let records = vec![
            PriceRecord::new(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(), 99.0, 105.0, 95.5, 100.0, 1000),
            PriceRecord::new(NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(), 101.0, 112.0, 99.0, 110.0, 1500),
        ];
        compute_insights(&records).unwrap()
    }

    #[test]
    fn test_csv_single_row() {
        let bytes = insights_to_csv(&sample_insights()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "highest_price,lowest_price,average_price,total_trading_volume,start_date,end_date,performance_change,seven_day_average_latest"
        );
        assert_eq!(lines[1], "112,95.5,105,2500,2023-01-01,2023-01-02,10.00%,");
    }

    #[test]
    fn test_csv_reads_back() {
        let bytes = insights_to_csv(&sample_insights()).unwrap();
        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let headers = reader.headers().unwrap().clone();
        let row = reader.records().next().unwrap().unwrap();

        let idx = headers.iter().position(|h| h == "performance_change").unwrap();
        assert_eq!(&row[idx], "10.00%");
    }

    #[test]
    fn test_json_report() {
        let insights = sample_insights();
        let json = InsightReport::new(&insights)
            .with_chart(Granularity::Month, 2)
            .to_json()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["insights"]["performance_change"], "10.00%");
        assert_eq!(value["insights"]["total_trading_volume"], 2500);
        assert!(value["insights"]["seven_day_average_latest"].is_null());
        assert_eq!(value["granularity"], "month");
        assert!(value.get("source").is_none());
    }
}
