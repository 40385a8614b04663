//! Chart planning: pick a bucket granularity from the data's own time span
//! and average closing prices per bucket.

use crate::analytics::mean;
use crate::error::{AnalysisError, Result};
use crate::types::PriceRecord;
use chrono::Datelike;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Spans longer than this many days are bucketed by year.
pub const YEARLY_THRESHOLD_DAYS: i64 = 365;

/// Time bucket width for the chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Month,
    Year,
}

impl Granularity {
    /// Choose the granularity for a span measured in days.
    pub fn for_span(span_days: i64) -> Self {
        if span_days > YEARLY_THRESHOLD_DAYS {
            Granularity::Year
        } else {
            Granularity::Month
        }
    }

    /// Chart title for this granularity.
    pub fn title(&self) -> &'static str {
        match self {
            Granularity::Month => "Average Closing Price by Month",
            Granularity::Year => "Average Closing Price by Year",
        }
    }

    /// Sortable bucket key for a record.
    fn bucket_key(&self, record: &PriceRecord) -> (i32, u32) {
        match self {
            Granularity::Month => (record.date.year(), record.date.month()),
            Granularity::Year => (record.date.year(), 0),
        }
    }

    fn label(&self, (year, month): (i32, u32)) -> String {
        match self {
            Granularity::Month => format!("{:04}-{:02}", year, month),
            Granularity::Year => year.to_string(),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Month => write!(f, "month"),
            Granularity::Year => write!(f, "year"),
        }
    }
}

/// One aggregated chart point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub label: String,
    pub value: f64,
}

/// Bucketed series ready for rendering, ordered by bucket start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketedSeries {
    pub granularity: Granularity,
    pub buckets: Vec<Bucket>,
}

impl BucketedSeries {
    pub fn title(&self) -> &'static str {
        self.granularity.title()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.buckets.iter().map(|b| b.label.as_str()).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.buckets.iter().map(|b| b.value).collect()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Days between the earliest and latest record.
pub fn span_days(records: &[PriceRecord]) -> Option<i64> {
    let min = records.iter().map(|r| r.date).min()?;
    let max = records.iter().map(|r| r.date).max()?;
    Some((max - min).num_days())
}

/// Bucket records by `granularity`, averaging `close` per bucket.
///
/// Only buckets that contain records are emitted; gaps are not filled.
pub fn bucket_closes(records: &[PriceRecord], granularity: Granularity) -> BucketedSeries {
    let mut closes: BTreeMap<(i32, u32), Vec<f64>> = BTreeMap::new();
    for record in records {
        closes
            .entry(granularity.bucket_key(record))
            .or_default()
            .push(record.close);
    }

    let buckets = closes
        .into_iter()
        .map(|(key, values)| Bucket {
            label: granularity.label(key),
            value: mean(&values),
        })
        .collect();

    BucketedSeries {
        granularity,
        buckets,
    }
}

/// Plan the chart for a record set: choose granularity, then bucket.
pub fn plan_chart(records: &[PriceRecord]) -> Result<BucketedSeries> {
    let span = span_days(records).ok_or(AnalysisError::EmptyInput)?;
    let granularity = Granularity::for_span(span);
    let series = bucket_closes(records, granularity);

    debug!(
        "Span of {} days bucketed by {} into {} points",
        span,
        granularity,
        series.len()
    );
    Ok(series)
}
