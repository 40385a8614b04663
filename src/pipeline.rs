//! End-to-end analysis of one CSV file.
//!
//! The pipeline is pure: bytes in, insights and chart bytes out. Every stage
//! needs the complete output of the previous one, so stages run strictly in
//! sequence, and nothing is produced unless every stage succeeds.

use crate::analytics::{compute_insights, InsightSet};
use crate::chart::{plan_chart, BucketedSeries, Granularity};
use crate::data::load_csv_bytes;
use crate::error::{AnalysisError, Result};
use crate::export::insights_to_csv;
use crate::viz::ChartFormat;
use tracing::debug;

/// Both artifacts of one analyzed file.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Summary statistics.
    pub insights: InsightSet,
    /// Encoded chart image.
    pub chart: Vec<u8>,
    /// Format of `chart`.
    pub chart_format: ChartFormat,
    /// Bucketed series behind the chart.
    pub series: BucketedSeries,
    /// Number of parsed records.
    pub records: usize,
}

impl Analysis {
    pub fn granularity(&self) -> Granularity {
        self.series.granularity
    }
}

/// Analyze CSV bytes, rendering the chart as PNG.
pub fn analyze(csv_bytes: &[u8]) -> Result<Analysis> {
    analyze_with(csv_bytes, ChartFormat::Png)
}

/// Analyze CSV bytes, rendering the chart in `format`.
pub fn analyze_with(csv_bytes: &[u8], format: ChartFormat) -> Result<Analysis> {
    let (mapping, records) = load_csv_bytes(csv_bytes)?;
    if records.is_empty() {
        return Err(AnalysisError::EmptyInput);
    }

    let insights = compute_insights(&records)?;
    let series = plan_chart(&records)?;
    let chart = format.render(&series, series.title())?;

    debug!(
        "Analyzed {} records ({} layout), chart {} bytes",
        records.len(),
        mapping.name,
        chart.len()
    );

    Ok(Analysis {
        insights,
        chart,
        chart_format: format,
        series,
        records: records.len(),
    })
}

/// Encode an insight set as the archival single-row CSV.
pub fn serialize(insights: &InsightSet) -> Result<Vec<u8>> {
    insights_to_csv(insights)
}
