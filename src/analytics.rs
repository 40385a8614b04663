//! Summary statistics over a canonical record set.
//!
//! Every insight is an independent reduction over the date-sorted records.
//! The set is built once per file by [`compute_insights`] and is read-only
//! afterwards.

use crate::error::{AnalysisError, Result};
use crate::types::PriceRecord;
use chrono::NaiveDate;
use serde::Serialize;

/// Window of the trailing close-price average reported in the insight set.
pub const ROLLING_WINDOW: usize = 7;

/// Date format used for `start_date` / `end_date`.
pub const INSIGHT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Insight names in serialization order.
pub const INSIGHT_FIELDS: [&str; 8] = [
    "highest_price",
    "lowest_price",
    "average_price",
    "total_trading_volume",
    "start_date",
    "end_date",
    "performance_change",
    "seven_day_average_latest",
];

/// Named summary statistics for one input file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightSet {
    highest_price: f64,
    lowest_price: f64,
    average_price: f64,
    total_trading_volume: u64,
    start_date: String,
    end_date: String,
    performance_change: String,
    seven_day_average_latest: Option<f64>,
}

impl InsightSet {
    /// Maximum `high` across all records.
    pub fn highest_price(&self) -> f64 {
        self.highest_price
    }

    /// Minimum `low` across all records.
    pub fn lowest_price(&self) -> f64 {
        self.lowest_price
    }

    /// Mean closing price.
    pub fn average_price(&self) -> f64 {
        self.average_price
    }

    pub fn total_trading_volume(&self) -> u64 {
        self.total_trading_volume
    }

    /// First date, `YYYY-MM-DD`.
    pub fn start_date(&self) -> &str {
        &self.start_date
    }

    /// Last date, `YYYY-MM-DD`.
    pub fn end_date(&self) -> &str {
        &self.end_date
    }

    /// Signed first-to-last close change, e.g. `"-3.25%"`.
    pub fn performance_change(&self) -> &str {
        &self.performance_change
    }

    /// Latest 7-record trailing close average, absent for short inputs.
    pub fn seven_day_average_latest(&self) -> Option<f64> {
        self.seven_day_average_latest
    }

    /// Insight values formatted for archival, paired with their names in
    /// [`INSIGHT_FIELDS`] order. An absent rolling average is an empty string.
    pub fn formatted_values(&self) -> Vec<(&'static str, String)> {
        let values = [
            self.highest_price.to_string(),
            self.lowest_price.to_string(),
            self.average_price.to_string(),
            self.total_trading_volume.to_string(),
            self.start_date.clone(),
            self.end_date.clone(),
            self.performance_change.clone(),
            self.seven_day_average_latest
                .map(|v| v.to_string())
                .unwrap_or_default(),
        ];
        INSIGHT_FIELDS.into_iter().zip(values).collect()
    }
}

/// Arithmetic mean that stays finite for finite inputs.
///
/// Values near `f64::MAX` overflow a plain sum; in that case each value is
/// scaled by the count before summing.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let n = values.len() as f64;
    let sum: f64 = values.iter().sum();
    if sum.is_finite() {
        sum / n
    } else {
        values.iter().map(|v| v / n).sum()
    }
}

/// Trailing mean over `window` values.
///
/// Position `i` holds the mean of `values[i + 1 - window..=i]`; positions
/// before the window fills are `None`.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }

    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                None
            } else {
                Some(mean(&values[i + 1 - window..=i]))
            }
        })
        .collect()
}

/// Percentage change from `first` to `last`, formatted to two decimals.
pub fn performance_change(first: f64, last: f64) -> Result<String> {
    if first == 0.0 {
        return Err(AnalysisError::DivisionByZero);
    }
    let mut pct = (last - first) / first * 100.0;
    if !pct.is_finite() {
        pct = (last / first - 1.0) * 100.0;
    }
    Ok(format!("{:.2}%", pct))
}

fn format_date(date: NaiveDate) -> String {
    date.format(INSIGHT_DATE_FORMAT).to_string()
}

/// Compute the insight set for records sorted ascending by date.
pub fn compute_insights(records: &[PriceRecord]) -> Result<InsightSet> {
    let (first, last) = match (records.first(), records.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return Err(AnalysisError::EmptyInput),
    };

    let highest_price = records
        .iter()
        .map(|r| r.high)
        .fold(f64::NEG_INFINITY, f64::max);
    let lowest_price = records.iter().map(|r| r.low).fold(f64::INFINITY, f64::min);

    let closes: Vec<f64> = records.iter().map(|r| r.close).collect();
    let average_price = mean(&closes);

    let total_trading_volume = records
        .iter()
        .fold(0u64, |acc, r| acc.saturating_add(r.volume));

    let start = records.iter().map(|r| r.date).min().unwrap_or(first.date);
    let end = records.iter().map(|r| r.date).max().unwrap_or(last.date);

    let performance_change = performance_change(first.close, last.close)?;

    let seven_day_average_latest = rolling_mean(&closes, ROLLING_WINDOW)
        .last()
        .copied()
        .flatten();

    Ok(InsightSet {
        highest_price,
        lowest_price,
        average_price,
        total_trading_volume,
        start_date: format_date(start),
        end_date: format_date(end),
        performance_change,
        seven_day_average_latest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(day: u32, high: f64, low: f64, close: f64, volume: u64) -> PriceRecord {
        PriceRecord::new(
            NaiveDate::from_ymd_opt(2023, 1, day).unwrap(),
            close,
            high,
            low,
            close,
            volume,
        )
    }

    #[test]
    fn test_two_row_example() {
        let records = vec![record(1, 105.0, 95.0, 100.0, 1000), record(2, 112.0, 99.0, 110.0, 1500)];
        let insights = compute_insights(&records).unwrap();

        assert_eq!(insights.performance_change(), "10.00%");
        assert_eq!(insights.highest_price(), 112.0);
        assert_eq!(insights.lowest_price(), 95.0);
        assert_eq!(insights.average_price(), 105.0);
        assert_eq!(insights.total_trading_volume(), 2500);
        assert_eq!(insights.start_date(), "2023-01-01");
        assert_eq!(insights.end_date(), "2023-01-02");
        assert_eq!(insights.seven_day_average_latest(), None);
    }

    #[test]
    fn test_negative_change() {
        assert_eq!(performance_change(200.0, 150.0).unwrap(), "-25.00%");
        assert_eq!(performance_change(3.0, 4.0).unwrap(), "33.33%");
    }

    #[test]
    fn test_zero_first_close() {
        let records = vec![record(1, 1.0, 0.0, 0.0, 10), record(2, 2.0, 1.0, 1.5, 10)];
        assert!(matches!(
            compute_insights(&records),
            Err(AnalysisError::DivisionByZero)
        ));
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(compute_insights(&[]), Err(AnalysisError::EmptyInput)));
    }

    #[test]
    fn test_rolling_average_latest_window() {
        let records: Vec<PriceRecord> = (1..=10)
            .map(|d| record(d, 100.0, 1.0, d as f64 * 10.0, 1))
            .collect();
        let insights = compute_insights(&records).unwrap();

        // Rows 4..=10 -> closes 40..=100
        let expected = (4..=10).map(|d| d as f64 * 10.0).sum::<f64>() / 7.0;
        let latest = insights.seven_day_average_latest().unwrap();
        assert!((latest - expected).abs() < 1e-9);
    }

    #[test]
    fn test_rolling_average_needs_seven_rows() {
        let six: Vec<PriceRecord> = (1..=6).map(|d| record(d, 2.0, 1.0, 1.5, 1)).collect();
        assert_eq!(compute_insights(&six).unwrap().seven_day_average_latest(), None);

        let seven: Vec<PriceRecord> = (1..=7).map(|d| record(d, 2.0, 1.0, 1.5, 1)).collect();
        assert_eq!(
            compute_insights(&seven).unwrap().seven_day_average_latest(),
            Some(1.5)
        );
    }

    #[test]
    fn test_mean_near_max() {
        assert_eq!(mean(&[2.0, 4.0]), 3.0);
        assert!(mean(&[]).is_nan());

        let huge = mean(&[1e308, 1e308, 1e308]);
        assert!(huge.is_finite());
        assert!((huge - 1e308).abs() / 1e308 < 1e-12);
        assert_eq!(mean(&[f64::MAX, f64::MAX]), f64::MAX);
    }

    #[test]
    fn test_insights_with_huge_prices() {
        let records = vec![
            record(1, 1.5e308, 1e308, 1e308, 10),
            record(2, 1.5e308, 1e308, 1e308, 10),
        ];
        let insights = compute_insights(&records).unwrap();
        assert!(insights.average_price().is_finite());
        assert_eq!(insights.performance_change(), "0.00%");
    }

    #[test]
    fn test_rolling_mean() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let means = rolling_mean(&values, 3);
        assert_eq!(means, vec![None, None, Some(2.0), Some(3.0), Some(4.0)]);
        assert_eq!(rolling_mean(&values, 0), vec![None; 5]);
        assert!(rolling_mean(&[], 3).is_empty());
    }

    #[test]
    fn test_volume_saturates() {
        let records = vec![record(1, 2.0, 1.0, 1.0, u64::MAX), record(2, 2.0, 1.0, 1.0, 5)];
        assert_eq!(compute_insights(&records).unwrap().total_trading_volume(), u64::MAX);
    }

    #[test]
    fn test_formatted_values() {
        let records = vec![record(1, 105.5, 95.0, 100.0, 1000), record(2, 112.0, 99.0, 110.0, 1500)];
        let values = compute_insights(&records).unwrap().formatted_values();

        assert_eq!(values.len(), INSIGHT_FIELDS.len());
        assert_eq!(values[0], ("highest_price", "112".to_string()));
        assert_eq!(values[6], ("performance_change", "10.00%".to_string()));
        assert_eq!(values[7], ("seven_day_average_latest", String::new()));
    }
}
