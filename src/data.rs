//! CSV ingestion: raw rows to canonical, date-sorted price records.

use crate::error::{AnalysisError, Result};
use crate::schema::{self, SchemaMapping};
use crate::types::{Field, PriceRecord};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{debug, info, warn};

/// Fixed date convention of uploaded files, applied after separator
/// normalization.
pub const DATE_FORMAT: &str = "%m/%d/%Y";

/// Year-first fallback for ISO uploads (`2024-01-31` normalizes to `2024/01/31`).
const YEAR_FIRST_FORMAT: &str = "%Y/%m/%d";

/// Currency symbol tolerated in front of numeric fields.
const CURRENCY_SYMBOL: char = '$';

/// Rows exactly as read from CSV text, addressable by column name.
#[derive(Debug, Clone)]
pub struct RawRecordSet {
    /// Header names with padding removed.
    pub headers: Vec<String>,
    /// Data rows in file order.
    pub rows: Vec<StringRecord>,
}

impl RawRecordSet {
    /// Read CSV bytes without interpreting any values.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(bytes);

        let headers = reader
            .headers()?
            .iter()
            .map(|h| schema::normalize_header(h).to_string())
            .collect();

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            // Blank trailing lines show up as a single empty field.
            if record.iter().all(|v| v.is_empty()) {
                continue;
            }
            rows.push(record);
        }

        debug!("Read {} raw rows", rows.len());
        Ok(Self { headers, rows })
    }

    /// Position of a column in the header.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    /// Raw value at a data row (0-based) and column name.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Parse a date, normalizing `-` separators to `/` first.
///
/// Values are read as month/day/year. A four-digit leading component can only
/// be a year, so those are read as year/month/day instead. The year must be
/// exactly four digits in either order: `01/05/23` is rejected, not read as
/// the year 23.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let normalized = raw.trim().replace('-', "/");
    let parts: Vec<&str> = normalized.split('/').collect();
    if parts.len() != 3 {
        return None;
    }

    let is_year = |part: &str| part.len() == 4 && part.bytes().all(|b| b.is_ascii_digit());
    let format = if is_year(parts[0]) {
        YEAR_FIRST_FORMAT
    } else if is_year(parts[2]) {
        DATE_FORMAT
    } else {
        return None;
    };
    NaiveDate::parse_from_str(&normalized, format).ok()
}

/// Strip padding and a leading currency symbol.
fn strip_currency(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix(CURRENCY_SYMBOL)
        .map(str::trim_start)
        .unwrap_or(trimmed)
}

/// Parse a price, tolerating a leading `$`.
pub fn parse_price(raw: &str) -> Option<f64> {
    strip_currency(raw)
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Parse a share volume as a non-negative integer, tolerating a leading `$`.
pub fn parse_volume(raw: &str) -> Option<u64> {
    strip_currency(raw).parse::<u64>().ok()
}

/// Converts raw rows into canonical records under one column mapping.
struct RecordParser<'a> {
    raw: &'a RawRecordSet,
    indices: [usize; 6],
}

impl<'a> RecordParser<'a> {
    fn new(raw: &'a RawRecordSet, mapping: &SchemaMapping) -> Result<Self> {
        let mut indices = [0usize; 6];
        for (slot, field) in indices.iter_mut().zip(Field::ALL) {
            let column = mapping.column(field);
            *slot = raw.column_index(column).ok_or_else(|| {
                AnalysisError::Schema(format!(
                    "column '{}' for field '{}' is not in the header",
                    column, field
                ))
            })?;
        }
        Ok(Self { raw, indices })
    }

    fn field<'r>(&self, record: &'r StringRecord, field: Field, row: usize) -> Result<&'r str> {
        let idx = self.indices[field_slot(field)];
        record.get(idx).ok_or_else(|| {
            AnalysisError::Schema(format!("row {} has no value for field '{}'", row, field))
        })
    }

    fn price(&self, record: &StringRecord, field: Field, row: usize) -> Result<f64> {
        let raw = self.field(record, field, row)?;
        parse_price(raw).ok_or_else(|| AnalysisError::NumericParse {
            row,
            field: field.name(),
            value: raw.to_string(),
        })
    }

    fn parse_row(&self, record: &StringRecord, row: usize) -> Result<PriceRecord> {
        let raw_date = self.field(record, Field::Date, row)?;
        let date = parse_date(raw_date).ok_or_else(|| AnalysisError::DateParse {
            row,
            value: raw_date.to_string(),
        })?;

        let open = self.price(record, Field::Open, row)?;
        let high = self.price(record, Field::High, row)?;
        let low = self.price(record, Field::Low, row)?;
        let close = self.price(record, Field::Close, row)?;

        let raw_volume = self.field(record, Field::Volume, row)?;
        let volume = parse_volume(raw_volume).ok_or_else(|| AnalysisError::NumericParse {
            row,
            field: Field::Volume.name(),
            value: raw_volume.to_string(),
        })?;

        Ok(PriceRecord::new(date, open, high, low, close, volume))
    }

    fn parse_all(&self) -> Result<Vec<PriceRecord>> {
        self.raw
            .rows
            .iter()
            .enumerate()
            .map(|(i, record)| self.parse_row(record, i + 1))
            .collect()
    }
}

fn field_slot(field: Field) -> usize {
    match field {
        Field::Date => 0,
        Field::Open => 1,
        Field::High => 2,
        Field::Low => 3,
        Field::Close => 4,
        Field::Volume => 5,
    }
}

/// Parse raw rows under `mapping` into records sorted ascending by date.
///
/// The whole set is rejected on the first bad value; no row is ever skipped.
/// Sorting is stable, so rows sharing a date keep their file order.
pub fn parse_records(raw: &RawRecordSet, mapping: &SchemaMapping) -> Result<Vec<PriceRecord>> {
    let parser = RecordParser::new(raw, mapping)?;
    let mut records = parser.parse_all()?;

    records.sort_by_key(|r| r.date);

    let inverted = records.iter().filter(|r| r.is_inverted()).count();
    if inverted > 0 {
        warn!("{} rows have low above high; kept as uploaded", inverted);
    }

    if let (Some(first), Some(last)) = (records.first(), records.last()) {
        info!(
            "Parsed {} records from {} to {} ({} convention)",
            records.len(),
            first.date,
            last.date,
            mapping.name
        );
    }

    Ok(records)
}

/// Resolve the column convention of CSV bytes and parse them.
pub fn load_csv_bytes(bytes: &[u8]) -> Result<(SchemaMapping, Vec<PriceRecord>)> {
    let raw = RawRecordSet::from_bytes(bytes)?;
    let mapping = schema::resolve(&raw.headers)?;
    let records = parse_records(&raw, &mapping)?;
    Ok((mapping, records))
}
