use chrono::{DateTime, Datelike, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

pub const NO_TITLE: &str = "No Title";
pub const NO_DESCRIPTION: &str = "No Description";
pub const NO_CONTENT: &str = "No Content";

/// A row of `stock_data` as read back from the store.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RawStockRow {
    pub id: i32,
    pub timestamp: Option<NaiveDateTime>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

/// A row of `news_data` as read back from the store.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RawNewsRow {
    pub id: i32,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub published_at: Option<NaiveDateTime>,
}

/// Calendar breakdown of a timestamp.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFields {
    pub year: i32,
    pub month: i32,
    pub day: i32,
    pub hour: i32,
    pub minute: i32,
}

impl CalendarFields {
    pub fn from_timestamp(ts: &NaiveDateTime) -> Self {
        Self {
            year: ts.year(),
            month: ts.month() as i32,
            day: ts.day() as i32,
            hour: ts.hour() as i32,
            minute: ts.minute() as i32,
        }
    }
}

/// Z-scores of the five numeric stock fields.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct NormalizedFields {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A deduplicated, null-filled and normalized stock row.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CleanedStockQuote {
    pub raw_id: i32,
    pub timestamp: Option<NaiveDateTime>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub calendar: Option<CalendarFields>,
    pub normalized: NormalizedFields,
}

/// A deduplicated news row with sentinel text in place of nulls.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CleanedNewsArticle {
    pub raw_id: i32,
    pub title: String,
    pub description: String,
    pub content: String,
    pub published_at: Option<NaiveDateTime>,
    pub calendar: Option<CalendarFields>,
}

/// Mean and sample standard deviation of one column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnStats {
    pub mean: f64,
    pub std_dev: f64,
}

impl ColumnStats {
    /// Computes the mean and sample standard deviation (`n - 1`) of a column.
    ///
    /// # Arguments
    /// * `values`: Every value of the column, in any order
    ///
    /// # Returns
    /// `None` for an empty column. A single value or a constant column has a
    /// standard deviation of exactly zero, whatever rounding the mean picks up.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let first = *values.first()?;

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;

        // Summing decimals like 0.1 leaves the mean a few ulps off the value.
        if values.iter().all(|&v| v == first) {
            return Some(Self { mean, std_dev: 0.0 });
        }

        let variance = values
            .iter()
            .map(|&v| {
                let diff = v - mean;
                diff * diff
            })
            .sum::<f64>()
            / (n - 1.0);

        Some(Self {
            mean,
            std_dev: variance.sqrt(),
        })
    }

    /// `(value - mean) / std_dev`, or `0.0` when the column has no spread.
    pub fn z_score(&self, value: f64) -> f64 {
        if self.std_dev == 0.0 || !self.std_dev.is_finite() {
            return 0.0;
        }
        (value - self.mean) / self.std_dev
    }
}

/// Counts gathered while transforming one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub raw_rows: usize,
    pub duplicates_removed: usize,
    pub nulls_filled: usize,
}

/// Turns raw rows into their cleaned counterparts.
///
/// The pipeline mirrors the batch recompute: deduplicate, fill nulls, derive
/// calendar fields and, for quotes, z-score every numeric column against the
/// whole batch. Output is sorted by timestamp then raw id so re-running on
/// unchanged input yields identical rows.
#[derive(Debug, Clone)]
pub struct DataProcessor {
    numeric_fill: f64,
}

impl Default for DataProcessor {
    fn default() -> Self {
        Self { numeric_fill: 0.0 }
    }
}

type StockKey = (Option<NaiveDateTime>, [Option<u64>; 5]);
type NewsKey = (Option<String>, Option<String>, Option<String>, Option<NaiveDateTime>);

impl DataProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deduplicates, fills and normalizes a batch of raw stock rows.
    ///
    /// # Arguments
    /// * `rows`: The full contents of `stock_data`, in any order
    ///
    /// # Returns
    /// The cleaned quotes ordered by timestamp then raw id, and the counts
    /// of duplicates removed and nulls filled
    pub fn process_stock_batch(
        &self,
        rows: Vec<RawStockRow>,
    ) -> (Vec<CleanedStockQuote>, BatchReport) {
        let mut report = BatchReport {
            raw_rows: rows.len(),
            ..Default::default()
        };

        let unique = dedup_by_key(rows, |row: &RawStockRow| -> StockKey {
            let bits = [row.open, row.high, row.low, row.close, row.volume]
                .map(|v| v.map(f64::to_bits));
            (row.timestamp, bits)
        });
        report.duplicates_removed = report.raw_rows - unique.len();

        let mut cleaned: Vec<CleanedStockQuote> = unique
            .into_iter()
            .map(|row| {
                let mut fill = |value: Option<f64>| {
                    value.unwrap_or_else(|| {
                        report.nulls_filled += 1;
                        self.numeric_fill
                    })
                };
                CleanedStockQuote {
                    raw_id: row.id,
                    timestamp: row.timestamp,
                    open: fill(row.open),
                    high: fill(row.high),
                    low: fill(row.low),
                    close: fill(row.close),
                    volume: fill(row.volume),
                    calendar: row.timestamp.as_ref().map(CalendarFields::from_timestamp),
                    normalized: NormalizedFields::default(),
                }
            })
            .collect();

        normalize_stock_quotes(&mut cleaned);
        cleaned.sort_by(|a, b| (a.timestamp, a.raw_id).cmp(&(b.timestamp, b.raw_id)));

        debug!(
            "Stock batch: {} raw, {} duplicates, {} nulls filled",
            report.raw_rows, report.duplicates_removed, report.nulls_filled
        );
        (cleaned, report)
    }

    /// Deduplicates news rows and replaces missing text with sentinels.
    ///
    /// Null `title`, `description` and `content` become [`NO_TITLE`],
    /// [`NO_DESCRIPTION`] and [`NO_CONTENT`]. Calendar fields come from
    /// `published_at` and stay empty when it is null.
    ///
    /// # Arguments
    /// * `rows`: The full contents of `news_data`, in any order
    ///
    /// # Returns
    /// The cleaned articles ordered by publication time then raw id, and the
    /// batch counts
    pub fn process_news_batch(&self, rows: Vec<RawNewsRow>) -> (Vec<CleanedNewsArticle>, BatchReport) {
        let mut report = BatchReport {
            raw_rows: rows.len(),
            ..Default::default()
        };

        let unique = dedup_by_key(rows, |row: &RawNewsRow| -> NewsKey {
            (
                row.title.clone(),
                row.description.clone(),
                row.content.clone(),
                row.published_at,
            )
        });
        report.duplicates_removed = report.raw_rows - unique.len();

        let mut cleaned: Vec<CleanedNewsArticle> = unique
            .into_iter()
            .map(|row| {
                let mut fill = |value: Option<String>, sentinel: &str| {
                    value.unwrap_or_else(|| {
                        report.nulls_filled += 1;
                        sentinel.to_string()
                    })
                };
                CleanedNewsArticle {
                    raw_id: row.id,
                    title: fill(row.title, NO_TITLE),
                    description: fill(row.description, NO_DESCRIPTION),
                    content: fill(row.content, NO_CONTENT),
                    calendar: row.published_at.as_ref().map(CalendarFields::from_timestamp),
                    published_at: row.published_at,
                }
            })
            .collect();

        cleaned.sort_by(|a, b| (a.published_at, a.raw_id).cmp(&(b.published_at, b.raw_id)));

        debug!(
            "News batch: {} raw, {} duplicates, {} nulls filled",
            report.raw_rows, report.duplicates_removed, report.nulls_filled
        );
        (cleaned, report)
    }
}

/// Keeps the first row (lowest id) of every group of identical rows.
fn dedup_by_key<R, K, F>(mut rows: Vec<R>, key: F) -> Vec<R>
where
    R: HasRawId,
    K: std::hash::Hash + Eq,
    F: Fn(&R) -> K,
{
    rows.sort_by_key(|row| row.raw_id());
    let mut seen = HashSet::with_capacity(rows.len());
    rows.into_iter().filter(|row| seen.insert(key(row))).collect()
}

trait HasRawId {
    fn raw_id(&self) -> i32;
}

impl HasRawId for RawStockRow {
    fn raw_id(&self) -> i32 {
        self.id
    }
}

impl HasRawId for RawNewsRow {
    fn raw_id(&self) -> i32 {
        self.id
    }
}

/// Fills `normalized` with z-scores computed over the whole slice.
///
/// Each of open/high/low/close/volume is scored against its own column mean
/// and sample standard deviation. A column without spread scores `0.0` on
/// every row; an empty slice is left untouched.
///
/// # Arguments
/// * `quotes`: Null-filled quotes; their `normalized` field is overwritten
pub fn normalize_stock_quotes(quotes: &mut [CleanedStockQuote]) {
    let (Some(open), Some(high), Some(low), Some(close), Some(volume)) = (
        column_stats(quotes, |q| q.open),
        column_stats(quotes, |q| q.high),
        column_stats(quotes, |q| q.low),
        column_stats(quotes, |q| q.close),
        column_stats(quotes, |q| q.volume),
    ) else {
        return;
    };

    for (name, stats) in [
        ("open", open),
        ("high", high),
        ("low", low),
        ("close", close),
        ("volume", volume),
    ] {
        if stats.std_dev == 0.0 {
            debug!("{} has zero standard deviation, normalized values set to 0", name);
        }
    }

    for quote in quotes.iter_mut() {
        quote.normalized = NormalizedFields {
            open: open.z_score(quote.open),
            high: high.z_score(quote.high),
            low: low.z_score(quote.low),
            close: close.z_score(quote.close),
            volume: volume.z_score(quote.volume),
        };
    }
}

fn column_stats<F>(quotes: &[CleanedStockQuote], get: F) -> Option<ColumnStats>
where
    F: Fn(&CleanedStockQuote) -> f64,
{
    let values: Vec<f64> = quotes.iter().map(get).collect();
    ColumnStats::from_values(&values)
}

/// Converts a zoned publication time to the naive UTC value stored in
/// `news_data.published_at`.
pub fn to_storage_timestamp(ts: &DateTime<Utc>) -> NaiveDateTime {
    ts.naive_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn stock_row(id: i32, timestamp: NaiveDateTime, close: f64) -> RawStockRow {
        RawStockRow {
            id,
            timestamp: Some(timestamp),
            open: Some(close - 0.5),
            high: Some(close + 1.0),
            low: Some(close - 1.0),
            close: Some(close),
            volume: Some(1000.0 + close),
        }
    }

    fn news_row(id: i32, title: Option<&str>, description: Option<&str>) -> RawNewsRow {
        RawNewsRow {
            id,
            title: title.map(str::to_string),
            description: description.map(str::to_string),
            content: Some("body".to_string()),
            published_at: Some(ts(14, 30)),
        }
    }

    fn mean_and_std(values: &[f64]) -> (f64, f64) {
        let stats = ColumnStats::from_values(values).unwrap();
        (stats.mean, stats.std_dev)
    }

    #[test]
    fn test_duplicates_removed_keeping_lowest_id() {
        let rows = vec![
            stock_row(3, ts(9, 31), 101.0),
            stock_row(1, ts(9, 30), 100.0),
            stock_row(2, ts(9, 30), 100.0),
            stock_row(4, ts(9, 31), 101.0),
            stock_row(5, ts(9, 32), 102.0),
        ];

        let (cleaned, report) = DataProcessor::new().process_stock_batch(rows);
        assert_eq!(cleaned.len(), 3);
        assert_eq!(report.duplicates_removed, 2);
        assert_eq!(
            cleaned.iter().map(|q| q.raw_id).collect::<Vec<_>>(),
            vec![1, 3, 5]
        );
    }

    #[test]
    fn test_null_numeric_fields_become_zero() {
        let row = RawStockRow {
            id: 1,
            timestamp: Some(ts(10, 0)),
            open: None,
            high: Some(5.0),
            low: None,
            close: Some(4.0),
            volume: None,
        };

        let (cleaned, report) = DataProcessor::new().process_stock_batch(vec![row]);
        assert_eq!(cleaned[0].open, 0.0);
        assert_eq!(cleaned[0].low, 0.0);
        assert_eq!(cleaned[0].volume, 0.0);
        assert_eq!(cleaned[0].high, 5.0);
        assert_eq!(report.nulls_filled, 3);
    }

    #[test]
    fn test_calendar_fields_derived() {
        let (cleaned, _) =
            DataProcessor::new().process_stock_batch(vec![stock_row(1, ts(15, 47), 10.0)]);
        assert_eq!(
            cleaned[0].calendar,
            Some(CalendarFields {
                year: 2024,
                month: 3,
                day: 15,
                hour: 15,
                minute: 47
            })
        );
    }

    #[test]
    fn test_null_timestamp_has_no_calendar() {
        let mut row = stock_row(1, ts(9, 30), 10.0);
        row.timestamp = None;
        let (cleaned, _) = DataProcessor::new().process_stock_batch(vec![row]);
        assert_eq!(cleaned[0].calendar, None);
    }

    #[test]
    fn test_normalized_columns_have_zero_mean_unit_std() {
        let rows: Vec<RawStockRow> = [100.0, 102.5, 99.0, 105.0, 101.0, 98.5]
            .iter()
            .enumerate()
            .map(|(i, &close)| stock_row(i as i32 + 1, ts(9, 30 + i as u32), close))
            .collect();

        let (cleaned, _) = DataProcessor::new().process_stock_batch(rows);

        let columns: [Vec<f64>; 5] = [
            cleaned.iter().map(|q| q.normalized.open).collect(),
            cleaned.iter().map(|q| q.normalized.high).collect(),
            cleaned.iter().map(|q| q.normalized.low).collect(),
            cleaned.iter().map(|q| q.normalized.close).collect(),
            cleaned.iter().map(|q| q.normalized.volume).collect(),
        ];

        for column in columns.iter() {
            let (mean, std) = mean_and_std(column);
            assert!(mean.abs() < 1e-9, "mean was {}", mean);
            assert!((std - 1.0).abs() < 1e-9, "std was {}", std);
        }
    }

    #[test]
    fn test_constant_column_normalizes_to_zero() {
        let rows: Vec<RawStockRow> = (0..4)
            .map(|i| RawStockRow {
                id: i + 1,
                timestamp: Some(ts(9, 30 + i as u32)),
                open: Some(50.0),
                high: Some(51.0 + i as f64),
                low: Some(49.0),
                close: Some(50.0),
                volume: Some(10.0),
            })
            .collect();

        let (cleaned, _) = DataProcessor::new().process_stock_batch(rows);
        assert!(cleaned.iter().all(|q| q.normalized.open == 0.0));
        assert!(cleaned.iter().all(|q| q.normalized.volume == 0.0));
        assert!(cleaned.iter().all(|q| q.normalized.high.is_finite()));
        assert!(cleaned.iter().any(|q| q.normalized.high != 0.0));
    }

    #[test]
    fn test_constant_decimal_column_normalizes_to_zero() {
        let rows: Vec<RawStockRow> = (0..3)
            .map(|i| RawStockRow {
                id: i + 1,
                timestamp: Some(ts(10, i as u32)),
                open: Some(0.1),
                high: Some(181.18),
                low: Some(180.0 + i as f64),
                close: Some(181.18),
                volume: Some(2291.0),
            })
            .collect();

        let (cleaned, _) = DataProcessor::new().process_stock_batch(rows);
        assert!(cleaned.iter().all(|q| q.normalized.open == 0.0));
        assert!(cleaned.iter().all(|q| q.normalized.high == 0.0));
        assert!(cleaned.iter().all(|q| q.normalized.close == 0.0));
        assert!(cleaned.iter().any(|q| q.normalized.low != 0.0));
    }

    #[test]
    fn test_constant_column_stats_have_no_spread() {
        let stats = ColumnStats::from_values(&[0.1, 0.1, 0.1]).unwrap();
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.z_score(0.1), 0.0);
        assert!(ColumnStats::from_values(&[]).is_none());
    }

    #[test]
    fn test_single_row_normalizes_to_zero() {
        let (cleaned, _) =
            DataProcessor::new().process_stock_batch(vec![stock_row(1, ts(9, 30), 10.0)]);
        assert_eq!(cleaned[0].normalized, NormalizedFields::default());
    }

    #[test]
    fn test_empty_batch() {
        let (cleaned, report) = DataProcessor::new().process_stock_batch(Vec::new());
        assert!(cleaned.is_empty());
        assert_eq!(report, BatchReport::default());
    }

    #[test]
    fn test_processing_is_deterministic() {
        let rows = vec![
            stock_row(7, ts(9, 33), 103.0),
            stock_row(2, ts(9, 31), 101.0),
            stock_row(5, ts(9, 31), 101.0),
            stock_row(1, ts(9, 30), 100.0),
        ];
        let mut shuffled = rows.clone();
        shuffled.reverse();

        let processor = DataProcessor::new();
        let (first, _) = processor.process_stock_batch(rows);
        let (second, _) = processor.process_stock_batch(shuffled);
        assert_eq!(first, second);
    }

    #[test]
    fn test_null_news_text_replaced_with_sentinels() {
        let row = RawNewsRow {
            id: 1,
            title: None,
            description: None,
            content: None,
            published_at: Some(ts(8, 5)),
        };

        let (cleaned, report) = DataProcessor::new().process_news_batch(vec![row]);
        assert_eq!(cleaned[0].title, NO_TITLE);
        assert_eq!(cleaned[0].description, NO_DESCRIPTION);
        assert_eq!(cleaned[0].content, NO_CONTENT);
        assert_eq!(cleaned[0].calendar.map(|c| (c.hour, c.minute)), Some((8, 5)));
        assert_eq!(report.nulls_filled, 3);
    }

    #[test]
    fn test_news_duplicates_removed() {
        let rows = vec![
            news_row(1, Some("Apple rallies"), None),
            news_row(2, Some("Apple rallies"), None),
            news_row(3, Some("Apple rallies"), Some("different")),
        ];

        let (cleaned, report) = DataProcessor::new().process_news_batch(rows);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(cleaned[0].description, NO_DESCRIPTION);
    }

    #[test]
    fn test_storage_timestamp_is_utc() {
        use chrono::TimeZone;
        let published = Utc.with_ymd_and_hms(2024, 1, 5, 13, 0, 0).unwrap();
        assert_eq!(
            to_storage_timestamp(&published),
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap().and_hms_opt(13, 0, 0).unwrap()
        );
    }
}
