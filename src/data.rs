//! Data loading and management
//!
//! Builds [`PriceSeries`] from broker CSV exports or from a daily chart API,
//! with an explicit TTL cache in front of network sources.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration as StdDuration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{PriceBar, PriceSeries};

// =============================================================================
// Constants
// =============================================================================

const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Default cache lifetime for fetched series
pub const DEFAULT_CACHE_TTL_SECS: i64 = 3600;

/// Date formats accepted in CSV exports, tried in order
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%m/%d/%Y", "%Y%m%d", "%d-%m-%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d.%m.%Y %H:%M:%S"];

/// Errors from the data-acquisition layer
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no price data available for '{symbol}'")]
    Unavailable { symbol: String },

    #[error("file has {found} columns, layout needs at least {required}")]
    BadLayout { found: usize, required: usize },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("response format changed: {0}")]
    ResponseFormat(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataError {
    /// True for "nothing to analyse" conditions the user can act on
    pub fn is_unavailable(&self) -> bool {
        matches!(self, DataError::Unavailable { .. })
    }
}

// =============================================================================
// CSV Data Loading
// =============================================================================

/// Zero-based column positions in a CSV export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMap {
    pub date: usize,
    pub close: usize,
    pub high: usize,
    pub low: usize,
    /// Falls back to the close when absent
    #[serde(default)]
    pub open: Option<usize>,
    #[serde(default)]
    pub has_headers: bool,
}

impl Default for ColumnMap {
    /// Broker export layout: date in column 1, close 2, high 4, low 5
    fn default() -> Self {
        ColumnMap {
            date: 1,
            close: 2,
            high: 4,
            low: 5,
            open: None,
            has_headers: false,
        }
    }
}

impl ColumnMap {
    /// Layout written by [`save_csv`]: `date,open,high,low,close`
    pub fn standard() -> Self {
        ColumnMap {
            date: 0,
            open: Some(1),
            high: 2,
            low: 3,
            close: 4,
            has_headers: true,
        }
    }

    /// Minimum number of columns a row must have
    pub fn required_width(&self) -> usize {
        [self.date, self.close, self.high, self.low]
            .into_iter()
            .chain(self.open)
            .max()
            .unwrap_or(0)
            + 1
    }
}

/// Parse a date cell in any of the accepted formats
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim().trim_matches('"');
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| s.parse::<DateTime<Utc>>().ok().map(|dt| dt.date_naive()))
}

/// Parse a numeric cell, accepting a decimal comma and thousands separators.
///
/// When both `.` and `,` appear, the last one is the decimal mark and the
/// other is a thousands separator. A lone `,` is a decimal comma. A decimal
/// mark that appears more than once makes the cell unparseable.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_matches('"')
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();

    let decimal = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => ',',
        (None, Some(_)) => ',',
        _ => '.',
    };
    let thousands = if decimal == ',' { '.' } else { ',' };
    if cleaned.matches(decimal).count() > 1 {
        return None;
    }

    let normalised: String = cleaned
        .chars()
        .filter(|c| *c != thousands)
        .map(|c| if c == decimal { '.' } else { c })
        .collect();
    normalised.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_row(record: &csv::StringRecord, columns: &ColumnMap) -> Option<PriceBar> {
    let date = parse_date(record.get(columns.date)?)?;
    let close = parse_number(record.get(columns.close)?)?;
    let high = parse_number(record.get(columns.high)?)?;
    let low = parse_number(record.get(columns.low)?)?;
    let open = match columns.open {
        Some(i) => record.get(i).and_then(parse_number).unwrap_or(close),
        None => close,
    };
    Some(PriceBar::new(date, open, high, low, close))
}

/// Read OHLC rows from any reader using a fixed column layout.
///
/// Rows with an unparseable date, close, high or low are discarded. The
/// result is sorted by date with duplicate dates removed.
pub fn read_csv<R: Read>(reader: R, columns: &ColumnMap) -> Result<PriceSeries, DataError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(columns.has_headers)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let required = columns.required_width();
    let mut widest = 0;
    let mut bars = Vec::new();
    let mut discarded = 0usize;

    for (row_idx, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                debug!("Skipping unreadable row {}: {}", row_idx + 1, e);
                discarded += 1;
                continue;
            }
        };
        widest = widest.max(record.len());

        match parse_row(&record, columns) {
            Some(bar) => bars.push(bar),
            None => {
                debug!("Discarding row {}: {:?}", row_idx + 1, record);
                discarded += 1;
            }
        }
    }

    if widest > 0 && widest < required {
        return Err(DataError::BadLayout {
            found: widest,
            required,
        });
    }

    let series = PriceSeries::from_unsorted(bars);
    if series.is_empty() {
        return Err(DataError::Unavailable {
            symbol: "csv".to_string(),
        });
    }

    info!(
        "Loaded {} bars ({} rows discarded) from {} to {}",
        series.len(),
        discarded,
        series.first().map(|b| b.date.to_string()).unwrap_or_default(),
        series.last().map(|b| b.date.to_string()).unwrap_or_default()
    );

    Ok(series)
}

/// Load OHLC data from a CSV file
pub fn load_csv(path: impl AsRef<Path>, columns: &ColumnMap) -> Result<PriceSeries, DataError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    read_csv(file, columns).map_err(|e| match e {
        DataError::Unavailable { .. } => DataError::Unavailable {
            symbol: path.display().to_string(),
        },
        other => other,
    })
}

/// Save a series as `date,open,high,low,close`
pub fn save_csv(series: &PriceSeries, path: impl AsRef<Path>) -> Result<PathBuf, DataError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    for bar in series.bars() {
        writer.serialize(bar)?;
    }
    writer.flush()?;

    info!("Saved {} rows to {}", series.len(), path.display());
    Ok(path.to_path_buf())
}

// =============================================================================
// Network sources
// =============================================================================

/// Symbol and inclusive date range to fetch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesRequest {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl SeriesRequest {
    pub fn new(symbol: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        SeriesRequest {
            symbol: symbol.into(),
            start,
            end,
        }
    }
}

/// Anything that can produce a daily series for a symbol and range
pub trait PriceSource {
    fn fetch(&self, request: &SeriesRequest) -> Result<PriceSeries, DataError>;
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
}

/// Daily bars from the Yahoo Finance v8 chart endpoint
pub struct YahooChartSource {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl YahooChartSource {
    pub fn new() -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(StdDuration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: YAHOO_CHART_URL.to_string(),
        })
    }

    fn chart_url(&self, request: &SeriesRequest) -> String {
        let start = request.start.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
        let end = (request.end + Duration::days(1))
            .and_time(chrono::NaiveTime::MIN)
            .and_utc()
            .timestamp();
        format!(
            "{}/{}?period1={}&period2={}&interval=1d",
            self.base_url, request.symbol, start, end
        )
    }

    /// Turn a chart response body into a series, dropping incomplete rows
    pub fn parse_chart(symbol: &str, body: &str) -> Result<PriceSeries, DataError> {
        let response: ChartResponse = serde_json::from_str(body)
            .map_err(|e| DataError::ResponseFormat(e.to_string()))?;

        let unavailable = || DataError::Unavailable {
            symbol: symbol.to_string(),
        };

        let Some(data) = response.chart.result.and_then(|r| r.into_iter().next()) else {
            if let Some(err) = response.chart.error {
                debug!("Chart API error for {}: {} {}", symbol, err.code, err.description);
            }
            return Err(unavailable());
        };

        let timestamps = data.timestamp.unwrap_or_default();
        let quote = data.indicators.quote.into_iter().next().ok_or_else(unavailable)?;

        let mut bars = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let Some(date) = DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive()) else {
                continue;
            };
            let field = |v: &Vec<Option<f64>>| v.get(i).copied().flatten().filter(|x| x.is_finite());

            match (field(&quote.close), field(&quote.high), field(&quote.low)) {
                (Some(close), Some(high), Some(low)) => {
                    let open = field(&quote.open).unwrap_or(close);
                    bars.push(PriceBar::new(date, open, high, low, close));
                }
                _ => debug!("Dropping incomplete bar for {} at {}", symbol, date),
            }
        }

        let series = PriceSeries::from_unsorted(bars);
        if series.is_empty() {
            return Err(unavailable());
        }
        Ok(series)
    }
}

impl PriceSource for YahooChartSource {
    fn fetch(&self, request: &SeriesRequest) -> Result<PriceSeries, DataError> {
        let url = self.chart_url(request);
        info!(
            "Fetching {} daily bars from {} to {}",
            request.symbol, request.start, request.end
        );

        let response = self.client.get(&url).send()?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DataError::Unavailable {
                symbol: request.symbol.clone(),
            });
        }
        if !response.status().is_success() {
            return Err(DataError::ResponseFormat(format!(
                "API returned status: {}",
                response.status()
            )));
        }

        let body = response.text()?;
        let series = Self::parse_chart(&request.symbol, &body)?;
        info!("Fetched {} bars for {}", series.len(), request.symbol);
        Ok(series)
    }
}

// =============================================================================
// Data Cache
// =============================================================================

struct CachedSeries {
    series: PriceSeries,
    expires_at: DateTime<Utc>,
}

/// TTL cache in front of a [`PriceSource`], keyed by symbol and range.
///
/// Meant for library callers that keep one source alive across many
/// analyses, such as a server or notebook. A single CLI run fetches once,
/// so there it only applies the configured TTL to that one request.
pub struct CachedSource<S> {
    inner: S,
    ttl: Duration,
    entries: Mutex<HashMap<SeriesRequest, CachedSeries>>,
}

impl<S: PriceSource> CachedSource<S> {
    /// TTLs too large to add to the current time fall back to
    /// [`DEFAULT_CACHE_TTL_SECS`].
    pub fn new(inner: S, ttl_seconds: i64) -> Self {
        let ttl = Duration::try_seconds(ttl_seconds)
            .filter(|ttl| Utc::now().checked_add_signed(*ttl).is_some())
            .unwrap_or_else(|| {
                warn!(
                    "Cache TTL of {}s is out of range, using {}s",
                    ttl_seconds, DEFAULT_CACHE_TTL_SECS
                );
                Duration::seconds(DEFAULT_CACHE_TTL_SECS)
            });

        CachedSource {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh cached series, if any
    pub fn get(&self, request: &SeriesRequest) -> Option<PriceSeries> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(request)
            .filter(|cached| Utc::now() < cached.expires_at)
            .map(|cached| cached.series.clone())
    }

    /// Drop every entry
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    /// Remove expired entries
    pub fn purge_expired(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            let now = Utc::now();
            entries.retain(|_, cached| now < cached.expires_at);
        }
    }
}

impl<S: PriceSource> PriceSource for CachedSource<S> {
    fn fetch(&self, request: &SeriesRequest) -> Result<PriceSeries, DataError> {
        if let Some(series) = self.get(request) {
            debug!("Cache hit for {} {}..{}", request.symbol, request.start, request.end);
            return Ok(series);
        }

        let series = self.inner.fetch(request)?;
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                request.clone(),
                CachedSeries {
                    series: series.clone(),
                    expires_at: Utc::now()
                        .checked_add_signed(self.ttl)
                        .unwrap_or(DateTime::<Utc>::MAX_UTC),
                },
            );
        }
        Ok(series)
    }
}

// =============================================================================
// Data Validation
// =============================================================================

/// Check a series for problems the simulator would silently absorb
pub fn validate_series(series: &PriceSeries) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if series.is_empty() {
        errors.push("No bars provided".to_string());
        return ValidationResult { errors, warnings };
    }

    for (i, bar) in series.bars().iter().enumerate() {
        if !bar.has_range() || !bar.close.is_finite() {
            warnings.push(format!("Bar {} ({}): missing price fields", i, bar.date));
            continue;
        }
        if bar.high < bar.low {
            errors.push(format!(
                "Bar {} ({}): high ({}) < low ({})",
                i, bar.date, bar.high, bar.low
            ));
        }
        if bar.low <= 0.0 || bar.close <= 0.0 {
            errors.push(format!("Bar {} ({}): non-positive price", i, bar.date));
        }
        if bar.close < bar.low || bar.close > bar.high {
            warnings.push(format!(
                "Bar {} ({}): close ({}) outside [{}, {}]",
                i, bar.date, bar.close, bar.low, bar.high
            ));
        }
    }

    if !warnings.is_empty() {
        warn!("{} data-quality warnings in series", warnings.len());
    }

    ValidationResult { errors, warnings }
}

/// Result of data validation
#[derive(Debug)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
