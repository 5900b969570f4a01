//! Subcommand implementations

pub mod analyze;
pub mod download;
pub mod resolve;

use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate};

/// Parse a YYYY-MM-DD command-line date
pub fn parse_cli_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}

/// Resolve an optional start/end pair; defaults to the last year up to today
pub fn date_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<(NaiveDate, NaiveDate)> {
    let end = end.unwrap_or_else(|| Local::now().date_naive());
    let start = start.unwrap_or(end - Duration::days(365));
    if start > end {
        anyhow::bail!("Start date {} is after end date {}", start, end);
    }
    Ok((start, end))
}
