//! Download command implementation

use anyhow::{Context, Result};
use std::path::PathBuf;
use stoploss_optimizer::data::{self, PriceSource, SeriesRequest, YahooChartSource};
use tracing::info;

use super::{date_range, parse_cli_date};

pub fn run(ticker: String, start: Option<String>, end: Option<String>, output: String) -> Result<()> {
    let start = start.as_deref().map(parse_cli_date).transpose()?;
    let end = end.as_deref().map(parse_cli_date).transpose()?;
    let (start, end) = date_range(start, end)?;

    info!("Downloading {} from {} to {}", ticker, start, end);

    let source = YahooChartSource::new()?;
    let request = SeriesRequest::new(ticker.clone(), start, end);
    let series = match source.fetch(&request) {
        Ok(series) => series,
        Err(e) if e.is_unavailable() => {
            println!("No data found for {} between {} and {}", ticker, start, end);
            return Ok(());
        }
        Err(e) => return Err(e).context("Download failed"),
    };

    let filename = format!("{}_1d.csv", ticker.replace(['^', '='], ""));
    let path = PathBuf::from(&output).join(filename);
    let path = data::save_csv(&series, &path)?;

    println!("Saved {} bars to {}", series.len(), path.display());
    Ok(())
}
