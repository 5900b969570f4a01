//! Analyze command implementation with progress tracking

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use stoploss_optimizer::analysis::{run_analysis_with, SweepMode};
use stoploss_optimizer::data::{
    self, CachedSource, DataError, PriceSource, SeriesRequest, YahooChartSource,
};
use stoploss_optimizer::entry::EntryPolicy;
use stoploss_optimizer::optimizer::SweepOptions;
use stoploss_optimizer::report;
use stoploss_optimizer::symbols::{SymbolResolver, YahooSymbolSearch};
use stoploss_optimizer::{Config, PriceSeries};
use tracing::{debug, info, warn};

use super::{date_range, parse_cli_date};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EntryArg {
    /// Lowest low of the period
    MinLow,
    /// First bar's close
    FirstClose,
    /// First close above its moving average
    MaCrossover,
    /// Explicit --entry-date / --entry-price
    Fixed,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Path to configuration file (defaults are used if it does not exist)
    #[arg(short, long, default_value = "configs/stoploss.json")]
    pub config: String,

    /// CSV export to analyse (overrides config)
    #[arg(long)]
    pub csv: Option<String>,

    /// Ticker symbol to download (overrides config)
    #[arg(short, long)]
    pub ticker: Option<String>,

    /// Company name to resolve to a ticker
    #[arg(long)]
    pub company: Option<String>,

    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<String>,

    /// End date (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<String>,

    /// Smallest stop-loss percent to test
    #[arg(long)]
    pub min: Option<u32>,

    /// Largest stop-loss percent to test
    #[arg(long)]
    pub max: Option<u32>,

    /// Entry-point policy
    #[arg(long, value_enum)]
    pub entry: Option<EntryArg>,

    /// Moving-average period for ma-crossover entries
    #[arg(long, default_value = "20")]
    pub ma_period: usize,

    /// Entry date for fixed entries (YYYY-MM-DD)
    #[arg(long)]
    pub entry_date: Option<String>,

    /// Entry price for fixed entries
    #[arg(long)]
    pub entry_price: Option<f64>,

    /// Average over periodic re-entries instead of a single entry
    #[arg(long)]
    pub periodic: bool,

    /// Bars between re-entries in periodic mode
    #[arg(long)]
    pub step_bars: Option<usize>,

    /// Evaluate candidates in parallel
    #[arg(long)]
    pub parallel: bool,

    /// Number of top results to show
    #[arg(long)]
    pub top: Option<usize>,

    /// Results directory
    #[arg(short, long)]
    pub output: Option<String>,

    /// Skip writing result files
    #[arg(long)]
    pub no_export: bool,
}

fn apply_overrides(config: &mut Config, args: &AnalyzeArgs) -> Result<()> {
    if let Some(csv) = &args.csv {
        info!("Overriding data source to CSV: {}", csv);
        config.data.csv_path = Some(csv.clone());
    }
    if let Some(ticker) = &args.ticker {
        info!("Overriding ticker to: {}", ticker);
        config.data.ticker = Some(ticker.clone());
        config.data.csv_path = None;
    }
    if let Some(company) = &args.company {
        config.data.company = Some(company.clone());
        config.data.ticker = None;
        config.data.csv_path = None;
    }
    if let Some(start) = &args.start {
        config.data.start = Some(parse_cli_date(start)?);
    }
    if let Some(end) = &args.end {
        config.data.end = Some(parse_cli_date(end)?);
    }

    let sweep = &mut config.analysis.sweep;
    if let Some(min) = args.min {
        sweep.min_percent = min;
    }
    if let Some(max) = args.max {
        sweep.max_percent = max;
    }
    if args.periodic {
        sweep.mode = SweepMode::Periodic;
    }
    if let Some(step) = args.step_bars {
        sweep.step_bars = step;
    }
    sweep.parallel |= args.parallel;

    if let Some(entry) = args.entry {
        config.analysis.entry = match entry {
            EntryArg::MinLow => EntryPolicy::MinLow,
            EntryArg::FirstClose => EntryPolicy::FirstClose,
            EntryArg::MaCrossover => EntryPolicy::MaCrossover {
                period: args.ma_period,
            },
            EntryArg::Fixed => {
                let date = args
                    .entry_date
                    .as_deref()
                    .context("--entry fixed needs --entry-date")?;
                let price = args.entry_price.context("--entry fixed needs --entry-price")?;
                EntryPolicy::Fixed {
                    date: parse_cli_date(date)?,
                    price,
                }
            }
        };
    }

    if let Some(top) = args.top {
        config.output.top = top;
    }
    if let Some(output) = &args.output {
        config.output.results_dir = output.clone();
    }
    if args.no_export {
        config.output.export = false;
    }

    Ok(())
}

/// Outcome of acquiring data: a series, or a user-facing reason there is none
enum Loaded {
    Series(PriceSeries),
    Nothing(String),
}

fn load_series(config: &Config) -> Result<Loaded> {
    let data_cfg = &config.data;

    if let Some(path) = &data_cfg.csv_path {
        info!("Loading data from: {}", path);
        return match data::load_csv(path, &data_cfg.columns) {
            Ok(series) => Ok(Loaded::Series(series)),
            Err(DataError::Unavailable { .. }) => Ok(Loaded::Nothing(format!(
                "No usable rows in {}. Check that it is a broker/Yahoo export.",
                path
            ))),
            Err(DataError::BadLayout { found, required }) => Ok(Loaded::Nothing(format!(
                "{} has the wrong format ({} columns, expected at least {}).",
                path, found, required
            ))),
            Err(e) => Err(e).with_context(|| format!("Failed to load {}", path)),
        };
    }

    let ticker = match (&data_cfg.ticker, &data_cfg.company) {
        (Some(ticker), _) => ticker.clone(),
        (None, Some(company)) => {
            let resolver = YahooSymbolSearch::new(data_cfg.preferred_suffix.clone())?;
            match resolver.resolve(company)? {
                Some(ticker) => ticker,
                None => return Ok(Loaded::Nothing(format!("No ticker found for '{}'", company))),
            }
        }
        (None, None) => anyhow::bail!("No data source: pass --csv, --ticker or --company"),
    };

    let (start, end) = date_range(data_cfg.start, data_cfg.end)?;
    // One fetch per run; the cache pays off for library callers that reuse it
    let source = CachedSource::new(YahooChartSource::new()?, data_cfg.cache_ttl_secs);
    let request = SeriesRequest::new(ticker.clone(), start, end);

    match source.fetch(&request) {
        Ok(series) => Ok(Loaded::Series(series)),
        Err(e) if e.is_unavailable() => Ok(Loaded::Nothing(format!(
            "No data found for {} between {} and {}",
            ticker, start, end
        ))),
        Err(e) => Err(e).with_context(|| format!("Failed to fetch data for {}", ticker)),
    }
}

pub fn run(args: AnalyzeArgs) -> Result<()> {
    info!("Starting analysis");

    let mut config = Config::load_or_default(&args.config)?;
    apply_overrides(&mut config, &args)?;
    debug!("Effective config: {:?}", config);

    let series = match load_series(&config)? {
        Loaded::Series(series) => series,
        Loaded::Nothing(message) => {
            println!("{}", message);
            info!("{}", message);
            return Ok(());
        }
    };

    let validation = data::validate_series(&series);
    for problem in validation.errors.iter().chain(validation.warnings.iter()) {
        warn!("{}", problem);
    }

    if let (Some(first), Some(last)) = (series.first(), series.last()) {
        println!(
            "Found {} trading days from {} to {}",
            series.len(),
            first.date,
            last.date
        );
    }

    let range = config.analysis.sweep.range();
    let pb = ProgressBar::new(range.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("⚡ {percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}]")
            .context("Invalid progress template")?
            .progress_chars("█░ "),
    );

    let result = run_analysis_with(&config.analysis, &series, SweepOptions::default(), &pb);
    pb.finish_and_clear();

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            println!("Analysis not possible: {}", e);
            info!("Analysis not possible: {}", e);
            return Ok(());
        }
    };

    report::print_summary(&result, config.output.top);

    if config.output.export {
        let written = report::export(&result, &config.output.results_dir)?;
        println!("\nResults written to {}", config.output.results_dir);
        debug!("Files: {:?}", written);
    }

    info!("Analysis completed successfully");

    Ok(())
}
