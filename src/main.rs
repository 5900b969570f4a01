//! Stop-loss optimizer - main entry point
//!
//! This binary provides three subcommands:
//! - analyze: Sweep stop-loss percentages over CSV or downloaded data
//! - download: Save daily bars for a ticker to CSV
//! - resolve: Look up a ticker for a company name

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "stoploss-optimizer")]
#[command(about = "Find the trailing stop-loss that maximised return on historical data", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sweep stop-loss percentages and report the best one
    Analyze(commands::analyze::AnalyzeArgs),

    /// Download daily bars for a ticker into a CSV file
    Download {
        /// Ticker symbol, e.g. "EQNR.OL"
        #[arg(short, long)]
        ticker: String,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        end: Option<String>,

        /// Output directory
        #[arg(short, long, default_value = "data")]
        output: String,
    },

    /// Resolve a company name to a ticker symbol
    Resolve {
        /// Company name or ticker
        query: String,

        /// Prefer tickers with this exchange suffix, e.g. ".OL"
        #[arg(long)]
        suffix: Option<String>,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // Log file naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    if file_only {
        // Keep the console clean for the progress bar
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        // Same format as the console, without ANSI colors
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();
    }

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Analyze(_) => ("analyze", true), // File-only for clean progress bar
        Commands::Download { .. } => ("download", false),
        Commands::Resolve { .. } => ("resolve", false),
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Analyze(args) => commands::analyze::run(args),
        Commands::Download {
            ticker,
            start,
            end,
            output,
        } => commands::download::run(ticker, start, end, output),
        Commands::Resolve { query, suffix } => commands::resolve::run(query, suffix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_analyze_flags() {
        let cli = Cli::try_parse_from([
            "stoploss-optimizer",
            "analyze",
            "--csv",
            "data/eqnr.csv",
            "--min",
            "5",
            "--max",
            "40",
            "--entry",
            "ma-crossover",
            "--parallel",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        let Commands::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.csv.as_deref(), Some("data/eqnr.csv"));
        assert_eq!(args.min, Some(5));
        assert_eq!(args.max, Some(40));
        assert_eq!(args.entry, Some(commands::analyze::EntryArg::MaCrossover));
        assert!(args.parallel);
    }

    #[test]
    fn test_parse_download_defaults() {
        let cli = Cli::try_parse_from(["stoploss-optimizer", "download", "-t", "EQNR.OL"]).unwrap();

        let Commands::Download { ticker, output, start, .. } = cli.command else {
            panic!("expected download");
        };
        assert_eq!(ticker, "EQNR.OL");
        assert_eq!(output, "data");
        assert!(start.is_none());
    }
}
