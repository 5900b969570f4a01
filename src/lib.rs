//! Stop-Loss Optimizer
//!
//! Finds the trailing stop-loss percentage that would have maximised the
//! return of a single trade over historical daily OHLC data, by replaying
//! the trade once per candidate percent and keeping the best.

pub mod analysis;
pub mod config;
pub mod data;
pub mod entry;
pub mod indicators;
pub mod optimizer;
pub mod report;
pub mod simulator;
pub mod symbols;
pub mod types;

pub use analysis::{run_analysis, AnalysisConfig, AnalysisResult};
pub use config::Config;
pub use optimizer::{sweep, PercentRange};
pub use simulator::{simulate, trail};
pub use types::*;
