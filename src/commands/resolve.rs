//! Resolve command implementation

use anyhow::Result;
use stoploss_optimizer::symbols::{SymbolResolver, YahooSymbolSearch};
use tracing::info;

pub fn run(query: String, suffix: Option<String>) -> Result<()> {
    info!("Resolving '{}'", query);

    let resolver = YahooSymbolSearch::new(suffix)?;
    match resolver.resolve(&query)? {
        Some(symbol) => println!("{}", symbol),
        None => println!("No ticker found for '{}'", query),
    }

    Ok(())
}
