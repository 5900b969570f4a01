//! Company name to ticker resolution
//!
//! Best-effort and fuzzy by nature, so it sits behind [`SymbolResolver`].
//! "No match" is `Ok(None)`, not an error.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const YAHOO_SEARCH_URL: &str = "https://query2.finance.yahoo.com/v1/finance/search";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Free-text query in, optional ticker out
pub trait SymbolResolver {
    fn resolve(&self, query: &str) -> Result<Option<String>>;
}

/// Heuristic: does the query already look like a ticker symbol?
///
/// Upper-case, no whitespace, 1-12 chars of `A-Z 0-9 . - ^ =` with at
/// least one letter. `EQNR.OL`, `BRK-B`, `^GSPC` pass; `Equinor` does not.
pub fn looks_like_ticker(query: &str) -> bool {
    let q = query.trim();
    (1..=12).contains(&q.len())
        && q.chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || ".-^=".contains(c))
        && q.chars().any(|c| c.is_ascii_uppercase())
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub quotes: Vec<SearchQuote>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuote {
    pub symbol: Option<String>,
    #[serde(rename = "quoteType")]
    pub quote_type: Option<String>,
    pub exchange: Option<String>,
}

impl SearchQuote {
    fn is_equity(&self) -> bool {
        self.quote_type.as_deref() == Some("EQUITY")
    }
}

/// Pick the best ticker from a search response.
///
/// Order: equities on a preferred suffix, any equity, then any quote.
pub fn pick_symbol(response: &SearchResponse, preferred_suffix: Option<&str>) -> Option<String> {
    let with_symbol = || response.quotes.iter().filter_map(|q| q.symbol.as_deref().map(|s| (q, s)));

    let preferred = preferred_suffix.and_then(|suffix| {
        with_symbol().find(|(q, s)| q.is_equity() && s.ends_with(suffix))
    });

    preferred
        .or_else(|| with_symbol().find(|(q, _)| q.is_equity()))
        .or_else(|| with_symbol().next())
        .map(|(_, s)| s.to_string())
}

/// Resolver backed by the Yahoo Finance search endpoint
pub struct YahooSymbolSearch {
    client: reqwest::blocking::Client,
    preferred_suffix: Option<String>,
}

impl YahooSymbolSearch {
    pub fn new(preferred_suffix: Option<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            preferred_suffix,
        })
    }
}

impl SymbolResolver for YahooSymbolSearch {
    fn resolve(&self, query: &str) -> Result<Option<String>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }
        if looks_like_ticker(query) {
            debug!("'{}' already looks like a ticker", query);
            return Ok(Some(query.to_string()));
        }

        let response = self
            .client
            .get(YAHOO_SEARCH_URL)
            .query(&[("q", query), ("quotesCount", "10"), ("newsCount", "0")])
            .send()
            .context("Failed to send search request")?;

        if !response.status().is_success() {
            anyhow::bail!("Search API returned status: {}", response.status());
        }

        let parsed: SearchResponse = response.json().context("Failed to parse search response")?;
        let symbol = pick_symbol(&parsed, self.preferred_suffix.as_deref());

        match &symbol {
            Some(s) => info!("Resolved '{}' to {}", query, s),
            None => info!("No ticker found for '{}'", query),
        }

        Ok(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> SearchResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_looks_like_ticker() {
        assert!(looks_like_ticker("AAPL"));
        assert!(looks_like_ticker("EQNR.OL"));
        assert!(looks_like_ticker("BRK-B"));
        assert!(looks_like_ticker("^GSPC"));
        assert!(!looks_like_ticker("Equinor"));
        assert!(!looks_like_ticker("NORSK HYDRO"));
        assert!(!looks_like_ticker("1234"));
        assert!(!looks_like_ticker(""));
    }

    #[test]
    fn test_pick_prefers_suffix_then_equity() {
        let r = response(
            r#"{"quotes":[
                {"symbol":"EQNR","quoteType":"EQUITY","exchange":"NYQ"},
                {"symbol":"EQNR.OL","quoteType":"EQUITY","exchange":"OSL"},
                {"symbol":"EQNR-FUND","quoteType":"MUTUALFUND"}
            ]}"#,
        );

        assert_eq!(pick_symbol(&r, Some(".OL")), Some("EQNR.OL".to_string()));
        assert_eq!(pick_symbol(&r, None), Some("EQNR".to_string()));
    }

    #[test]
    fn test_pick_falls_back_to_any_quote() {
        let r = response(r#"{"quotes":[{"quoteType":"EQUITY"},{"symbol":"GC=F","quoteType":"FUTURE"}]}"#);
        assert_eq!(pick_symbol(&r, Some(".OL")), Some("GC=F".to_string()));
    }

    #[test]
    fn test_pick_no_quotes_is_none() {
        assert_eq!(pick_symbol(&response(r#"{"quotes":[]}"#), None), None);
        assert_eq!(pick_symbol(&response("{}"), None), None);
    }
}
