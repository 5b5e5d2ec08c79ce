//! Core types used throughout the engine
//!
//! Defines the shared input types: tickers, daily bars, sentiment sources.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A tradable ticker (equity or index) tracked by the system.
///
/// The universe is configured at runtime (Mag7 plus optional index tickers
/// such as `^IXIC`), so this is a string newtype rather than a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ticker(String);

impl Ticker {
    pub fn new(symbol: impl Into<String>) -> Self {
        Ticker(symbol.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for index tickers (`^IXIC`, `^NDXE`, `^VIX`, ...).
    pub fn is_index(&self) -> bool {
        self.0.starts_with('^')
    }
}

impl From<&str> for Ticker {
    fn from(s: &str) -> Self {
        Ticker::new(s)
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One day's OHLCV record for an instrument.
///
/// Produced by the upstream bar normalizer: exactly one row per
/// (ticker, trade_date), ordered ascending by date within each ticker,
/// trading-day gaps left unfilled. Open/high/low/close are guaranteed by the
/// normalizer; adjusted close and volume may be absent when the source record
/// is genuinely incomplete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    /// Instrument this bar belongs to
    pub ticker: Ticker,
    /// Trading date (exchange calendar)
    pub trade_date: NaiveDate,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Corporate-action adjusted close; basis for all price-derived features
    pub adjusted_close: Option<f64>,
    /// Traded volume in shares
    pub volume: Option<f64>,
}

/// Sentiment feed source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SentimentSource {
    /// FinBERT headline sentiment (score + positive/negative/neutral label)
    Finbert,
    /// GDELT event tone
    Gdelt,
}

impl SentimentSource {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "FINBERT" => Some(SentimentSource::Finbert),
            "GDELT" => Some(SentimentSource::Gdelt),
            _ => None,
        }
    }
}

impl fmt::Display for SentimentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SentimentSource::Finbert => write!(f, "FINBERT"),
            SentimentSource::Gdelt => write!(f, "GDELT"),
        }
    }
}

/// Input-contract violations from the upstream normalizer.
///
/// These are the only hard failures the engine raises. Insufficient history,
/// degenerate denominators and missing joins are all soft (`None` values or
/// omitted rows), never errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("bars for {ticker} are not in ascending trade_date order at {date}")]
    UnorderedBars { ticker: Ticker, date: NaiveDate },

    #[error("duplicate bar for {ticker} on {date}")]
    DuplicateBar { ticker: Ticker, date: NaiveDate },

    #[error("macro observations are not in ascending trade_date order at {date}")]
    UnorderedMacroRows { date: NaiveDate },

    #[error("bar universe is empty")]
    EmptyUniverse,
}

/// Validate the normalizer contract on one instrument's bar sequence:
/// strictly ascending trade dates, no duplicates.
pub fn validate_bars(bars: &[Bar]) -> Result<(), EngineError> {
    for pair in bars.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.trade_date == prev.trade_date {
            return Err(EngineError::DuplicateBar {
                ticker: next.ticker.clone(),
                date: next.trade_date,
            });
        }
        if next.trade_date < prev.trade_date {
            return Err(EngineError::UnorderedBars {
                ticker: next.ticker.clone(),
                date: next.trade_date,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ticker: &str, date: &str) -> Bar {
        Bar {
            ticker: Ticker::new(ticker),
            trade_date: date.parse().unwrap(),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            adjusted_close: Some(100.5),
            volume: Some(1_000_000.0),
        }
    }

    #[test]
    fn test_ticker_normalizes_case() {
        assert_eq!(Ticker::new("aapl").as_str(), "AAPL");
        assert!(Ticker::new("^ixic").is_index());
        assert!(!Ticker::new("NVDA").is_index());
    }

    #[test]
    fn test_validate_bars_ordering() {
        let bars = vec![bar("AAPL", "2024-01-02"), bar("AAPL", "2024-01-03")];
        assert!(validate_bars(&bars).is_ok());

        let unordered = vec![bar("AAPL", "2024-01-03"), bar("AAPL", "2024-01-02")];
        assert!(matches!(
            validate_bars(&unordered),
            Err(EngineError::UnorderedBars { .. })
        ));

        let duped = vec![bar("AAPL", "2024-01-02"), bar("AAPL", "2024-01-02")];
        assert!(matches!(
            validate_bars(&duped),
            Err(EngineError::DuplicateBar { .. })
        ));
    }

    #[test]
    fn test_sentiment_source_roundtrip() {
        assert_eq!(
            SentimentSource::from_str("finbert"),
            Some(SentimentSource::Finbert)
        );
        assert_eq!(SentimentSource::Gdelt.to_string(), "GDELT");
        assert_eq!(SentimentSource::from_str("reuters"), None);
    }
}
