//! Sentiment Aggregator - daily per-ticker rollups of news and event feeds
//!
//! Collapses article-level FinBERT sentiment and event-level GDELT tone into
//! one row per (trade date, ticker, source): observation count, mean, median
//! and sample stddev, plus label counts and a positive/negative balance for
//! the labeled source. Pure grouped aggregation, no rolling state.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::features::rolling;
use crate::types::{SentimentSource, Ticker};

/// FinBERT article-level label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "positive" => Some(SentimentLabel::Positive),
            "negative" => Some(SentimentLabel::Negative),
            "neutral" => Some(SentimentLabel::Neutral),
            _ => None,
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
        };
        write!(f, "{s}")
    }
}

/// One scored headline from the news extractor.
/// `sentiment_score` is positive probability minus negative probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsSentimentRecord {
    pub ticker: Ticker,
    pub published_at: DateTime<Utc>,
    pub sentiment_score: f64,
    pub sentiment_label: SentimentLabel,
}

/// One GDELT event mention with its tone score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GdeltEventRecord {
    pub ticker: Ticker,
    pub event_time: DateTime<Utc>,
    pub tone: f64,
}

/// Daily per-ticker sentiment summary for one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentRow {
    pub ticker: Ticker,
    pub trade_date: NaiveDate,
    pub source: SentimentSource,
    pub n_obs: u64,
    pub score_mean: Option<f64>,
    pub score_median: Option<f64>,
    /// Sample stddev; `None` below two observations
    pub score_stddev: Option<f64>,
    /// Label counts; FinBERT only
    pub n_positive: Option<u64>,
    pub n_negative: Option<u64>,
    pub n_neutral: Option<u64>,
    /// (positive − negative) / total; FinBERT only
    pub balance: Option<f64>,
}

/// Groups per-article and per-event records into daily rows. Output is
/// sorted by (ticker, trade date) so repeated runs emit identical files.
pub struct SentimentAggregator;

impl SentimentAggregator {
    /// Aggregate FinBERT-scored headlines into daily FINBERT rows.
    pub fn aggregate_news(records: &[NewsSentimentRecord]) -> Vec<SentimentRow> {
        let mut groups: BTreeMap<(Ticker, NaiveDate), Vec<&NewsSentimentRecord>> = BTreeMap::new();
        for rec in records {
            groups
                .entry((rec.ticker.clone(), rec.published_at.date_naive()))
                .or_default()
                .push(rec);
        }

        groups
            .into_iter()
            .map(|((ticker, trade_date), recs)| {
                let scores: Vec<f64> = recs.iter().map(|r| r.sentiment_score).collect();
                let n_positive = recs
                    .iter()
                    .filter(|r| r.sentiment_label == SentimentLabel::Positive)
                    .count() as u64;
                let n_negative = recs
                    .iter()
                    .filter(|r| r.sentiment_label == SentimentLabel::Negative)
                    .count() as u64;
                let n_neutral = recs.len() as u64 - n_positive - n_negative;
                let balance = (n_positive as f64 - n_negative as f64) / recs.len() as f64;

                SentimentRow {
                    ticker,
                    trade_date,
                    source: SentimentSource::Finbert,
                    n_obs: recs.len() as u64,
                    score_mean: rolling::mean(&scores),
                    score_median: median(&scores),
                    score_stddev: rolling::sample_stddev(&scores),
                    n_positive: Some(n_positive),
                    n_negative: Some(n_negative),
                    n_neutral: Some(n_neutral),
                    balance: Some(balance),
                }
            })
            .collect()
    }

    /// Aggregate GDELT event tones into daily GDELT rows.
    pub fn aggregate_events(records: &[GdeltEventRecord]) -> Vec<SentimentRow> {
        let mut groups: BTreeMap<(Ticker, NaiveDate), Vec<f64>> = BTreeMap::new();
        for rec in records {
            groups
                .entry((rec.ticker.clone(), rec.event_time.date_naive()))
                .or_default()
                .push(rec.tone);
        }

        groups
            .into_iter()
            .map(|((ticker, trade_date), tones)| SentimentRow {
                ticker,
                trade_date,
                source: SentimentSource::Gdelt,
                n_obs: tones.len() as u64,
                score_mean: rolling::mean(&tones),
                score_median: median(&tones),
                score_stddev: rolling::sample_stddev(&tones),
                n_positive: None,
                n_negative: None,
                n_neutral: None,
                balance: None,
            })
            .collect()
    }
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("non-finite sentiment score"));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn news(ticker: &str, ts: &str, score: f64, label: SentimentLabel) -> NewsSentimentRecord {
        NewsSentimentRecord {
            ticker: Ticker::new(ticker),
            published_at: ts.parse().unwrap(),
            sentiment_score: score,
            sentiment_label: label,
        }
    }

    #[test]
    fn test_news_daily_grouping_and_balance() {
        let records = vec![
            news("AAPL", "2024-03-04T09:30:00Z", 0.8, SentimentLabel::Positive),
            news("AAPL", "2024-03-04T14:00:00Z", -0.5, SentimentLabel::Negative),
            news("AAPL", "2024-03-04T20:00:00Z", 0.6, SentimentLabel::Positive),
            news("AAPL", "2024-03-05T01:00:00Z", 0.1, SentimentLabel::Neutral),
            news("TSLA", "2024-03-04T12:00:00Z", -0.9, SentimentLabel::Negative),
        ];
        let rows = SentimentAggregator::aggregate_news(&records);
        assert_eq!(rows.len(), 3);

        // Sorted by (ticker, date): AAPL 03-04, AAPL 03-05, TSLA 03-04.
        let first = &rows[0];
        assert_eq!(first.ticker.as_str(), "AAPL");
        assert_eq!(first.trade_date, "2024-03-04".parse().unwrap());
        assert_eq!(first.n_obs, 3);
        assert_eq!(first.n_positive, Some(2));
        assert_eq!(first.n_negative, Some(1));
        assert_eq!(first.n_neutral, Some(0));
        assert!((first.balance.unwrap() - 1.0 / 3.0).abs() < 1e-12);
        assert!((first.score_mean.unwrap() - 0.3).abs() < 1e-12);
        assert_eq!(first.score_median, Some(0.6));

        let next_day = &rows[1];
        assert_eq!(next_day.n_obs, 1);
        // A single observation has no sample stddev.
        assert_eq!(next_day.score_stddev, None);
        assert_eq!(next_day.balance, Some(0.0));
    }

    #[test]
    fn test_median_even_count() {
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), Some(2.5));
        assert_eq!(median(&[3.0, 1.0]), Some(2.0));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_gdelt_rows_skip_label_fields() {
        let utc = |d: u32, h: u32| Utc.with_ymd_and_hms(2024, 3, d, h, 0, 0).unwrap();
        let records = vec![
            GdeltEventRecord {
                ticker: Ticker::new("MSFT"),
                event_time: utc(4, 10),
                tone: -2.5,
            },
            GdeltEventRecord {
                ticker: Ticker::new("MSFT"),
                event_time: utc(4, 18),
                tone: 1.5,
            },
        ];
        let rows = SentimentAggregator::aggregate_events(&records);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.source, SentimentSource::Gdelt);
        assert_eq!(row.n_obs, 2);
        assert_eq!(row.score_mean, Some(-0.5));
        assert!(row.score_stddev.is_some());
        assert_eq!(row.n_positive, None);
        assert_eq!(row.balance, None);
    }
}
