//! Batch pipeline - fans the engine out across instruments
//!
//! The engine is a pure transformation from input tables to output tables.
//! Instruments are independent (every rolling feature reads only its own
//! ticker's history), so per-ticker computation runs on blocking worker
//! threads in parallel, while each ticker's sequence stays single-threaded
//! and ordered. Tickers are processed in sorted order and results are
//! concatenated in that same order, so re-running on the same snapshot
//! produces byte-identical output.

use chrono::{DateTime, NaiveDate, Utc};
use futures_util::future::join_all;
use std::collections::BTreeMap;

use crate::config::AppConfig;
use crate::features::{FeatureComputer, FeatureRow};
use crate::macro_risk::{MacroComputer, MacroObservation, MacroRow};
use crate::regime::{RegimeClassifier, RegimeRow};
use crate::research::{
    self, RegimeOutcomeRow, RiskSummaryRow, SignalOutcomeRow,
};
use crate::sentiment::{
    GdeltEventRecord, NewsSentimentRecord, SentimentAggregator, SentimentRow,
};
use crate::signal::{MomRevSignalRow, SignalClassifier, ValueSignalRow};
use crate::types::{Bar, EngineError, Ticker};

/// Everything one engine run consumes.
#[derive(Debug, Clone, Default)]
pub struct EngineInput {
    /// Bars for the whole universe; grouped by ticker internally
    pub bars: Vec<Bar>,
    pub macro_observations: Vec<MacroObservation>,
    pub news: Vec<NewsSentimentRecord>,
    pub events: Vec<GdeltEventRecord>,
}

/// Everything one engine run produces, each table sorted by
/// (ticker, trade_date) or (trade_date) for macro rows.
#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    pub features: Vec<FeatureRow>,
    pub regimes: Vec<RegimeRow>,
    pub value_signals: Vec<ValueSignalRow>,
    pub mom_rev_signals: Vec<MomRevSignalRow>,
    pub macro_rows: Vec<MacroRow>,
    pub sentiment: Vec<SentimentRow>,
    // Research marts (forward-looking, offline only)
    pub signal_outcomes: Vec<SignalOutcomeRow>,
    pub regime_outcomes: Vec<RegimeOutcomeRow>,
    pub risk_summaries: Vec<RiskSummaryRow>,
}

/// Per-ticker intermediate bundle produced by one worker.
struct TickerArtifacts {
    ticker: Ticker,
    features: Vec<FeatureRow>,
    regimes: Vec<RegimeRow>,
    value_signals: Vec<ValueSignalRow>,
    mom_rev_signals: Vec<MomRevSignalRow>,
    signal_outcomes: Vec<SignalOutcomeRow>,
    regime_outcomes: Vec<RegimeOutcomeRow>,
}

/// The Feature & Regime Engine.
pub struct Engine {
    cfg: AppConfig,
}

impl Engine {
    pub fn new(cfg: AppConfig) -> Self {
        Self { cfg }
    }

    /// Run the full batch: features, regimes, signals, macro, sentiment and
    /// the research marts. `asof` stamps signal rows for lineage and must
    /// come from the caller so identical snapshots reproduce identically.
    pub async fn run(
        &self,
        input: EngineInput,
        asof: DateTime<Utc>,
    ) -> anyhow::Result<EngineOutput> {
        if input.bars.is_empty() {
            return Err(EngineError::EmptyUniverse.into());
        }

        // Group bars per ticker; BTreeMap fixes the processing order.
        let mut by_ticker: BTreeMap<Ticker, Vec<Bar>> = BTreeMap::new();
        for bar in input.bars {
            by_ticker.entry(bar.ticker.clone()).or_default().push(bar);
        }
        let ticker_count = by_ticker.len();

        tracing::info!(
            tickers = ticker_count,
            macro_rows = input.macro_observations.len(),
            news_records = input.news.len(),
            event_records = input.events.len(),
            "engine run starting"
        );

        let tasks: Vec<_> = by_ticker
            .into_iter()
            .map(|(ticker, bars)| {
                let cfg = self.cfg.clone();
                tokio::task::spawn_blocking(move || compute_ticker(&cfg, ticker, &bars, asof))
            })
            .collect();

        let mut artifacts = Vec::with_capacity(ticker_count);
        for result in join_all(tasks).await {
            artifacts.push(result??);
        }

        // Benchmark features for the tracking-error fields, if the
        // benchmark ticker is part of the universe.
        let benchmark_features: Option<Vec<FeatureRow>> = self
            .cfg
            .universe
            .benchmark
            .as_deref()
            .map(Ticker::from)
            .and_then(|bench| {
                artifacts
                    .iter()
                    .find(|a| a.ticker == bench)
                    .map(|a| a.features.clone())
            });

        let mut out = EngineOutput::default();
        for art in artifacts {
            if let Some(summary) = research::risk_summary(
                &art.features,
                &art.regimes,
                benchmark_features.as_deref(),
            ) {
                out.risk_summaries.push(summary);
            }
            out.features.extend(art.features);
            out.regimes.extend(art.regimes);
            out.value_signals.extend(art.value_signals);
            out.mom_rev_signals.extend(art.mom_rev_signals);
            out.signal_outcomes.extend(art.signal_outcomes);
            out.regime_outcomes.extend(art.regime_outcomes);
        }

        out.macro_rows = MacroComputer::new(self.cfg.macro_risk.clone())
            .compute(&input.macro_observations)?;
        out.sentiment = SentimentAggregator::aggregate_news(&input.news);
        out.sentiment
            .extend(SentimentAggregator::aggregate_events(&input.events));

        tracing::info!(
            feature_rows = out.features.len(),
            regime_rows = out.regimes.len(),
            value_signal_rows = out.value_signals.len(),
            mom_rev_signal_rows = out.mom_rev_signals.len(),
            macro_rows = out.macro_rows.len(),
            sentiment_rows = out.sentiment.len(),
            "engine run complete"
        );

        Ok(out)
    }
}

/// One instrument's full leaf-to-root computation, single-threaded and in
/// row order: features, regimes, both signal classifiers, outcome marts.
fn compute_ticker(
    cfg: &AppConfig,
    ticker: Ticker,
    bars: &[Bar],
    asof: DateTime<Utc>,
) -> Result<TickerArtifacts, EngineError> {
    let features = FeatureComputer::new(cfg.features.clone()).compute(bars)?;
    let regimes = RegimeClassifier::classify(&features);

    let classifier = SignalClassifier::new(cfg.signal.clone(), asof);
    let value_signals: Vec<ValueSignalRow> = regimes
        .iter()
        .map(|r| classifier.classify_value(r))
        .collect();

    // S1 runs over every feature row; the regime bucket joins in by date
    // and is simply absent where the regime filter dropped the row.
    let bucket_by_date: BTreeMap<NaiveDate, u8> = regimes
        .iter()
        .map(|r| (r.trade_date, r.regime_bucket_10))
        .collect();
    let mom_rev_signals: Vec<MomRevSignalRow> = features
        .iter()
        .map(|f| {
            classifier.classify_mom_rev(
                &f.ticker,
                f.trade_date,
                f.adjusted_close,
                &f.causal,
                bucket_by_date.get(&f.trade_date).copied(),
            )
        })
        .collect();

    let mut signal_outcomes = research::value_signal_outcomes(&value_signals, &features);
    signal_outcomes.extend(research::mom_rev_signal_outcomes(
        &mom_rev_signals,
        &features,
    ));
    let regime_outcomes = research::regime_bucket_outcomes(&regimes, &features);

    Ok(TickerArtifacts {
        ticker,
        features,
        regimes,
        value_signals,
        mom_rev_signals,
        signal_outcomes,
        regime_outcomes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_config() -> AppConfig {
        AppConfig {
            universe: crate::config::UniverseConfig {
                tickers: vec!["AAPL".into(), "MSFT".into()],
                benchmark: None,
            },
            features: Default::default(),
            signal: Default::default(),
            macro_risk: Default::default(),
            persistence: crate::config::PersistenceConfig {
                data_dir: "./data".into(),
                csv_enabled: false,
                write_research_marts: true,
            },
        }
    }

    fn bars_for(ticker: &str, closes: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| Bar {
                ticker: Ticker::new(ticker),
                trade_date: start + chrono::Days::new(i as u64),
                open: c - 1.0,
                high: c + 2.0,
                low: c - 2.0,
                close: *c,
                adjusted_close: Some(*c),
                volume: Some(1_000_000.0),
            })
            .collect()
    }

    fn wavy_closes(n: usize, base: f64) -> Vec<f64> {
        (0..n)
            .map(|i| base + ((i % 7) as f64 - 3.0) * 2.0 + i as f64 * 0.05)
            .collect()
    }

    fn asof() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_run_produces_all_tables() {
        let mut bars = bars_for("AAPL", &wavy_closes(260, 150.0));
        bars.extend(bars_for("MSFT", &wavy_closes(260, 300.0)));
        let input = EngineInput {
            bars,
            ..Default::default()
        };

        let out = Engine::new(test_config()).run(input, asof()).await.unwrap();
        assert_eq!(out.features.len(), 520);
        // Regime rows exist once the 200-row range fills.
        assert_eq!(out.regimes.len(), 2 * (260 - 199));
        assert_eq!(out.value_signals.len(), out.regimes.len());
        // S1 covers every feature row, classified or not.
        assert_eq!(out.mom_rev_signals.len(), 520);
        assert!(!out.risk_summaries.is_empty());
        assert!(out.macro_rows.is_empty());

        // Ticker-major ordering.
        assert_eq!(out.features[0].ticker.as_str(), "AAPL");
        assert_eq!(out.features[519].ticker.as_str(), "MSFT");
    }

    #[tokio::test]
    async fn test_reruns_are_identical() {
        let mut bars = bars_for("AAPL", &wavy_closes(230, 150.0));
        bars.extend(bars_for("NVDA", &wavy_closes(230, 700.0)));
        let input = EngineInput {
            bars,
            ..Default::default()
        };

        let engine = Engine::new(test_config());
        let a = engine.run(input.clone(), asof()).await.unwrap();
        let b = engine.run(input, asof()).await.unwrap();

        let ser = |o: &EngineOutput| {
            (
                serde_json::to_string(&o.features).unwrap(),
                serde_json::to_string(&o.regimes).unwrap(),
                serde_json::to_string(&o.value_signals).unwrap(),
                serde_json::to_string(&o.mom_rev_signals).unwrap(),
            )
        };
        assert_eq!(ser(&a), ser(&b));
    }

    #[tokio::test]
    async fn test_instruments_do_not_leak_into_each_other() {
        let aapl = bars_for("AAPL", &wavy_closes(230, 150.0));

        let solo = Engine::new(test_config())
            .run(
                EngineInput {
                    bars: aapl.clone(),
                    ..Default::default()
                },
                asof(),
            )
            .await
            .unwrap();

        let mut mixed_bars = aapl;
        mixed_bars.extend(bars_for("TSLA", &wavy_closes(230, 200.0)));
        let mixed = Engine::new(test_config())
            .run(
                EngineInput {
                    bars: mixed_bars,
                    ..Default::default()
                },
                asof(),
            )
            .await
            .unwrap();

        let mixed_aapl: Vec<_> = mixed
            .features
            .iter()
            .filter(|f| f.ticker.as_str() == "AAPL")
            .collect();
        assert_eq!(
            serde_json::to_string(&solo.features).unwrap(),
            serde_json::to_string(&mixed_aapl).unwrap()
        );
    }

    #[tokio::test]
    async fn test_empty_universe_is_an_error() {
        let result = Engine::new(test_config())
            .run(EngineInput::default(), asof())
            .await;
        assert!(result.is_err());
    }
}
