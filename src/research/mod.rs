//! Research marts - offline validation and cross-sectional risk summaries
//!
//! Everything in this module consumes forward returns and full-history
//! aggregates, so it is research-only by construction: the live classifiers
//! never read these tables. Outcome tables answer "what happened after the
//! engine said X", the risk summary describes each ticker's realized
//! behavior for the cross-sectional dashboard.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::features::rolling;
use crate::features::{FeatureRow, ForwardReturns};
use crate::regime::RegimeRow;
use crate::signal::{MomRevSignalRow, ValueSignalRow};
use crate::types::Ticker;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Forward horizons the outcome tables evaluate, in rows.
pub const OUTCOME_HORIZONS: [u8; 3] = [5, 10, 20];

/// Forward-return outcome stats for one (ticker, signal state, horizon).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalOutcomeRow {
    pub ticker: Ticker,
    /// Which classifier produced the state ("s0" / "s1")
    pub classifier: String,
    pub signal_state: String,
    pub horizon_days: u8,
    /// Rows with a non-null forward return at this horizon
    pub n_obs: u64,
    pub avg_forward_return: Option<f64>,
    /// Share of observations with a positive forward return
    pub win_rate: Option<f64>,
}

/// Forward-return outcome stats for one (ticker, regime bucket, horizon).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeOutcomeRow {
    pub ticker: Ticker,
    pub regime_bucket_10: u8,
    pub horizon_days: u8,
    pub n_obs: u64,
    pub avg_forward_return: Option<f64>,
    pub win_rate: Option<f64>,
}

/// Cross-sectional descriptive risk metrics for one ticker's full history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSummaryRow {
    pub ticker: Ticker,
    pub n_days: u64,
    pub annualized_return: Option<f64>,
    pub annualized_volatility: Option<f64>,
    /// Annualized stddev of negative daily returns only
    pub annualized_downside_volatility: Option<f64>,
    /// Worst decline from the running adjusted-close maximum, as a negative
    /// fraction
    pub max_drawdown: Option<f64>,
    // Share of classified days spent in each combined regime style
    pub pct_time_deep_value: Option<f64>,
    pub pct_time_value_setup: Option<f64>,
    pub pct_time_momentum: Option<f64>,
    pub pct_time_overextended: Option<f64>,
    pub pct_time_neutral: Option<f64>,
    /// Annualized stddev of daily excess returns vs the benchmark; `None`
    /// when the benchmark is absent from the universe
    pub tracking_error: Option<f64>,
    /// Share of days with a negative excess return vs the benchmark
    pub excess_negative_rate: Option<f64>,
}

fn forward_return(fwd: &ForwardReturns, horizon: u8) -> Option<f64> {
    match horizon {
        5 => fwd.fwd_return_5d,
        10 => fwd.fwd_return_10d,
        20 => fwd.fwd_return_20d,
        _ => None,
    }
}

fn outcome_stats(returns: &[f64]) -> (u64, Option<f64>, Option<f64>) {
    let n = returns.len() as u64;
    let avg = rolling::mean(returns);
    let win_rate = if returns.is_empty() {
        None
    } else {
        Some(returns.iter().filter(|r| **r > 0.0).count() as f64 / returns.len() as f64)
    };
    (n, avg, win_rate)
}

/// Outcome stats grouped by a state key. Groups are emitted in sorted key
/// order, one row per (state, horizon).
fn grouped_outcomes(
    ticker: &Ticker,
    classifier: &str,
    keyed: Vec<(String, &ForwardReturns)>,
) -> Vec<SignalOutcomeRow> {
    let mut groups: BTreeMap<String, Vec<&ForwardReturns>> = BTreeMap::new();
    for (state, fwd) in keyed {
        groups.entry(state).or_default().push(fwd);
    }

    let mut out = Vec::new();
    for (state, fwds) in groups {
        for horizon in OUTCOME_HORIZONS {
            let returns: Vec<f64> = fwds
                .iter()
                .filter_map(|f| forward_return(f, horizon))
                .collect();
            let (n_obs, avg_forward_return, win_rate) = outcome_stats(&returns);
            out.push(SignalOutcomeRow {
                ticker: ticker.clone(),
                classifier: classifier.to_string(),
                signal_state: state.clone(),
                horizon_days: horizon,
                n_obs,
                avg_forward_return,
                win_rate,
            });
        }
    }
    out
}

/// What happened after each S0 state, per forward horizon.
pub fn value_signal_outcomes(
    signals: &[ValueSignalRow],
    features: &[FeatureRow],
) -> Vec<SignalOutcomeRow> {
    let Some(first) = signals.first() else {
        return Vec::new();
    };
    let fwd_by_date: BTreeMap<_, _> = features.iter().map(|f| (f.trade_date, &f.forward)).collect();
    let keyed = signals
        .iter()
        .filter_map(|s| {
            fwd_by_date
                .get(&s.trade_date)
                .map(|f| (s.state.to_string(), *f))
        })
        .collect();
    grouped_outcomes(&first.ticker, "s0", keyed)
}

/// What happened after each S1 state, per forward horizon.
pub fn mom_rev_signal_outcomes(
    signals: &[MomRevSignalRow],
    features: &[FeatureRow],
) -> Vec<SignalOutcomeRow> {
    let Some(first) = signals.first() else {
        return Vec::new();
    };
    let fwd_by_date: BTreeMap<_, _> = features.iter().map(|f| (f.trade_date, &f.forward)).collect();
    let keyed = signals
        .iter()
        .filter_map(|s| {
            fwd_by_date
                .get(&s.trade_date)
                .map(|f| (s.state.to_string(), *f))
        })
        .collect();
    grouped_outcomes(&first.ticker, "s1", keyed)
}

/// What happened after each regime bucket, per forward horizon.
pub fn regime_bucket_outcomes(
    regimes: &[RegimeRow],
    features: &[FeatureRow],
) -> Vec<RegimeOutcomeRow> {
    let Some(first) = regimes.first() else {
        return Vec::new();
    };
    let fwd_by_date: BTreeMap<_, _> = features.iter().map(|f| (f.trade_date, &f.forward)).collect();

    let mut groups: BTreeMap<u8, Vec<&ForwardReturns>> = BTreeMap::new();
    for r in regimes {
        if let Some(f) = fwd_by_date.get(&r.trade_date) {
            groups.entry(r.regime_bucket_10).or_default().push(f);
        }
    }

    let mut out = Vec::new();
    for (bucket, fwds) in groups {
        for horizon in OUTCOME_HORIZONS {
            let returns: Vec<f64> = fwds
                .iter()
                .filter_map(|f| forward_return(f, horizon))
                .collect();
            let (n_obs, avg_forward_return, win_rate) = outcome_stats(&returns);
            out.push(RegimeOutcomeRow {
                ticker: first.ticker.clone(),
                regime_bucket_10: bucket,
                horizon_days: horizon,
                n_obs,
                avg_forward_return,
                win_rate,
            });
        }
    }
    out
}

/// Descriptive risk metrics for one ticker. `benchmark` is the benchmark
/// ticker's feature rows when present in the universe; its absence leaves
/// the benchmark-relative fields null rather than failing.
pub fn risk_summary(
    features: &[FeatureRow],
    regimes: &[RegimeRow],
    benchmark: Option<&[FeatureRow]>,
) -> Option<RiskSummaryRow> {
    let first = features.first()?;

    let daily_returns: Vec<f64> = features.iter().filter_map(|f| f.causal.ret_1d).collect();
    let annualized_return = rolling::mean(&daily_returns).map(|m| m * TRADING_DAYS_PER_YEAR);
    let annualized_volatility =
        rolling::sample_stddev(&daily_returns).map(|s| s * TRADING_DAYS_PER_YEAR.sqrt());
    let downside: Vec<f64> = daily_returns.iter().copied().filter(|r| *r < 0.0).collect();
    let annualized_downside_volatility =
        rolling::sample_stddev(&downside).map(|s| s * TRADING_DAYS_PER_YEAR.sqrt());

    // Worst decline from the running adjusted-close maximum.
    let mut running_max = f64::NEG_INFINITY;
    let mut max_drawdown: Option<f64> = None;
    for price in features.iter().filter_map(|f| f.adjusted_close) {
        running_max = running_max.max(price);
        if running_max > 0.0 {
            let dd = price / running_max - 1.0;
            max_drawdown = Some(max_drawdown.map_or(dd, |cur: f64| cur.min(dd)));
        }
    }

    let style_share = |style: crate::regime::RegimeStyle| -> Option<f64> {
        if regimes.is_empty() {
            return None;
        }
        Some(
            regimes
                .iter()
                .filter(|r| r.combined_regime_style == style)
                .count() as f64
                / regimes.len() as f64,
        )
    };

    // Benchmark-relative fields: align daily returns by trade date.
    let mut tracking_error = None;
    let mut excess_negative_rate = None;
    if let Some(bench) = benchmark {
        let bench_by_date: BTreeMap<_, _> = bench
            .iter()
            .filter_map(|f| f.causal.ret_1d.map(|r| (f.trade_date, r)))
            .collect();
        let excess: Vec<f64> = features
            .iter()
            .filter_map(|f| {
                let own = f.causal.ret_1d?;
                let b = bench_by_date.get(&f.trade_date)?;
                Some(own - b)
            })
            .collect();
        tracking_error =
            rolling::sample_stddev(&excess).map(|s| s * TRADING_DAYS_PER_YEAR.sqrt());
        if !excess.is_empty() {
            excess_negative_rate =
                Some(excess.iter().filter(|e| **e < 0.0).count() as f64 / excess.len() as f64);
        }
    }

    Some(RiskSummaryRow {
        ticker: first.ticker.clone(),
        n_days: features.len() as u64,
        annualized_return,
        annualized_volatility,
        annualized_downside_volatility,
        max_drawdown,
        pct_time_deep_value: style_share(crate::regime::RegimeStyle::DeepValue),
        pct_time_value_setup: style_share(crate::regime::RegimeStyle::ValueSetup),
        pct_time_momentum: style_share(crate::regime::RegimeStyle::Momentum),
        pct_time_overextended: style_share(crate::regime::RegimeStyle::Overextended),
        pct_time_neutral: style_share(crate::regime::RegimeStyle::Neutral),
        tracking_error,
        excess_negative_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::CausalFeatures;
    use crate::regime::{RegimeRow, RegimeStyle};
    use chrono::NaiveDate;

    fn date(day: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(day)
    }

    fn feature_row(day: u64, ret_1d: Option<f64>, fwd_10: Option<f64>) -> FeatureRow {
        FeatureRow {
            ticker: Ticker::new("AMZN"),
            trade_date: date(day),
            adjusted_close: Some(100.0 + day as f64),
            causal: CausalFeatures {
                ret_1d,
                ..Default::default()
            },
            forward: ForwardReturns {
                fwd_return_10d: fwd_10,
                ..Default::default()
            },
        }
    }

    fn regime_row(day: u64, bucket: u8, style: RegimeStyle) -> RegimeRow {
        RegimeRow {
            ticker: Ticker::new("AMZN"),
            trade_date: date(day),
            adjusted_close: Some(100.0),
            price_pos_200d: 0.5,
            regime_bucket_10: bucket,
            price_zscore_20d: None,
            zscore_bucket_10: None,
            zscore_label_5: None,
            combined_regime_style: style,
        }
    }

    #[test]
    fn test_regime_outcomes_grouped_by_bucket() {
        let features = vec![
            feature_row(0, None, Some(0.05)),
            feature_row(1, None, Some(-0.02)),
            feature_row(2, None, Some(0.03)),
            feature_row(3, None, None),
        ];
        let regimes = vec![
            regime_row(0, 2, RegimeStyle::ValueSetup),
            regime_row(1, 2, RegimeStyle::ValueSetup),
            regime_row(2, 9, RegimeStyle::Momentum),
            regime_row(3, 9, RegimeStyle::Momentum),
        ];
        let out = regime_bucket_outcomes(&regimes, &features);

        // Two buckets x three horizons.
        assert_eq!(out.len(), 6);
        let b2_h10 = out
            .iter()
            .find(|r| r.regime_bucket_10 == 2 && r.horizon_days == 10)
            .unwrap();
        assert_eq!(b2_h10.n_obs, 2);
        assert!((b2_h10.avg_forward_return.unwrap() - 0.015).abs() < 1e-12);
        assert_eq!(b2_h10.win_rate, Some(0.5));

        // The null forward return at day 3 drops out of the count.
        let b9_h10 = out
            .iter()
            .find(|r| r.regime_bucket_10 == 9 && r.horizon_days == 10)
            .unwrap();
        assert_eq!(b9_h10.n_obs, 1);
        assert_eq!(b9_h10.win_rate, Some(1.0));
    }

    #[test]
    fn test_empty_inputs_yield_no_rows() {
        assert!(regime_bucket_outcomes(&[], &[]).is_empty());
        assert!(value_signal_outcomes(&[], &[]).is_empty());
        assert!(risk_summary(&[], &[], None).is_none());
    }

    #[test]
    fn test_max_drawdown_from_running_peak() {
        // Peak 120 then trough 90: drawdown 25%.
        let closes = [100.0, 120.0, 110.0, 90.0, 115.0];
        let features: Vec<FeatureRow> = closes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let mut f = feature_row(i as u64, Some(0.01), None);
                f.adjusted_close = Some(*c);
                f
            })
            .collect();
        let summary = risk_summary(&features, &[], None).unwrap();
        assert!((summary.max_drawdown.unwrap() - (90.0 / 120.0 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_style_shares_sum_to_one() {
        let features = vec![feature_row(0, Some(0.01), None)];
        let regimes = vec![
            regime_row(0, 2, RegimeStyle::DeepValue),
            regime_row(1, 2, RegimeStyle::ValueSetup),
            regime_row(2, 9, RegimeStyle::Momentum),
            regime_row(3, 5, RegimeStyle::Neutral),
        ];
        let summary = risk_summary(&features, &regimes, None).unwrap();
        let total = summary.pct_time_deep_value.unwrap()
            + summary.pct_time_value_setup.unwrap()
            + summary.pct_time_momentum.unwrap()
            + summary.pct_time_overextended.unwrap()
            + summary.pct_time_neutral.unwrap();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_benchmark_fields_null_without_benchmark() {
        let features = vec![
            feature_row(0, Some(0.01), None),
            feature_row(1, Some(-0.01), None),
            feature_row(2, Some(0.02), None),
        ];
        let summary = risk_summary(&features, &[], None).unwrap();
        assert_eq!(summary.tracking_error, None);
        assert_eq!(summary.excess_negative_rate, None);
        assert!(summary.annualized_volatility.is_some());
    }

    #[test]
    fn test_tracking_error_aligns_dates() {
        let own = vec![
            feature_row(0, Some(0.02), None),
            feature_row(1, Some(-0.01), None),
            feature_row(2, Some(0.01), None),
        ];
        // Benchmark misses day 2: only two aligned days.
        let bench = vec![
            feature_row(0, Some(0.01), None),
            feature_row(1, Some(0.01), None),
        ];
        let summary = risk_summary(&own, &[], Some(&bench)).unwrap();
        assert!(summary.tracking_error.is_some());
        // Excess: +0.01 and -0.02 -> half negative.
        assert_eq!(summary.excess_negative_rate, Some(0.5));
    }
}
