//! Macro Risk Composite - cross-sectional stress indicator over macro feeds
//!
//! Consumes one row per calendar date of macro indicators (the CNN
//! fear & greed constituent series: fear/greed index, market momentum,
//! stock strength/breadth, put/call, volatility, safe-haven and junk-bond
//! demand) and produces:
//! - 20/60-row rolling mean/stddev/z-score per indicator
//! - a composite risk-off score per window (fear/greed sign-inverted so
//!   more fear raises the score; volatility, put/call and safe-haven
//!   contribute directly), averaged over whichever of the four components
//!   exist that day - a missing feed never nulls the composite
//! - 5-row smoothed variants for display stability
//! - 4-level and 3-level risk regime labels and a full-history decile

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::MacroConfig;
use crate::features::rolling;
use crate::types::EngineError;

/// One calendar date of raw macro indicator readings. Any field may be
/// absent when the upstream feed skipped a day.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MacroObservation {
    pub trade_date: NaiveDate,
    pub fear_greed: Option<f64>,
    pub momentum_sp500: Option<f64>,
    pub momentum_sp125: Option<f64>,
    pub stock_strength: Option<f64>,
    pub stock_breadth: Option<f64>,
    pub put_call: Option<f64>,
    pub volatility: Option<f64>,
    pub volatility_50: Option<f64>,
    pub safe_haven: Option<f64>,
    pub junk_bonds: Option<f64>,
}

/// Rolling statistics for one indicator on one date.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorStats {
    pub value: Option<f64>,
    pub mean_20d: Option<f64>,
    pub stddev_20d: Option<f64>,
    pub z_20d: Option<f64>,
    pub mean_60d: Option<f64>,
    pub stddev_60d: Option<f64>,
    pub z_60d: Option<f64>,
}

/// 4-level risk regime over the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskRegime {
    Panic,
    RiskOff,
    Neutral,
    RiskOn,
}

impl fmt::Display for RiskRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskRegime::Panic => "panic",
            RiskRegime::RiskOff => "risk_off",
            RiskRegime::Neutral => "neutral",
            RiskRegime::RiskOn => "risk_on",
        };
        write!(f, "{s}")
    }
}

impl RiskRegime {
    /// Collapse panic into risk_off for the 3-level variant.
    pub fn coarse(self) -> RiskRegime {
        match self {
            RiskRegime::Panic => RiskRegime::RiskOff,
            other => other,
        }
    }
}

/// Macro risk output for one calendar date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroRow {
    pub trade_date: NaiveDate,

    // Per-indicator rolling stats
    pub fear_greed: IndicatorStats,
    pub momentum_sp500: IndicatorStats,
    pub momentum_sp125: IndicatorStats,
    pub stock_strength: IndicatorStats,
    pub stock_breadth: IndicatorStats,
    pub put_call: IndicatorStats,
    pub volatility: IndicatorStats,
    pub volatility_50: IndicatorStats,
    pub safe_haven: IndicatorStats,
    pub junk_bonds: IndicatorStats,

    /// Composite over 60-row z-scores (the headline score)
    pub risk_off_score: Option<f64>,
    /// Composite over 20-row z-scores
    pub risk_off_score_20d: Option<f64>,
    /// 5-row rolling means for display stability
    pub risk_off_score_smoothed: Option<f64>,
    pub risk_off_score_20d_smoothed: Option<f64>,
    pub fear_greed_z_smoothed: Option<f64>,
    pub volatility_z_smoothed: Option<f64>,

    /// Regimes over the headline composite
    pub risk_regime_4: Option<RiskRegime>,
    pub risk_regime_3: Option<RiskRegime>,
    /// Full-history decile of the headline composite. NON-CAUSAL: ranked
    /// over the complete series, same caveat as the z-score bucket.
    pub risk_off_decile_10: Option<u8>,
}

/// Computes macro risk rows from the ordered daily observation sequence.
pub struct MacroComputer {
    cfg: MacroConfig,
}

impl MacroComputer {
    pub fn new(cfg: MacroConfig) -> Self {
        Self { cfg }
    }

    pub fn compute(&self, obs: &[MacroObservation]) -> Result<Vec<MacroRow>, EngineError> {
        for pair in obs.windows(2) {
            if pair[1].trade_date <= pair[0].trade_date {
                return Err(EngineError::UnorderedMacroRows {
                    date: pair[1].trade_date,
                });
            }
        }

        let n = obs.len();
        let series = |f: fn(&MacroObservation) -> Option<f64>| -> Vec<Option<f64>> {
            obs.iter().map(f).collect()
        };

        let fear_greed = self.indicator_stats(&series(|o| o.fear_greed));
        let momentum_sp500 = self.indicator_stats(&series(|o| o.momentum_sp500));
        let momentum_sp125 = self.indicator_stats(&series(|o| o.momentum_sp125));
        let stock_strength = self.indicator_stats(&series(|o| o.stock_strength));
        let stock_breadth = self.indicator_stats(&series(|o| o.stock_breadth));
        let put_call = self.indicator_stats(&series(|o| o.put_call));
        let volatility = self.indicator_stats(&series(|o| o.volatility));
        let volatility_50 = self.indicator_stats(&series(|o| o.volatility_50));
        let safe_haven = self.indicator_stats(&series(|o| o.safe_haven));
        let junk_bonds = self.indicator_stats(&series(|o| o.junk_bonds));

        // Composite per window: average of whichever of the four stress
        // components exist. Fear/greed flips sign (greed is low stress).
        let composite_at = |i: usize, pick: fn(&IndicatorStats) -> Option<f64>| -> Option<f64> {
            let components = [
                pick(&fear_greed[i]).map(|z| -z),
                pick(&volatility[i]),
                pick(&put_call[i]),
                pick(&safe_haven[i]),
            ];
            let present: Vec<f64> = components.iter().filter_map(|c| *c).collect();
            rolling::mean(&present)
        };

        let risk_off: Vec<Option<f64>> = (0..n).map(|i| composite_at(i, |s| s.z_60d)).collect();
        let risk_off_20d: Vec<Option<f64>> = (0..n).map(|i| composite_at(i, |s| s.z_20d)).collect();

        let fear_greed_z: Vec<Option<f64>> = fear_greed.iter().map(|s| s.z_60d).collect();
        let volatility_z: Vec<Option<f64>> = volatility.iter().map(|s| s.z_60d).collect();

        let deciles = global_deciles(&risk_off);

        let mut rows = Vec::with_capacity(n);
        for i in 0..n {
            let regime_4 = risk_off[i].map(|s| self.risk_regime(s));
            rows.push(MacroRow {
                trade_date: obs[i].trade_date,
                fear_greed: fear_greed[i].clone(),
                momentum_sp500: momentum_sp500[i].clone(),
                momentum_sp125: momentum_sp125[i].clone(),
                stock_strength: stock_strength[i].clone(),
                stock_breadth: stock_breadth[i].clone(),
                put_call: put_call[i].clone(),
                volatility: volatility[i].clone(),
                volatility_50: volatility_50[i].clone(),
                safe_haven: safe_haven[i].clone(),
                junk_bonds: junk_bonds[i].clone(),
                risk_off_score: risk_off[i],
                risk_off_score_20d: risk_off_20d[i],
                risk_off_score_smoothed: self.smooth(&risk_off, i),
                risk_off_score_20d_smoothed: self.smooth(&risk_off_20d, i),
                fear_greed_z_smoothed: self.smooth(&fear_greed_z, i),
                volatility_z_smoothed: self.smooth(&volatility_z, i),
                risk_regime_4: regime_4,
                risk_regime_3: regime_4.map(RiskRegime::coarse),
                risk_off_decile_10: deciles[i],
            });
        }

        tracing::debug!(
            rows = rows.len(),
            with_composite = rows.iter().filter(|r| r.risk_off_score.is_some()).count(),
            "macro risk computation complete"
        );

        Ok(rows)
    }

    fn indicator_stats(&self, values: &[Option<f64>]) -> Vec<IndicatorStats> {
        (0..values.len())
            .map(|i| {
                let mut stats = IndicatorStats {
                    value: values[i],
                    ..Default::default()
                };
                if let Some(w) = rolling::trailing_nonnull(values, i, self.cfg.short_window) {
                    stats.mean_20d = rolling::mean(&w);
                    stats.stddev_20d = rolling::sample_stddev(&w);
                }
                if let Some(w) = rolling::trailing_nonnull(values, i, self.cfg.long_window) {
                    stats.mean_60d = rolling::mean(&w);
                    stats.stddev_60d = rolling::sample_stddev(&w);
                }
                if let (Some(v), Some(m), Some(s)) = (values[i], stats.mean_20d, stats.stddev_20d) {
                    stats.z_20d = rolling::zscore(v, m, s);
                }
                if let (Some(v), Some(m), Some(s)) = (values[i], stats.mean_60d, stats.stddev_60d) {
                    stats.z_60d = rolling::zscore(v, m, s);
                }
                stats
            })
            .collect()
    }

    /// Trailing smooth over up to `smooth_window` rows; fills from the first
    /// row like the warehouse display marts.
    fn smooth(&self, series: &[Option<f64>], idx: usize) -> Option<f64> {
        let window = rolling::trailing_nonnull_partial(series, idx, self.cfg.smooth_window);
        rolling::mean(&window)
    }

    fn risk_regime(&self, score: f64) -> RiskRegime {
        if score >= self.cfg.panic_threshold {
            RiskRegime::Panic
        } else if score >= self.cfg.risk_off_threshold {
            RiskRegime::RiskOff
        } else if score <= self.cfg.risk_on_threshold {
            RiskRegime::RiskOn
        } else {
            RiskRegime::Neutral
        }
    }
}

/// Equal-count decile of each date's composite over the full history.
fn global_deciles(series: &[Option<f64>]) -> Vec<Option<u8>> {
    let mut indexed: Vec<(usize, f64)> = series
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i, v)))
        .collect();
    indexed.sort_by(|a, b| a.1.partial_cmp(&b.1).expect("non-finite composite"));

    let n = indexed.len();
    let mut out = vec![None; series.len()];
    for (rank, (idx, _)) in indexed.into_iter().enumerate() {
        out[idx] = Some(rolling::ntile(10, n, rank));
    }
    out
}
