//! Feature Computer - rolling technical features per (ticker, trade date)
//!
//! Turns one instrument's ordered daily bars into one `FeatureRow` per bar:
//! - Returns over 1/5/10/20 rows
//! - Rolling volatility (sample stddev of 1-row returns) over 20/60 rows
//! - Rolling min/max over 20/200 rows
//! - Price z-score over 20 rows
//! - ATR-14 (simple mean of true range, not exponential)
//! - Moving averages 12/20/26/50/100/200
//! - Bollinger bands (MA-20 basis, ±2 stddev)
//! - RSI-14 (simple averages, not Wilder's smoothing)
//! - SMA MACD proxy (MA-12 − MA-26) with a 9-row signal line
//! - Volatility-of-volatility gate over a trailing 252-row window
//! - Forward returns at 1/5/10/20 rows (research-only, non-causal)
//!
//! All windows are row-count based over the instrument's own sequence.
//! Insufficient history and degenerate denominators yield `None`, never an
//! error or an infinity.

pub mod rolling;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::FeaturesConfig;
use crate::types::{validate_bars, Bar, EngineError, Ticker};

/// Backward-looking features: everything here depends only on rows at or
/// before the row it belongs to. This is the only feature surface the
/// regime and signal classifiers are allowed to consume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CausalFeatures {
    // Returns over trailing rows
    pub ret_1d: Option<f64>,
    pub ret_5d: Option<f64>,
    pub ret_10d: Option<f64>,
    pub ret_20d: Option<f64>,

    // Rolling volatility of 1-row returns
    pub vola_20d: Option<f64>,
    pub vola_60d: Option<f64>,

    // Rolling price range
    pub roll_min_20d: Option<f64>,
    pub roll_max_20d: Option<f64>,
    pub roll_min_200d: Option<f64>,
    pub roll_max_200d: Option<f64>,

    /// (price − mean20) / stddev20, null when the stddev degenerates
    pub price_zscore_20d: Option<f64>,

    /// Simple 14-row mean of true range
    pub atr_14: Option<f64>,

    // Moving averages of adjusted close
    pub ma_12: Option<f64>,
    pub ma_20: Option<f64>,
    pub ma_26: Option<f64>,
    pub ma_50: Option<f64>,
    pub ma_100: Option<f64>,
    pub ma_200: Option<f64>,

    // Bollinger bands around MA-20
    pub bb_basis: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_lower: Option<f64>,

    pub rsi_14: Option<f64>,

    /// SMA MACD proxy: MA-12 − MA-26
    pub macd: Option<f64>,
    /// 9-row rolling mean of the MACD proxy
    pub macd_signal: Option<f64>,

    /// Z-score of `vola_20d` within its trailing 252-row distribution
    pub vola_z20d: Option<f64>,
    /// 80th percentile of the same trailing distribution
    pub vola_pct80_252d: Option<f64>,
    /// True when current volatility is not in the top 20% of its trailing year
    pub vola_not_top_20_252d: Option<bool>,
}

/// Forward-looking returns. Research-only: they require future rows and must
/// never feed a live classifier; keeping them in their own struct means a
/// classifier input type cannot name them by accident.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForwardReturns {
    pub fwd_return_1d: Option<f64>,
    pub fwd_return_5d: Option<f64>,
    pub fwd_return_10d: Option<f64>,
    pub fwd_return_20d: Option<f64>,
}

/// One row per bar: the bar's identity, its adjusted close, the causal
/// feature set and the segregated forward-return set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRow {
    pub ticker: Ticker,
    pub trade_date: NaiveDate,
    /// Carried through for classifiers that compare price to a moving average
    pub adjusted_close: Option<f64>,
    pub causal: CausalFeatures,
    pub forward: ForwardReturns,
}

/// Feature computer over one instrument's ordered bar sequence.
pub struct FeatureComputer {
    cfg: FeaturesConfig,
}

impl FeatureComputer {
    pub fn new(cfg: FeaturesConfig) -> Self {
        Self { cfg }
    }

    /// Compute one `FeatureRow` per bar. Bars must be one instrument's
    /// sequence, ascending by trade date, deduplicated.
    pub fn compute(&self, bars: &[Bar]) -> Result<Vec<FeatureRow>, EngineError> {
        validate_bars(bars)?;
        if bars.is_empty() {
            return Ok(Vec::new());
        }

        let n = bars.len();
        let adj: Vec<Option<f64>> = bars.iter().map(|b| b.adjusted_close).collect();

        // 1-row returns, the base series for volatility and RSI.
        let ret_1: Vec<Option<f64>> = (0..n).map(|i| return_at(&adj, i, 1)).collect();

        // True range needs the previous close, so the first row has none.
        let tr: Vec<Option<f64>> = (0..n)
            .map(|i| {
                if i == 0 {
                    return None;
                }
                let prev_close = bars[i - 1].close;
                let b = &bars[i];
                Some(
                    (b.high - b.low)
                        .max((b.high - prev_close).abs())
                        .max((b.low - prev_close).abs()),
                )
            })
            .collect();

        // First pass: everything except the vol-of-vol gate and MACD signal,
        // which need completed series.
        let vola_20: Vec<Option<f64>> = (0..n)
            .map(|i| {
                rolling::trailing_nonnull(&ret_1, i, self.cfg.vola_short_window)
                    .and_then(|w| rolling::sample_stddev(&w))
            })
            .collect();

        let macd: Vec<Option<f64>> = (0..n)
            .map(|i| {
                let ma_fast = window_mean(&adj, i, self.cfg.macd_fast)?;
                let ma_slow = window_mean(&adj, i, self.cfg.macd_slow)?;
                Some(ma_fast - ma_slow)
            })
            .collect();

        let mut rows = Vec::with_capacity(n);
        for i in 0..n {
            let bar = &bars[i];
            let mut causal = CausalFeatures {
                ret_1d: ret_1[i],
                ret_5d: return_at(&adj, i, 5),
                ret_10d: return_at(&adj, i, 10),
                ret_20d: return_at(&adj, i, 20),
                vola_20d: vola_20[i],
                vola_60d: rolling::trailing_nonnull(&ret_1, i, self.cfg.vola_long_window)
                    .and_then(|w| rolling::sample_stddev(&w)),
                roll_min_20d: window_min(&adj, i, self.cfg.range_short_window),
                roll_max_20d: window_max(&adj, i, self.cfg.range_short_window),
                roll_min_200d: window_min(&adj, i, self.cfg.range_long_window),
                roll_max_200d: window_max(&adj, i, self.cfg.range_long_window),
                atr_14: rolling::trailing_nonnull(&tr, i, self.cfg.atr_period)
                    .and_then(|w| rolling::mean(&w)),
                ma_12: window_mean(&adj, i, self.cfg.macd_fast),
                ma_20: window_mean(&adj, i, self.cfg.bb_period),
                ma_26: window_mean(&adj, i, self.cfg.macd_slow),
                ma_50: window_mean(&adj, i, self.cfg.ma_mid_window),
                ma_100: window_mean(&adj, i, self.cfg.ma_trend_window),
                ma_200: window_mean(&adj, i, self.cfg.ma_long_window),
                rsi_14: self.compute_rsi(&ret_1, i),
                macd: macd[i],
                // The signal line waits for nine actual MACD values; a null
                // inside the window is missing history, not a data gap.
                macd_signal: rolling::trailing_complete(&macd, i, self.cfg.macd_signal)
                    .and_then(|w| rolling::mean(&w)),
                ..Default::default()
            };

            // Price z-score over the 20-row window.
            causal.price_zscore_20d = self.compute_price_zscore(&adj, i);

            // Bollinger: MA-20 basis ± k × 20-row stddev of price.
            if let Some(basis) = causal.ma_20 {
                let std = rolling::trailing_nonnull(&adj, i, self.cfg.bb_period)
                    .and_then(|w| rolling::sample_stddev(&w));
                if let Some(std) = std {
                    causal.bb_basis = Some(basis);
                    causal.bb_upper = Some(basis + self.cfg.bb_stddev_mult * std);
                    causal.bb_lower = Some(basis - self.cfg.bb_stddev_mult * std);
                }
            }

            // Vol-of-vol gate: z-score and 80th percentile of the 20-row
            // volatility within its trailing-year distribution. The long
            // window fills from whatever history exists, warehouse-style.
            let vol_dist =
                rolling::trailing_nonnull_partial(&vola_20, i, self.cfg.vol_gate_window);
            if let Some(v) = vola_20[i] {
                if let (Some(m), Some(s)) =
                    (rolling::mean(&vol_dist), rolling::sample_stddev(&vol_dist))
                {
                    causal.vola_z20d = rolling::zscore(v, m, s);
                }
                causal.vola_pct80_252d =
                    rolling::percentile_cont(&vol_dist, self.cfg.vol_gate_percentile);
                causal.vola_not_top_20_252d = causal.vola_pct80_252d.map(|p80| v <= p80);
            }

            let forward = ForwardReturns {
                fwd_return_1d: forward_return_at(&adj, i, 1),
                fwd_return_5d: forward_return_at(&adj, i, 5),
                fwd_return_10d: forward_return_at(&adj, i, 10),
                fwd_return_20d: forward_return_at(&adj, i, 20),
            };

            rows.push(FeatureRow {
                ticker: bar.ticker.clone(),
                trade_date: bar.trade_date,
                adjusted_close: bar.adjusted_close,
                causal,
                forward,
            });
        }

        tracing::debug!(
            ticker = %bars[0].ticker,
            rows = rows.len(),
            with_zscore = rows.iter().filter(|r| r.causal.price_zscore_20d.is_some()).count(),
            with_range_200d = rows.iter().filter(|r| r.causal.roll_max_200d.is_some()).count(),
            "feature computation complete"
        );

        Ok(rows)
    }

    /// RSI over simple trailing averages: avg gain / avg loss of 1-row
    /// returns in the 14-row window. Division is guarded: an all-gain or
    /// flat window has no defined RSI here.
    fn compute_rsi(&self, ret_1: &[Option<f64>], idx: usize) -> Option<f64> {
        let window = rolling::trailing_nonnull(ret_1, idx, self.cfg.rsi_period)?;
        if window.is_empty() {
            return None;
        }
        let avg_gain = window.iter().map(|r| r.max(0.0)).sum::<f64>() / window.len() as f64;
        let avg_loss = window.iter().map(|r| (-r).max(0.0)).sum::<f64>() / window.len() as f64;
        if avg_loss <= 0.0 {
            return None;
        }
        Some(100.0 - 100.0 / (1.0 + avg_gain / avg_loss))
    }

    fn compute_price_zscore(&self, adj: &[Option<f64>], idx: usize) -> Option<f64> {
        let price = adj[idx]?;
        let window = rolling::trailing_nonnull(adj, idx, self.cfg.zscore_window)?;
        let m = rolling::mean(&window)?;
        let s = rolling::sample_stddev(&window)?;
        rolling::zscore(price, m, s)
    }
}

/// Return over `h` trailing rows: (p[n] − p[n−h]) / p[n−h]. `None` when the
/// lookback row does not exist, either price is null, or the denominator is
/// zero.
fn return_at(adj: &[Option<f64>], idx: usize, h: usize) -> Option<f64> {
    if idx < h {
        return None;
    }
    let base = adj[idx - h]?;
    let cur = adj[idx]?;
    if base == 0.0 {
        return None;
    }
    Some((cur - base) / base)
}

/// Forward return `h` rows ahead: (p[n+h] − p[n]) / p[n]. Research-only.
fn forward_return_at(adj: &[Option<f64>], idx: usize, h: usize) -> Option<f64> {
    let target = adj.get(idx + h).copied().flatten()?;
    let base = adj[idx]?;
    if base == 0.0 {
        return None;
    }
    Some((target - base) / base)
}

fn window_mean(adj: &[Option<f64>], idx: usize, len: usize) -> Option<f64> {
    rolling::trailing_nonnull(adj, idx, len).and_then(|w| rolling::mean(&w))
}

fn window_min(adj: &[Option<f64>], idx: usize, len: usize) -> Option<f64> {
    rolling::trailing_nonnull(adj, idx, len).and_then(|w| rolling::min(&w))
}

fn window_max(adj: &[Option<f64>], idx: usize, len: usize) -> Option<f64> {
    rolling::trailing_nonnull(adj, idx, len).and_then(|w| rolling::max(&w))
}
