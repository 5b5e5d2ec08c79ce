//! Regime Classifier - percentile-range and z-score regime bucketing
//!
//! Maps each `FeatureRow` to where its price sits relative to the
//! instrument's own history:
//! - `price_pos_200d`: position inside the trailing 200-row min/max range
//! - `regime_bucket_10`: decile of that position (1 = cheapest, 10 = richest)
//! - `zscore_bucket_10`: equal-count decile of the 20-row price z-score over
//!   the instrument's ENTIRE history (global rank, not trailing — kept for
//!   parity with the warehouse output; see the field docs)
//! - a coarse 5-level z-score label and a combined categorical style
//!
//! Rows whose range bucket cannot be computed are dropped from the output
//! entirely, matching the warehouse fact filter.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::features::rolling;
use crate::features::FeatureRow;
use crate::types::Ticker;

/// Coarse 5-level label over the 20-row price z-score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZscoreLabel {
    DeepOversold,
    Oversold,
    Neutral,
    Overbought,
    ExtremeOverbought,
}

impl ZscoreLabel {
    /// Threshold boundaries at -2, -1, +1, +2.
    pub fn from_zscore(z: f64) -> Self {
        if z < -2.0 {
            ZscoreLabel::DeepOversold
        } else if z < -1.0 {
            ZscoreLabel::Oversold
        } else if z <= 1.0 {
            ZscoreLabel::Neutral
        } else if z <= 2.0 {
            ZscoreLabel::Overbought
        } else {
            ZscoreLabel::ExtremeOverbought
        }
    }
}

impl fmt::Display for ZscoreLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ZscoreLabel::DeepOversold => "deep_oversold",
            ZscoreLabel::Oversold => "oversold",
            ZscoreLabel::Neutral => "neutral",
            ZscoreLabel::Overbought => "overbought",
            ZscoreLabel::ExtremeOverbought => "extreme_overbought",
        };
        write!(f, "{s}")
    }
}

/// Combined categorical style from range bucket × z-score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegimeStyle {
    DeepValue,
    ValueSetup,
    Momentum,
    Overextended,
    Neutral,
}

impl fmt::Display for RegimeStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegimeStyle::DeepValue => "deep_value",
            RegimeStyle::ValueSetup => "value_setup",
            RegimeStyle::Momentum => "momentum",
            RegimeStyle::Overextended => "overextended",
            RegimeStyle::Neutral => "neutral",
        };
        write!(f, "{s}")
    }
}

/// One rule of the style decision table: evaluated top-down, first match
/// wins, `Neutral` is the fall-through.
struct StyleRule {
    style: RegimeStyle,
    applies: fn(bucket: u8, z: f64) -> bool,
}

const STYLE_RULES: &[StyleRule] = &[
    StyleRule {
        style: RegimeStyle::DeepValue,
        applies: |bucket, z| bucket <= 2 && z <= -1.0,
    },
    StyleRule {
        style: RegimeStyle::ValueSetup,
        applies: |bucket, z| bucket <= 3 && z > -1.0 && z < 1.0,
    },
    StyleRule {
        style: RegimeStyle::Momentum,
        applies: |bucket, z| bucket >= 8 && (-0.5..=0.5).contains(&z),
    },
    StyleRule {
        style: RegimeStyle::Overextended,
        applies: |bucket, z| bucket >= 8 && z >= 1.0,
    },
];

fn combined_style(bucket: u8, zscore: Option<f64>) -> RegimeStyle {
    // A null z-score fails every comparison and falls through, SQL-style.
    let Some(z) = zscore else {
        return RegimeStyle::Neutral;
    };
    STYLE_RULES
        .iter()
        .find(|rule| (rule.applies)(bucket, z))
        .map(|rule| rule.style)
        .unwrap_or(RegimeStyle::Neutral)
}

/// Regime classification for one (ticker, trade date).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeRow {
    pub ticker: Ticker,
    pub trade_date: NaiveDate,
    /// Carried through for dashboards joining price onto regimes
    pub adjusted_close: Option<f64>,
    /// Price position inside the trailing 200-row min/max range, in [0, 1]
    pub price_pos_200d: f64,
    /// Decile of `price_pos_200d`: 1 = at the low, 10 = at the high
    pub regime_bucket_10: u8,
    /// 20-row price z-score, carried from the feature row
    pub price_zscore_20d: Option<f64>,
    /// Global-history decile of the z-score. NON-CAUSAL: ranked over the
    /// instrument's complete series including future rows; treat like a
    /// forward return when evaluating point-in-time behavior.
    pub zscore_bucket_10: Option<u8>,
    /// Coarse 5-level z-score label
    pub zscore_label_5: Option<ZscoreLabel>,
    /// Combined style from the bucket × z-score decision table
    pub combined_regime_style: RegimeStyle,
}

/// Classifies feature rows into regime rows. Stateless; one instrument's
/// full feature sequence per call (the global z-score decile ranks within
/// that sequence).
pub struct RegimeClassifier;

impl RegimeClassifier {
    /// Classify one instrument's ordered feature rows. Rows without a
    /// computable range bucket are omitted (hard filter, not null rows).
    pub fn classify(rows: &[FeatureRow]) -> Vec<RegimeRow> {
        let z_buckets = global_zscore_deciles(rows);

        let mut out = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let Some(pos) = price_pos_200d(row) else {
                continue;
            };
            let bucket = position_decile(pos);
            let z = row.causal.price_zscore_20d;

            out.push(RegimeRow {
                ticker: row.ticker.clone(),
                trade_date: row.trade_date,
                adjusted_close: row.adjusted_close,
                price_pos_200d: pos,
                regime_bucket_10: bucket,
                price_zscore_20d: z,
                zscore_bucket_10: z_buckets[i],
                zscore_label_5: z.map(ZscoreLabel::from_zscore),
                combined_regime_style: combined_style(bucket, z),
            });
        }

        if let Some(first) = rows.first() {
            tracing::debug!(
                ticker = %first.ticker,
                input_rows = rows.len(),
                classified_rows = out.len(),
                "regime classification complete"
            );
        }

        out
    }
}

/// Position of price within the trailing 200-row range. `None` when either
/// bound is missing or the range is degenerate.
fn price_pos_200d(row: &FeatureRow) -> Option<f64> {
    let price = row.adjusted_close?;
    let min = row.causal.roll_min_200d?;
    let max = row.causal.roll_max_200d?;
    if max == min {
        return None;
    }
    Some((price - min) / (max - min))
}

/// Decile of a [0, 1] position: floor(pos × 10) + 1, clamped into 1..=10 so
/// a price exactly at the range max lands in bucket 10, not 11.
fn position_decile(pos: f64) -> u8 {
    ((pos * 10.0).floor() as i64 + 1).clamp(1, 10) as u8
}

/// Equal-count decile of each row's z-score over the instrument's entire
/// non-null z-score history, ties broken by input order (stable sort).
fn global_zscore_deciles(rows: &[FeatureRow]) -> Vec<Option<u8>> {
    let mut indexed: Vec<(usize, f64)> = rows
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.causal.price_zscore_20d.map(|z| (i, z)))
        .collect();
    indexed.sort_by(|a, b| a.1.partial_cmp(&b.1).expect("non-finite z-score"));

    let n = indexed.len();
    let mut buckets = vec![None; rows.len()];
    for (rank, (idx, _)) in indexed.into_iter().enumerate() {
        buckets[idx] = Some(rolling::ntile(10, n, rank));
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{CausalFeatures, ForwardReturns};
    use chrono::NaiveDate;

    fn feature_row(day: u64, price: f64, min: f64, max: f64, z: Option<f64>) -> FeatureRow {
        FeatureRow {
            ticker: Ticker::new("NVDA"),
            trade_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(day),
            adjusted_close: Some(price),
            causal: CausalFeatures {
                roll_min_200d: Some(min),
                roll_max_200d: Some(max),
                price_zscore_20d: z,
                ..Default::default()
            },
            forward: ForwardReturns::default(),
        }
    }

    #[test]
    fn test_bucket_bounds_at_range_extremes() {
        // Exactly at the historical minimum: pos 0.0, bucket 1.
        let rows = vec![feature_row(0, 50.0, 50.0, 150.0, Some(0.0))];
        let regimes = RegimeClassifier::classify(&rows);
        assert_eq!(regimes[0].price_pos_200d, 0.0);
        assert_eq!(regimes[0].regime_bucket_10, 1);

        // Exactly at the maximum: pos 1.0 must clamp into bucket 10, not 11.
        let rows = vec![feature_row(0, 150.0, 50.0, 150.0, Some(0.0))];
        let regimes = RegimeClassifier::classify(&rows);
        assert_eq!(regimes[0].price_pos_200d, 1.0);
        assert_eq!(regimes[0].regime_bucket_10, 10);
    }

    #[test]
    fn test_degenerate_range_row_is_dropped() {
        let rows = vec![
            feature_row(0, 100.0, 100.0, 100.0, Some(0.0)),
            feature_row(1, 100.0, 90.0, 110.0, Some(0.0)),
        ];
        let regimes = RegimeClassifier::classify(&rows);
        assert_eq!(regimes.len(), 1);
        assert_eq!(regimes[0].regime_bucket_10, 6);
    }

    #[test]
    fn test_missing_range_row_is_dropped() {
        let mut row = feature_row(0, 100.0, 90.0, 110.0, Some(0.0));
        row.causal.roll_max_200d = None;
        assert!(RegimeClassifier::classify(&[row]).is_empty());
    }

    #[test]
    fn test_global_zscore_deciles_rank_whole_history() {
        // 20 rows with strictly increasing z-scores: two per decile.
        let rows: Vec<FeatureRow> = (0..20)
            .map(|i| feature_row(i, 100.0, 90.0, 110.0, Some(i as f64 / 10.0 - 1.0)))
            .collect();
        let regimes = RegimeClassifier::classify(&rows);
        assert_eq!(regimes[0].zscore_bucket_10, Some(1));
        assert_eq!(regimes[1].zscore_bucket_10, Some(1));
        assert_eq!(regimes[2].zscore_bucket_10, Some(2));
        assert_eq!(regimes[19].zscore_bucket_10, Some(10));
    }

    #[test]
    fn test_zscore_ties_keep_input_order() {
        let rows: Vec<FeatureRow> = (0..10)
            .map(|i| feature_row(i, 100.0, 90.0, 110.0, Some(0.5)))
            .collect();
        let regimes = RegimeClassifier::classify(&rows);
        // All equal: stable sort leaves input order, so deciles ascend.
        let buckets: Vec<u8> = regimes.iter().map(|r| r.zscore_bucket_10.unwrap()).collect();
        assert_eq!(buckets, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn test_null_zscore_rows_keep_null_bucket() {
        let rows = vec![
            feature_row(0, 95.0, 90.0, 110.0, None),
            feature_row(1, 95.0, 90.0, 110.0, Some(0.2)),
        ];
        let regimes = RegimeClassifier::classify(&rows);
        assert_eq!(regimes[0].zscore_bucket_10, None);
        assert_eq!(regimes[0].zscore_label_5, None);
        assert_eq!(regimes[1].zscore_bucket_10, Some(1));
    }

    #[test]
    fn test_zscore_label_boundaries() {
        assert_eq!(ZscoreLabel::from_zscore(-2.5), ZscoreLabel::DeepOversold);
        assert_eq!(ZscoreLabel::from_zscore(-2.0), ZscoreLabel::Oversold);
        assert_eq!(ZscoreLabel::from_zscore(-1.0), ZscoreLabel::Neutral);
        assert_eq!(ZscoreLabel::from_zscore(1.0), ZscoreLabel::Neutral);
        assert_eq!(ZscoreLabel::from_zscore(1.5), ZscoreLabel::Overbought);
        assert_eq!(ZscoreLabel::from_zscore(2.0), ZscoreLabel::Overbought);
        assert_eq!(
            ZscoreLabel::from_zscore(2.1),
            ZscoreLabel::ExtremeOverbought
        );
    }

    #[test]
    fn test_style_table_precedence_and_fallthrough() {
        // bucket 2, z -1: deep_value fires before value_setup could.
        assert_eq!(combined_style(2, Some(-1.0)), RegimeStyle::DeepValue);
        // bucket 3, z 0: cheap but not oversold.
        assert_eq!(combined_style(3, Some(0.0)), RegimeStyle::ValueSetup);
        // bucket 9, z 0.2: rich with tame z-score.
        assert_eq!(combined_style(9, Some(0.2)), RegimeStyle::Momentum);
        // bucket 9, z 1.5: rich and stretched.
        assert_eq!(combined_style(9, Some(1.5)), RegimeStyle::Overextended);
        // bucket 9, z 0.8: between momentum band and overextension.
        assert_eq!(combined_style(9, Some(0.8)), RegimeStyle::Neutral);
        // Null z-score falls through to neutral.
        assert_eq!(combined_style(2, None), RegimeStyle::Neutral);
    }

    #[test]
    fn test_price_pos_midpoint() {
        let rows = vec![feature_row(0, 100.0, 90.0, 110.0, None)];
        let regimes = RegimeClassifier::classify(&rows);
        assert!((regimes[0].price_pos_200d - 0.5).abs() < 1e-12);
        assert_eq!(regimes[0].regime_bucket_10, 6);
    }
}
