//! Signal Classifier - S0 value and S1 momentum/reversion state machines
//!
//! Two independent classifiers over the same regime/feature inputs. Both are
//! ordered decision tables (predicate, state, reason) evaluated top-down with
//! first-match-wins, so precedence is explicit and testable on its own.
//! Missing required inputs never throw: they produce the defined fallback
//! state (`MISSING` for S0, `NEU` for S1) with a diagnostic reason code.
//!
//! Every output row carries the signal version tag and an as-of timestamp
//! for lineage. The as-of stamp is supplied by the caller so that re-running
//! the engine on the same snapshot reproduces identical rows.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::SignalConfig;
use crate::features::CausalFeatures;
use crate::regime::RegimeRow;
use crate::types::Ticker;

// ---------------------------------------------------------------------
// S0: value signal over bucket pairs
// ---------------------------------------------------------------------

/// S0 value signal states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueState {
    LongSetup,
    Overextended,
    Neutral,
    Missing,
}

impl fmt::Display for ValueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueState::LongSetup => "LONG_SETUP",
            ValueState::Overextended => "OVEREXTENDED",
            ValueState::Neutral => "NEUTRAL",
            ValueState::Missing => "MISSING",
        };
        write!(f, "{s}")
    }
}

/// Why an S0 row did (or did not) qualify as cheap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueReason {
    MissingBuckets,
    BothNotCheap,
    RegimeNotCheap,
    ZscoreNotCheap,
    Ok,
}

impl fmt::Display for ValueReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueReason::MissingBuckets => "missing_buckets",
            ValueReason::BothNotCheap => "both_not_cheap",
            ValueReason::RegimeNotCheap => "regime_not_cheap",
            ValueReason::ZscoreNotCheap => "zscore_not_cheap",
            ValueReason::Ok => "ok",
        };
        write!(f, "{s}")
    }
}

/// S0 classification output for one (ticker, trade date).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueSignalRow {
    pub ticker: Ticker,
    pub trade_date: NaiveDate,
    pub regime_bucket_10: u8,
    pub zscore_bucket_10: Option<u8>,
    pub price_pos_200d: f64,
    pub price_zscore_20d: Option<f64>,
    pub state: ValueState,
    pub reason: ValueReason,
    /// Bounded cheapness score: max(0, (4−regime_bucket) + (4−z_bucket)),
    /// in [0, 6]. `None` exactly when the state is `MISSING`.
    pub core_score: Option<f64>,
    /// `core_score` normalized into [0, 1]
    pub core_score_norm: Option<f64>,
    pub signal_version: String,
    pub asof: DateTime<Utc>,
}

// ---------------------------------------------------------------------
// S1: momentum / reversion signal
// ---------------------------------------------------------------------

/// S1 momentum/reversion states, precedence MOM > REV > NEU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MomRevState {
    Mom,
    Rev,
    Neu,
}

impl fmt::Display for MomRevState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MomRevState::Mom => "MOM",
            MomRevState::Rev => "REV",
            MomRevState::Neu => "NEU",
        };
        write!(f, "{s}")
    }
}

/// S1 reason codes: either the first missing required input (checked in a
/// fixed priority order) or the rule that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MomRevReason {
    MissingPrice,
    MissingMa100,
    MissingVolaZ,
    MissingVolaGate,
    MissingRegimeBucket,
    MissingPriceZscore,
    MomTrendIntactLowVol,
    RevOversoldLowVol,
    NoRuleMatched,
}

impl fmt::Display for MomRevReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MomRevReason::MissingPrice => "missing_price",
            MomRevReason::MissingMa100 => "missing_ma_100",
            MomRevReason::MissingVolaZ => "missing_vola_z20d",
            MomRevReason::MissingVolaGate => "missing_vola_gate",
            MomRevReason::MissingRegimeBucket => "missing_regime_bucket",
            MomRevReason::MissingPriceZscore => "missing_price_zscore",
            MomRevReason::MomTrendIntactLowVol => "mom_trend_intact_low_vol",
            MomRevReason::RevOversoldLowVol => "rev_oversold_low_vol",
            MomRevReason::NoRuleMatched => "no_rule_matched",
        };
        write!(f, "{s}")
    }
}

/// S1 classification output for one (ticker, trade date). Echoes the inputs
/// the decision read, for inspectability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomRevSignalRow {
    pub ticker: Ticker,
    pub trade_date: NaiveDate,
    pub adjusted_close: Option<f64>,
    pub ma_100: Option<f64>,
    pub vola_z20d: Option<f64>,
    pub vola_not_top_20_252d: Option<bool>,
    pub regime_bucket_10: Option<u8>,
    pub price_zscore_20d: Option<f64>,
    pub state: MomRevState,
    pub is_mom: bool,
    pub is_rev: bool,
    pub reason: MomRevReason,
    pub signal_version: String,
    pub asof: DateTime<Utc>,
}

/// Resolved (non-null) S1 inputs after the missing-data check.
struct MomRevInputs {
    price: f64,
    ma_100: f64,
    vola_z20d: f64,
    vola_calm: bool,
    regime_bucket: u8,
    price_zscore: f64,
}

/// One rule of the S1 decision table.
struct MomRevRule {
    state: MomRevState,
    reason: MomRevReason,
    applies: fn(&MomRevInputs, &SignalConfig) -> bool,
}

/// Evaluated top-down; the two predicates are built not to overlap, but the
/// order still defines precedence: MOM beats REV.
const MOM_REV_RULES: &[MomRevRule] = &[
    MomRevRule {
        state: MomRevState::Mom,
        reason: MomRevReason::MomTrendIntactLowVol,
        applies: |inp, cfg| {
            inp.price > inp.ma_100
                && inp.regime_bucket >= cfg.s1_momentum_min_bucket
                && inp.vola_z20d < cfg.s1_vola_z_max
        },
    },
    MomRevRule {
        state: MomRevState::Rev,
        reason: MomRevReason::RevOversoldLowVol,
        applies: |inp, cfg| {
            inp.regime_bucket <= cfg.s1_reversion_max_bucket
                && inp.price_zscore <= cfg.s1_reversion_zscore_max
                && inp.vola_calm
        },
    },
];

/// Signal classifier: pure functions over regime/feature rows plus the
/// lineage stamp applied to every output row.
pub struct SignalClassifier {
    cfg: SignalConfig,
    asof: DateTime<Utc>,
}

impl SignalClassifier {
    pub fn new(cfg: SignalConfig, asof: DateTime<Utc>) -> Self {
        Self { cfg, asof }
    }

    /// S0 value state machine over a classified regime row.
    pub fn classify_value(&self, regime: &RegimeRow) -> ValueSignalRow {
        let rb = regime.regime_bucket_10;
        let (state, reason, score) = match regime.zscore_bucket_10 {
            None => (ValueState::Missing, ValueReason::MissingBuckets, None),
            Some(zb) => {
                let cheap_max = self.cfg.s0_cheap_max_bucket;
                let rich_min = self.cfg.s0_rich_min_bucket;
                let state = if rb <= cheap_max && zb <= cheap_max {
                    ValueState::LongSetup
                } else if rb >= rich_min && zb >= rich_min {
                    ValueState::Overextended
                } else {
                    ValueState::Neutral
                };
                let reason = match (rb <= cheap_max, zb <= cheap_max) {
                    (true, true) => ValueReason::Ok,
                    (false, false) => ValueReason::BothNotCheap,
                    (false, true) => ValueReason::RegimeNotCheap,
                    (true, false) => ValueReason::ZscoreNotCheap,
                };
                let score = ((4.0 - rb as f64) + (4.0 - zb as f64)).max(0.0);
                (state, reason, Some(score))
            }
        };

        ValueSignalRow {
            ticker: regime.ticker.clone(),
            trade_date: regime.trade_date,
            regime_bucket_10: rb,
            zscore_bucket_10: regime.zscore_bucket_10,
            price_pos_200d: regime.price_pos_200d,
            price_zscore_20d: regime.price_zscore_20d,
            state,
            reason,
            core_score: score,
            core_score_norm: score.map(|s| s / 6.0),
            signal_version: self.cfg.version.clone(),
            asof: self.asof,
        }
    }

    /// S1 momentum/reversion state machine. Takes the causal feature set
    /// plus the regime bucket (which may be absent when the 200-row range
    /// was not computable); forward-looking fields are not in the input
    /// type at all.
    pub fn classify_mom_rev(
        &self,
        ticker: &Ticker,
        trade_date: NaiveDate,
        adjusted_close: Option<f64>,
        causal: &CausalFeatures,
        regime_bucket: Option<u8>,
    ) -> MomRevSignalRow {
        let mut row = MomRevSignalRow {
            ticker: ticker.clone(),
            trade_date,
            adjusted_close,
            ma_100: causal.ma_100,
            vola_z20d: causal.vola_z20d,
            vola_not_top_20_252d: causal.vola_not_top_20_252d,
            regime_bucket_10: regime_bucket,
            price_zscore_20d: causal.price_zscore_20d,
            state: MomRevState::Neu,
            is_mom: false,
            is_rev: false,
            reason: MomRevReason::NoRuleMatched,
            signal_version: self.cfg.version.clone(),
            asof: self.asof,
        };

        // Missing-data check, fixed priority order.
        let missing = [
            (adjusted_close.is_none(), MomRevReason::MissingPrice),
            (causal.ma_100.is_none(), MomRevReason::MissingMa100),
            (causal.vola_z20d.is_none(), MomRevReason::MissingVolaZ),
            (
                causal.vola_not_top_20_252d.is_none(),
                MomRevReason::MissingVolaGate,
            ),
            (regime_bucket.is_none(), MomRevReason::MissingRegimeBucket),
            (
                causal.price_zscore_20d.is_none(),
                MomRevReason::MissingPriceZscore,
            ),
        ];
        if let Some((_, reason)) = missing.iter().find(|(is_missing, _)| *is_missing) {
            row.reason = *reason;
            return row;
        }

        let inputs = MomRevInputs {
            price: adjusted_close.expect("checked above"),
            ma_100: causal.ma_100.expect("checked above"),
            vola_z20d: causal.vola_z20d.expect("checked above"),
            vola_calm: causal.vola_not_top_20_252d.expect("checked above"),
            regime_bucket: regime_bucket.expect("checked above"),
            price_zscore: causal.price_zscore_20d.expect("checked above"),
        };

        if let Some(rule) = MOM_REV_RULES
            .iter()
            .find(|rule| (rule.applies)(&inputs, &self.cfg))
        {
            row.state = rule.state;
            row.reason = rule.reason;
        }
        row.is_mom = row.state == MomRevState::Mom;
        row.is_rev = row.state == MomRevState::Rev;
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::RegimeStyle;
    use chrono::TimeZone;

    fn classifier() -> SignalClassifier {
        let asof = Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap();
        SignalClassifier::new(SignalConfig::default(), asof)
    }

    fn regime_row(rb: u8, zb: Option<u8>) -> RegimeRow {
        RegimeRow {
            ticker: Ticker::new("MSFT"),
            trade_date: "2024-05-31".parse().unwrap(),
            adjusted_close: Some(400.0),
            price_pos_200d: 0.25,
            regime_bucket_10: rb,
            price_zscore_20d: Some(-0.5),
            zscore_bucket_10: zb,
            zscore_label_5: None,
            combined_regime_style: RegimeStyle::Neutral,
        }
    }

    fn causal(
        ma_100: Option<f64>,
        vola_z: Option<f64>,
        gate: Option<bool>,
        z: Option<f64>,
    ) -> CausalFeatures {
        CausalFeatures {
            ma_100,
            vola_z20d: vola_z,
            vola_not_top_20_252d: gate,
            price_zscore_20d: z,
            ..Default::default()
        }
    }

    #[test]
    fn test_s0_long_setup_boundary_inclusive() {
        let row = classifier().classify_value(&regime_row(3, Some(3)));
        assert_eq!(row.state, ValueState::LongSetup);
        assert_eq!(row.reason, ValueReason::Ok);
        assert_eq!(row.core_score, Some(2.0));
        assert!((row.core_score_norm.unwrap() - 2.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_s0_bucket_four_not_long_setup() {
        let row = classifier().classify_value(&regime_row(4, Some(3)));
        assert_ne!(row.state, ValueState::LongSetup);
        assert_eq!(row.state, ValueState::Neutral);
        assert_eq!(row.reason, ValueReason::RegimeNotCheap);
    }

    #[test]
    fn test_s0_overextended_and_reason() {
        let row = classifier().classify_value(&regime_row(9, Some(8)));
        assert_eq!(row.state, ValueState::Overextended);
        assert_eq!(row.reason, ValueReason::BothNotCheap);
        // Score floors at zero, never negative.
        assert_eq!(row.core_score, Some(0.0));
    }

    #[test]
    fn test_s0_missing_zscore_bucket() {
        let row = classifier().classify_value(&regime_row(2, None));
        assert_eq!(row.state, ValueState::Missing);
        assert_eq!(row.reason, ValueReason::MissingBuckets);
        assert_eq!(row.core_score, None);
        assert_eq!(row.core_score_norm, None);
    }

    #[test]
    fn test_s0_score_peaks_at_six() {
        let row = classifier().classify_value(&regime_row(1, Some(1)));
        assert_eq!(row.state, ValueState::LongSetup);
        assert_eq!(row.core_score, Some(6.0));
        assert_eq!(row.core_score_norm, Some(1.0));
    }

    #[test]
    fn test_s0_zscore_not_cheap_reason() {
        let row = classifier().classify_value(&regime_row(2, Some(7)));
        assert_eq!(row.state, ValueState::Neutral);
        assert_eq!(row.reason, ValueReason::ZscoreNotCheap);
    }

    #[test]
    fn test_s1_momentum_fires() {
        let c = classifier();
        let row = c.classify_mom_rev(
            &Ticker::new("NVDA"),
            "2024-05-31".parse().unwrap(),
            Some(120.0),
            &causal(Some(100.0), Some(0.3), Some(true), Some(0.2)),
            Some(9),
        );
        assert_eq!(row.state, MomRevState::Mom);
        assert!(row.is_mom && !row.is_rev);
        assert_eq!(row.reason, MomRevReason::MomTrendIntactLowVol);
    }

    #[test]
    fn test_s1_reversion_fires() {
        let c = classifier();
        let row = c.classify_mom_rev(
            &Ticker::new("NVDA"),
            "2024-05-31".parse().unwrap(),
            Some(80.0),
            &causal(Some(100.0), Some(0.3), Some(true), Some(-1.5)),
            Some(2),
        );
        assert_eq!(row.state, MomRevState::Rev);
        assert!(row.is_rev && !row.is_mom);
        assert_eq!(row.reason, MomRevReason::RevOversoldLowVol);
    }

    #[test]
    fn test_s1_precedence_mom_beats_rev() {
        // Synthetic row satisfying both rule bodies at once: price above the
        // trend MA with a top bucket AND an oversold z-score with the calm
        // flag. The table order must resolve it to MOM.
        let cfg = SignalConfig {
            s1_momentum_min_bucket: 1,
            ..SignalConfig::default()
        };
        let asof = Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap();
        let c = SignalClassifier::new(cfg, asof);
        let row = c.classify_mom_rev(
            &Ticker::new("NVDA"),
            "2024-05-31".parse().unwrap(),
            Some(120.0),
            &causal(Some(100.0), Some(0.3), Some(true), Some(-1.5)),
            Some(2),
        );
        assert_eq!(row.state, MomRevState::Mom);
    }

    #[test]
    fn test_s1_vol_gate_blocks_reversion() {
        let c = classifier();
        let row = c.classify_mom_rev(
            &Ticker::new("NVDA"),
            "2024-05-31".parse().unwrap(),
            Some(80.0),
            &causal(Some(100.0), Some(2.0), Some(false), Some(-1.5)),
            Some(2),
        );
        assert_eq!(row.state, MomRevState::Neu);
        assert_eq!(row.reason, MomRevReason::NoRuleMatched);
    }

    #[test]
    fn test_s1_missing_input_priority_order() {
        let c = classifier();
        // Everything missing: price is reported first.
        let row = c.classify_mom_rev(
            &Ticker::new("NVDA"),
            "2024-05-31".parse().unwrap(),
            None,
            &causal(None, None, None, None),
            None,
        );
        assert_eq!(row.state, MomRevState::Neu);
        assert_eq!(row.reason, MomRevReason::MissingPrice);

        // Price present: the trend MA is next in line.
        let row = c.classify_mom_rev(
            &Ticker::new("NVDA"),
            "2024-05-31".parse().unwrap(),
            Some(80.0),
            &causal(None, None, None, None),
            None,
        );
        assert_eq!(row.reason, MomRevReason::MissingMa100);

        // Only the regime bucket missing.
        let row = c.classify_mom_rev(
            &Ticker::new("NVDA"),
            "2024-05-31".parse().unwrap(),
            Some(80.0),
            &causal(Some(100.0), Some(0.1), Some(true), Some(0.0)),
            None,
        );
        assert_eq!(row.reason, MomRevReason::MissingRegimeBucket);
    }

    #[test]
    fn test_signal_rows_carry_lineage() {
        let c = classifier();
        let row = c.classify_value(&regime_row(5, Some(5)));
        assert_eq!(row.signal_version, "core_v3");
        assert_eq!(row.asof.timestamp(), 1717221600);
    }
}
