//! CSV Persistence Module
//!
//! Reads the engine's input tables and writes its output marts as CSV, plus
//! a JSON run manifest for lineage. Domain rows are converted to flat record
//! structs for serialization; marts are rewritten whole on every run so a
//! re-run on the same snapshot reproduces the files byte for byte.
//!
//! Layout under the data directory:
//!   inputs/prices.csv, inputs/macro.csv,
//!   inputs/news_sentiment.csv, inputs/gdelt_events.csv
//!   marts/*.csv, run_manifest.json

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::features::FeatureRow;
use crate::macro_risk::{MacroObservation, MacroRow};
use crate::pipeline::EngineOutput;
use crate::regime::RegimeRow;
use crate::research::{RegimeOutcomeRow, RiskSummaryRow, SignalOutcomeRow};
use crate::sentiment::{
    GdeltEventRecord, NewsSentimentRecord, SentimentLabel, SentimentRow,
};
use crate::signal::{MomRevSignalRow, ValueSignalRow};
use crate::types::{Bar, Ticker};

// ---------------------------------------------------------------------
// Input records
// ---------------------------------------------------------------------

/// One row of inputs/prices.csv as delivered by the bar normalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarRecord {
    pub ticker: String,
    pub trade_date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adjusted_close: Option<f64>,
    pub volume: Option<f64>,
}

impl From<BarRecord> for Bar {
    fn from(r: BarRecord) -> Self {
        Bar {
            ticker: Ticker::new(r.ticker),
            trade_date: r.trade_date,
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            adjusted_close: r.adjusted_close,
            volume: r.volume,
        }
    }
}

/// One row of inputs/macro.csv: the daily fear & greed constituent feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroInputRecord {
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

impl From<MacroInputRecord> for MacroObservation {
    fn from(r: MacroInputRecord) -> Self {
        MacroObservation {
            trade_date: r.trade_date,
            fear_greed: r.fear_greed,
            momentum_sp500: r.momentum_sp500,
            momentum_sp125: r.momentum_sp125,
            stock_strength: r.stock_strength,
            stock_breadth: r.stock_breadth,
            put_call: r.put_call,
            volatility: r.volatility,
            volatility_50: r.volatility_50,
            safe_haven: r.safe_haven,
            junk_bonds: r.junk_bonds,
        }
    }
}

/// One row of inputs/news_sentiment.csv (FinBERT-scored headlines).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsInputRecord {
    pub ticker: String,
    pub published_at: DateTime<Utc>,
    pub sentiment_score: f64,
    pub sentiment_label: String,
}

/// One row of inputs/gdelt_events.csv.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GdeltInputRecord {
    pub ticker: String,
    pub event_time: DateTime<Utc>,
    pub tone: f64,
}

// ---------------------------------------------------------------------
// Output records
// ---------------------------------------------------------------------

/// Flat feature mart row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub ticker: String,
    pub trade_date: NaiveDate,
    pub adjusted_close: Option<f64>,
    pub ret_1d: Option<f64>,
    pub ret_5d: Option<f64>,
    pub ret_10d: Option<f64>,
    pub ret_20d: Option<f64>,
    pub vola_20d: Option<f64>,
    pub vola_60d: Option<f64>,
    pub roll_min_20d: Option<f64>,
    pub roll_max_20d: Option<f64>,
    pub roll_min_200d: Option<f64>,
    pub roll_max_200d: Option<f64>,
    pub price_zscore_20d: Option<f64>,
    pub atr_14: Option<f64>,
    pub ma_12: Option<f64>,
    pub ma_20: Option<f64>,
    pub ma_26: Option<f64>,
    pub ma_50: Option<f64>,
    pub ma_100: Option<f64>,
    pub ma_200: Option<f64>,
    pub bb_basis: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_lower: Option<f64>,
    pub rsi_14: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub vola_z20d: Option<f64>,
    pub vola_pct80_252d: Option<f64>,
    pub vola_not_top_20_252d: Option<bool>,
    pub fwd_return_1d: Option<f64>,
    pub fwd_return_5d: Option<f64>,
    pub fwd_return_10d: Option<f64>,
    pub fwd_return_20d: Option<f64>,
}

impl From<&FeatureRow> for FeatureRecord {
    fn from(r: &FeatureRow) -> Self {
        let c = &r.causal;
        let f = &r.forward;
        FeatureRecord {
            ticker: r.ticker.to_string(),
            trade_date: r.trade_date,
            adjusted_close: r.adjusted_close,
            ret_1d: c.ret_1d,
            ret_5d: c.ret_5d,
            ret_10d: c.ret_10d,
            ret_20d: c.ret_20d,
            vola_20d: c.vola_20d,
            vola_60d: c.vola_60d,
            roll_min_20d: c.roll_min_20d,
            roll_max_20d: c.roll_max_20d,
            roll_min_200d: c.roll_min_200d,
            roll_max_200d: c.roll_max_200d,
            price_zscore_20d: c.price_zscore_20d,
            atr_14: c.atr_14,
            ma_12: c.ma_12,
            ma_20: c.ma_20,
            ma_26: c.ma_26,
            ma_50: c.ma_50,
            ma_100: c.ma_100,
            ma_200: c.ma_200,
            bb_basis: c.bb_basis,
            bb_upper: c.bb_upper,
            bb_lower: c.bb_lower,
            rsi_14: c.rsi_14,
            macd: c.macd,
            macd_signal: c.macd_signal,
            vola_z20d: c.vola_z20d,
            vola_pct80_252d: c.vola_pct80_252d,
            vola_not_top_20_252d: c.vola_not_top_20_252d,
            fwd_return_1d: f.fwd_return_1d,
            fwd_return_5d: f.fwd_return_5d,
            fwd_return_10d: f.fwd_return_10d,
            fwd_return_20d: f.fwd_return_20d,
        }
    }
}

/// Flat regime mart row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeRecord {
    pub ticker: String,
    pub trade_date: NaiveDate,
    pub adjusted_close: Option<f64>,
    pub price_pos_200d: f64,
    pub regime_bucket_10: u8,
    pub price_zscore_20d: Option<f64>,
    pub zscore_bucket_10: Option<u8>,
    pub zscore_label_5: Option<String>,
    pub combined_regime_style: String,
}

impl From<&RegimeRow> for RegimeRecord {
    fn from(r: &RegimeRow) -> Self {
        RegimeRecord {
            ticker: r.ticker.to_string(),
            trade_date: r.trade_date,
            adjusted_close: r.adjusted_close,
            price_pos_200d: r.price_pos_200d,
            regime_bucket_10: r.regime_bucket_10,
            price_zscore_20d: r.price_zscore_20d,
            zscore_bucket_10: r.zscore_bucket_10,
            zscore_label_5: r.zscore_label_5.map(|l| l.to_string()),
            combined_regime_style: r.combined_regime_style.to_string(),
        }
    }
}

/// Flat S0 mart row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueSignalRecord {
    pub ticker: String,
    pub trade_date: NaiveDate,
    pub regime_bucket_10: u8,
    pub zscore_bucket_10: Option<u8>,
    pub price_pos_200d: f64,
    pub price_zscore_20d: Option<f64>,
    pub core_signal_state: String,
    pub core_signal_reason: String,
    pub core_score: Option<f64>,
    pub core_score_norm: Option<f64>,
    pub signal_version: String,
    pub asof: DateTime<Utc>,
}

impl From<&ValueSignalRow> for ValueSignalRecord {
    fn from(r: &ValueSignalRow) -> Self {
        ValueSignalRecord {
            ticker: r.ticker.to_string(),
            trade_date: r.trade_date,
            regime_bucket_10: r.regime_bucket_10,
            zscore_bucket_10: r.zscore_bucket_10,
            price_pos_200d: r.price_pos_200d,
            price_zscore_20d: r.price_zscore_20d,
            core_signal_state: r.state.to_string(),
            core_signal_reason: r.reason.to_string(),
            core_score: r.core_score,
            core_score_norm: r.core_score_norm,
            signal_version: r.signal_version.clone(),
            asof: r.asof,
        }
    }
}

/// Flat S1 mart row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomRevSignalRecord {
    pub ticker: String,
    pub trade_date: NaiveDate,
    pub adj_close: Option<f64>,
    pub ma_100: Option<f64>,
    pub vola_z20d: Option<f64>,
    pub vola_not_top_20_252d: Option<bool>,
    pub regime_bucket_10: Option<u8>,
    pub price_zscore_20d: Option<f64>,
    pub signal_state: String,
    pub is_mom: bool,
    pub is_rev: bool,
    pub signal_reason: String,
    pub signal_version: String,
    pub asof: DateTime<Utc>,
}

impl From<&MomRevSignalRow> for MomRevSignalRecord {
    fn from(r: &MomRevSignalRow) -> Self {
        MomRevSignalRecord {
            ticker: r.ticker.to_string(),
            trade_date: r.trade_date,
            adj_close: r.adjusted_close,
            ma_100: r.ma_100,
            vola_z20d: r.vola_z20d,
            vola_not_top_20_252d: r.vola_not_top_20_252d,
            regime_bucket_10: r.regime_bucket_10,
            price_zscore_20d: r.price_zscore_20d,
            signal_state: r.state.to_string(),
            is_mom: r.is_mom,
            is_rev: r.is_rev,
            signal_reason: r.reason.to_string(),
            signal_version: r.signal_version.clone(),
            asof: r.asof,
        }
    }
}

/// Flat macro dashboard mart row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroRecord {
    pub trade_date: NaiveDate,
    pub fear_greed: Option<f64>,
    pub fear_greed_z20d: Option<f64>,
    pub fear_greed_z60d: Option<f64>,
    pub volatility: Option<f64>,
    pub volatility_z20d: Option<f64>,
    pub volatility_z60d: Option<f64>,
    pub put_call: Option<f64>,
    pub put_call_z60d: Option<f64>,
    pub safe_haven: Option<f64>,
    pub safe_haven_z60d: Option<f64>,
    pub macro_risk_off_score: Option<f64>,
    pub macro_risk_off_score_20d: Option<f64>,
    pub macro_risk_off_score_smoothed: Option<f64>,
    pub macro_risk_off_score_20d_smoothed: Option<f64>,
    pub fear_greed_z_smoothed: Option<f64>,
    pub volatility_z_smoothed: Option<f64>,
    pub risk_regime_4: Option<String>,
    pub risk_regime_3: Option<String>,
    pub risk_off_decile_10: Option<u8>,
}

impl From<&MacroRow> for MacroRecord {
    fn from(r: &MacroRow) -> Self {
        MacroRecord {
            trade_date: r.trade_date,
            fear_greed: r.fear_greed.value,
            fear_greed_z20d: r.fear_greed.z_20d,
            fear_greed_z60d: r.fear_greed.z_60d,
            volatility: r.volatility.value,
            volatility_z20d: r.volatility.z_20d,
            volatility_z60d: r.volatility.z_60d,
            put_call: r.put_call.value,
            put_call_z60d: r.put_call.z_60d,
            safe_haven: r.safe_haven.value,
            safe_haven_z60d: r.safe_haven.z_60d,
            macro_risk_off_score: r.risk_off_score,
            macro_risk_off_score_20d: r.risk_off_score_20d,
            macro_risk_off_score_smoothed: r.risk_off_score_smoothed,
            macro_risk_off_score_20d_smoothed: r.risk_off_score_20d_smoothed,
            fear_greed_z_smoothed: r.fear_greed_z_smoothed,
            volatility_z_smoothed: r.volatility_z_smoothed,
            risk_regime_4: r.risk_regime_4.map(|x| x.to_string()),
            risk_regime_3: r.risk_regime_3.map(|x| x.to_string()),
            risk_off_decile_10: r.risk_off_decile_10,
        }
    }
}

/// Flat sentiment mart row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentRecord {
    pub ticker: String,
    pub trade_date: NaiveDate,
    pub source: String,
    pub n_obs: u64,
    pub score_mean: Option<f64>,
    pub score_median: Option<f64>,
    pub score_stddev: Option<f64>,
    pub n_positive: Option<u64>,
    pub n_negative: Option<u64>,
    pub n_neutral: Option<u64>,
    pub balance: Option<f64>,
}

impl From<&SentimentRow> for SentimentRecord {
    fn from(r: &SentimentRow) -> Self {
        SentimentRecord {
            ticker: r.ticker.to_string(),
            trade_date: r.trade_date,
            source: r.source.to_string(),
            n_obs: r.n_obs,
            score_mean: r.score_mean,
            score_median: r.score_median,
            score_stddev: r.score_stddev,
            n_positive: r.n_positive,
            n_negative: r.n_negative,
            n_neutral: r.n_neutral,
            balance: r.balance,
        }
    }
}

/// Flat research outcome mart row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalOutcomeRecord {
    pub ticker: String,
    pub classifier: String,
    pub signal_state: String,
    pub horizon_days: u8,
    pub n_obs: u64,
    pub avg_forward_return: Option<f64>,
    pub win_rate: Option<f64>,
}

impl From<&SignalOutcomeRow> for SignalOutcomeRecord {
    fn from(r: &SignalOutcomeRow) -> Self {
        SignalOutcomeRecord {
            ticker: r.ticker.to_string(),
            classifier: r.classifier.clone(),
            signal_state: r.signal_state.clone(),
            horizon_days: r.horizon_days,
            n_obs: r.n_obs,
            avg_forward_return: r.avg_forward_return,
            win_rate: r.win_rate,
        }
    }
}

/// Flat regime summary mart row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeOutcomeRecord {
    pub ticker: String,
    pub regime_bucket_10: u8,
    pub horizon_days: u8,
    pub n_obs: u64,
    pub avg_forward_return: Option<f64>,
    pub win_rate: Option<f64>,
}

impl From<&RegimeOutcomeRow> for RegimeOutcomeRecord {
    fn from(r: &RegimeOutcomeRow) -> Self {
        RegimeOutcomeRecord {
            ticker: r.ticker.to_string(),
            regime_bucket_10: r.regime_bucket_10,
            horizon_days: r.horizon_days,
            n_obs: r.n_obs,
            avg_forward_return: r.avg_forward_return,
            win_rate: r.win_rate,
        }
    }
}

/// Flat risk dashboard mart row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSummaryRecord {
    pub ticker: String,
    pub n_days: u64,
    pub annualized_return: Option<f64>,
    pub annualized_volatility: Option<f64>,
    pub annualized_downside_volatility: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub pct_time_deep_value: Option<f64>,
    pub pct_time_value_setup: Option<f64>,
    pub pct_time_momentum: Option<f64>,
    pub pct_time_overextended: Option<f64>,
    pub pct_time_neutral: Option<f64>,
    pub tracking_error: Option<f64>,
    pub excess_negative_rate: Option<f64>,
}

impl From<&RiskSummaryRow> for RiskSummaryRecord {
    fn from(r: &RiskSummaryRow) -> Self {
        RiskSummaryRecord {
            ticker: r.ticker.to_string(),
            n_days: r.n_days,
            annualized_return: r.annualized_return,
            annualized_volatility: r.annualized_volatility,
            annualized_downside_volatility: r.annualized_downside_volatility,
            max_drawdown: r.max_drawdown,
            pct_time_deep_value: r.pct_time_deep_value,
            pct_time_value_setup: r.pct_time_value_setup,
            pct_time_momentum: r.pct_time_momentum,
            pct_time_overextended: r.pct_time_overextended,
            pct_time_neutral: r.pct_time_neutral,
            tracking_error: r.tracking_error,
            excess_negative_rate: r.excess_negative_rate,
        }
    }
}

/// Lineage record written next to the marts after every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub asof: DateTime<Utc>,
    pub config_digest: String,
    pub feature_rows: u64,
    pub regime_rows: u64,
    pub value_signal_rows: u64,
    pub mom_rev_signal_rows: u64,
    pub macro_rows: u64,
    pub sentiment_rows: u64,
}

// ---------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------

/// CSV-backed input/output store rooted at the configured data directory.
pub struct CsvStore {
    data_dir: PathBuf,
}

impl CsvStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn input_path(&self, name: &str) -> PathBuf {
        self.data_dir.join("inputs").join(name)
    }

    fn mart_path(&self, name: &str) -> PathBuf {
        self.data_dir.join("marts").join(name)
    }

    /// Read the required bar input. Missing file is an error: the engine
    /// has nothing to do without prices.
    pub fn read_bars(&self) -> Result<Vec<Bar>> {
        let records: Vec<BarRecord> = read_csv(&self.input_path("prices.csv"))?;
        Ok(records.into_iter().map(Bar::from).collect())
    }

    /// Read the optional macro feed; absent file yields an empty table.
    pub fn read_macro_observations(&self) -> Result<Vec<MacroObservation>> {
        let path = self.input_path("macro.csv");
        if !path.exists() {
            tracing::warn!(path = %path.display(), "macro input missing, skipping macro marts");
            return Ok(Vec::new());
        }
        let records: Vec<MacroInputRecord> = read_csv(&path)?;
        Ok(records.into_iter().map(MacroObservation::from).collect())
    }

    /// Read the optional news sentiment feed. Rows with an unknown label are
    /// skipped with a warning rather than failing the run.
    pub fn read_news(&self) -> Result<Vec<NewsSentimentRecord>> {
        let path = self.input_path("news_sentiment.csv");
        if !path.exists() {
            tracing::warn!(path = %path.display(), "news input missing, skipping FINBERT rows");
            return Ok(Vec::new());
        }
        let records: Vec<NewsInputRecord> = read_csv(&path)?;
        let mut out = Vec::with_capacity(records.len());
        for rec in records {
            match SentimentLabel::from_str(&rec.sentiment_label) {
                Some(label) => out.push(NewsSentimentRecord {
                    ticker: Ticker::new(rec.ticker),
                    published_at: rec.published_at,
                    sentiment_score: rec.sentiment_score,
                    sentiment_label: label,
                }),
                None => {
                    tracing::warn!(
                        ticker = %rec.ticker,
                        label = %rec.sentiment_label,
                        "unknown sentiment label, skipping row"
                    );
                }
            }
        }
        Ok(out)
    }

    /// Read the optional GDELT event feed; absent file yields an empty table.
    pub fn read_gdelt_events(&self) -> Result<Vec<GdeltEventRecord>> {
        let path = self.input_path("gdelt_events.csv");
        if !path.exists() {
            tracing::warn!(path = %path.display(), "gdelt input missing, skipping GDELT rows");
            return Ok(Vec::new());
        }
        let records: Vec<GdeltInputRecord> = read_csv(&path)?;
        Ok(records
            .into_iter()
            .map(|r| GdeltEventRecord {
                ticker: Ticker::new(r.ticker),
                event_time: r.event_time,
                tone: r.tone,
            })
            .collect())
    }

    /// Write every mart plus the run manifest; returns the manifest.
    pub fn write_all(
        &self,
        output: &EngineOutput,
        config: &AppConfig,
        run_id: &str,
        asof: DateTime<Utc>,
    ) -> Result<RunManifest> {
        if config.persistence.csv_enabled {
            write_csv(
                &self.mart_path("stock_price_features.csv"),
                output.features.iter().map(FeatureRecord::from),
            )?;
            write_csv(
                &self.mart_path("stock_price_regimes.csv"),
                output.regimes.iter().map(RegimeRecord::from),
            )?;
            write_csv(
                &self.mart_path("signal_core_value.csv"),
                output.value_signals.iter().map(ValueSignalRecord::from),
            )?;
            write_csv(
                &self.mart_path("signal_core_momrev.csv"),
                output.mom_rev_signals.iter().map(MomRevSignalRecord::from),
            )?;
            write_csv(
                &self.mart_path("macro_risk_dashboard.csv"),
                output.macro_rows.iter().map(MacroRecord::from),
            )?;
            write_csv(
                &self.mart_path("sentiment_daily.csv"),
                output.sentiment.iter().map(SentimentRecord::from),
            )?;

            if config.persistence.write_research_marts {
                write_csv(
                    &self.mart_path("research_signal_outcomes.csv"),
                    output.signal_outcomes.iter().map(SignalOutcomeRecord::from),
                )?;
                write_csv(
                    &self.mart_path("stock_price_regime_summary.csv"),
                    output.regime_outcomes.iter().map(RegimeOutcomeRecord::from),
                )?;
                write_csv(
                    &self.mart_path("risk_dashboard.csv"),
                    output.risk_summaries.iter().map(RiskSummaryRecord::from),
                )?;
            }
        }

        let manifest = RunManifest {
            run_id: run_id.to_string(),
            asof,
            config_digest: config.digest(),
            feature_rows: output.features.len() as u64,
            regime_rows: output.regimes.len() as u64,
            value_signal_rows: output.value_signals.len() as u64,
            mom_rev_signal_rows: output.mom_rev_signals.len() as u64,
            macro_rows: output.macro_rows.len() as u64,
            sentiment_rows: output.sentiment.len() as u64,
        };
        let manifest_path = self.data_dir.join("run_manifest.json");
        fs::create_dir_all(&self.data_dir).context("Failed to create data directory")?;
        let json = serde_json::to_string_pretty(&manifest)
            .context("Failed to serialize run manifest")?;
        fs::write(&manifest_path, json)
            .with_context(|| format!("Failed to write {}", manifest_path.display()))?;

        tracing::info!(
            run_id = %manifest.run_id,
            feature_rows = manifest.feature_rows,
            regime_rows = manifest.regime_rows,
            "marts written"
        );

        Ok(manifest)
    }
}

fn read_csv<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let row: T =
            result.with_context(|| format!("Failed to parse row in {}", path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

fn write_csv<T: Serialize>(path: &Path, rows: impl Iterator<Item = T>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);
    for row in rows {
        writer
            .serialize(&row)
            .with_context(|| format!("Failed to write row to {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    Ok(())
}
