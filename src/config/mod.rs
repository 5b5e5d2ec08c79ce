//! Configuration management for the engine
//!
//! Loads from optional config files + environment variables via .env.
//! Every window length and decision-table cutoff is configurable; the
//! defaults below are the canonical production values.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub universe: UniverseConfig,
    pub features: FeaturesConfig,
    pub signal: SignalConfig,
    pub macro_risk: MacroConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UniverseConfig {
    /// Tickers to compute features/regimes/signals for
    pub tickers: Vec<String>,
    /// Benchmark index ticker for tracking-error fields (optional join)
    pub benchmark: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeaturesConfig {
    /// RSI window
    pub rsi_period: usize,
    /// MACD fast moving average (also published as ma_12)
    pub macd_fast: usize,
    /// MACD slow moving average (also published as ma_26)
    pub macd_slow: usize,
    /// MACD signal line window
    pub macd_signal: usize,
    /// Bollinger/z-score basis window (also published as ma_20)
    pub bb_period: usize,
    /// Bollinger band width in stddevs
    pub bb_stddev_mult: f64,
    /// ATR window
    pub atr_period: usize,
    /// Short volatility window
    pub vola_short_window: usize,
    /// Long volatility window
    pub vola_long_window: usize,
    /// Short rolling min/max window
    pub range_short_window: usize,
    /// Long rolling min/max window (the 200-row regime range)
    pub range_long_window: usize,
    /// Price z-score window
    pub zscore_window: usize,
    /// Trailing distribution window for the vol-of-vol gate (one year of rows)
    pub vol_gate_window: usize,
    /// Percentile cutoff for the "not in top vol" gate
    pub vol_gate_percentile: f64,
    /// Mid trend moving average (published as ma_50)
    pub ma_mid_window: usize,
    /// Trend moving average used by the S1 classifier (published as ma_100)
    pub ma_trend_window: usize,
    /// Long trend moving average (published as ma_200)
    pub ma_long_window: usize,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bb_period: 20,
            bb_stddev_mult: 2.0,
            atr_period: 14,
            vola_short_window: 20,
            vola_long_window: 60,
            range_short_window: 20,
            range_long_window: 200,
            zscore_window: 20,
            vol_gate_window: 252,
            vol_gate_percentile: 0.80,
            ma_mid_window: 50,
            ma_trend_window: 100,
            ma_long_window: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignalConfig {
    /// Version tag stamped on every signal row for lineage
    pub version: String,
    /// S0: both buckets at or below this are "cheap"
    pub s0_cheap_max_bucket: u8,
    /// S0: both buckets at or above this are "rich"
    pub s0_rich_min_bucket: u8,
    /// S1 MOM: minimum regime bucket
    pub s1_momentum_min_bucket: u8,
    /// S1 MOM: volatility z-score must stay below this
    pub s1_vola_z_max: f64,
    /// S1 REV: maximum regime bucket
    pub s1_reversion_max_bucket: u8,
    /// S1 REV: price z-score must be at or below this
    pub s1_reversion_zscore_max: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            version: "core_v3".to_string(),
            s0_cheap_max_bucket: 3,
            s0_rich_min_bucket: 8,
            s1_momentum_min_bucket: 8,
            s1_vola_z_max: 1.0,
            s1_reversion_max_bucket: 3,
            s1_reversion_zscore_max: -1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MacroConfig {
    /// Short rolling window for indicator z-scores
    pub short_window: usize,
    /// Long rolling window for indicator z-scores
    pub long_window: usize,
    /// Smoothing window for display-stable composites
    pub smooth_window: usize,
    /// Composite at or above this is "panic"
    pub panic_threshold: f64,
    /// Composite at or above this is "risk_off"
    pub risk_off_threshold: f64,
    /// Composite at or below this is "risk_on"
    pub risk_on_threshold: f64,
}

impl Default for MacroConfig {
    fn default() -> Self {
        Self {
            short_window: 20,
            long_window: 60,
            smooth_window: 5,
            panic_threshold: 1.5,
            risk_off_threshold: 0.5,
            risk_on_threshold: -0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Data directory for input and output CSVs
    pub data_dir: String,
    /// Enable CSV mart output
    pub csv_enabled: bool,
    /// Also write the research/validation marts (forward-looking)
    pub write_research_marts: bool,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Universe defaults: Mag7 + NASDAQ benchmark
            .set_default(
                "universe.tickers",
                vec!["AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA"],
            )?
            .set_default("universe.benchmark", "^IXIC")?
            // Feature window defaults
            .set_default("features.rsi_period", 14)?
            .set_default("features.macd_fast", 12)?
            .set_default("features.macd_slow", 26)?
            .set_default("features.macd_signal", 9)?
            .set_default("features.bb_period", 20)?
            .set_default("features.bb_stddev_mult", 2.0)?
            .set_default("features.atr_period", 14)?
            .set_default("features.vola_short_window", 20)?
            .set_default("features.vola_long_window", 60)?
            .set_default("features.range_short_window", 20)?
            .set_default("features.range_long_window", 200)?
            .set_default("features.zscore_window", 20)?
            .set_default("features.vol_gate_window", 252)?
            .set_default("features.vol_gate_percentile", 0.80)?
            .set_default("features.ma_mid_window", 50)?
            .set_default("features.ma_trend_window", 100)?
            .set_default("features.ma_long_window", 200)?
            // Signal defaults
            .set_default("signal.version", "core_v3")?
            .set_default("signal.s0_cheap_max_bucket", 3)?
            .set_default("signal.s0_rich_min_bucket", 8)?
            .set_default("signal.s1_momentum_min_bucket", 8)?
            .set_default("signal.s1_vola_z_max", 1.0)?
            .set_default("signal.s1_reversion_max_bucket", 3)?
            .set_default("signal.s1_reversion_zscore_max", -1.0)?
            // Macro defaults
            .set_default("macro_risk.short_window", 20)?
            .set_default("macro_risk.long_window", 60)?
            .set_default("macro_risk.smooth_window", 5)?
            .set_default("macro_risk.panic_threshold", 1.5)?
            .set_default("macro_risk.risk_off_threshold", 0.5)?
            .set_default("macro_risk.risk_on_threshold", -0.5)?
            // Persistence defaults
            .set_default("persistence.data_dir", "./data")?
            .set_default("persistence.csv_enabled", true)?
            .set_default("persistence.write_research_marts", true)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (MAG7_*)
            .add_source(Environment::with_prefix("MAG7").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Generate a digest of the config for logging and the run manifest
    pub fn digest(&self) -> String {
        format!(
            "universe={:?} benchmark={:?} signal_version={} zscore_w={} range_w={} vol_gate_w={}",
            self.universe.tickers,
            self.universe.benchmark,
            self.signal.version,
            self.features.zscore_window,
            self.features.range_long_window,
            self.features.vol_gate_window,
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_defaults_match_production_windows() {
        let cfg = FeaturesConfig::default();
        assert_eq!(cfg.zscore_window, 20);
        assert_eq!(cfg.range_long_window, 200);
        assert_eq!(cfg.vol_gate_window, 252);
        assert!((cfg.vol_gate_percentile - 0.80).abs() < 1e-12);
    }

    #[test]
    fn test_signal_defaults() {
        let cfg = SignalConfig::default();
        assert_eq!(cfg.s0_cheap_max_bucket, 3);
        assert_eq!(cfg.s0_rich_min_bucket, 8);
        assert!((cfg.s1_reversion_zscore_max + 1.0).abs() < 1e-12);
    }
}
