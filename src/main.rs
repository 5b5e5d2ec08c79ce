//! Mag7 Intel batch entrypoint
//!
//! Loads configuration, reads the input tables from the data directory,
//! runs the engine and writes the output marts plus a run manifest.

use anyhow::Result;
use chrono::Utc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use mag7_intel::config::AppConfig;
use mag7_intel::persistence::CsvStore;
use mag7_intel::pipeline::{Engine, EngineInput};
use mag7_intel::types::Ticker;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    info!(config = %config.digest(), "configuration loaded");

    let store = CsvStore::new(&config.persistence.data_dir);

    // The universe filter keeps configured tickers plus the benchmark;
    // anything else in the price file is someone else's problem.
    let mut universe: Vec<Ticker> = config
        .universe
        .tickers
        .iter()
        .map(|t| Ticker::new(t.clone()))
        .collect();
    if let Some(bench) = &config.universe.benchmark {
        universe.push(Ticker::new(bench.clone()));
    }

    let bars: Vec<_> = store
        .read_bars()?
        .into_iter()
        .filter(|b| universe.contains(&b.ticker))
        .collect();

    let input = EngineInput {
        bars,
        macro_observations: store.read_macro_observations()?,
        news: store.read_news()?,
        events: store.read_gdelt_events()?,
    };

    let asof = Utc::now();
    let run_id = Uuid::new_v4().to_string();
    info!(run_id = %run_id, bar_rows = input.bars.len(), "starting engine run");

    let output = Engine::new(config.clone()).run(input, asof).await?;
    let manifest = store.write_all(&output, &config, &run_id, asof)?;

    info!(
        run_id = %manifest.run_id,
        feature_rows = manifest.feature_rows,
        regime_rows = manifest.regime_rows,
        value_signal_rows = manifest.value_signal_rows,
        mom_rev_signal_rows = manifest.mom_rev_signal_rows,
        macro_rows = manifest.macro_rows,
        sentiment_rows = manifest.sentiment_rows,
        "run complete"
    );

    Ok(())
}
