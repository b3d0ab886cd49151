use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use block_analytics::config::AnalyticsConfig;
use block_analytics::core::monte_carlo::{simulate_async, CancelToken};
use block_analytics::report::print_correlation;
use block_analytics::snapshot::{AnalysisRequest, PerformanceSnapshot};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = AnalyticsConfig::from_env().context("invalid configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("usage: block-analytics <block.json> [strategy...]");
    };
    let strategies: Vec<String> = args.collect();

    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let request: AnalysisRequest =
        serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))?;
    let request = request.with_strategies(strategies).with_config(cfg.clone());
    info!(
        path = %path,
        trades = request.trades.len(),
        daily_logs = request.daily_logs.len(),
        "Loaded block"
    );

    let snapshot = PerformanceSnapshot::build(&request)?;
    snapshot.print_summary();

    let (matrix, analytics) = snapshot.correlation();
    print_correlation(&matrix, &analytics);

    match snapshot.kelly() {
        Ok(kelly) => kelly.print_summary(),
        Err(e) => warn!("Skipping Kelly analysis: {e}"),
    }

    let mut mc_cfg = cfg.monte_carlo.clone();
    if mc_cfg.initial_capital.is_none() && snapshot.initial_capital > 0.0 {
        mc_cfg.initial_capital = Some(snapshot.initial_capital);
    }

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping simulation");
            on_signal.cancel();
        }
    });

    let mut last_decile = 0;
    let result = simulate_async(&snapshot.filtered_trades, &mc_cfg, cancel, |p| {
        let decile = (p.fraction() * 10.0) as usize;
        if decile > last_decile {
            last_decile = decile;
            info!(completed = p.completed, total = p.total, "Simulating");
        }
    })
    .await;

    match result {
        Ok(Some(mc)) => mc.print_summary(),
        Ok(None) => warn!("Monte Carlo produced no result"),
        Err(e) => warn!("Skipping Monte Carlo: {e}"),
    }

    Ok(())
}
