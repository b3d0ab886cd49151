//! Bootstrap resampling of historical trade outcomes.
//!
//! A [`Simulation`] owns its population and RNG and advances one run at a time, so the
//! same seeded simulation produces identical results whether it is driven as an
//! iterator, through [`simulate_with_progress`], or from async code.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::MonteCarloConfig;
use crate::core::equity_curve::{infer_starting_capital, EquityCurve};
use crate::core::returns::{mean, percentile_sorted, std_dev};
use crate::error::{AnalyticsError, Result};
use crate::models::Trade;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleBasis {
    /// Each trade's P/L relative to account equity before it; samples compound.
    Percentage,
    /// Dollar P/L scaled by initial capital; samples add up.
    Pl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueAtRisk {
    pub p1: f64,
    pub p5: f64,
    pub p10: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationStatistics {
    pub mean_total_return: f64,
    pub median_total_return: f64,
    pub std_dev_total_return: f64,
    pub probability_of_profit: f64,
    pub value_at_risk: ValueAtRisk,
    /// 95th percentile of per-run max drawdown.
    pub median_max_drawdown: f64,
    /// Mean final return at or below the `1 - confidence_level` percentile.
    pub expected_shortfall: f64,
    /// Share of runs whose max drawdown reached `drawdown_threshold`.
    pub drawdown_breach_probability: f64,
    pub annualized_return: f64,
    pub best_case_return: f64,
}

/// Cumulative return per simulated step at each percentile across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileBands {
    pub p5: Vec<f64>,
    pub p25: Vec<f64>,
    pub p50: Vec<f64>,
    pub p75: Vec<f64>,
    pub p95: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub parameters: MonteCarloConfig,
    pub initial_capital: f64,
    pub population_size: usize,
    pub runs_completed: usize,
    pub statistics: SimulationStatistics,
    pub percentiles: PercentileBands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationProgress {
    pub completed: usize,
    pub total: usize,
}

impl SimulationProgress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// Cooperative cancellation flag, checked between runs.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An in-progress Monte Carlo simulation.
///
/// Iterating yields a [`SimulationProgress`] every `progress_interval` runs until all runs
/// are done; the sequence cannot be restarted.
pub struct Simulation {
    config: MonteCarloConfig,
    basis: ResampleBasis,
    initial_capital: f64,
    population: Vec<f64>,
    rng: StdRng,
    interval: usize,
    completed: usize,
    // step_values[step][run]
    step_values: Vec<Vec<f64>>,
    final_returns: Vec<f64>,
    max_drawdowns: Vec<f64>,
}

impl Simulation {
    pub fn new(trades: &[Trade], config: &MonteCarloConfig) -> Result<Self> {
        config.validate()?;

        let valid: Vec<Trade> = trades
            .iter()
            .filter(|t| t.defect().is_none())
            .cloned()
            .collect();
        let initial_capital = config
            .initial_capital
            .unwrap_or_else(|| infer_starting_capital(&valid));

        let population = match config.resample_basis {
            ResampleBasis::Percentage if initial_capital > 0.0 => {
                percentage_population(&valid, initial_capital)
            }
            ResampleBasis::Percentage => {
                warn!("No positive starting capital; nothing to resample");
                Vec::new()
            }
            ResampleBasis::Pl => {
                if initial_capital <= 0.0 {
                    return Err(AnalyticsError::invalid(
                        "initial_capital",
                        "P/L resampling needs a positive initial capital; none could be inferred",
                    ));
                }
                valid.iter().map(|t| t.pl / initial_capital).collect()
            }
        };

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        info!(
            simulations = config.num_simulations,
            length = config.simulation_length,
            population = population.len(),
            basis = ?config.resample_basis,
            "Starting Monte Carlo simulation"
        );

        Ok(Self {
            basis: config.resample_basis,
            interval: config.effective_progress_interval(),
            step_values: vec![Vec::with_capacity(config.num_simulations); config.simulation_length],
            final_returns: Vec::with_capacity(config.num_simulations),
            max_drawdowns: Vec::with_capacity(config.num_simulations),
            config: config.clone(),
            initial_capital,
            population,
            rng,
            completed: 0,
        })
    }

    pub fn total(&self) -> usize {
        if self.population.is_empty() {
            0
        } else {
            self.config.num_simulations
        }
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn is_done(&self) -> bool {
        self.completed >= self.total()
    }

    pub fn progress(&self) -> SimulationProgress {
        SimulationProgress {
            completed: self.completed,
            total: self.total(),
        }
    }

    /// Runs a single path. Returns false once every run has completed.
    pub fn run_next(&mut self) -> bool {
        if self.is_done() {
            return false;
        }

        let mut equity = 1.0f64;
        let mut peak = 1.0f64;
        let mut max_dd = 0.0f64;
        for step in 0..self.config.simulation_length {
            if equity > 0.0 {
                let sample = self.population[self.rng.gen_range(0..self.population.len())];
                equity = match self.basis {
                    ResampleBasis::Percentage => equity * (1.0 + sample),
                    ResampleBasis::Pl => equity + sample,
                };
                // a ruined account stays ruined
                equity = equity.max(0.0);
            }
            peak = peak.max(equity);
            max_dd = max_dd.max((peak - equity) / peak);
            self.step_values[step].push(equity - 1.0);
        }

        self.final_returns.push(equity - 1.0);
        self.max_drawdowns.push(max_dd);
        self.completed += 1;
        true
    }

    /// Aggregates the completed runs. `None` when nothing has run.
    pub fn finish(self) -> Option<MonteCarloResult> {
        if self.completed == 0 {
            return None;
        }

        let mut finals = self.final_returns;
        finals.sort_by(f64::total_cmp);
        let mut drawdowns = self.max_drawdowns;
        drawdowns.sort_by(f64::total_cmp);
        let runs = finals.len() as f64;

        let percentiles = percentile_bands(self.step_values);

        let mean_total_return = mean(&finals);
        let tail_cutoff = percentile_sorted(&finals, (1.0 - self.config.confidence_level) * 100.0);
        let tail: Vec<f64> = finals.iter().copied().filter(|r| *r <= tail_cutoff).collect();

        let years = self.config.simulation_length as f64 / self.config.trades_per_year;
        let annualized_return = if years > 0.0 && 1.0 + mean_total_return > 0.0 {
            (1.0 + mean_total_return).powf(1.0 / years) - 1.0
        } else {
            mean_total_return
        };

        let statistics = SimulationStatistics {
            mean_total_return,
            median_total_return: percentile_sorted(&finals, 50.0),
            std_dev_total_return: std_dev(&finals),
            probability_of_profit: finals.iter().filter(|r| **r > 0.0).count() as f64 / runs,
            value_at_risk: ValueAtRisk {
                p1: percentile_sorted(&finals, 1.0),
                p5: percentile_sorted(&finals, 5.0),
                p10: percentile_sorted(&finals, 10.0),
            },
            median_max_drawdown: percentile_sorted(&drawdowns, 95.0),
            expected_shortfall: mean(&tail),
            drawdown_breach_probability: drawdowns
                .iter()
                .filter(|d| **d >= self.config.drawdown_threshold)
                .count() as f64
                / runs,
            annualized_return,
            best_case_return: percentiles.p95.last().copied().unwrap_or(0.0),
        };

        Some(MonteCarloResult {
            parameters: self.config,
            initial_capital: self.initial_capital,
            population_size: self.population.len(),
            runs_completed: self.completed,
            statistics,
            percentiles,
        })
    }
}

impl Iterator for Simulation {
    type Item = SimulationProgress;

    fn next(&mut self) -> Option<SimulationProgress> {
        if self.is_done() {
            return None;
        }
        for _ in 0..self.interval {
            if !self.run_next() {
                break;
            }
        }
        debug!(completed = self.completed, total = self.total(), "Monte Carlo progress");
        Some(self.progress())
    }
}

/// Runs the full simulation. `Ok(None)` when there are no usable trades to resample.
pub fn simulate(trades: &[Trade], config: &MonteCarloConfig) -> Result<Option<MonteCarloResult>> {
    let mut sim = Simulation::new(trades, config)?;
    while sim.run_next() {}
    Ok(sim.finish())
}

/// Runs the simulation, handing each progress record to `on_progress`.
///
/// Returning `ControlFlow::Break` stops before the next run and yields `Ok(None)`.
pub fn simulate_with_progress<F>(
    trades: &[Trade],
    config: &MonteCarloConfig,
    mut on_progress: F,
) -> Result<Option<MonteCarloResult>>
where
    F: FnMut(SimulationProgress) -> ControlFlow<()>,
{
    let mut sim = Simulation::new(trades, config)?;
    while let Some(progress) = sim.next() {
        if on_progress(progress).is_break() {
            info!(completed = progress.completed, "Monte Carlo simulation cancelled");
            return Ok(None);
        }
    }
    Ok(sim.finish())
}

/// Async variant that yields to the runtime after every progress interval.
///
/// `cancel` is checked before each run; once set the call returns `Ok(None)`.
pub async fn simulate_async<F>(
    trades: &[Trade],
    config: &MonteCarloConfig,
    cancel: CancelToken,
    mut on_progress: F,
) -> Result<Option<MonteCarloResult>>
where
    F: FnMut(SimulationProgress),
{
    let mut sim = Simulation::new(trades, config)?;
    let interval = config.effective_progress_interval();

    loop {
        if cancel.is_cancelled() {
            info!(completed = sim.completed(), "Monte Carlo simulation cancelled");
            return Ok(None);
        }
        if !sim.run_next() {
            break;
        }
        if sim.completed() % interval == 0 || sim.is_done() {
            on_progress(sim.progress());
            tokio::task::yield_now().await;
        }
    }
    Ok(sim.finish())
}

/// Per-trade return on the equity the account held right before the trade.
fn percentage_population(trades: &[Trade], initial_capital: f64) -> Vec<f64> {
    let curve = EquityCurve::from_trades(trades, Some(initial_capital));
    let mut before = curve.starting_capital;
    let mut out = Vec::with_capacity(curve.points.len());
    for p in &curve.points {
        if before > 0.0 {
            out.push((p.equity - before) / before);
        }
        before = p.equity;
    }
    out
}

fn percentile_bands(step_values: Vec<Vec<f64>>) -> PercentileBands {
    let steps = step_values.len();
    let mut bands = PercentileBands {
        p5: Vec::with_capacity(steps),
        p25: Vec::with_capacity(steps),
        p50: Vec::with_capacity(steps),
        p75: Vec::with_capacity(steps),
        p95: Vec::with_capacity(steps),
    };
    for mut column in step_values {
        column.sort_by(f64::total_cmp);
        bands.p5.push(percentile_sorted(&column, 5.0));
        bands.p25.push(percentile_sorted(&column, 25.0));
        bands.p50.push(percentile_sorted(&column, 50.0));
        bands.p75.push(percentile_sorted(&column, 75.0));
        bands.p95.push(percentile_sorted(&column, 95.0));
    }
    bands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{mixed_trades, trade};

    fn seeded(seed: u64) -> MonteCarloConfig {
        MonteCarloConfig {
            num_simulations: 200,
            simulation_length: 50,
            trades_per_year: 100.0,
            seed: Some(seed),
            ..MonteCarloConfig::default()
        }
    }

    #[test]
    fn same_seed_is_reproducible() {
        let trades = mixed_trades();
        let a = simulate(&trades, &seeded(42)).unwrap().unwrap();
        let b = simulate(&trades, &seeded(42)).unwrap().unwrap();
        assert_eq!(a.percentiles, b.percentiles);
        assert_eq!(a.statistics, b.statistics);

        let c = simulate(&trades, &seeded(7)).unwrap().unwrap();
        assert_ne!(a.percentiles, c.percentiles);
    }

    #[test]
    fn bands_are_ordered_at_every_step() {
        let result = simulate(&mixed_trades(), &seeded(1)).unwrap().unwrap();
        let p = &result.percentiles;
        assert_eq!(p.p50.len(), 50);
        for i in 0..p.p50.len() {
            assert!(p.p5[i] <= p.p25[i]);
            assert!(p.p25[i] <= p.p50[i]);
            assert!(p.p50[i] <= p.p75[i]);
            assert!(p.p75[i] <= p.p95[i]);
        }
        assert_eq!(result.statistics.best_case_return, *p.p95.last().unwrap());
    }

    #[test]
    fn statistics_are_bounded() {
        let result = simulate(&mixed_trades(), &seeded(3)).unwrap().unwrap();
        let s = &result.statistics;
        assert!((0.0..=1.0).contains(&s.probability_of_profit));
        assert!((0.0..=1.0).contains(&s.drawdown_breach_probability));
        assert!(s.median_max_drawdown >= 0.0);
        assert!(s.value_at_risk.p1 <= s.value_at_risk.p5);
        assert!(s.value_at_risk.p5 <= s.value_at_risk.p10);
        assert!(s.expected_shortfall <= s.value_at_risk.p10);
        assert_eq!(result.runs_completed, 200);
    }

    #[test]
    fn all_winning_trades_always_profit() {
        let trades: Vec<Trade> = mixed_trades().into_iter().filter(|t| t.pl > 0.0).collect();
        let result = simulate(&trades, &seeded(9)).unwrap().unwrap();
        assert_eq!(result.statistics.probability_of_profit, 1.0);
        assert_eq!(result.statistics.median_max_drawdown, 0.0);
    }

    #[test]
    fn iterator_and_callback_match_plain_loop() {
        let trades = mixed_trades();
        let cfg = MonteCarloConfig {
            progress_interval: 30,
            ..seeded(11)
        };
        let plain = simulate(&trades, &cfg).unwrap().unwrap();

        let mut sim = Simulation::new(&trades, &cfg).unwrap();
        let records: Vec<SimulationProgress> = sim.by_ref().collect();
        assert_eq!(records.len(), 7);
        assert_eq!(records.last().unwrap().completed, 200);
        assert!(sim.next().is_none());
        assert_eq!(sim.finish().unwrap(), plain);

        let mut calls = 0;
        let via_callback = simulate_with_progress(&trades, &cfg, |_| {
            calls += 1;
            ControlFlow::Continue(())
        })
        .unwrap()
        .unwrap();
        assert_eq!(calls, 7);
        assert_eq!(via_callback, plain);
    }

    #[test]
    fn break_cancels_between_runs() {
        let result = simulate_with_progress(&mixed_trades(), &seeded(5), |p| {
            if p.completed >= 20 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn empty_population_is_no_data() {
        assert!(simulate(&[], &seeded(1)).unwrap().is_none());
    }

    #[test]
    fn invalid_config_fails_before_running() {
        let cfg = MonteCarloConfig {
            num_simulations: 0,
            ..seeded(1)
        };
        assert!(simulate(&mixed_trades(), &cfg).is_err());

        let pl_without_capital = MonteCarloConfig {
            resample_basis: ResampleBasis::Pl,
            ..seeded(1)
        };
        let trades: Vec<Trade> = mixed_trades()
            .into_iter()
            .map(|mut t| {
                t.funds_at_close = None;
                t
            })
            .collect();
        assert!(simulate(&trades, &pl_without_capital).is_err());
    }

    #[test]
    fn percentage_basis_without_capital_is_no_data() {
        let mut trades: Vec<Trade> = (0..10).map(|i| trade(i, i + 1, "A", 100.0)).collect();
        trades.push(trade(10, 11, "A", -50.0));
        let cfg = MonteCarloConfig {
            num_simulations: 100,
            simulation_length: 20,
            ..seeded(1)
        };
        assert!(simulate(&trades, &cfg).unwrap().is_none());

        let sim = Simulation::new(&trades, &cfg).unwrap();
        assert_eq!(sim.total(), 0);

        let with_capital = MonteCarloConfig {
            initial_capital: Some(10_000.0),
            ..cfg
        };
        let result = simulate(&trades, &with_capital).unwrap().unwrap();
        assert_eq!(result.population_size, 11);
        // twenty draws of at most +1% each
        assert!(result.statistics.mean_total_return < 0.25);
    }

    #[test]
    fn pl_basis_scales_by_capital() {
        let cfg = MonteCarloConfig {
            resample_basis: ResampleBasis::Pl,
            initial_capital: Some(100_000.0),
            ..seeded(2)
        };
        let result = simulate(&mixed_trades(), &cfg).unwrap().unwrap();
        assert_eq!(result.initial_capital, 100_000.0);
        assert!(result.statistics.mean_total_return.abs() < 1.0);
    }

    #[tokio::test]
    async fn async_run_matches_and_cancels() {
        let trades = mixed_trades();
        let cfg = seeded(13);
        let plain = simulate(&trades, &cfg).unwrap().unwrap();

        let mut seen = 0;
        let result = simulate_async(&trades, &cfg, CancelToken::new(), |_| seen += 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, plain);
        assert!(seen > 0);

        let token = CancelToken::new();
        token.cancel();
        let cancelled = simulate_async(&trades, &cfg, token, |_| {}).await.unwrap();
        assert!(cancelled.is_none());
    }
}
