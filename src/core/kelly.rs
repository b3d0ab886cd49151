use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::config::KellyConfig;
use crate::error::{AnalyticsError, Result};
use crate::models::Trade;

/// Anything carrying a realized P/L.
pub trait HasPnl {
    fn pnl(&self) -> f64;
}

impl HasPnl for &Trade {
    fn pnl(&self) -> f64 {
        self.pl
    }
}

impl HasPnl for f64 {
    fn pnl(&self) -> f64 {
        *self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KellyMetrics {
    /// Full-Kelly fraction of capital (0.4 = 40%).
    pub fraction: f64,
    /// Same value in percent.
    pub percent: f64,
    pub win_rate: f64,
    pub avg_win: f64,
    /// Absolute size of the average losing trade.
    pub avg_loss: f64,
    pub payoff_ratio: f64,
    /// False when there are no wins or no losses to form a payoff ratio.
    pub has_valid_kelly: bool,
    pub trade_count: usize,
}

/// `f* = p - q / b` over the given trades.
///
/// Without both winners and losers the payoff ratio is undefined, so the fraction is
/// reported as 0 and `has_valid_kelly` stays false.
pub fn calculate_kelly_metrics<T: HasPnl>(trades: &[T]) -> KellyMetrics {
    let total = trades.len();
    if total == 0 {
        return KellyMetrics::default();
    }

    let wins: Vec<f64> = trades.iter().map(|t| t.pnl()).filter(|p| *p > 0.0).collect();
    let losses: Vec<f64> = trades.iter().map(|t| t.pnl()).filter(|p| *p < 0.0).collect();

    let p = wins.len() as f64 / total as f64;
    let q = 1.0 - p;

    let avg_win = if !wins.is_empty() {
        wins.iter().sum::<f64>() / wins.len() as f64
    } else {
        0.0
    };
    let avg_loss = if !losses.is_empty() {
        (losses.iter().sum::<f64>() / losses.len() as f64).abs()
    } else {
        0.0
    };

    let b = if avg_loss > 0.0 { avg_win / avg_loss } else { 0.0 };
    let has_valid_kelly = avg_win > 0.0 && avg_loss > 0.0;
    let fraction = if has_valid_kelly { p - q / b } else { 0.0 };

    KellyMetrics {
        fraction,
        percent: fraction * 100.0,
        win_rate: p,
        avg_win,
        avg_loss,
        payoff_ratio: b,
        has_valid_kelly,
        trade_count: total,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyAllocation {
    pub name: String,
    pub trade_count: usize,
    pub kelly: KellyMetrics,
    /// User's Kelly multiplier in percent.
    pub input_pct: f64,
    /// Full Kelly % scaled by the multiplier.
    pub applied_pct: f64,
    /// Peak concurrent margin as a percent of starting capital.
    pub max_margin_pct: f64,
    pub projected_margin_pct: f64,
    pub allocation_dollars: f64,
    pub negative_expectancy: bool,
    pub needs_more_data: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioAllocation {
    pub kelly: KellyMetrics,
    pub input_pct: f64,
    pub applied_pct: f64,
    pub max_margin_pct: f64,
    pub projected_margin_pct: f64,
    pub weighted_applied_pct: f64,
    pub weighted_projected_margin_pct: f64,
    pub total_allocation_dollars: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KellyAnalysis {
    pub starting_capital: f64,
    pub portfolio: PortfolioAllocation,
    pub strategies: BTreeMap<String, StrategyAllocation>,
}

/// Position sizing from historical win rate, payoff and margin usage.
pub struct KellyCalculator {
    default_multiplier_pct: f64,
    multipliers: HashMap<String, f64>,
}

impl KellyCalculator {
    pub fn new(cfg: &KellyConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            default_multiplier_pct: cfg.default_multiplier_pct,
            multipliers: cfg.multipliers.clone(),
        })
    }

    pub fn multiplier_for(&self, strategy: &str) -> f64 {
        self.multipliers
            .get(strategy)
            .copied()
            .unwrap_or(self.default_multiplier_pct)
    }

    pub fn analyze(&self, trades: &[Trade], starting_capital: f64) -> Result<KellyAnalysis> {
        if !starting_capital.is_finite() || starting_capital <= 0.0 {
            return Err(AnalyticsError::invalid(
                "starting_capital",
                format!("must be a positive amount, got {starting_capital}"),
            ));
        }

        let valid: Vec<&Trade> = trades.iter().filter(|t| t.defect().is_none()).collect();

        let mut by_strategy: BTreeMap<String, Vec<&Trade>> = BTreeMap::new();
        for t in &valid {
            by_strategy
                .entry(t.strategy_name().to_string())
                .or_default()
                .push(t);
        }

        let strategies: BTreeMap<String, StrategyAllocation> = by_strategy
            .into_iter()
            .map(|(name, group)| {
                let alloc = self.allocate(&name, &group, starting_capital);
                (name, alloc)
            })
            .collect();

        let portfolio = self.blend(&valid, &strategies, starting_capital);

        debug!(
            strategies = strategies.len(),
            portfolio_kelly = portfolio.kelly.percent,
            "Kelly analysis complete"
        );

        Ok(KellyAnalysis {
            starting_capital,
            portfolio,
            strategies,
        })
    }

    fn allocate(&self, name: &str, trades: &[&Trade], starting_capital: f64) -> StrategyAllocation {
        let kelly = calculate_kelly_metrics(trades);
        let input_pct = self.multiplier_for(name);
        let applied_pct = kelly.percent * (input_pct / 100.0);
        let max_margin_pct = max_margin_pct(trades, starting_capital);

        StrategyAllocation {
            name: name.to_string(),
            trade_count: trades.len(),
            input_pct,
            applied_pct,
            max_margin_pct,
            projected_margin_pct: max_margin_pct * (input_pct / 100.0),
            allocation_dollars: starting_capital * applied_pct / 100.0,
            negative_expectancy: kelly.has_valid_kelly && kelly.percent <= 0.0,
            needs_more_data: !kelly.has_valid_kelly,
            kelly,
        }
    }

    fn blend(
        &self,
        trades: &[&Trade],
        strategies: &BTreeMap<String, StrategyAllocation>,
        starting_capital: f64,
    ) -> PortfolioAllocation {
        let kelly = calculate_kelly_metrics(trades);
        let input_pct = self.default_multiplier_pct;
        let max_margin = max_margin_pct(trades, starting_capital);

        // weights are each strategy's positive applied %
        let total_weight: f64 = strategies.values().map(|s| s.applied_pct.max(0.0)).sum();
        let weighted = |f: fn(&StrategyAllocation) -> f64| {
            if total_weight > 0.0 {
                strategies
                    .values()
                    .map(|s| f(s) * s.applied_pct.max(0.0))
                    .sum::<f64>()
                    / total_weight
            } else {
                0.0
            }
        };

        PortfolioAllocation {
            applied_pct: kelly.percent * (input_pct / 100.0),
            input_pct,
            max_margin_pct: max_margin,
            projected_margin_pct: max_margin * (input_pct / 100.0),
            weighted_applied_pct: weighted(|s| s.applied_pct),
            weighted_projected_margin_pct: weighted(|s| s.projected_margin_pct),
            total_allocation_dollars: strategies.values().map(|s| s.allocation_dollars).sum(),
            kelly,
        }
    }
}

/// Peak margin held by simultaneously open trades, as a percent of capital.
///
/// A trade holds margin from its open date up to (not including) its close date; a trade
/// closed on the day it opened still counts for that day.
pub fn max_margin_pct(trades: &[&Trade], starting_capital: f64) -> f64 {
    if starting_capital <= 0.0 {
        return 0.0;
    }

    let mut events: Vec<(NaiveDate, f64)> = Vec::new();
    for t in trades {
        let margin = match t.margin_req {
            Some(m) if m > 0.0 && m.is_finite() => m,
            _ => continue,
        };
        let release = t.close_date().max(t.date_opened + Duration::days(1));
        events.push((t.date_opened, margin));
        events.push((release, -margin));
    }
    // releases sort before additions on the same date
    events.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)));

    let mut open = 0.0f64;
    let mut peak = 0.0f64;
    for (_, delta) in events {
        open += delta;
        peak = peak.max(open);
    }
    peak / starting_capital * 100.0
}
