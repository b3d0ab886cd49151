use chrono::Datelike;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::config::AnalyticsConfig;
use crate::core::equity_curve::{infer_starting_capital, CurveSource, EquityCurve};
use crate::core::kelly::calculate_kelly_metrics;
use crate::core::returns::{mean, simple_returns, std_dev};
use crate::error::Result;
use crate::models::{sort_by_open, DailyLogEntry, DataQuality, PortfolioStats, StrategyStats, Trade};

const DAYS_PER_YEAR: f64 = 365.25;
// below this a return series is treated as flat
const ZERO_VARIANCE: f64 = 1e-12;

/// Stateless calculator producing a fresh [`PortfolioStats`] per call.
#[derive(Debug, Clone)]
pub struct PortfolioStatsCalculator {
    risk_free_rate: f64,
    annualization_factor: f64,
    starting_capital: Option<f64>,
}

impl PortfolioStatsCalculator {
    pub fn new(cfg: &AnalyticsConfig) -> Result<Self> {
        cfg.validate_stats()?;
        Ok(Self {
            risk_free_rate: cfg.risk_free_rate,
            annualization_factor: cfg.annualization_factor,
            starting_capital: cfg.starting_capital,
        })
    }

    /// Capital before the first trade, inferred from its `fundsAtClose`.
    pub fn calculate_initial_capital(trades: &[Trade]) -> f64 {
        infer_starting_capital(trades)
    }

    pub fn calculate(&self, trades: &[Trade], daily_logs: &[DailyLogEntry]) -> PortfolioStats {
        let (valid, data_quality) = partition_valid(trades);
        if valid.is_empty() {
            return PortfolioStats {
                data_quality,
                ..PortfolioStats::default()
            };
        }

        let initial_capital = self
            .starting_capital
            .unwrap_or_else(|| infer_starting_capital(&valid));
        let trade_curve = EquityCurve::from_trades(&valid, Some(initial_capital));
        let curve = EquityCurve::reconcile(trade_curve, daily_logs);

        let pls: Vec<f64> = sort_by_open(&valid).iter().map(|t| t.pl).collect();
        let total_pl: f64 = pls.iter().sum();
        let kelly = calculate_kelly_metrics(&pls);

        let gross_profit: f64 = pls.iter().filter(|p| **p > 0.0).sum();
        let gross_loss: f64 = pls.iter().filter(|p| **p < 0.0).sum::<f64>().abs();
        let winning_trades = pls.iter().filter(|p| **p > 0.0).count();
        let losing_trades = pls.iter().filter(|p| **p < 0.0).count();

        let cagr = match curve.source {
            CurveSource::DailyLogs => {
                calculate_cagr(curve.starting_capital, curve.final_equity(), curve.day_span())
            }
            CurveSource::Trades => calculate_cagr(
                initial_capital,
                initial_capital + total_pl,
                trade_day_span(&valid),
            ),
        };

        // without a positive base there is no return series to measure
        let returns = if curve.starting_capital > 0.0 {
            simple_returns(&curve.equity_values())
        } else {
            Vec::new()
        };
        let max_drawdown = curve.max_drawdown();
        let (max_win_streak, max_loss_streak) = calculate_streaks(&pls);

        let stats = PortfolioStats {
            total_trades: valid.len(),
            winning_trades,
            losing_trades,
            total_pl,
            initial_capital,
            cagr,
            win_rate: kelly.win_rate,
            avg_win: kelly.avg_win,
            avg_loss: kelly.avg_loss,
            profit_factor: if gross_loss > 0.0 {
                gross_profit / gross_loss
            } else {
                0.0
            },
            max_drawdown,
            time_in_drawdown: curve.time_in_drawdown(),
            sharpe_ratio: self.sharpe_ratio(&returns),
            sortino_ratio: self.sortino_ratio(&returns),
            calmar_ratio: if max_drawdown > 0.0 { cagr / max_drawdown } else { 0.0 },
            max_win_streak,
            max_loss_streak,
            monthly_win_rate: period_win_rate(&valid, |d| (d.year(), d.month())),
            weekly_win_rate: period_win_rate(&valid, |d| {
                let w = d.iso_week();
                (w.year(), w.week())
            }),
            kelly_percentage: kelly.percent,
            data_quality,
        };

        debug!(
            trades = stats.total_trades,
            curve = ?curve.source,
            sharpe = stats.sharpe_ratio,
            "Portfolio stats computed"
        );
        stats
    }

    /// Partitions trades by strategy label and computes each partition on its own.
    pub fn calculate_strategy_stats(&self, trades: &[Trade]) -> HashMap<String, StrategyStats> {
        let mut groups: HashMap<String, Vec<Trade>> = HashMap::new();
        for t in trades {
            groups
                .entry(t.strategy_name().to_string())
                .or_default()
                .push(t.clone());
        }

        groups
            .into_iter()
            .map(|(name, group)| {
                let stats = self.calculate(&group, &[]);
                (
                    name.clone(),
                    StrategyStats {
                        strategy_name: name,
                        stats,
                    },
                )
            })
            .collect()
    }

    fn per_period_risk_free(&self) -> f64 {
        self.risk_free_rate / 100.0 / self.annualization_factor
    }

    pub fn sharpe_ratio(&self, returns: &[f64]) -> f64 {
        if returns.len() < 2 {
            return 0.0;
        }
        let sd = std_dev(returns);
        if sd < ZERO_VARIANCE {
            return 0.0;
        }
        let rf = self.per_period_risk_free();
        let mean_excess = mean(returns) - rf;
        mean_excess / sd * self.annualization_factor.sqrt()
    }

    pub fn sortino_ratio(&self, returns: &[f64]) -> f64 {
        if returns.len() < 2 {
            return 0.0;
        }
        let rf = self.per_period_risk_free();
        let excess: Vec<f64> = returns.iter().map(|r| r - rf).collect();
        let downside: Vec<f64> = excess.iter().copied().filter(|e| *e < 0.0).collect();
        if downside.is_empty() {
            return 0.0;
        }
        let downside_dev = std_dev(&downside);
        if downside_dev < ZERO_VARIANCE {
            return 0.0;
        }
        mean(&excess) / downside_dev * self.annualization_factor.sqrt()
    }
}

fn partition_valid(trades: &[Trade]) -> (Vec<Trade>, DataQuality) {
    let mut quality = DataQuality::default();
    let mut valid = Vec::with_capacity(trades.len());
    for (idx, t) in trades.iter().enumerate() {
        match t.defect() {
            Some(reason) => {
                warn!(index = idx, strategy = t.strategy_name(), reason, "Skipping malformed trade");
                quality.skipped_trades += 1;
                quality
                    .warnings
                    .push(format!("trade #{idx} ({}): {reason}", t.strategy_name()));
            }
            None => valid.push(t.clone()),
        }
    }
    (valid, quality)
}

/// `(ending / starting)^(365.25 / days) - 1`, or 0 where growth is undefined.
pub fn calculate_cagr(starting: f64, ending: f64, days: f64) -> f64 {
    if days <= 0.0 || starting <= 0.0 || ending <= 0.0 {
        return 0.0;
    }
    (ending / starting).powf(DAYS_PER_YEAR / days) - 1.0
}

fn trade_day_span(trades: &[Trade]) -> f64 {
    let first_open = trades.iter().map(|t| t.date_opened).min();
    let last_close = trades.iter().map(|t| t.close_date()).max();
    match (first_open, last_close) {
        (Some(a), Some(b)) => (b - a).num_days() as f64,
        _ => 0.0,
    }
}

/// Longest runs of consecutive wins and losses. A flat trade ends both.
pub fn calculate_streaks(pls: &[f64]) -> (usize, usize) {
    let mut max_win = 0;
    let mut max_loss = 0;
    let mut win = 0;
    let mut loss = 0;
    for &pl in pls {
        if pl > 0.0 {
            win += 1;
            loss = 0;
        } else if pl < 0.0 {
            loss += 1;
            win = 0;
        } else {
            win = 0;
            loss = 0;
        }
        max_win = max_win.max(win);
        max_loss = max_loss.max(loss);
    }
    (max_win, max_loss)
}

/// Fraction of calendar buckets (keyed by close date) whose summed P/L is positive.
fn period_win_rate<K, F>(trades: &[Trade], key: F) -> f64
where
    K: Ord,
    F: Fn(chrono::NaiveDate) -> K,
{
    let mut buckets: BTreeMap<K, f64> = BTreeMap::new();
    for t in trades {
        *buckets.entry(key(t.close_date())).or_default() += t.pl;
    }
    if buckets.is_empty() {
        return 0.0;
    }
    let positive = buckets.values().filter(|v| **v > 0.0).count();
    positive as f64 / buckets.len() as f64
}
