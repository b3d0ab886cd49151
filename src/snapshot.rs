//! One-shot analysis session: filter a block's trades and compute everything the
//! dashboard shows from them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::AnalyticsConfig;
use crate::core::correlation::{
    calculate_correlation_analytics, calculate_correlation_matrix, CorrelationAnalytics,
    CorrelationMatrix,
};
use crate::core::equity_curve::{infer_starting_capital, EquityCurve};
use crate::core::kelly::{KellyAnalysis, KellyCalculator};
use crate::core::returns::{mean, std_dev};
use crate::error::Result;
use crate::models::{DailyLogEntry, PortfolioStats, StrategyStats, Trade};
use crate::stats::PortfolioStatsCalculator;

/// Inputs for a single analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub trades: Vec<Trade>,
    #[serde(default)]
    pub daily_logs: Vec<DailyLogEntry>,
    /// Strategies to keep. Empty keeps every trade.
    #[serde(default)]
    pub strategies: Vec<String>,
    #[serde(skip)]
    pub config: AnalyticsConfig,
}

impl AnalysisRequest {
    pub fn new(trades: Vec<Trade>) -> Self {
        Self {
            trades,
            ..Self::default()
        }
    }

    pub fn with_daily_logs(mut self, daily_logs: Vec<DailyLogEntry>) -> Self {
        self.daily_logs = daily_logs;
        self
    }

    pub fn with_strategies<I, S>(mut self, strategies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.strategies = strategies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_config(mut self, config: AnalyticsConfig) -> Self {
        self.config = config;
        self
    }

    fn keeps(&self, trade: &Trade) -> bool {
        self.strategies.is_empty()
            || self
                .strategies
                .iter()
                .any(|s| s.trim() == trade.strategy_name())
    }
}

/// Return-on-margin figures across trades that carry a margin requirement, in percent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarginMetrics {
    pub trades_with_margin: usize,
    pub avg_rom: f64,
    pub std_rom: f64,
    pub best_rom: f64,
    pub worst_rom: f64,
}

impl MarginMetrics {
    pub fn from_trades(trades: &[Trade]) -> Self {
        let roms: Vec<f64> = trades.iter().filter_map(Trade::return_on_margin).collect();
        if roms.is_empty() {
            return Self::default();
        }
        Self {
            trades_with_margin: roms.len(),
            avg_rom: mean(&roms),
            std_rom: std_dev(&roms),
            best_rom: roms.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            worst_rom: roms.iter().copied().fold(f64::INFINITY, f64::min),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub filtered_trades: Vec<Trade>,
    pub portfolio_stats: PortfolioStats,
    pub strategy_stats: HashMap<String, StrategyStats>,
    pub equity_curve: EquityCurve,
    pub margin: MarginMetrics,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub initial_capital: f64,
    #[serde(skip)]
    config: AnalyticsConfig,
}

impl PerformanceSnapshot {
    /// Daily logs describe the whole account, so they only feed the curve when no
    /// strategy filter is active.
    pub fn build(request: &AnalysisRequest) -> Result<Self> {
        request.config.validate()?;

        let filtered_trades: Vec<Trade> = request
            .trades
            .iter()
            .filter(|t| request.keeps(t))
            .cloned()
            .collect();
        let daily_logs: &[DailyLogEntry] = if request.strategies.is_empty() {
            &request.daily_logs
        } else {
            &[]
        };

        let calculator = PortfolioStatsCalculator::new(&request.config)?;
        let portfolio_stats = calculator.calculate(&filtered_trades, daily_logs);
        let strategy_stats = calculator.calculate_strategy_stats(&filtered_trades);

        let initial_capital = request
            .config
            .starting_capital
            .unwrap_or_else(|| infer_starting_capital(&filtered_trades));
        let valid: Vec<Trade> = filtered_trades
            .iter()
            .filter(|t| t.defect().is_none())
            .cloned()
            .collect();
        let equity_curve = EquityCurve::reconcile(
            EquityCurve::from_trades(&valid, Some(initial_capital)),
            daily_logs,
        );

        let date_range = valid
            .iter()
            .map(|t| t.date_opened)
            .min()
            .zip(valid.iter().map(Trade::close_date).max());

        info!(
            trades = filtered_trades.len(),
            strategies = strategy_stats.len(),
            filter = ?request.strategies,
            "Built performance snapshot"
        );

        Ok(Self {
            margin: MarginMetrics::from_trades(&valid),
            filtered_trades,
            portfolio_stats,
            strategy_stats,
            equity_curve,
            date_range,
            initial_capital,
            config: request.config.clone(),
        })
    }

    pub fn correlation(&self) -> (CorrelationMatrix, CorrelationAnalytics) {
        let matrix = calculate_correlation_matrix(&self.filtered_trades, &self.config.correlation);
        let analytics = calculate_correlation_analytics(&matrix);
        debug!(strategies = matrix.len(), "Correlation computed");
        (matrix, analytics)
    }

    /// Fails when the snapshot has no positive starting capital.
    pub fn kelly(&self) -> Result<KellyAnalysis> {
        KellyCalculator::new(&self.config.kelly)?.analyze(&self.filtered_trades, self.initial_capital)
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{date, mixed_trades, trade};

    #[test]
    fn filter_keeps_named_strategies() {
        let request = AnalysisRequest::new(mixed_trades()).with_strategies(["A"]);
        let snap = PerformanceSnapshot::build(&request).unwrap();
        assert_eq!(snap.filtered_trades.len(), 6);
        assert!(snap.filtered_trades.iter().all(|t| t.strategy == "A"));
        assert_eq!(snap.strategy_stats.len(), 1);
        assert_eq!(snap.portfolio_stats.total_trades, 6);
    }

    #[test]
    fn margin_metrics_cover_rom() {
        let trades = vec![
            trade(0, 1, "A", 100.0).with_margin(1_000.0),
            trade(1, 2, "A", -50.0).with_margin(1_000.0),
            trade(2, 3, "A", 30.0),
        ];
        let m = MarginMetrics::from_trades(&trades);
        assert_eq!(m.trades_with_margin, 2);
        assert!((m.avg_rom - 2.5).abs() < 1e-9);
        assert!((m.std_rom - 7.5).abs() < 1e-9);
        assert!((m.best_rom - 10.0).abs() < 1e-9);
        assert!((m.worst_rom + 5.0).abs() < 1e-9);
    }

    #[test]
    fn daily_logs_ignored_under_filter() {
        let logs = vec![
            DailyLogEntry::new(date(0), 100_000.0),
            DailyLogEntry::new(date(30), 90_000.0),
        ];
        let all = PerformanceSnapshot::build(
            &AnalysisRequest::new(mixed_trades()).with_daily_logs(logs.clone()),
        )
        .unwrap();
        assert!((all.portfolio_stats.max_drawdown - 0.1).abs() < 1e-9);

        let filtered = PerformanceSnapshot::build(
            &AnalysisRequest::new(mixed_trades())
                .with_daily_logs(logs)
                .with_strategies(["B"]),
        )
        .unwrap();
        assert_ne!(filtered.portfolio_stats.max_drawdown, 0.1);
    }

    #[test]
    fn empty_block_is_zeroed() {
        let snap = PerformanceSnapshot::build(&AnalysisRequest::default()).unwrap();
        assert_eq!(snap.portfolio_stats.total_trades, 0);
        assert!(snap.date_range.is_none());
        assert_eq!(snap.margin, MarginMetrics::default());
        assert!(snap.kelly().is_err());
    }

    #[test]
    fn components_run_from_snapshot() {
        let snap = PerformanceSnapshot::build(&AnalysisRequest::new(mixed_trades())).unwrap();
        assert_eq!(snap.initial_capital, 100_000.0);
        assert_eq!(snap.date_range, Some((date(0), date(23))));

        let (matrix, analytics) = snap.correlation();
        assert_eq!(matrix.strategies, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(analytics.strategy_count, 2);

        let kelly = snap.kelly().unwrap();
        assert_eq!(kelly.strategies.len(), 2);
    }
}
