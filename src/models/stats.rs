use serde::{Deserialize, Serialize};

/// Records skipped while computing a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    pub skipped_trades: usize,
    pub warnings: Vec<String>,
}

impl DataQuality {
    pub fn is_clean(&self) -> bool {
        self.skipped_trades == 0
    }
}

/// Aggregate performance of a set of trades.
///
/// Ratios are fractions (`0.25` is 25%) except `kelly_percentage`, which is already in
/// percent. Every field is zero when there is nothing to measure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub total_pl: f64,
    pub initial_capital: f64,
    pub cagr: f64,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub profit_factor: f64,
    pub max_drawdown: f64,
    pub time_in_drawdown: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub max_win_streak: usize,
    pub max_loss_streak: usize,
    pub monthly_win_rate: f64,
    pub weekly_win_rate: f64,
    pub kelly_percentage: f64,
    pub data_quality: DataQuality,
}

impl PortfolioStats {
    pub fn loss_rate(&self) -> f64 {
        if self.total_trades == 0 {
            0.0
        } else {
            1.0 - self.win_rate
        }
    }

    pub fn avg_trade(&self) -> f64 {
        if self.total_trades == 0 {
            0.0
        } else {
            self.total_pl / self.total_trades as f64
        }
    }
}

/// Same metrics as [`PortfolioStats`], restricted to one strategy label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyStats {
    pub strategy_name: String,
    #[serde(flatten)]
    pub stats: PortfolioStats,
}

impl std::ops::Deref for StrategyStats {
    type Target = PortfolioStats;

    fn deref(&self) -> &PortfolioStats {
        &self.stats
    }
}
