pub mod daily_log;
pub mod stats;
pub mod trade;

pub use daily_log::DailyLogEntry;
pub use stats::{DataQuality, PortfolioStats, StrategyStats};
pub use trade::{sort_by_open, Trade, UNKNOWN_STRATEGY};
