pub mod portfolio;

pub use portfolio::PortfolioStatsCalculator;
