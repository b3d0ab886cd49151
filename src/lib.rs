pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod report;
pub mod snapshot;
pub mod stats;
#[cfg(test)]
pub mod test_helpers;

pub use config::AnalyticsConfig;
pub use error::{AnalyticsError, Result};
