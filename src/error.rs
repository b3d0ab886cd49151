use thiserror::Error;

/// Contract violations raised before any computation starts.
///
/// Degenerate data (no trades, zero variance, no losses) never produces an error;
/// those cases come back as zeroed statistics or `None`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyticsError {
    #[error("invalid configuration for '{field}': {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("unknown correlation method '{0}' (expected pearson, spearman or kendall)")]
    UnknownCorrelationMethod(String),
}

impl AnalyticsError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        AnalyticsError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
