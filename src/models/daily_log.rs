use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// End-of-day account snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLogEntry {
    pub date: NaiveDate,
    #[serde(default)]
    pub net_liquidity: Option<f64>,
}

impl DailyLogEntry {
    pub fn new(date: NaiveDate, net_liquidity: f64) -> Self {
        Self {
            date,
            net_liquidity: Some(net_liquidity),
        }
    }

    /// Net liquidity if present and finite.
    pub fn usable_value(&self) -> Option<f64> {
        self.net_liquidity.filter(|v| v.is_finite())
    }
}
