use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

pub const UNKNOWN_STRATEGY: &str = "Unknown";

fn default_strategy() -> String {
    UNKNOWN_STRATEGY.to_string()
}

/// One closed position as exported by the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub date_opened: NaiveDate,
    #[serde(default)]
    pub time_opened: Option<NaiveTime>,
    #[serde(default)]
    pub date_closed: Option<NaiveDate>,
    #[serde(default)]
    pub time_closed: Option<NaiveTime>,
    #[serde(default = "default_strategy")]
    pub strategy: String,
    pub pl: f64,
    #[serde(default)]
    pub margin_req: Option<f64>,
    #[serde(default)]
    pub funds_at_close: Option<f64>,
}

impl Trade {
    pub fn new(
        date_opened: NaiveDate,
        date_closed: Option<NaiveDate>,
        strategy: &str,
        pl: f64,
    ) -> Self {
        Self {
            date_opened,
            time_opened: None,
            date_closed,
            time_closed: None,
            strategy: normalize_strategy(strategy),
            pl,
            margin_req: None,
            funds_at_close: None,
        }
    }

    pub fn with_margin(mut self, margin_req: f64) -> Self {
        self.margin_req = Some(margin_req);
        self
    }

    pub fn with_funds_at_close(mut self, funds: f64) -> Self {
        self.funds_at_close = Some(funds);
        self
    }

    /// Back-fill the strategy label before the engine consumes the trade.
    pub fn with_strategy(mut self, strategy: &str) -> Self {
        self.strategy = normalize_strategy(strategy);
        self
    }

    pub fn strategy_name(&self) -> &str {
        if self.strategy.trim().is_empty() {
            UNKNOWN_STRATEGY
        } else {
            &self.strategy
        }
    }

    pub fn opened_at(&self) -> NaiveDateTime {
        self.date_opened
            .and_time(self.time_opened.unwrap_or(NaiveTime::MIN))
    }

    /// Close timestamp, falling back to the open date for records without one.
    pub fn closed_at(&self) -> NaiveDateTime {
        match self.date_closed {
            Some(d) => d.and_time(self.time_closed.unwrap_or(NaiveTime::MIN)),
            None => self.opened_at(),
        }
    }

    pub fn close_date(&self) -> NaiveDate {
        self.date_closed.unwrap_or(self.date_opened)
    }

    pub fn is_win(&self) -> bool {
        self.pl > 0.0
    }

    pub fn is_loss(&self) -> bool {
        self.pl < 0.0
    }

    /// Return on margin in percent, when the trade carries a usable margin figure.
    pub fn return_on_margin(&self) -> Option<f64> {
        match self.margin_req {
            Some(m) if m > 0.0 && m.is_finite() => Some(self.pl / m * 100.0),
            _ => None,
        }
    }

    /// Why this record cannot take part in the statistics, if it can't.
    pub fn defect(&self) -> Option<&'static str> {
        if !self.pl.is_finite() {
            return Some("non-finite pl");
        }
        if matches!(self.margin_req, Some(m) if !m.is_finite()) {
            return Some("non-finite marginReq");
        }
        if matches!(self.funds_at_close, Some(f) if !f.is_finite()) {
            return Some("non-finite fundsAtClose");
        }
        None
    }
}

fn normalize_strategy(strategy: &str) -> String {
    let trimmed = strategy.trim();
    if trimmed.is_empty() {
        default_strategy()
    } else {
        trimmed.to_string()
    }
}

/// Returns the trades ordered by open timestamp. Ties keep their input order.
pub fn sort_by_open(trades: &[Trade]) -> Vec<&Trade> {
    let mut sorted: Vec<&Trade> = trades.iter().collect();
    sorted.sort_by_key(|t| t.opened_at());
    sorted
}
