use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::models::{sort_by_open, DailyLogEntry, Trade};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
    pub peak: f64,
    pub drawdown_pct: f64,
}

/// Which source produced the curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveSource {
    Trades,
    DailyLogs,
}

/// Cumulative equity with a running peak and drawdown at every point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityCurve {
    pub source: CurveSource,
    pub starting_capital: f64,
    pub points: Vec<EquityPoint>,
}

impl EquityCurve {
    /// Builds one point per trade in close order. Trades closing at the same moment
    /// keep their open order.
    ///
    /// `starting_capital` falls back to [`infer_starting_capital`] when not supplied.
    pub fn from_trades(trades: &[Trade], starting_capital: Option<f64>) -> Self {
        let starting_capital = starting_capital.unwrap_or_else(|| infer_starting_capital(trades));

        // stable sort: same-close ties keep open order
        let mut by_close = sort_by_open(trades);
        by_close.sort_by_key(|t| t.closed_at());

        let mut tracker = PeakTracker::new(starting_capital);
        let mut equity = starting_capital;
        let points = by_close
            .into_iter()
            .map(|t| {
                equity += t.pl;
                tracker.point(t.closed_at(), equity)
            })
            .collect();

        Self {
            source: CurveSource::Trades,
            starting_capital,
            points,
        }
    }

    /// Builds one point per daily log carrying a usable net liquidity value.
    pub fn from_daily_logs(logs: &[DailyLogEntry]) -> Self {
        let mut usable: Vec<(chrono::NaiveDate, f64)> = logs
            .iter()
            .filter_map(|l| l.usable_value().map(|v| (l.date, v)))
            .collect();
        usable.sort_by_key(|(d, _)| *d);

        let starting_capital = usable.first().map(|(_, v)| *v).unwrap_or(0.0);
        let mut tracker = PeakTracker::new(starting_capital);
        let points = usable
            .into_iter()
            .map(|(date, v)| tracker.point(date.and_time(NaiveTime::MIN), v))
            .collect();

        Self {
            source: CurveSource::DailyLogs,
            starting_capital,
            points,
        }
    }

    /// Picks the daily-log curve when the logs carry at least two usable values,
    /// otherwise keeps the trade curve.
    pub fn reconcile(trade_curve: EquityCurve, daily_logs: &[DailyLogEntry]) -> EquityCurve {
        let usable = daily_logs
            .iter()
            .filter(|l| l.usable_value().is_some())
            .count();
        if usable >= 2 {
            EquityCurve::from_daily_logs(daily_logs)
        } else {
            trade_curve
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn final_equity(&self) -> f64 {
        self.points
            .last()
            .map(|p| p.equity)
            .unwrap_or(self.starting_capital)
    }

    /// Equity values in order. A trade curve is prefixed with its starting capital;
    /// a daily curve already starts at its first snapshot.
    pub fn equity_values(&self) -> Vec<f64> {
        let base = match self.source {
            CurveSource::Trades => Some(self.starting_capital),
            CurveSource::DailyLogs => None,
        };
        base.into_iter()
            .chain(self.points.iter().map(|p| p.equity))
            .collect()
    }

    /// Calendar days between the first and last point.
    pub fn day_span(&self) -> f64 {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_days() as f64,
            _ => 0.0,
        }
    }

    /// Change in equity at every point, measured from the starting capital.
    pub fn deltas(&self) -> Vec<f64> {
        self.equity_values().windows(2).map(|w| w[1] - w[0]).collect()
    }

    pub fn max_drawdown(&self) -> f64 {
        self.points
            .iter()
            .map(|p| p.drawdown_pct)
            .fold(0.0, f64::max)
    }

    /// Fraction of points sitting below their running peak.
    pub fn time_in_drawdown(&self) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        let under = self.points.iter().filter(|p| p.drawdown_pct > 0.0).count();
        under as f64 / self.points.len() as f64
    }
}

/// `fundsAtClose - pl` of the earliest opened trade, or 0 without that data.
pub fn infer_starting_capital(trades: &[Trade]) -> f64 {
    sort_by_open(trades)
        .first()
        .and_then(|t| t.funds_at_close.map(|f| f - t.pl))
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

struct PeakTracker {
    peak: f64,
}

impl PeakTracker {
    fn new(start: f64) -> Self {
        Self { peak: start }
    }

    fn point(&mut self, timestamp: NaiveDateTime, equity: f64) -> EquityPoint {
        self.peak = self.peak.max(equity);
        let drawdown_pct = if self.peak > 0.0 {
            ((self.peak - equity) / self.peak).max(0.0)
        } else {
            0.0
        };
        EquityPoint {
            timestamp,
            equity,
            peak: self.peak,
            drawdown_pct,
        }
    }
}
