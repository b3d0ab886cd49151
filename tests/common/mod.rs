use chrono::{Duration, NaiveDate};
use block_analytics::models::Trade;

pub fn day(offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap() + Duration::days(offset)
}

/// A trade opened on `offset` and closed the next day.
pub fn make_trade(offset: i64, strategy: &str, pl: f64) -> Trade {
    Trade::new(day(offset), Some(day(offset + 1)), strategy, pl)
}

/// Three strategies over sixty days: a steady earner, a volatile one, and a hedge
/// that tends to win when the volatile one loses.
pub fn make_block() -> Vec<Trade> {
    let mut funds = 50_000.0;
    let mut trades = Vec::new();
    for i in 0..60i64 {
        let swing = if i % 3 == 0 { -600.0 } else { 450.0 };
        let rows = [
            ("Steady", if i % 5 == 4 { -120.0 } else { 90.0 }),
            ("Swing", swing),
            ("Hedge", -swing * 0.4 + 20.0),
        ];
        for (strategy, pl) in rows {
            funds += pl;
            trades.push(
                make_trade(i, strategy, pl)
                    .with_margin(2_500.0)
                    .with_funds_at_close(funds),
            );
        }
    }
    trades
}

/// The block serialized the way the record store exports it.
pub fn block_json(trades: &[Trade]) -> String {
    let daily_logs: Vec<serde_json::Value> = Vec::new();
    serde_json::json!({
        "trades": trades,
        "dailyLogs": daily_logs,
    })
    .to_string()
}
