use chrono::{Duration, NaiveDate};

use crate::models::Trade;

/// 2024-01-01 shifted by `offset` days.
pub fn date(offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(offset)
}

pub fn trade(open_offset: i64, close_offset: i64, strategy: &str, pl: f64) -> Trade {
    Trade::new(date(open_offset), Some(date(close_offset)), strategy, pl)
}

/// Two strategies, wins and losses, running balance from 100k in `fundsAtClose`.
pub fn mixed_trades() -> Vec<Trade> {
    let pls = [
        ("A", 1_200.0),
        ("B", -400.0),
        ("A", 650.0),
        ("A", -900.0),
        ("B", 300.0),
        ("B", 1_100.0),
        ("A", -250.0),
        ("B", -700.0),
        ("A", 800.0),
        ("B", 450.0),
        ("A", 300.0),
        ("B", -150.0),
    ];
    let mut funds = 100_000.0;
    pls.iter()
        .enumerate()
        .map(|(i, (strategy, pl))| {
            funds += pl;
            let day = i as i64 * 2;
            trade(day, day + 1, strategy, *pl)
                .with_margin(5_000.0)
                .with_funds_at_close(funds)
        })
        .collect()
}
