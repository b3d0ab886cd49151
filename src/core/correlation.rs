use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::config::CorrelationConfig;
use crate::core::returns::average_ranks;
use crate::error::AnalyticsError;
use crate::models::Trade;

/// Fewest active days a strategy needs to enter the matrix.
const MIN_OBSERVATIONS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMethod {
    Pearson,
    Spearman,
    Kendall,
}

impl fmt::Display for CorrelationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelationMethod::Pearson => write!(f, "pearson"),
            CorrelationMethod::Spearman => write!(f, "spearman"),
            CorrelationMethod::Kendall => write!(f, "kendall"),
        }
    }
}

impl FromStr for CorrelationMethod {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pearson" => Ok(CorrelationMethod::Pearson),
            "spearman" => Ok(CorrelationMethod::Spearman),
            "kendall" => Ok(CorrelationMethod::Kendall),
            other => Err(AnalyticsError::UnknownCorrelationMethod(other.to_string())),
        }
    }
}

/// Value each trade contributes to its strategy's daily series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationBasis {
    /// Raw dollar P/L.
    Pl,
    /// P/L over margin in percent; trades without margin are left out.
    ReturnOnMargin,
}

/// How two strategies' daily series are lined up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationAlignment {
    /// Every day any strategy traded; idle days count as 0.
    Union,
    /// Only days both strategies traded.
    Shared,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationMatrix {
    pub strategies: Vec<String>,
    pub correlation_data: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.strategies.iter().position(|s| s == a)?;
        let j = self.strategies.iter().position(|s| s == b)?;
        Some(self.correlation_data[i][j])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationPair {
    pub strategies: (String, String),
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationAnalytics {
    /// Most positive off-diagonal entry.
    pub strongest: Option<CorrelationPair>,
    /// Most negative off-diagonal entry.
    pub weakest: Option<CorrelationPair>,
    pub average_correlation: f64,
    pub strategy_count: usize,
}

pub fn calculate_correlation_matrix(trades: &[Trade], cfg: &CorrelationConfig) -> CorrelationMatrix {
    let series = daily_series(trades, cfg.basis);
    let strategies: Vec<String> = series.keys().cloned().collect();
    let n = strategies.len();

    let union_days: BTreeSet<NaiveDate> = series.values().flat_map(|s| s.keys().copied()).collect();
    let dense: Vec<Vec<f64>> = series
        .values()
        .map(|s| union_days.iter().map(|d| s.get(d).copied().unwrap_or(0.0)).collect())
        .collect();

    let mut data = vec![vec![0.0; n]; n];
    for i in 0..n {
        data[i][i] = 1.0;
        for j in (i + 1)..n {
            let value = match cfg.alignment {
                CorrelationAlignment::Union => correlate(&dense[i], &dense[j], cfg.method),
                CorrelationAlignment::Shared => {
                    let (x, y) = shared_days(&series[&strategies[i]], &series[&strategies[j]]);
                    if x.len() < MIN_OBSERVATIONS {
                        0.0
                    } else {
                        correlate(&x, &y, cfg.method)
                    }
                }
            };
            let value = value.clamp(-1.0, 1.0);
            data[i][j] = value;
            data[j][i] = value;
        }
    }

    debug!(
        strategies = n,
        days = union_days.len(),
        method = %cfg.method,
        "Correlation matrix built"
    );

    CorrelationMatrix {
        strategies,
        correlation_data: data,
    }
}

/// Summarizes the off-diagonal entries, each unordered pair counted once.
pub fn calculate_correlation_analytics(matrix: &CorrelationMatrix) -> CorrelationAnalytics {
    let n = matrix.len();
    let mut strongest: Option<CorrelationPair> = None;
    let mut weakest: Option<CorrelationPair> = None;
    let mut sum = 0.0;
    let mut count = 0usize;

    for i in 0..n {
        for j in (i + 1)..n {
            let value = matrix.correlation_data[i][j];
            sum += value;
            count += 1;

            let pair = || CorrelationPair {
                strategies: (matrix.strategies[i].clone(), matrix.strategies[j].clone()),
                value,
            };
            if strongest.as_ref().map_or(true, |s| value > s.value) {
                strongest = Some(pair());
            }
            if weakest.as_ref().map_or(true, |w| value < w.value) {
                weakest = Some(pair());
            }
        }
    }

    CorrelationAnalytics {
        strongest,
        weakest,
        average_correlation: if count > 0 { sum / count as f64 } else { 0.0 },
        strategy_count: n,
    }
}

/// Per-strategy sums of the basis value by open date, keeping only strategies with
/// enough active days.
fn daily_series(
    trades: &[Trade],
    basis: CorrelationBasis,
) -> BTreeMap<String, BTreeMap<NaiveDate, f64>> {
    let mut series: BTreeMap<String, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
    for t in trades.iter().filter(|t| t.defect().is_none()) {
        let value = match basis {
            CorrelationBasis::Pl => Some(t.pl),
            CorrelationBasis::ReturnOnMargin => t.return_on_margin(),
        };
        if let Some(v) = value {
            *series
                .entry(t.strategy_name().to_string())
                .or_default()
                .entry(t.date_opened)
                .or_default() += v;
        }
    }
    series.retain(|_, days| days.len() >= MIN_OBSERVATIONS);
    series
}

fn shared_days(
    a: &BTreeMap<NaiveDate, f64>,
    b: &BTreeMap<NaiveDate, f64>,
) -> (Vec<f64>, Vec<f64>) {
    a.iter()
        .filter_map(|(d, x)| b.get(d).map(|y| (*x, *y)))
        .unzip()
}

pub fn correlate(x: &[f64], y: &[f64], method: CorrelationMethod) -> f64 {
    match method {
        CorrelationMethod::Pearson => pearson(x, y),
        CorrelationMethod::Spearman => pearson(&average_ranks(x), &average_ranks(y)),
        CorrelationMethod::Kendall => kendall_tau_b(x, y),
    }
}

pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let mx = x[..n].iter().sum::<f64>() / n as f64;
    let my = y[..n].iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for k in 0..n {
        let dx = x[k] - mx;
        let dy = y[k] - my;
        cov += dx * dy;
        vx += dx * dx;
        vy += dy * dy;
    }
    let denom = (vx * vy).sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    cov / denom
}

/// Kendall's tau-b with tie corrections on both series.
pub fn kendall_tau_b(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }

    let mut concordant = 0i64;
    let mut discordant = 0i64;
    let mut ties_x = 0i64;
    let mut ties_y = 0i64;
    for i in 0..n {
        for j in (i + 1)..n {
            let dx = x[i] - x[j];
            let dy = y[i] - y[j];
            if dx == 0.0 {
                ties_x += 1;
            }
            if dy == 0.0 {
                ties_y += 1;
            }
            if dx == 0.0 || dy == 0.0 {
                continue;
            }
            if (dx > 0.0) == (dy > 0.0) {
                concordant += 1;
            } else {
                discordant += 1;
            }
        }
    }

    let n0 = (n * (n - 1) / 2) as i64;
    let denom = tau_b_denominator(n0, ties_x, ties_y);
    if denom == 0.0 {
        return 0.0;
    }
    (concordant - discordant) as f64 / denom
}

/// `sqrt((n0 - tx)(n0 - ty))`, multiplied in f64 so large pair counts cannot overflow.
fn tau_b_denominator(n0: i64, ties_x: i64, ties_y: i64) -> f64 {
    ((n0 - ties_x) as f64 * (n0 - ties_y) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::trade;

    fn config(method: CorrelationMethod) -> CorrelationConfig {
        CorrelationConfig {
            method,
            ..CorrelationConfig::default()
        }
    }

    fn three_strategy_trades() -> Vec<Trade> {
        let a = [100.0, -50.0, 80.0, -20.0, 60.0, 10.0];
        let b = [90.0, -40.0, 70.0, -30.0, 50.0, 5.0];
        let c = [-80.0, 60.0, -70.0, 25.0, -40.0, 0.0];
        let mut trades = Vec::new();
        for day in 0..6 {
            trades.push(trade(day as i64, day as i64 + 1, "A", a[day]));
            trades.push(trade(day as i64, day as i64 + 1, "B", b[day]));
            trades.push(trade(day as i64, day as i64 + 1, "C", c[day]));
        }
        trades
    }

    #[test]
    fn matrix_invariants_hold_for_every_method() {
        let trades = three_strategy_trades();
        for method in [
            CorrelationMethod::Pearson,
            CorrelationMethod::Spearman,
            CorrelationMethod::Kendall,
        ] {
            let m = calculate_correlation_matrix(&trades, &config(method));
            assert_eq!(m.strategies, vec!["A", "B", "C"]);
            for i in 0..m.len() {
                assert_eq!(m.correlation_data[i][i], 1.0);
                for j in 0..m.len() {
                    let v = m.correlation_data[i][j];
                    assert_eq!(v, m.correlation_data[j][i]);
                    assert!((-1.0..=1.0).contains(&v), "{method}: {v}");
                }
            }
            assert!(m.get("A", "B").unwrap() > 0.8);
            assert!(m.get("A", "C").unwrap() < -0.8);
        }
    }

    #[test]
    fn sparse_strategies_are_excluded() {
        let mut trades = three_strategy_trades();
        trades.push(trade(2, 3, "Lonely", 500.0));
        let m = calculate_correlation_matrix(&trades, &CorrelationConfig::default());
        assert!(!m.strategies.contains(&"Lonely".to_string()));
        assert_eq!(m.len(), 3);
    }

    #[test]
    fn analytics_use_signed_extremes() {
        let trades = three_strategy_trades();
        let m = calculate_correlation_matrix(&trades, &CorrelationConfig::default());
        let a = calculate_correlation_analytics(&m);
        assert_eq!(a.strategy_count, 3);
        let strongest = a.strongest.unwrap();
        assert_eq!(strongest.strategies, ("A".to_string(), "B".to_string()));
        let weakest = a.weakest.unwrap();
        assert!(weakest.value < 0.0);
        let expected = (m.correlation_data[0][1] + m.correlation_data[0][2] + m.correlation_data[1][2]) / 3.0;
        assert!((a.average_correlation - expected).abs() < 1e-12);
    }

    #[test]
    fn single_strategy_has_no_pairs() {
        let trades = vec![trade(0, 1, "Solo", 10.0), trade(1, 2, "Solo", -5.0)];
        let m = calculate_correlation_matrix(&trades, &CorrelationConfig::default());
        assert_eq!(m.correlation_data, vec![vec![1.0]]);
        let a = calculate_correlation_analytics(&m);
        assert!(a.strongest.is_none() && a.weakest.is_none());
        assert_eq!(a.average_correlation, 0.0);
    }

    #[test]
    fn zero_variance_yields_zero() {
        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(kendall_tau_b(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn kendall_with_ties() {
        // scipy.stats.kendalltau([1,2,2,3],[1,3,2,4]) => 0.9128709291752769
        let tau = kendall_tau_b(&[1.0, 2.0, 2.0, 3.0], &[1.0, 3.0, 2.0, 4.0]);
        assert!((tau - 0.912_870_929_175_276_9).abs() < 1e-12);
    }

    #[test]
    fn spearman_is_rank_based() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [1.0, 4.0, 9.0, 16.0, 1000.0];
        assert!((correlate(&x, &y, CorrelationMethod::Spearman) - 1.0).abs() < 1e-12);
        assert!(correlate(&x, &y, CorrelationMethod::Pearson) < 1.0);
    }

    #[test]
    fn shared_alignment_ignores_idle_days() {
        let mut trades = Vec::new();
        for d in 0..4 {
            trades.push(trade(d, d + 1, "A", 10.0 * (d + 1) as f64));
            trades.push(trade(d, d + 1, "B", 5.0 * (d + 1) as f64));
        }
        trades.push(trade(10, 11, "A", -500.0));
        let cfg = CorrelationConfig {
            alignment: CorrelationAlignment::Shared,
            ..CorrelationConfig::default()
        };
        let m = calculate_correlation_matrix(&trades, &cfg);
        assert!((m.get("A", "B").unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn tau_b_denominator_handles_large_samples() {
        // 100k observations: the pair-count product exceeds i64::MAX
        let n: i64 = 100_000;
        let n0 = n * (n - 1) / 2;
        let denom = tau_b_denominator(n0, 0, 0);
        assert!(denom.is_finite());
        assert!((denom - n0 as f64).abs() / (n0 as f64) < 1e-12);

        let with_ties = tau_b_denominator(n0, n0 / 2, 0);
        assert!((with_ties - ((n0 / 2) as f64 * n0 as f64).sqrt()).abs() < 1.0);
    }

    #[test]
    fn parses_method_names() {
        assert_eq!("Spearman".parse::<CorrelationMethod>().unwrap(), CorrelationMethod::Spearman);
        assert!("cosine".parse::<CorrelationMethod>().is_err());
    }
}
