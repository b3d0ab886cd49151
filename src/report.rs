//! Console renderings of analysis outputs.

use crate::core::correlation::{CorrelationAnalytics, CorrelationMatrix};
use crate::core::kelly::KellyAnalysis;
use crate::core::monte_carlo::MonteCarloResult;
use crate::snapshot::PerformanceSnapshot;

const RULE: &str = "  ───────────────────────────────────";

fn banner(out: &mut String, title: &str) {
    let bar = "=".repeat(70);
    out.push_str(&format!("\n{bar}\n  {title}\n{bar}\n"));
}

fn section(out: &mut String, title: &str) {
    out.push_str(&format!("\n  {title}\n{RULE}\n"));
}

fn line(out: &mut String, text: String) {
    out.push_str(&text);
    out.push('\n');
}

impl PerformanceSnapshot {
    pub fn summary(&self) -> String {
        let s = &self.portfolio_stats;
        let mut out = String::new();

        banner(&mut out, "BLOCK PERFORMANCE");
        match self.date_range {
            Some((start, end)) => line(
                &mut out,
                format!(
                    "  Period:      {} to {} ({} days)",
                    start.format("%Y-%m-%d"),
                    end.format("%Y-%m-%d"),
                    (end - start).num_days()
                ),
            ),
            None => line(&mut out, "  Period:      no trades".to_string()),
        }

        section(&mut out, "PERFORMANCE");
        line(&mut out, format!("  Initial:     ${:.2}", self.initial_capital));
        line(&mut out, format!("  PnL:         ${:+.2}", s.total_pl));
        line(&mut out, format!("  CAGR:        {:+.1}%", s.cagr * 100.0));

        section(&mut out, "TRADES");
        line(&mut out, format!("  Total:       {}", s.total_trades));
        line(
            &mut out,
            format!("  Win/Loss:    {} / {}", s.winning_trades, s.losing_trades),
        );
        line(&mut out, format!("  Win Rate:    {:.1}%", s.win_rate * 100.0));
        line(&mut out, format!("  Avg Win:     ${:+.2}", s.avg_win));
        line(&mut out, format!("  Avg Loss:    ${:+.2}", -s.avg_loss));
        line(&mut out, format!("  Avg Trade:   ${:+.2}", s.avg_trade()));
        line(&mut out, format!("  Profit Factor: {:.2}", s.profit_factor));
        line(
            &mut out,
            format!("  Streaks:     {}W / {}L", s.max_win_streak, s.max_loss_streak),
        );
        line(
            &mut out,
            format!(
                "  Month/Week:  {:.0}% / {:.0}% winning",
                s.monthly_win_rate * 100.0,
                s.weekly_win_rate * 100.0
            ),
        );

        section(&mut out, "RISK");
        line(&mut out, format!("  Max DD:      {:.1}%", s.max_drawdown * 100.0));
        line(
            &mut out,
            format!("  Time in DD:  {:.1}%", s.time_in_drawdown * 100.0),
        );
        line(&mut out, format!("  Sharpe:      {:.2}", s.sharpe_ratio));
        line(&mut out, format!("  Sortino:     {:.2}", s.sortino_ratio));
        line(&mut out, format!("  Calmar:      {:.2}", s.calmar_ratio));
        line(&mut out, format!("  Kelly:       {:.1}%", s.kelly_percentage));

        if self.margin.trades_with_margin > 0 {
            section(&mut out, "RETURN ON MARGIN");
            line(
                &mut out,
                format!(
                    "  Avg:         {:+.1}% (std {:.1}%)",
                    self.margin.avg_rom, self.margin.std_rom
                ),
            );
            line(
                &mut out,
                format!(
                    "  Best/Worst:  {:+.1}% / {:+.1}%",
                    self.margin.best_rom, self.margin.worst_rom
                ),
            );
        }

        if !self.strategy_stats.is_empty() {
            section(&mut out, "BY STRATEGY");
            let mut rows: Vec<_> = self.strategy_stats.values().collect();
            rows.sort_by(|a, b| a.strategy_name.cmp(&b.strategy_name));
            for st in rows {
                line(
                    &mut out,
                    format!(
                        "  {:<16} {:>4} trades | WR {:.0}% | PnL ${:+.2} | PF {:.2}",
                        st.strategy_name,
                        st.total_trades,
                        st.win_rate * 100.0,
                        st.total_pl,
                        st.profit_factor
                    ),
                );
            }
        }

        if !s.data_quality.is_clean() {
            section(&mut out, "DATA QUALITY");
            line(
                &mut out,
                format!("  Skipped:     {} trades", s.data_quality.skipped_trades),
            );
        }

        out
    }

    pub fn print_summary(&self) {
        print!("{}", self.summary());
    }
}

pub fn correlation_summary(matrix: &CorrelationMatrix, analytics: &CorrelationAnalytics) -> String {
    let mut out = String::new();
    banner(&mut out, "STRATEGY CORRELATION");
    if matrix.is_empty() {
        line(&mut out, "  Not enough overlapping trading days".to_string());
        return out;
    }

    let mut header = format!("  {:<16}", "");
    for name in &matrix.strategies {
        header.push_str(&format!(" {:>8}", truncate(name, 8)));
    }
    line(&mut out, header);
    for (name, row) in matrix.strategies.iter().zip(&matrix.correlation_data) {
        let mut text = format!("  {:<16}", truncate(name, 16));
        for v in row {
            text.push_str(&format!(" {v:>8.2}"));
        }
        line(&mut out, text);
    }

    section(&mut out, "ANALYTICS");
    if let Some(p) = &analytics.strongest {
        line(
            &mut out,
            format!("  Strongest:   {} / {} ({:+.2})", p.strategies.0, p.strategies.1, p.value),
        );
    }
    if let Some(p) = &analytics.weakest {
        line(
            &mut out,
            format!("  Weakest:     {} / {} ({:+.2})", p.strategies.0, p.strategies.1, p.value),
        );
    }
    line(
        &mut out,
        format!("  Average:     {:+.2}", analytics.average_correlation),
    );
    out
}

pub fn print_correlation(matrix: &CorrelationMatrix, analytics: &CorrelationAnalytics) {
    print!("{}", correlation_summary(matrix, analytics));
}

impl KellyAnalysis {
    pub fn summary(&self) -> String {
        let p = &self.portfolio;
        let mut out = String::new();
        banner(&mut out, "KELLY POSITION SIZING");
        line(&mut out, format!("  Capital:     ${:.2}", self.starting_capital));

        section(&mut out, "PORTFOLIO");
        line(&mut out, format!("  Full Kelly:  {:.1}%", p.kelly.percent));
        line(
            &mut out,
            format!("  Win Rate:    {:.1}%", p.kelly.win_rate * 100.0),
        );
        line(&mut out, format!("  Payoff:      {:.2}", p.kelly.payoff_ratio));
        line(
            &mut out,
            format!("  Applied:     {:.1}% (weighted {:.1}%)", p.applied_pct, p.weighted_applied_pct),
        );
        line(
            &mut out,
            format!(
                "  Margin:      {:.1}% max, {:.1}% projected",
                p.max_margin_pct, p.weighted_projected_margin_pct
            ),
        );
        line(
            &mut out,
            format!("  Allocation:  ${:.2}", p.total_allocation_dollars),
        );

        if !self.strategies.is_empty() {
            section(&mut out, "BY STRATEGY");
            for s in self.strategies.values() {
                let flag = if s.needs_more_data {
                    "  [needs wins & losses]"
                } else if s.negative_expectancy {
                    "  [negative expectancy]"
                } else {
                    ""
                };
                line(
                    &mut out,
                    format!(
                        "  {:<16} Kelly {:>6.1}% x {:.0}% = {:>6.1}% | margin {:.1}% | ${:.2}{}",
                        truncate(&s.name, 16),
                        s.kelly.percent,
                        s.input_pct,
                        s.applied_pct,
                        s.max_margin_pct,
                        s.allocation_dollars,
                        flag
                    ),
                );
            }
        }
        out
    }

    pub fn print_summary(&self) {
        print!("{}", self.summary());
    }
}

impl MonteCarloResult {
    pub fn summary(&self) -> String {
        let s = &self.statistics;
        let mut out = String::new();
        banner(&mut out, "MONTE CARLO SIMULATION");
        line(
            &mut out,
            format!(
                "  Runs:        {} x {} trades (population {})",
                self.runs_completed, self.parameters.simulation_length, self.population_size
            ),
        );
        line(&mut out, format!("  Capital:     ${:.2}", self.initial_capital));

        section(&mut out, "RETURNS");
        line(
            &mut out,
            format!("  Mean:        {:+.1}%", s.mean_total_return * 100.0),
        );
        line(
            &mut out,
            format!("  Median:      {:+.1}%", s.median_total_return * 100.0),
        );
        line(
            &mut out,
            format!("  Std Dev:     {:.1}%", s.std_dev_total_return * 100.0),
        );
        line(
            &mut out,
            format!("  Annualized:  {:+.1}%", s.annualized_return * 100.0),
        );
        line(
            &mut out,
            format!("  Best (p95):  {:+.1}%", s.best_case_return * 100.0),
        );
        line(
            &mut out,
            format!("  P(profit):   {:.1}%", s.probability_of_profit * 100.0),
        );

        section(&mut out, "RISK");
        line(
            &mut out,
            format!(
                "  VaR 1/5/10:  {:+.1}% / {:+.1}% / {:+.1}%",
                s.value_at_risk.p1 * 100.0,
                s.value_at_risk.p5 * 100.0,
                s.value_at_risk.p10 * 100.0
            ),
        );
        line(
            &mut out,
            format!(
                "  ES ({:.0}%):    {:+.1}%",
                self.parameters.confidence_level * 100.0,
                s.expected_shortfall * 100.0
            ),
        );
        line(
            &mut out,
            format!("  Max DD p95:  {:.1}%", s.median_max_drawdown * 100.0),
        );
        line(
            &mut out,
            format!(
                "  P(DD >= {:.0}%): {:.1}%",
                self.parameters.drawdown_threshold * 100.0,
                s.drawdown_breach_probability * 100.0
            ),
        );
        out
    }

    pub fn print_summary(&self) {
        print!("{}", self.summary());
    }
}

fn truncate(name: &str, width: usize) -> String {
    name.chars().take(width).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonteCarloConfig;
    use crate::core::monte_carlo::simulate;
    use crate::snapshot::AnalysisRequest;
    use crate::test_helpers::mixed_trades;

    #[test]
    fn snapshot_summary_lists_strategies() {
        let snap = PerformanceSnapshot::build(&AnalysisRequest::new(mixed_trades())).unwrap();
        let text = snap.summary();
        assert!(text.contains("BLOCK PERFORMANCE"));
        assert!(text.contains("Total:       12"));
        assert!(text.contains("RETURN ON MARGIN"));
        assert!(text.contains("BY STRATEGY"));
        assert!(!text.contains("DATA QUALITY"));
    }

    #[test]
    fn correlation_summary_handles_empty_matrix() {
        let snap = PerformanceSnapshot::build(&AnalysisRequest::default()).unwrap();
        let (matrix, analytics) = snap.correlation();
        assert!(correlation_summary(&matrix, &analytics).contains("Not enough"));
    }

    #[test]
    fn kelly_and_monte_carlo_render() {
        let snap = PerformanceSnapshot::build(&AnalysisRequest::new(mixed_trades())).unwrap();
        let kelly = snap.kelly().unwrap().summary();
        assert!(kelly.contains("KELLY POSITION SIZING"));

        let cfg = MonteCarloConfig {
            num_simulations: 20,
            simulation_length: 10,
            seed: Some(4),
            ..MonteCarloConfig::default()
        };
        let mc = simulate(&mixed_trades(), &cfg).unwrap().unwrap().summary();
        assert!(mc.contains("Runs:        20 x 10 trades"));
    }
}
