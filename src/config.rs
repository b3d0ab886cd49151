use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::core::correlation::{CorrelationAlignment, CorrelationBasis, CorrelationMethod};
use crate::core::monte_carlo::ResampleBasis;
use crate::error::{AnalyticsError, Result};

pub const DEFAULT_RISK_FREE_RATE: f64 = 2.0;
pub const DEFAULT_ANNUALIZATION_FACTOR: f64 = 252.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    pub method: CorrelationMethod,
    pub basis: CorrelationBasis,
    pub alignment: CorrelationAlignment,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            method: CorrelationMethod::Pearson,
            basis: CorrelationBasis::Pl,
            alignment: CorrelationAlignment::Union,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    pub num_simulations: usize,
    /// Number of trades drawn per simulated path.
    pub simulation_length: usize,
    pub trades_per_year: f64,
    /// Fixed seed for reproducible runs; `None` draws from entropy.
    pub seed: Option<u64>,
    pub resample_basis: ResampleBasis,
    /// Capital used to scale dollar P/L samples. Inferred from the trades when absent.
    pub initial_capital: Option<f64>,
    pub confidence_level: f64,
    pub drawdown_threshold: f64,
    /// Runs between progress records. 0 picks roughly 1% of `num_simulations`.
    pub progress_interval: usize,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            num_simulations: 1000,
            simulation_length: 252,
            trades_per_year: 252.0,
            seed: None,
            resample_basis: ResampleBasis::Percentage,
            initial_capital: None,
            confidence_level: 0.95,
            drawdown_threshold: 0.2,
            progress_interval: 0,
        }
    }
}

impl MonteCarloConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_simulations == 0 {
            return Err(AnalyticsError::invalid(
                "num_simulations",
                "must run at least one simulation",
            ));
        }
        if self.simulation_length == 0 {
            return Err(AnalyticsError::invalid(
                "simulation_length",
                "must draw at least one trade per path",
            ));
        }
        if !self.trades_per_year.is_finite() || self.trades_per_year <= 0.0 {
            return Err(AnalyticsError::invalid(
                "trades_per_year",
                format!("must be positive, got {}", self.trades_per_year),
            ));
        }
        validate_confidence(self.confidence_level)?;
        validate_threshold(self.drawdown_threshold)?;
        if let Some(capital) = self.initial_capital {
            if !capital.is_finite() || capital <= 0.0 {
                return Err(AnalyticsError::invalid(
                    "initial_capital",
                    format!("must be positive, got {capital}"),
                ));
            }
        }
        Ok(())
    }

    pub fn effective_progress_interval(&self) -> usize {
        if self.progress_interval > 0 {
            self.progress_interval
        } else {
            (self.num_simulations / 100).max(1)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KellyConfig {
    pub default_multiplier_pct: f64,
    /// Per-strategy overrides of the Kelly multiplier, in percent.
    pub multipliers: HashMap<String, f64>,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            default_multiplier_pct: 100.0,
            multipliers: HashMap::new(),
        }
    }
}

impl KellyConfig {
    pub fn validate(&self) -> Result<()> {
        let bad = std::iter::once(self.default_multiplier_pct)
            .chain(self.multipliers.values().copied())
            .find(|m| !m.is_finite() || *m < 0.0);
        match bad {
            Some(m) => Err(AnalyticsError::invalid(
                "user_multiplier_pct",
                format!("must be a non-negative percent, got {m}"),
            )),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Annual risk-free rate in percent.
    pub risk_free_rate: f64,
    pub annualization_factor: f64,
    /// Overrides the capital inferred from `fundsAtClose`.
    pub starting_capital: Option<f64>,

    pub correlation: CorrelationConfig,
    pub monte_carlo: MonteCarloConfig,
    pub kelly: KellyConfig,

    pub log_level: String,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            annualization_factor: DEFAULT_ANNUALIZATION_FACTOR,
            starting_capital: None,
            correlation: CorrelationConfig::default(),
            monte_carlo: MonteCarloConfig::default(),
            kelly: KellyConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl AnalyticsConfig {
    /// Reads overrides from the environment (and `.env`). Unparseable values keep
    /// their defaults; range checks happen in [`AnalyticsConfig::validate`].
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let env = |key: &str| -> Option<String> {
            std::env::var(key).ok().filter(|v| !v.trim().is_empty())
        };
        let parsed = |key: &str, default: f64| -> f64 {
            env(key).and_then(|v| v.parse().ok()).unwrap_or(default)
        };

        let defaults = AnalyticsConfig::default();
        let mc_defaults = MonteCarloConfig::default();

        let method = match env("CORRELATION_METHOD") {
            Some(m) => CorrelationMethod::from_str(&m)?,
            None => CorrelationMethod::Pearson,
        };


        let cfg = AnalyticsConfig {
            risk_free_rate: parsed("RISK_FREE_RATE", DEFAULT_RISK_FREE_RATE),
            annualization_factor: parsed("ANNUALIZATION_FACTOR", DEFAULT_ANNUALIZATION_FACTOR),
            starting_capital: env("STARTING_CAPITAL").and_then(|v| v.parse().ok()),
            correlation: CorrelationConfig {
                method,
                ..CorrelationConfig::default()
            },
            monte_carlo: MonteCarloConfig {
                num_simulations: env("MC_SIMULATIONS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(mc_defaults.num_simulations),
                simulation_length: env("MC_LENGTH")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(mc_defaults.simulation_length),
                trades_per_year: parsed("MC_TRADES_PER_YEAR", mc_defaults.trades_per_year),
                seed: env("MC_SEED").and_then(|v| v.parse().ok()),
                confidence_level: parsed("CONFIDENCE_LEVEL", mc_defaults.confidence_level),
                drawdown_threshold: parsed("DRAWDOWN_THRESHOLD", mc_defaults.drawdown_threshold),
                ..mc_defaults
            },
            kelly: KellyConfig {
                default_multiplier_pct: parsed("KELLY_MULTIPLIER_PCT", 100.0),
                multipliers: HashMap::new(),
            },
            log_level: env("LOG_LEVEL").unwrap_or(defaults.log_level),
        };

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_stats()?;
        if let Some(capital) = self.starting_capital {
            if !capital.is_finite() {
                return Err(AnalyticsError::invalid(
                    "starting_capital",
                    "must be a finite amount",
                ));
            }
        }
        self.monte_carlo.validate()?;
        self.kelly.validate()
    }

    /// The subset of checks the stats calculator depends on.
    pub fn validate_stats(&self) -> Result<()> {
        if !self.risk_free_rate.is_finite() {
            return Err(AnalyticsError::invalid(
                "risk_free_rate",
                "must be a finite percent",
            ));
        }
        if !self.annualization_factor.is_finite() || self.annualization_factor <= 0.0 {
            return Err(AnalyticsError::invalid(
                "annualization_factor",
                format!("must be positive, got {}", self.annualization_factor),
            ));
        }
        Ok(())
    }
}

fn validate_confidence(level: f64) -> Result<()> {
    if level > 0.0 && level < 1.0 {
        Ok(())
    } else {
        Err(AnalyticsError::invalid(
            "confidence_level",
            format!("must lie strictly between 0 and 1, got {level}"),
        ))
    }
}

fn validate_threshold(threshold: f64) -> Result<()> {
    if threshold > 0.0 && threshold <= 1.0 {
        Ok(())
    } else {
        Err(AnalyticsError::invalid(
            "drawdown_threshold",
            format!("must lie in (0, 1], got {threshold}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(AnalyticsConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_simulations_rejected() {
        let cfg = MonteCarloConfig {
            num_simulations: 0,
            ..MonteCarloConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert_eq!(
            err,
            AnalyticsError::invalid("num_simulations", "must run at least one simulation")
        );
    }

    #[test]
    fn bad_ranges_rejected() {
        let mut cfg = AnalyticsConfig::default();
        cfg.annualization_factor = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = AnalyticsConfig::default();
        cfg.monte_carlo.confidence_level = 1.0;
        assert_eq!(
            cfg.validate().unwrap_err(),
            AnalyticsError::invalid("confidence_level", "must lie strictly between 0 and 1, got 1")
        );

        let mut cfg = AnalyticsConfig::default();
        cfg.monte_carlo.drawdown_threshold = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = AnalyticsConfig::default();
        cfg.kelly.multipliers.insert("A".into(), -5.0);
        assert!(cfg.validate().is_err());

        let mc = MonteCarloConfig {
            initial_capital: Some(0.0),
            ..MonteCarloConfig::default()
        };
        assert!(mc.validate().is_err());
    }

    #[test]
    fn progress_interval_defaults_to_one_percent() {
        let mc = MonteCarloConfig {
            num_simulations: 5000,
            ..MonteCarloConfig::default()
        };
        assert_eq!(mc.effective_progress_interval(), 50);
        let small = MonteCarloConfig {
            num_simulations: 10,
            ..MonteCarloConfig::default()
        };
        assert_eq!(small.effective_progress_interval(), 1);
    }
}
