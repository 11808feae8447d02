use crate::param_utils::{get_param, get_rounded_param, get_usize_param_min};
use anyhow::{anyhow, Result};
use log::warn;
use serde_json::Value;
use std::collections::HashMap;

/// Every option the simulation engine recognizes, with defaults matching the
/// reference swing configuration. Validated once at construction; the engine
/// itself never re-checks these.
#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    /// Commission applied on both entry and exit, as a percentage.
    pub commission_pct: f64,
    /// Assumed adverse fill difference on entries and exits, as a percentage.
    pub slippage_pct: f64,
    pub max_open_positions: usize,
    /// Fraction of the account risked per trade, as a percentage of balance.
    pub max_risk_pct: f64,
    /// Hard cap on one position's entry value as a fraction of the balance.
    pub max_position_fraction: f64,
    /// Targets expressed as multiples of the initial per-share risk.
    pub target1_multiplier: f64,
    pub target2_multiplier: f64,
    /// Trailing stop only arms after this many days held.
    pub trailing_min_days: i64,
    /// Unrealized gain (percent) required before the trailing stop tightens.
    pub trailing_trigger_gain_pct: f64,
    /// Tightened stop as a fraction of the current close.
    pub trailing_stop_fraction: f64,
    pub max_hold_days: i64,
    pub atr_stop_multiplier: f64,
    pub swing_low_lookback: usize,
    /// Discount applied to the stop before declaring an intrabar hit.
    pub stop_hit_tolerance: f64,
    /// A proposed stop at or above this fraction of the entry price is
    /// rejected as too tight to size against.
    pub max_stop_price_fraction: f64,
    /// Entries are not considered once cash falls to this floor.
    pub min_cash_to_trade: f64,
    /// Bars reserved at the front of the series for indicator warm-up.
    pub warmup_bars: usize,
    pub max_test_bars: usize,
    pub min_test_bars: usize,
    /// Annualization factor for the Sharpe ratio.
    pub bars_per_year: f64,
    /// Wall-clock bound on one symbol's simulation inside a batch. A symbol
    /// that exceeds it is abandoned and reported as a failure.
    pub symbol_timeout_secs: u64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            commission_pct: 0.2,
            slippage_pct: 0.1,
            max_open_positions: 5,
            max_risk_pct: 2.0,
            max_position_fraction: 0.25,
            target1_multiplier: 2.0,
            target2_multiplier: 3.0,
            trailing_min_days: 5,
            trailing_trigger_gain_pct: 10.0,
            trailing_stop_fraction: 0.95,
            max_hold_days: 30,
            atr_stop_multiplier: 2.0,
            swing_low_lookback: 20,
            stop_hit_tolerance: 0.005,
            max_stop_price_fraction: 0.9,
            min_cash_to_trade: 1_000.0,
            warmup_bars: 50,
            max_test_bars: 252,
            min_test_bars: 50,
            bars_per_year: 252.0,
            symbol_timeout_secs: 30,
        }
    }
}

impl BacktestConfig {
    /// Builds a config from a flat parameter map, falling back to defaults
    /// for absent keys and validating the result.
    pub fn from_parameters(parameters: &HashMap<String, f64>) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            initial_capital: get_param(parameters, "initial_capital", defaults.initial_capital),
            commission_pct: get_param(parameters, "commission_pct", defaults.commission_pct),
            slippage_pct: get_param(parameters, "slippage_pct", defaults.slippage_pct),
            max_open_positions: get_usize_param_min(
                parameters,
                "max_open_positions",
                defaults.max_open_positions,
                1,
            ),
            max_risk_pct: get_param(parameters, "max_risk_pct", defaults.max_risk_pct),
            max_position_fraction: get_param(
                parameters,
                "max_position_fraction",
                defaults.max_position_fraction,
            ),
            target1_multiplier: get_param(
                parameters,
                "target1_multiplier",
                defaults.target1_multiplier,
            ),
            target2_multiplier: get_param(
                parameters,
                "target2_multiplier",
                defaults.target2_multiplier,
            ),
            trailing_min_days: get_rounded_param(
                parameters,
                "trailing_min_days",
                defaults.trailing_min_days,
            ),
            trailing_trigger_gain_pct: get_param(
                parameters,
                "trailing_trigger_gain_pct",
                defaults.trailing_trigger_gain_pct,
            ),
            trailing_stop_fraction: get_param(
                parameters,
                "trailing_stop_fraction",
                defaults.trailing_stop_fraction,
            ),
            max_hold_days: get_rounded_param(parameters, "max_hold_days", defaults.max_hold_days),
            atr_stop_multiplier: get_param(
                parameters,
                "atr_stop_multiplier",
                defaults.atr_stop_multiplier,
            ),
            swing_low_lookback: get_usize_param_min(
                parameters,
                "stop_loss_lookback",
                defaults.swing_low_lookback,
                1,
            ),
            stop_hit_tolerance: get_param(
                parameters,
                "stop_hit_tolerance",
                defaults.stop_hit_tolerance,
            ),
            max_stop_price_fraction: get_param(
                parameters,
                "max_stop_price_fraction",
                defaults.max_stop_price_fraction,
            ),
            min_cash_to_trade: get_param(
                parameters,
                "min_cash_to_trade",
                defaults.min_cash_to_trade,
            ),
            warmup_bars: get_usize_param_min(parameters, "warmup_bars", defaults.warmup_bars, 0),
            max_test_bars: get_usize_param_min(
                parameters,
                "max_test_bars",
                defaults.max_test_bars,
                1,
            ),
            min_test_bars: get_usize_param_min(
                parameters,
                "min_test_bars",
                defaults.min_test_bars,
                1,
            ),
            bars_per_year: get_param(parameters, "bars_per_year", defaults.bars_per_year),
            symbol_timeout_secs: get_rounded_param(
                parameters,
                "symbol_timeout_secs",
                defaults.symbol_timeout_secs as i64,
            )
            .max(1) as u64,
        };
        config.validate()?;
        Ok(config)
    }

    /// Builds a config from a flat JSON object of named options.
    pub fn from_json_options(json: &str) -> Result<Self> {
        let raw: HashMap<String, Value> =
            serde_json::from_str(json).map_err(|error| anyhow!("Invalid options JSON: {}", error))?;
        Self::from_parameters(&normalize_parameter_map(raw))
    }

    pub fn validate(&self) -> Result<()> {
        ensure_positive("initial_capital", self.initial_capital)?;
        ensure_range("commission_pct", self.commission_pct, 0.0, 100.0)?;
        ensure_range("slippage_pct", self.slippage_pct, 0.0, 100.0)?;
        if self.max_open_positions == 0 {
            return Err(anyhow!("max_open_positions must be at least 1"));
        }
        ensure_positive("max_risk_pct", self.max_risk_pct)?;
        ensure_range("max_risk_pct", self.max_risk_pct, 0.0, 100.0)?;
        ensure_positive("max_position_fraction", self.max_position_fraction)?;
        ensure_range("max_position_fraction", self.max_position_fraction, 0.0, 1.0)?;
        ensure_positive("target1_multiplier", self.target1_multiplier)?;
        ensure_positive("target2_multiplier", self.target2_multiplier)?;
        ensure_positive("trailing_trigger_gain_pct", self.trailing_trigger_gain_pct)?;
        ensure_positive("trailing_stop_fraction", self.trailing_stop_fraction)?;
        ensure_range("trailing_stop_fraction", self.trailing_stop_fraction, 0.0, 1.0)?;
        if self.max_hold_days < 1 {
            return Err(anyhow!(
                "max_hold_days must be at least 1 (value: {})",
                self.max_hold_days
            ));
        }
        ensure_positive("atr_stop_multiplier", self.atr_stop_multiplier)?;
        ensure_range("stop_hit_tolerance", self.stop_hit_tolerance, 0.0, 1.0)?;
        ensure_positive("max_stop_price_fraction", self.max_stop_price_fraction)?;
        ensure_range("max_stop_price_fraction", self.max_stop_price_fraction, 0.0, 1.0)?;
        if self.min_cash_to_trade < 0.0 {
            return Err(anyhow!(
                "min_cash_to_trade must not be negative (value: {})",
                self.min_cash_to_trade
            ));
        }
        if self.min_test_bars == 0 {
            return Err(anyhow!("min_test_bars must be at least 1"));
        }
        if self.max_test_bars < self.min_test_bars {
            return Err(anyhow!(
                "max_test_bars ({}) must be >= min_test_bars ({})",
                self.max_test_bars,
                self.min_test_bars
            ));
        }
        ensure_positive("bars_per_year", self.bars_per_year)?;
        if self.symbol_timeout_secs == 0 {
            return Err(anyhow!("symbol_timeout_secs must be at least 1"));
        }
        Ok(())
    }
}

fn ensure_positive(key: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(anyhow!("{} must be a positive number (value: {})", key, value));
    }
    Ok(())
}

fn ensure_range(key: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if !value.is_finite() || value < min || value >= max {
        return Err(anyhow!(
            "{} must be in [{}, {}) (value: {})",
            key,
            min,
            max,
            value
        ));
    }
    Ok(())
}

fn normalize_parameter_map(raw: HashMap<String, Value>) -> HashMap<String, f64> {
    let mut cleaned = HashMap::with_capacity(raw.len());

    for (key, value) in raw.into_iter() {
        if let Some(num) = value.as_f64() {
            if num.is_finite() {
                cleaned.insert(key, num);
            } else {
                warn!(
                    "Skipping option `{}` due to non-finite numeric value {}",
                    key, value
                );
            }
            continue;
        }

        if let Some(text) = value.as_str() {
            match text.trim().parse::<f64>() {
                Ok(parsed) if parsed.is_finite() => {
                    cleaned.insert(key, parsed);
                }
                _ => {
                    warn!(
                        "Skipping option `{}` due to non-numeric string value {:?}",
                        key, text
                    );
                }
            }
            continue;
        }

        if let Some(boolean) = value.as_bool() {
            cleaned.insert(key, if boolean { 1.0 } else { 0.0 });
            continue;
        }

        warn!("Skipping option `{}` due to unsupported value {}", key, value);
    }

    cleaned
}
