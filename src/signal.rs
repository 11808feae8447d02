use crate::config::BacktestConfig;
use crate::error::SignalError;
use crate::models::Candle;
use std::collections::HashMap;

/// Column name the default stop model looks up for an average-true-range
/// annotation. Evaluators that compute ATR should publish it under this name.
pub const ATR_COLUMN: &str = "atr";

/// A bar prefix enriched with named indicator columns.
///
/// This is what the signal collaborators exchange: the candles they were
/// given plus whatever per-bar values their indicator pass derived. Columns
/// are aligned with the candles one-to-one.
#[derive(Debug, Clone)]
pub struct AnnotatedSeries {
    candles: Vec<Candle>,
    columns: HashMap<String, Vec<f64>>,
}

impl AnnotatedSeries {
    pub fn new(candles: Vec<Candle>) -> Self {
        Self {
            candles,
            columns: HashMap::new(),
        }
    }

    pub fn from_prefix(prefix: &[Candle]) -> Self {
        Self::new(prefix.to_vec())
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn latest(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn insert_column(&mut self, name: &str, values: Vec<f64>) -> Result<(), SignalError> {
        if values.len() != self.candles.len() {
            return Err(SignalError::ColumnLength {
                expected: self.candles.len(),
                actual: values.len(),
            });
        }
        self.columns.insert(name.to_string(), values);
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn latest_value(&self, name: &str) -> Option<f64> {
        self.columns.get(name).and_then(|values| values.last().copied())
    }
}

/// Stop and target levels proposed for a candidate entry at the latest bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopTargets {
    pub stop_loss: f64,
    pub target1: f64,
    pub target2: f64,
}

/// The rule set deciding whether the latest bar of a prefix qualifies for
/// entry. Implementations live outside this crate; the engine only ever
/// hands them the point-in-time prefix, never the full series.
pub trait SignalEvaluator: Send + Sync {
    fn compute_indicators(&self, history: &[Candle]) -> Result<AnnotatedSeries, SignalError>;

    fn evaluate_entry(
        &self,
        series: &AnnotatedSeries,
        config: &BacktestConfig,
    ) -> Result<bool, SignalError>;
}

/// Proposes stop-loss and target levels for an accepted entry signal.
pub trait StopTargetProposer: Send + Sync {
    fn propose_stop_and_targets(
        &self,
        series: &AnnotatedSeries,
        config: &BacktestConfig,
    ) -> Result<StopTargets, SignalError>;
}

/// Default stop/target model: the wider of an ATR-based stop and a discounted
/// swing low, with targets at configured multiples of the initial risk.
///
/// Reads the `atr` column when the evaluator annotated one and otherwise
/// falls back to a tenth of the latest bar's range.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwingStopModel;

impl StopTargetProposer for SwingStopModel {
    fn propose_stop_and_targets(
        &self,
        series: &AnnotatedSeries,
        config: &BacktestConfig,
    ) -> Result<StopTargets, SignalError> {
        let latest = series
            .latest()
            .ok_or_else(|| SignalError::Proposal("series has no bars".to_string()))?;
        let close = latest.close;

        let atr = series
            .latest_value(ATR_COLUMN)
            .filter(|value| value.is_finite() && *value > 0.0)
            .unwrap_or((latest.high - latest.low) * 0.1)
            .max(0.01);
        let atr_stop = close - config.atr_stop_multiplier * atr;

        let lookback = config.swing_low_lookback.min(series.len());
        let swing_stop = if lookback > 0 {
            let tail = &series.candles()[series.len() - lookback..];
            let lowest = tail.iter().map(|bar| bar.low).fold(f64::INFINITY, f64::min);
            lowest * 0.98
        } else {
            close * 0.95
        };

        let stop_loss = atr_stop.max(swing_stop);
        let risk = close - stop_loss;

        Ok(StopTargets {
            stop_loss,
            target1: close + risk * config.target1_multiplier,
            target2: close + risk * config.target2_multiplier,
        })
    }
}
