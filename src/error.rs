use thiserror::Error;

/// Failures that abort a single symbol's simulation. These never escape the
/// batch runner; they become per-symbol failure entries in the batch outcome.
#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("insufficient data: need at least {required} test bars, got {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("bar series is empty")]
    EmptySeries,

    #[error("bar series timestamps are not strictly increasing at index {index}")]
    UnorderedSeries { index: usize },

    #[error("backtest cancelled")]
    Cancelled,
}

/// Failures raised by the indicator/signal collaborators. The driver catches
/// these per bar, logs them, and treats the bar as having no entry signal.
#[derive(Error, Debug)]
pub enum SignalError {
    #[error("indicator computation failed: {0}")]
    Indicators(String),

    #[error("entry evaluation failed: {0}")]
    Entry(String),

    #[error("stop/target proposal failed: {0}")]
    Proposal(String),

    #[error("indicator column length mismatch: expected {expected}, got {actual}")]
    ColumnLength { expected: usize, actual: usize },
}
