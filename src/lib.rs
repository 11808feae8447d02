//! Bar-driven swing trade simulation engine.
//!
//! Feed it a symbol's daily candles plus an entry-signal evaluator and a
//! stop/target proposer, and it replays the most recent test window bar by
//! bar: risk-sized entries, stop-loss and target exits, a tighten-only
//! trailing stop, a maximum holding period and forced liquidation at the end
//! of the series. Each run yields the closed trades, the per-bar equity
//! curve and a performance summary. [`batch::BatchBacktester`] fans
//! independent symbol runs out over a worker pool.

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod ledger;
pub mod models;
pub mod param_utils;
pub mod performance;
pub mod signal;
pub mod status;
pub mod trading_rules;

pub use batch::{BatchBacktester, BatchOutcome, SymbolFailure, SymbolSeries};
pub use config::BacktestConfig;
pub use engine::Backtester;
pub use error::{BacktestError, SignalError};
pub use models::{
    Candle, EquitySample, ExitReason, PerformanceSummary, SymbolBacktest, Trade, TradeStatus,
};
pub use performance::PerformanceCalculator;
pub use signal::{
    AnnotatedSeries, SignalEvaluator, StopTargetProposer, StopTargets, SwingStopModel,
};
pub use status::{BatchStatus, BatchStatusSnapshot, CancelFlag};
