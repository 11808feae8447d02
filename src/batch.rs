use crate::config::BacktestConfig;
use crate::engine::Backtester;
use crate::models::{Candle, SymbolBacktest};
use crate::signal::{SignalEvaluator, StopTargetProposer};
use crate::status::{BatchStatus, CancelFlag};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// One symbol's bar history queued for a batch run.
#[derive(Debug, Clone)]
pub struct SymbolSeries {
    pub symbol: String,
    pub bars: Vec<Candle>,
}

#[derive(Debug, Clone)]
pub struct SymbolFailure {
    pub symbol: String,
    pub reason: String,
}

/// Everything a batch produced: completed runs plus per-symbol failures.
/// Both lists are sorted by symbol so outcomes are stable across runs
/// regardless of worker scheduling.
#[derive(Debug)]
pub struct BatchOutcome {
    pub completed: Vec<SymbolBacktest>,
    pub failures: Vec<SymbolFailure>,
}

struct SymbolResult {
    symbol: String,
    run: Result<SymbolBacktest, String>,
}

/// Fans a list of symbols out over a worker pool, one independent simulation
/// per symbol. Workers share nothing but the read-only collaborators and the
/// cancellation flag.
pub struct BatchBacktester {
    config: BacktestConfig,
}

impl BatchBacktester {
    pub fn new(config: BacktestConfig) -> Self {
        Self { config }
    }

    pub fn run(
        &self,
        series: Vec<SymbolSeries>,
        signals: Arc<dyn SignalEvaluator>,
        stops: Arc<dyn StopTargetProposer>,
        status: &BatchStatus,
        cancel: &CancelFlag,
    ) -> BatchOutcome {
        let total = series.len();
        status.set_phase("running", total);
        if total == 0 {
            status.mark_done();
            return BatchOutcome {
                completed: Vec::new(),
                failures: Vec::new(),
            };
        }

        let num_workers = num_cpus::get().max(1).min(total);
        info!("Batch of {} symbols across {} workers", total, num_workers);

        let (task_tx, task_rx): (Sender<SymbolSeries>, Receiver<SymbolSeries>) = bounded(total);
        let (result_tx, result_rx): (Sender<SymbolResult>, Receiver<SymbolResult>) =
            bounded(total);

        let mut handles = Vec::with_capacity(num_workers);
        for _ in 0..num_workers {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let signals = Arc::clone(&signals);
            let stops = Arc::clone(&stops);
            let cancel = cancel.clone();
            let config = self.config.clone();

            handles.push(thread::spawn(move || {
                let engine = Backtester::new(config);
                while let Ok(task) = task_rx.recv() {
                    let run = engine
                        .run_symbol(
                            &task.symbol,
                            &task.bars,
                            signals.as_ref(),
                            stops.as_ref(),
                            &cancel,
                        )
                        .map_err(|error| error.to_string());
                    let message = SymbolResult {
                        symbol: task.symbol,
                        run,
                    };
                    if result_tx.send(message).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(task_rx);
        drop(result_tx);

        let mut failures = Vec::new();
        let mut outstanding: HashSet<String> = HashSet::new();
        for task in series {
            if cancel.is_cancelled() {
                failures.push(SymbolFailure {
                    symbol: task.symbol,
                    reason: "cancelled before start".to_string(),
                });
                continue;
            }
            let symbol = task.symbol.clone();
            // Channel capacity covers every task, so send cannot block.
            if task_tx.send(task).is_ok() {
                outstanding.insert(symbol);
            }
        }
        drop(task_tx);

        // Each wait for the next result is bounded. A worker stuck inside a
        // collaborator cannot stall the batch: once the deadline passes, the
        // remaining symbols are written off and their threads abandoned.
        let timeout = Duration::from_secs(self.config.symbol_timeout_secs);
        let mut completed = Vec::new();
        let mut timed_out = false;
        while !outstanding.is_empty() {
            let result = match result_rx.recv_timeout(timeout) {
                Ok(result) => result,
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "{} symbols unfinished after {}s, abandoning them",
                        outstanding.len(),
                        self.config.symbol_timeout_secs
                    );
                    cancel.cancel();
                    timed_out = true;
                    let mut overdue: Vec<String> = outstanding.drain().collect();
                    overdue.sort();
                    for symbol in overdue {
                        status.record_failure();
                        failures.push(SymbolFailure {
                            symbol,
                            reason: format!(
                                "timed out after {}s",
                                self.config.symbol_timeout_secs
                            ),
                        });
                    }
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };
            outstanding.remove(&result.symbol);
            match result.run {
                Ok(backtest) => {
                    status.record_completion(backtest.summary.sharpe_ratio);
                    completed.push(backtest);
                }
                Err(reason) => {
                    warn!("{}: backtest failed: {}", result.symbol, reason);
                    status.record_failure();
                    failures.push(SymbolFailure {
                        symbol: result.symbol,
                        reason,
                    });
                }
            }
        }

        // A stalled worker thread cannot be joined; dropping its handle
        // detaches it instead.
        if !timed_out {
            for handle in handles {
                let _ = handle.join();
            }
        }

        completed.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        failures.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        status.mark_done();
        info!(
            "Batch finished: {} completed, {} failed",
            completed.len(),
            failures.len()
        );
        BatchOutcome {
            completed,
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SignalError;
    use crate::signal::{AnnotatedSeries, StopTargets};
    use chrono::{Duration, TimeZone, Utc};

    struct EnterOnFirstTestBar;

    impl SignalEvaluator for EnterOnFirstTestBar {
        fn compute_indicators(&self, history: &[Candle]) -> Result<AnnotatedSeries, SignalError> {
            Ok(AnnotatedSeries::from_prefix(history))
        }

        fn evaluate_entry(
            &self,
            series: &AnnotatedSeries,
            _config: &BacktestConfig,
        ) -> Result<bool, SignalError> {
            Ok(series.len() == 51)
        }
    }

    struct WideProposer;

    impl StopTargetProposer for WideProposer {
        fn propose_stop_and_targets(
            &self,
            series: &AnnotatedSeries,
            _config: &BacktestConfig,
        ) -> Result<StopTargets, SignalError> {
            let close = series
                .latest()
                .ok_or_else(|| SignalError::Proposal("empty series".to_string()))?
                .close;
            Ok(StopTargets {
                stop_loss: close * 0.85,
                target1: close * 1.5,
                target2: close * 1.6,
            })
        }
    }

    fn flat_series(symbol: &str, count: usize) -> SymbolSeries {
        let base = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
        SymbolSeries {
            symbol: symbol.to_string(),
            bars: (0..count)
                .map(|i| Candle {
                    symbol: symbol.to_string(),
                    date: base + Duration::days(i as i64),
                    open: 100.0,
                    high: 100.5,
                    low: 99.5,
                    close: 100.0,
                    volume_shares: 1_000,
                })
                .collect(),
        }
    }

    #[test]
    fn mixed_batch_separates_completions_from_failures() {
        let _ = env_logger::builder().is_test(true).try_init();
        let batch = BatchBacktester::new(BacktestConfig::default());
        let status = BatchStatus::new();
        let outcome = batch.run(
            vec![
                flat_series("BBB", 110),
                flat_series("AAA", 110),
                flat_series("SHORT", 60),
            ],
            Arc::new(EnterOnFirstTestBar),
            Arc::new(WideProposer),
            &status,
            &CancelFlag::new(),
        );

        assert_eq!(outcome.completed.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        // Sorted by symbol, independent of worker scheduling.
        assert_eq!(outcome.completed[0].symbol, "AAA");
        assert_eq!(outcome.completed[1].symbol, "BBB");
        assert_eq!(outcome.failures[0].symbol, "SHORT");
        assert!(outcome.failures[0].reason.contains("insufficient data"));

        let snapshot = status.snapshot();
        assert_eq!(snapshot.phase, "done");
        assert_eq!(snapshot.completed_symbols, 2);
        assert_eq!(snapshot.failed_symbols, 1);
    }

    /// Never signals, but stalls inside the indicator pass for the symbol
    /// named `SLOW`.
    struct StallingEvaluator;

    impl SignalEvaluator for StallingEvaluator {
        fn compute_indicators(&self, history: &[Candle]) -> Result<AnnotatedSeries, SignalError> {
            if history.first().map(|bar| bar.symbol.as_str()) == Some("SLOW") {
                std::thread::sleep(std::time::Duration::from_secs(5));
            }
            Ok(AnnotatedSeries::from_prefix(history))
        }

        fn evaluate_entry(
            &self,
            _series: &AnnotatedSeries,
            _config: &BacktestConfig,
        ) -> Result<bool, SignalError> {
            Ok(false)
        }
    }

    #[test]
    fn stalled_symbol_is_timed_out_not_awaited() {
        let config = BacktestConfig {
            symbol_timeout_secs: 1,
            ..BacktestConfig::default()
        };
        let batch = BatchBacktester::new(config);
        let status = BatchStatus::new();
        let outcome = batch.run(
            vec![flat_series("AAA", 110), flat_series("SLOW", 110)],
            Arc::new(StallingEvaluator),
            Arc::new(WideProposer),
            &status,
            &CancelFlag::new(),
        );

        assert_eq!(outcome.completed.len(), 1);
        assert_eq!(outcome.completed[0].symbol, "AAA");
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].symbol, "SLOW");
        assert!(outcome.failures[0].reason.contains("timed out"));
        assert_eq!(status.snapshot().failed_symbols, 1);
    }

    #[test]
    fn cancelled_batch_skips_undispatched_symbols() {
        let batch = BatchBacktester::new(BacktestConfig::default());
        let status = BatchStatus::new();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let outcome = batch.run(
            vec![flat_series("AAA", 110), flat_series("BBB", 110)],
            Arc::new(EnterOnFirstTestBar),
            Arc::new(WideProposer),
            &status,
            &cancel,
        );

        assert!(outcome.completed.is_empty());
        assert_eq!(outcome.failures.len(), 2);
        assert!(outcome
            .failures
            .iter()
            .all(|f| f.reason.contains("cancelled")));
    }

    #[test]
    fn empty_batch_finishes_immediately() {
        let batch = BatchBacktester::new(BacktestConfig::default());
        let status = BatchStatus::new();
        let outcome = batch.run(
            Vec::new(),
            Arc::new(EnterOnFirstTestBar),
            Arc::new(WideProposer),
            &status,
            &CancelFlag::new(),
        );
        assert!(outcome.completed.is_empty());
        assert!(outcome.failures.is_empty());
        assert_eq!(status.snapshot().phase, "done");
    }
}
