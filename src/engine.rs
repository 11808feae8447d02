use crate::config::BacktestConfig;
use crate::error::{BacktestError, SignalError};
use crate::history::PointInTime;
use crate::ledger::PortfolioLedger;
use crate::models::{Candle, SymbolBacktest, Trade};
use crate::performance::PerformanceCalculator;
use crate::signal::{SignalEvaluator, StopTargetProposer};
use crate::status::CancelFlag;
use crate::trading_rules::{
    evaluate_exit_rules, risk_based_position_size, ExitAction, ExitRuleParams, PositionSizeParams,
    PRICE_EPSILON,
};
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::HashMap;
use uuid::Uuid;

/// Single-symbol bar-by-bar simulation driver.
///
/// The driver walks the test window in order. On each bar it first updates
/// excursions and runs the exit rules against every open position, then
/// considers at most one new entry, then samples equity at the close.
/// Signal collaborators only ever see the bar prefix ending at the current
/// bar, so no decision can depend on later data.
pub struct Backtester {
    config: BacktestConfig,
}

enum EntryOutcome {
    Entered,
    NoSignal,
    SignalFailed(SignalError),
    RejectedStop { stop: f64 },
    NoShares,
    InsufficientCash { required: f64 },
}

impl Backtester {
    pub fn new(config: BacktestConfig) -> Self {
        Self { config }
    }

    pub fn from_parameters(parameters: &HashMap<String, f64>) -> anyhow::Result<Self> {
        Ok(Self::new(BacktestConfig::from_parameters(parameters)?))
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn run_symbol(
        &self,
        symbol: &str,
        bars: &[Candle],
        signals: &dyn SignalEvaluator,
        stops: &dyn StopTargetProposer,
        cancel: &CancelFlag,
    ) -> Result<SymbolBacktest, BacktestError> {
        if bars.is_empty() {
            return Err(BacktestError::EmptySeries);
        }
        for (i, pair) in bars.windows(2).enumerate() {
            if pair[1].date <= pair[0].date {
                return Err(BacktestError::UnorderedSeries { index: i + 1 });
            }
        }

        let config = &self.config;
        let test_bars = config
            .max_test_bars
            .min(bars.len().saturating_sub(config.warmup_bars));
        if test_bars < config.min_test_bars {
            return Err(BacktestError::InsufficientData {
                required: config.min_test_bars,
                available: test_bars,
            });
        }

        let start_index = bars.len() - test_bars;
        let view = PointInTime::new(bars);
        let mut ledger = PortfolioLedger::new(config.initial_capital);
        let mut entries_missed_for_cash = 0;
        let mut signal_errors = 0;

        for index in start_index..bars.len() {
            if cancel.is_cancelled() {
                return Err(BacktestError::Cancelled);
            }
            let candle = &bars[index];

            ledger.update_open_excursions(candle.close);
            self.process_exits(&mut ledger, candle);

            if ledger.open_count() < config.max_open_positions
                && ledger.cash() > config.min_cash_to_trade
            {
                match self.try_enter(&view, index, &mut ledger, signals, stops) {
                    EntryOutcome::Entered | EntryOutcome::NoSignal | EntryOutcome::NoShares => {}
                    EntryOutcome::SignalFailed(error) => {
                        warn!("{}: signal error at {}: {}", symbol, candle.date, error);
                        signal_errors += 1;
                    }
                    EntryOutcome::RejectedStop { stop } => {
                        debug!(
                            "{}: rejected stop {:.2} against close {:.2} at {}",
                            symbol, stop, candle.close, candle.date
                        );
                    }
                    EntryOutcome::InsufficientCash { required } => {
                        debug!(
                            "{}: entry needs {:.2} but only {:.2} cash at {}",
                            symbol,
                            required,
                            ledger.cash(),
                            candle.date
                        );
                        entries_missed_for_cash += 1;
                    }
                }
            }

            ledger.sample_equity(candle.date, candle.close);
        }

        let last = &bars[bars.len() - 1];
        ledger.liquidate_all(last, config.commission_pct);

        let (_cash, trades, equity_curve) = ledger.finish();
        let summary = PerformanceCalculator::summarize(
            &trades,
            &equity_curve,
            config.initial_capital,
            config.bars_per_year,
        );
        info!(
            "{}: {} trades over {} bars, net {:.2}",
            symbol,
            trades.len(),
            test_bars,
            summary.total_profit
        );

        Ok(SymbolBacktest {
            id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            start_date: bars[start_index].date,
            end_date: last.date,
            bars_tested: test_bars,
            initial_capital: config.initial_capital,
            trades,
            equity_curve,
            summary,
            entries_missed_for_cash,
            signal_errors,
            created_at: Utc::now(),
        })
    }

    /// Runs the exit rules for every open position against one bar. The index
    /// only advances on a hold so removals cannot skip a position.
    fn process_exits(&self, ledger: &mut PortfolioLedger, candle: &Candle) {
        let config = &self.config;
        let mut index = 0;
        while index < ledger.open_count() {
            let evaluation = {
                let trade = &ledger.open_trades()[index];
                let days_held = (candle.date - trade.entry_date).num_days();
                evaluate_exit_rules(ExitRuleParams {
                    trade,
                    candle,
                    days_held,
                    config,
                })
            };

            if let Some(new_stop) = evaluation.raised_stop {
                if ledger.raise_stop(index, new_stop) {
                    debug!(
                        "{}: trailing stop raised to {:.2} at {}",
                        candle.symbol, new_stop, candle.date
                    );
                }
            }

            match evaluation.action {
                ExitAction::Close { price, reason } => {
                    ledger.close_position(index, candle.date, price, reason, config.commission_pct);
                }
                ExitAction::Hold => index += 1,
            }
        }
    }

    fn try_enter(
        &self,
        view: &PointInTime,
        index: usize,
        ledger: &mut PortfolioLedger,
        signals: &dyn SignalEvaluator,
        stops: &dyn StopTargetProposer,
    ) -> EntryOutcome {
        let config = &self.config;
        let prefix = match view.prefix(index) {
            Some(prefix) => prefix,
            None => return EntryOutcome::NoSignal,
        };
        let candle = match prefix.last() {
            Some(candle) => candle,
            None => return EntryOutcome::NoSignal,
        };

        let series = match signals.compute_indicators(prefix) {
            Ok(series) => series,
            Err(error) => return EntryOutcome::SignalFailed(error),
        };
        match signals.evaluate_entry(&series, config) {
            Ok(true) => {}
            Ok(false) => return EntryOutcome::NoSignal,
            Err(error) => return EntryOutcome::SignalFailed(error),
        }
        let proposal = match stops.propose_stop_and_targets(&series, config) {
            Ok(proposal) => proposal,
            Err(error) => return EntryOutcome::SignalFailed(error),
        };

        // A stop at or above this fraction of the close leaves too little
        // room to size a position against.
        let close = candle.close;
        if proposal.stop_loss <= PRICE_EPSILON
            || proposal.stop_loss >= close * config.max_stop_price_fraction
        {
            return EntryOutcome::RejectedStop {
                stop: proposal.stop_loss,
            };
        }

        let entry_price = close * (1.0 + config.slippage_pct / 100.0);
        let shares = risk_based_position_size(PositionSizeParams {
            balance: ledger.cash(),
            risk_pct: config.max_risk_pct,
            entry_price,
            stop_price: proposal.stop_loss,
            max_position_fraction: config.max_position_fraction,
        });
        if shares < 1 {
            return EntryOutcome::NoShares;
        }

        let trade = Trade::open(
            &candle.symbol,
            candle.date,
            entry_price,
            proposal.stop_loss,
            proposal.target1,
            proposal.target2,
            shares,
        );
        let cost = trade.entry_cost(config.commission_pct);
        if ledger.try_open(trade, cost) {
            EntryOutcome::Entered
        } else {
            EntryOutcome::InsufficientCash { required: cost }
        }
    }
}
