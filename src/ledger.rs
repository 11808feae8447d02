use crate::models::{Candle, EquitySample, ExitReason, Trade};
use chrono::{DateTime, Utc};
use log::debug;

/// Cash, open positions, closed trades and the per-bar equity curve of one
/// simulation run.
///
/// The ledger is the only place money moves: entries debit cash by the full
/// commission-inclusive cost, exits credit the commission-reduced proceeds.
/// Equity sampled on a bar is always exactly cash plus the mark-to-market
/// value of the open positions at that bar's close.
#[derive(Debug)]
pub struct PortfolioLedger {
    cash: f64,
    open_trades: Vec<Trade>,
    closed_trades: Vec<Trade>,
    equity_curve: Vec<EquitySample>,
}

impl PortfolioLedger {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            cash: initial_capital,
            open_trades: Vec::new(),
            closed_trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn open_count(&self) -> usize {
        self.open_trades.len()
    }

    pub fn open_trades(&self) -> &[Trade] {
        &self.open_trades
    }

    pub fn closed_trades(&self) -> &[Trade] {
        &self.closed_trades
    }

    pub fn equity_curve(&self) -> &[EquitySample] {
        &self.equity_curve
    }

    /// Attempts to take a position. The entry is rejected, leaving the ledger
    /// untouched, when its full cost exceeds available cash.
    pub fn try_open(&mut self, trade: Trade, entry_cost: f64) -> bool {
        if entry_cost > self.cash {
            return false;
        }
        self.cash -= entry_cost;
        debug!(
            "{}: opened {} shares at {:.2}, stop {:.2}, cash left {:.2}",
            trade.symbol, trade.shares, trade.entry_price, trade.stop_loss, self.cash
        );
        self.open_trades.push(trade);
        true
    }

    pub fn update_open_excursions(&mut self, current_price: f64) {
        for trade in &mut self.open_trades {
            trade.update_excursions(current_price);
        }
    }

    pub fn raise_stop(&mut self, index: usize, new_stop: f64) -> bool {
        self.open_trades[index].raise_stop(new_stop)
    }

    /// Closes the open position at `index`, credits the proceeds and moves
    /// the trade to the closed list. Returns the realized profit.
    pub fn close_position(
        &mut self,
        index: usize,
        exit_date: DateTime<Utc>,
        exit_price: f64,
        reason: ExitReason,
        commission_pct: f64,
    ) -> f64 {
        let mut trade = self.open_trades.remove(index);
        let profit = trade.close(exit_date, exit_price, reason, commission_pct);
        self.cash += trade.shares as f64 * exit_price * (1.0 - commission_pct / 100.0);
        debug!(
            "{}: closed {} shares at {:.2} ({}), profit {:.2}",
            trade.symbol,
            trade.shares,
            exit_price,
            reason.as_str(),
            profit
        );
        self.closed_trades.push(trade);
        profit
    }

    /// Mark-to-market value of every open position at the given price.
    pub fn open_value(&self, current_price: f64) -> f64 {
        self.open_trades
            .iter()
            .map(|trade| trade.shares as f64 * current_price)
            .sum()
    }

    /// Records one equity-curve sample at the given bar close.
    pub fn sample_equity(&mut self, date: DateTime<Utc>, close: f64) {
        let open_value = self.open_value(close);
        self.equity_curve.push(EquitySample {
            date,
            equity: self.cash + open_value,
            cash: self.cash,
            open_positions: self.open_trades.len() as i32,
            open_value,
        });
    }

    /// Force-closes every remaining open position at the final bar's close.
    pub fn liquidate_all(&mut self, last_bar: &Candle, commission_pct: f64) {
        while !self.open_trades.is_empty() {
            self.close_position(
                0,
                last_bar.date,
                last_bar.close,
                ExitReason::BacktestEnd,
                commission_pct,
            );
        }
    }

    /// Consumes the ledger and returns its final cash, closed trades and
    /// equity curve.
    pub fn finish(self) -> (f64, Vec<Trade>, Vec<EquitySample>) {
        debug_assert!(self.open_trades.is_empty(), "open positions at finish");
        (self.cash, self.closed_trades, self.equity_curve)
    }
}
