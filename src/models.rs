use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One unit of historical price data for a fixed trading period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub date: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume_shares: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Open,
    ClosedProfit,
    ClosedLoss,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Open => "open",
            TradeStatus::ClosedProfit => "closed_profit",
            TradeStatus::ClosedLoss => "closed_loss",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    Target1Reached,
    MaxHoldTime,
    BacktestEnd,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::Target1Reached => "target1_reached",
            ExitReason::MaxHoldTime => "max_hold_time",
            ExitReason::BacktestEnd => "backtest_end",
        }
    }
}

/// One simulated position, from entry to exit.
///
/// The lifecycle is single-writer: the driver creates it, the exit rules may
/// raise its stop, and it is closed exactly once. Exit fields stay at their
/// defaults until closure and are never touched afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub symbol: String,
    pub entry_date: DateTime<Utc>,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub target1: f64,
    pub target2: f64,
    pub shares: i32,
    pub status: TradeStatus,
    pub exit_date: Option<DateTime<Utc>>,
    pub exit_price: Option<f64>,
    pub exit_reason: Option<ExitReason>,
    pub profit: f64,
    pub profit_pct: f64,
    pub days_held: i64,
    pub max_favorable_excursion: f64,
    pub max_adverse_excursion: f64,
}

impl Trade {
    pub fn open(
        symbol: &str,
        entry_date: DateTime<Utc>,
        entry_price: f64,
        stop_loss: f64,
        target1: f64,
        target2: f64,
        shares: i32,
    ) -> Self {
        debug_assert!(stop_loss < entry_price, "stop must sit below entry");
        debug_assert!(shares >= 1, "trades require at least one share");
        Self {
            symbol: symbol.to_string(),
            entry_date,
            entry_price,
            stop_loss,
            target1,
            target2,
            shares,
            status: TradeStatus::Open,
            exit_date: None,
            exit_price: None,
            exit_reason: None,
            profit: 0.0,
            profit_pct: 0.0,
            days_held: 0,
            max_favorable_excursion: 0.0,
            max_adverse_excursion: 0.0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    /// Gross cost of entering this position, commission included.
    pub fn entry_cost(&self, commission_pct: f64) -> f64 {
        self.shares as f64 * self.entry_price * (1.0 + commission_pct / 100.0)
    }

    /// Tracks the best and worst percentage move since entry while open.
    /// Favorable excursion never decreases, adverse never increases.
    pub fn update_excursions(&mut self, current_price: f64) {
        if !self.is_open() || self.entry_price <= 0.0 {
            return;
        }
        let pct_change = (current_price - self.entry_price) / self.entry_price * 100.0;
        if pct_change > self.max_favorable_excursion {
            self.max_favorable_excursion = pct_change;
        }
        if pct_change < self.max_adverse_excursion {
            self.max_adverse_excursion = pct_change;
        }
    }

    /// Tightens the stop. Moves only upward; returns whether it moved.
    pub fn raise_stop(&mut self, new_stop: f64) -> bool {
        if self.is_open() && new_stop > self.stop_loss {
            self.stop_loss = new_stop;
            true
        } else {
            false
        }
    }

    /// Closes the position and computes realized profit net of commission on
    /// both legs. Returns the realized profit.
    pub fn close(
        &mut self,
        exit_date: DateTime<Utc>,
        exit_price: f64,
        exit_reason: ExitReason,
        commission_pct: f64,
    ) -> f64 {
        debug_assert!(self.is_open(), "trade closed twice");
        self.exit_date = Some(exit_date);
        self.exit_price = Some(exit_price);
        self.exit_reason = Some(exit_reason);
        self.days_held = (exit_date - self.entry_date).num_days();

        let entry_cost = self.entry_cost(commission_pct);
        let exit_value = self.shares as f64 * exit_price * (1.0 - commission_pct / 100.0);
        let profit = exit_value - entry_cost;
        self.profit = profit;
        self.profit_pct = if entry_cost > 0.0 {
            profit / entry_cost * 100.0
        } else {
            0.0
        };
        self.status = if profit > 0.0 {
            TradeStatus::ClosedProfit
        } else {
            TradeStatus::ClosedLoss
        };
        profit
    }
}

/// One ledger snapshot per bar. Equity is cash plus the mark-to-market value
/// of every open position at that bar's close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquitySample {
    pub date: DateTime<Utc>,
    pub equity: f64,
    pub cash: f64,
    pub open_positions: i32,
    pub open_value: f64,
}

/// Summary statistics over the closed-trade list and equity curve of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub total_trades: i32,
    pub winning_trades: i32,
    pub losing_trades: i32,
    pub win_rate: f64,
    pub total_profit: f64,
    pub total_return_pct: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub profit_factor: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub expectancy: f64,
    pub avg_days_held: f64,
    pub avg_mfe: f64,
    pub avg_mae: f64,
    pub initial_capital: f64,
    pub final_equity: f64,
}

/// Completed simulation output for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolBacktest {
    pub id: String,
    pub symbol: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub bars_tested: usize,
    pub initial_capital: f64,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquitySample>,
    pub summary: PerformanceSummary,
    pub entries_missed_for_cash: i32,
    pub signal_errors: i32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn base_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap()
    }

    fn open_trade() -> Trade {
        Trade::open("TST", base_date(), 100.0, 90.0, 120.0, 130.0, 10)
    }

    #[test]
    fn close_applies_commission_on_both_legs() {
        let mut trade = open_trade();
        let profit = trade.close(
            base_date() + Duration::days(7),
            110.0,
            ExitReason::Target1Reached,
            0.2,
        );

        let entry_cost = 10.0 * 100.0 * 1.002;
        let exit_value = 10.0 * 110.0 * 0.998;
        assert!((profit - (exit_value - entry_cost)).abs() < 1e-9);
        assert_eq!(trade.status, TradeStatus::ClosedProfit);
        assert_eq!(trade.exit_reason, Some(ExitReason::Target1Reached));
        assert_eq!(trade.days_held, 7);
        assert!((trade.profit_pct - profit / entry_cost * 100.0).abs() < 1e-9);
    }

    #[test]
    fn losing_close_sets_closed_loss_status() {
        let mut trade = open_trade();
        let profit = trade.close(
            base_date() + Duration::days(3),
            92.0,
            ExitReason::StopLoss,
            0.2,
        );
        assert!(profit < 0.0);
        assert_eq!(trade.status, TradeStatus::ClosedLoss);
    }

    #[test]
    fn excursions_are_monotone() {
        let mut trade = open_trade();
        trade.update_excursions(110.0);
        trade.update_excursions(104.0);
        trade.update_excursions(95.0);
        trade.update_excursions(99.0);

        assert!((trade.max_favorable_excursion - 10.0).abs() < 1e-9);
        assert!((trade.max_adverse_excursion + 5.0).abs() < 1e-9);
    }

    #[test]
    fn stop_only_moves_upward() {
        let mut trade = open_trade();
        assert!(trade.raise_stop(95.0));
        assert!(!trade.raise_stop(93.0));
        assert!((trade.stop_loss - 95.0).abs() < 1e-9);
    }

    #[test]
    fn excursions_frozen_after_close() {
        let mut trade = open_trade();
        trade.close(
            base_date() + Duration::days(1),
            105.0,
            ExitReason::BacktestEnd,
            0.2,
        );
        trade.update_excursions(150.0);
        assert_eq!(trade.max_favorable_excursion, 0.0);
    }

    #[test]
    fn exit_reasons_serialize_to_stable_strings() {
        assert_eq!(ExitReason::StopLoss.as_str(), "stop_loss");
        assert_eq!(ExitReason::Target1Reached.as_str(), "target1_reached");
        assert_eq!(ExitReason::MaxHoldTime.as_str(), "max_hold_time");
        assert_eq!(ExitReason::BacktestEnd.as_str(), "backtest_end");
    }
}
