use crate::config::BacktestConfig;
use crate::models::{Candle, ExitReason, Trade};

pub const PRICE_EPSILON: f64 = 1e-6;

pub struct PositionSizeParams {
    pub balance: f64,
    pub risk_pct: f64,
    pub entry_price: f64,
    pub stop_price: f64,
    pub max_position_fraction: f64,
}

/// Risk-based whole-share sizing: the share count that puts `risk_pct` of the
/// balance at risk between entry and stop, capped so the position's entry
/// value never exceeds `max_position_fraction` of the balance.
///
/// Degenerate inputs (non-positive prices, stop at or above entry, empty
/// balance) size to zero rather than failing; zero means "no trade".
pub fn risk_based_position_size(params: PositionSizeParams) -> i32 {
    let PositionSizeParams {
        balance,
        risk_pct,
        entry_price,
        stop_price,
        max_position_fraction,
    } = params;

    if balance <= 0.0 || !balance.is_finite() {
        return 0;
    }
    if entry_price <= 0.0 || stop_price <= 0.0 || !entry_price.is_finite() {
        return 0;
    }

    let per_share_risk = entry_price - stop_price;
    if per_share_risk <= 0.0 {
        return 0;
    }

    let risk_amount = balance * (risk_pct / 100.0);
    let raw_shares = (risk_amount / per_share_risk).floor();
    let cap_shares = (balance * max_position_fraction / entry_price).floor();

    raw_shares.min(cap_shares).max(0.0) as i32
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitAction {
    Hold,
    Close { price: f64, reason: ExitReason },
}

/// Result of running the exit rules against one open trade on one bar.
/// `raised_stop` carries a trailing-stop tightening independent of whether
/// the trade also closes this bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitEvaluation {
    pub action: ExitAction,
    pub raised_stop: Option<f64>,
}

pub struct ExitRuleParams<'a> {
    pub trade: &'a Trade,
    pub candle: &'a Candle,
    pub days_held: i64,
    pub config: &'a BacktestConfig,
}

/// Evaluates the exit rules for one open trade on one bar, in priority
/// order: stop-loss touch, target touch, trailing-stop tightening, maximum
/// holding period. Touch exits use the bar's high/low to model intrabar
/// fills; time exits use the close.
pub fn evaluate_exit_rules(params: ExitRuleParams) -> ExitEvaluation {
    let ExitRuleParams {
        trade,
        candle,
        days_held,
        config,
    } = params;

    let slippage = config.slippage_pct / 100.0;

    if candle.low <= trade.stop_loss * (1.0 - config.stop_hit_tolerance) {
        return ExitEvaluation {
            action: ExitAction::Close {
                price: trade.stop_loss * (1.0 - slippage),
                reason: ExitReason::StopLoss,
            },
            raised_stop: None,
        };
    }

    if candle.high >= trade.target1 {
        return ExitEvaluation {
            action: ExitAction::Close {
                price: trade.target1 * (1.0 - slippage),
                reason: ExitReason::Target1Reached,
            },
            raised_stop: None,
        };
    }

    let mut raised_stop = None;
    if days_held > config.trailing_min_days && trade.entry_price > 0.0 {
        let gain_pct = (candle.close - trade.entry_price) / trade.entry_price * 100.0;
        if gain_pct > config.trailing_trigger_gain_pct {
            let candidate = candle.close * config.trailing_stop_fraction;
            if candidate > trade.stop_loss {
                raised_stop = Some(candidate);
            }
        }
    }

    if days_held > config.max_hold_days {
        return ExitEvaluation {
            action: ExitAction::Close {
                price: candle.close,
                reason: ExitReason::MaxHoldTime,
            },
            raised_stop,
        };
    }

    ExitEvaluation {
        action: ExitAction::Hold,
        raised_stop,
    }
}
