use crate::models::{EquitySample, PerformanceSummary, Trade};
use statrs::statistics::Statistics;

/// Derives summary statistics from a finished run's closed trades and equity
/// curve. Stateless; all methods are associated functions.
pub struct PerformanceCalculator;

impl PerformanceCalculator {
    pub fn summarize(
        trades: &[Trade],
        equity_curve: &[EquitySample],
        initial_capital: f64,
        bars_per_year: f64,
    ) -> PerformanceSummary {
        if trades.is_empty() {
            return Self::empty_summary(initial_capital);
        }

        let total_trades = trades.len() as i32;
        let winners: Vec<&Trade> = trades.iter().filter(|t| t.profit > 0.0).collect();
        let losers: Vec<&Trade> = trades.iter().filter(|t| t.profit <= 0.0).collect();
        let winning_trades = winners.len() as i32;
        let losing_trades = losers.len() as i32;

        let total_profit: f64 = trades.iter().map(|t| t.profit).sum();
        let total_win: f64 = winners.iter().map(|t| t.profit).sum();
        let total_loss: f64 = losers.iter().map(|t| t.profit).sum();

        let win_rate = winning_trades as f64 / total_trades as f64 * 100.0;
        let avg_win = Self::average(winners.iter().map(|t| t.profit));
        let avg_loss = Self::average(losers.iter().map(|t| t.profit));

        // All-winner runs have no loss to divide by; the sentinel keeps the
        // ratio ordered above every finite value.
        let profit_factor = if total_loss == 0.0 {
            f64::INFINITY
        } else {
            total_win / total_loss.abs()
        };

        let win_fraction = win_rate / 100.0;
        let expectancy = win_fraction * avg_win + (1.0 - win_fraction) * avg_loss;

        PerformanceSummary {
            total_trades,
            winning_trades,
            losing_trades,
            win_rate,
            total_profit,
            total_return_pct: if initial_capital > 0.0 {
                total_profit / initial_capital * 100.0
            } else {
                0.0
            },
            avg_win,
            avg_loss,
            profit_factor,
            max_drawdown: Self::max_drawdown(equity_curve),
            sharpe_ratio: Self::sharpe_ratio(equity_curve, bars_per_year),
            expectancy,
            avg_days_held: Self::average(trades.iter().map(|t| t.days_held as f64)),
            avg_mfe: Self::average(trades.iter().map(|t| t.max_favorable_excursion)),
            avg_mae: Self::average(trades.iter().map(|t| t.max_adverse_excursion)),
            initial_capital,
            final_equity: initial_capital + total_profit,
        }
    }

    /// Worst peak-to-trough equity decline in percent. Zero or negative; zero
    /// means the curve never fell below a prior peak.
    pub fn max_drawdown(equity_curve: &[EquitySample]) -> f64 {
        let mut peak = f64::NEG_INFINITY;
        let mut worst: f64 = 0.0;
        for sample in equity_curve {
            if sample.equity > peak {
                peak = sample.equity;
            }
            if peak > 0.0 {
                let drawdown = (sample.equity - peak) / peak * 100.0;
                if drawdown < worst {
                    worst = drawdown;
                }
            }
        }
        worst
    }

    /// Annualized Sharpe ratio over per-bar equity returns, zero risk-free
    /// rate. Zero when there are too few samples or no return variance.
    pub fn sharpe_ratio(equity_curve: &[EquitySample], bars_per_year: f64) -> f64 {
        if equity_curve.len() < 2 {
            return 0.0;
        }

        let returns: Vec<f64> = equity_curve
            .windows(2)
            .filter(|pair| pair[0].equity > 0.0)
            .map(|pair| (pair[1].equity - pair[0].equity) / pair[0].equity)
            .collect();
        if returns.len() < 2 {
            return 0.0;
        }

        let mean = (&returns).mean();
        let std_dev = (&returns).std_dev();
        if !std_dev.is_finite() || std_dev == 0.0 {
            return 0.0;
        }
        mean / std_dev * bars_per_year.sqrt()
    }

    fn empty_summary(initial_capital: f64) -> PerformanceSummary {
        PerformanceSummary {
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            total_profit: 0.0,
            total_return_pct: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
            profit_factor: 0.0,
            max_drawdown: 0.0,
            sharpe_ratio: 0.0,
            expectancy: 0.0,
            avg_days_held: 0.0,
            avg_mfe: 0.0,
            avg_mae: 0.0,
            initial_capital,
            final_equity: initial_capital,
        }
    }

    fn average(values: impl Iterator<Item = f64>) -> f64 {
        let finite: Vec<f64> = values.filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            0.0
        } else {
            finite.iter().sum::<f64>() / finite.len() as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExitReason;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn base_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap()
    }

    fn closed_trade(profit_target: f64, days: i64) -> Trade {
        let mut trade = Trade::open("TST", base_date(), 100.0, 90.0, 120.0, 130.0, 10);
        // Zero commission keeps the realized profit exactly shares * move.
        let exit_price = 100.0 + profit_target / 10.0;
        trade.close(
            base_date() + Duration::days(days),
            exit_price,
            if profit_target > 0.0 {
                ExitReason::Target1Reached
            } else {
                ExitReason::StopLoss
            },
            0.0,
        );
        trade
    }

    fn curve(equities: &[f64]) -> Vec<EquitySample> {
        equities
            .iter()
            .enumerate()
            .map(|(i, &equity)| EquitySample {
                date: base_date() + Duration::days(i as i64),
                equity,
                cash: equity,
                open_positions: 0,
                open_value: 0.0,
            })
            .collect()
    }

    #[test]
    fn empty_run_yields_zeroed_summary() {
        let summary = PerformanceCalculator::summarize(&[], &curve(&[10_000.0]), 10_000.0, 252.0);
        assert_eq!(summary.total_trades, 0);
        assert_eq!(summary.profit_factor, 0.0);
        assert_eq!(summary.final_equity, 10_000.0);
    }

    #[test]
    fn mixed_trades_produce_expected_ratios() {
        let trades = vec![
            closed_trade(200.0, 10),
            closed_trade(100.0, 4),
            closed_trade(-150.0, 2),
        ];
        let summary = PerformanceCalculator::summarize(&trades, &[], 10_000.0, 252.0);

        assert_eq!(summary.total_trades, 3);
        assert_eq!(summary.winning_trades, 2);
        assert_eq!(summary.losing_trades, 1);
        assert!((summary.win_rate - 66.666_666_666_666_67).abs() < 1e-9);
        assert!((summary.total_profit - 150.0).abs() < 1e-9);
        assert!((summary.profit_factor - 2.0).abs() < 1e-9);
        assert!((summary.avg_win - 150.0).abs() < 1e-9);
        assert!((summary.avg_loss + 150.0).abs() < 1e-9);
        // expectancy = 2/3 * 150 + 1/3 * (-150) = 50
        assert!((summary.expectancy - 50.0).abs() < 1e-9);
        assert!((summary.final_equity - 10_150.0).abs() < 1e-9);
    }

    #[test]
    fn profit_factor_is_infinite_without_losses() {
        let trades = vec![closed_trade(100.0, 5), closed_trade(50.0, 3)];
        let summary = PerformanceCalculator::summarize(&trades, &[], 10_000.0, 252.0);
        assert!(summary.profit_factor.is_infinite());
        assert!(summary.profit_factor > 0.0);
        assert_eq!(summary.losing_trades, 0);
    }

    #[test]
    fn max_drawdown_tracks_worst_decline_from_peak() {
        let samples = curve(&[10_000.0, 11_000.0, 9_900.0, 10_500.0, 10_450.0]);
        let drawdown = PerformanceCalculator::max_drawdown(&samples);
        assert!((drawdown - (9_900.0 - 11_000.0) / 11_000.0 * 100.0).abs() < 1e-9);
        assert!(drawdown <= 0.0);

        let rising = curve(&[10_000.0, 10_100.0, 10_200.0]);
        assert_eq!(PerformanceCalculator::max_drawdown(&rising), 0.0);
    }

    #[test]
    fn flat_equity_has_zero_sharpe() {
        let samples = curve(&[10_000.0, 10_000.0, 10_000.0, 10_000.0]);
        assert_eq!(PerformanceCalculator::sharpe_ratio(&samples, 252.0), 0.0);
        assert_eq!(PerformanceCalculator::sharpe_ratio(&samples[..1], 252.0), 0.0);
    }

    #[test]
    fn steady_growth_has_positive_sharpe() {
        let samples = curve(&[10_000.0, 10_100.0, 10_250.0, 10_300.0, 10_500.0]);
        assert!(PerformanceCalculator::sharpe_ratio(&samples, 252.0) > 0.0);
    }
}
