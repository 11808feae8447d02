use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Cooperative cancellation flag shared between the caller and the workers.
/// Workers poll it between bars; the symbol in flight finishes its current
/// bar and then aborts.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatusSnapshot {
    pub phase: String,
    pub total_symbols: usize,
    pub completed_symbols: usize,
    pub failed_symbols: usize,
    pub best_sharpe: Option<f64>,
}

#[derive(Debug)]
struct BatchStatusData {
    phase: String,
    total_symbols: usize,
    completed_symbols: usize,
    failed_symbols: usize,
    best_sharpe: Option<f64>,
}

/// Shared progress view of a running batch, safe to clone across threads and
/// poll from outside while workers report in.
#[derive(Clone, Debug)]
pub struct BatchStatus {
    data: Arc<Mutex<BatchStatusData>>,
}

impl Default for BatchStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchStatus {
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(BatchStatusData {
                phase: "idle".to_string(),
                total_symbols: 0,
                completed_symbols: 0,
                failed_symbols: 0,
                best_sharpe: None,
            })),
        }
    }

    // Progress reporting must never take the batch down. A poisoned lock
    // drops the update or yields a placeholder snapshot instead of panicking.

    pub fn set_phase(&self, phase: &str, total_symbols: usize) {
        if let Ok(mut data) = self.data.lock() {
            data.phase = phase.to_string();
            data.total_symbols = total_symbols;
            data.completed_symbols = 0;
            data.failed_symbols = 0;
            data.best_sharpe = None;
        }
    }

    /// Flips the phase without clearing progress counters.
    pub fn mark_done(&self) {
        if let Ok(mut data) = self.data.lock() {
            data.phase = "done".to_string();
        }
    }

    pub fn record_completion(&self, sharpe: f64) {
        if let Ok(mut data) = self.data.lock() {
            data.completed_symbols += 1;
            if sharpe.is_finite() {
                let improved = data.best_sharpe.map_or(true, |best| sharpe > best);
                if improved {
                    data.best_sharpe = Some(sharpe);
                }
            }
        }
    }

    pub fn record_failure(&self) {
        if let Ok(mut data) = self.data.lock() {
            data.failed_symbols += 1;
        }
    }

    pub fn snapshot(&self) -> BatchStatusSnapshot {
        match self.data.lock() {
            Ok(data) => BatchStatusSnapshot {
                phase: data.phase.clone(),
                total_symbols: data.total_symbols,
                completed_symbols: data.completed_symbols,
                failed_symbols: data.failed_symbols,
                best_sharpe: data.best_sharpe,
            },
            Err(_) => BatchStatusSnapshot {
                phase: "unknown".to_string(),
                total_symbols: 0,
                completed_symbols: 0,
                failed_symbols: 0,
                best_sharpe: None,
            },
        }
    }
}
