//! Engine processing metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters recorded by the workers, readable from any thread.
///
/// Latency is measured from dequeue to completion of the matching call with
/// a monotonic clock.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    total_latency_micros: AtomicU64,
    orders_processed: AtomicU64,
    trades_executed: AtomicU64,
}

impl EngineMetrics {
    pub(crate) fn record_order(&self, latency_micros: u64, trades: usize) {
        self.total_latency_micros
            .fetch_add(latency_micros, Ordering::Relaxed);
        self.orders_processed.fetch_add(1, Ordering::Relaxed);
        if trades > 0 {
            self.trades_executed
                .fetch_add(trades as u64, Ordering::Relaxed);
        }
    }

    /// Number of orders workers have fully processed.
    pub fn orders_processed(&self) -> u64 {
        self.orders_processed.load(Ordering::Relaxed)
    }

    /// Number of trades emitted by processed orders.
    pub fn trades_executed(&self) -> u64 {
        self.trades_executed.load(Ordering::Relaxed)
    }

    /// Mean per-order processing latency in microseconds, 0.0 before any
    /// order has been processed.
    pub fn average_latency_micros(&self) -> f64 {
        let count = self.orders_processed.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.total_latency_micros.load(Ordering::Relaxed) as f64 / count as f64
    }
}
