//! Concurrent order submission pipeline
//!
//! Producers submit orders into an unbounded FIFO and receive a single-shot
//! completion handle; a fixed pool of worker threads dequeues, routes each
//! order through the book by type, runs the stop-activation cascade after
//! any pass that traded, and resolves the handle with the accept/reject
//! outcome. Per-order latency is measured from dequeue with a monotonic
//! clock.

mod metrics;
mod queue;


pub use metrics::EngineMetrics;
pub use queue::CompletionHandle;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::orderbook::{Order, OrderBook, OrderId, OrderType, Trade};
use queue::{completion_pair, Submission, SubmissionQueue};

/// Callback invoked by workers once per emitted trade.
pub type FillHandler = Arc<dyn Fn(&Trade) + Send + Sync>;

/// Matching engine for a single instrument
///
/// Owns the order book and the worker pool. Workers are spawned at
/// construction and idle until [`start`](MatchingEngine::start); after
/// [`stop`](MatchingEngine::stop) they exit and pending submissions resolve
/// as rejected. Dropping the engine stops it and joins the workers.
pub struct MatchingEngine {
    book: Arc<OrderBook>,
    submissions: Arc<SubmissionQueue>,
    running: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    metrics: Arc<EngineMetrics>,
    fill_handler: Arc<RwLock<Option<FillHandler>>>,
    started_at: Mutex<Instant>,
    workers: Vec<JoinHandle<()>>,
}

impl MatchingEngine {
    /// Create an engine with one worker per available hardware thread.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let book = Arc::new(OrderBook::new());
        let submissions = Arc::new(SubmissionQueue::new());
        let running = Arc::new(AtomicBool::new(false));
        let stopped = Arc::new(AtomicBool::new(false));
        let metrics = Arc::new(EngineMetrics::default());
        let fill_handler: Arc<RwLock<Option<FillHandler>>> = Arc::new(RwLock::new(None));

        let num_workers = config.num_workers.max(1);
        let mut workers = Vec::with_capacity(num_workers);
        for i in 0..num_workers {
            let book = Arc::clone(&book);
            let submissions = Arc::clone(&submissions);
            let running = Arc::clone(&running);
            let stopped = Arc::clone(&stopped);
            let metrics = Arc::clone(&metrics);
            let fill_handler = Arc::clone(&fill_handler);

            let handle = thread::Builder::new()
                .name(format!("matcher-{}", i))
                .spawn(move || {
                    worker_loop(book, submissions, running, stopped, metrics, fill_handler)
                })
                .expect("failed to spawn matcher worker");
            workers.push(handle);
        }

        debug!(num_workers, "matching engine created");

        Self {
            book,
            submissions,
            running,
            stopped,
            metrics,
            fill_handler,
            started_at: Mutex::new(Instant::now()),
            workers,
        }
    }

    /// Enqueue an order for processing. The returned handle resolves after
    /// a worker has routed the order through the book.
    pub fn submit_order(&self, order: Order) -> CompletionHandle {
        let (completion, handle) = completion_pair();

        if self.stopped.load(Ordering::Acquire) {
            warn!(order_id = %order.id, "submission rejected: engine stopped");
            completion.resolve(false);
            return handle;
        }

        self.submissions.push(Submission { order, completion });

        // A stop may have raced the push; its drain and this one together
        // guarantee the handle resolves either way.
        if self.stopped.load(Ordering::Acquire) {
            for submission in self.submissions.drain() {
                submission.completion.resolve(false);
            }
        }
        handle
    }

    /// Cancel a live order synchronously, bypassing the queue. Races with
    /// in-flight processing are serialized by the book lock: the cancel
    /// succeeds iff the order is in the book when the lock is acquired.
    pub fn cancel_order(&self, order_id: &OrderId) -> bool {
        self.book.cancel_order(order_id).is_ok()
    }

    /// Begin processing queued submissions and reset the throughput clock.
    pub fn start(&self) {
        if self.stopped.load(Ordering::Acquire) {
            warn!("start ignored: engine already stopped");
            return;
        }
        *self.started_at.lock() = Instant::now();
        self.running.store(true, Ordering::Release);
        self.submissions.notify_all();
        info!("matching engine started");
    }

    /// Stop the engine. Workers exit their wait; submissions still queued
    /// are not processed and their handles resolve as rejected. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.running.store(false, Ordering::Release);
        self.submissions.notify_all();

        let drained = self.submissions.drain();
        let cancelled = drained.len();
        for submission in drained {
            submission.completion.resolve(false);
        }
        info!(cancelled, "matching engine stopped");
    }

    /// Register the downstream fills consumer. Must be called before
    /// [`start`](MatchingEngine::start); registration while running is
    /// ignored.
    pub fn set_fill_handler(&self, handler: impl Fn(&Trade) + Send + Sync + 'static) {
        if self.running.load(Ordering::Acquire) {
            warn!("fill handler must be registered before start");
            return;
        }
        *self.fill_handler.write() = Some(Arc::new(handler));
    }

    /// The underlying book, for direct best-price reads.
    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Mean dequeue-to-completion latency in microseconds.
    pub fn average_latency_micros(&self) -> f64 {
        self.metrics.average_latency_micros()
    }

    /// Processed-order throughput since the last `start`, 0 before one full
    /// second has elapsed.
    pub fn orders_processed_per_second(&self) -> u64 {
        let elapsed_secs = self.started_at.lock().elapsed().as_secs();
        if elapsed_secs == 0 {
            return 0;
        }
        self.metrics.orders_processed() / elapsed_secs
    }
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MatchingEngine {
    fn drop(&mut self) {
        self.stop();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    book: Arc<OrderBook>,
    submissions: Arc<SubmissionQueue>,
    running: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    metrics: Arc<EngineMetrics>,
    fill_handler: Arc<RwLock<Option<FillHandler>>>,
) {
    while let Some(submission) = submissions.pop_wait(&running, &stopped) {
        let dequeued_at = Instant::now();
        let (accepted, trades) = process_order(&book, submission.order, &fill_handler);
        let latency_micros = dequeued_at.elapsed().as_micros() as u64;

        metrics.record_order(latency_micros, trades);
        submission.completion.resolve(accepted);
    }
    debug!("matcher worker exiting");
}

/// Route one order through the book by type. Returns the accept outcome and
/// the number of trades the order produced.
fn process_order(
    book: &OrderBook,
    mut order: Order,
    fill_handler: &RwLock<Option<FillHandler>>,
) -> (bool, usize) {
    if let Err(err) = order.validate() {
        warn!(order_id = %order.id, %err, "order rejected");
        return (false, 0);
    }

    let order_id = order.id.clone();
    let order_type = order.order_type;

    let (accepted, trades) = match order.order_type {
        OrderType::Market => {
            let trades = book.match_order(&mut order);
            // Unfilled market residual is discarded; market orders never rest
            run_stop_cascade(book, &trades);
            emit_fills(fill_handler, &trades);
            (true, trades.len())
        }
        OrderType::Limit => {
            let trades = book.match_order(&mut order);
            run_stop_cascade(book, &trades);
            emit_fills(fill_handler, &trades);

            let accepted = if order.quantity > 0 {
                book.add_order(order).is_ok()
            } else {
                true
            };
            (accepted, trades.len())
        }
        OrderType::Stop => (book.add_order(order).is_ok(), 0),
    };

    debug!(order_id = %order_id, %order_type, accepted, trades, "order processed");
    (accepted, trades)
}

/// After a pass that traded, activate stops against the last maker's price.
fn run_stop_cascade(book: &OrderBook, trades: &[Trade]) {
    if let Some(last) = trades.last() {
        book.check_stop_orders(last.price);
    }
}

fn emit_fills(fill_handler: &RwLock<Option<FillHandler>>, trades: &[Trade]) {
    if trades.is_empty() {
        return;
    }
    let handler = fill_handler.read().clone();
    if let Some(handler) = handler {
        for trade in trades {
            handler(trade);
        }
    }
}
