//! Continuous double-auction matching core for a single trading instrument.
//!
//! The crate is built around three pieces:
//!
//! - [`orderbook::OrderBook`] — a two-sided price-ordered book with FIFO
//!   queues per level, an id index for O(1) cancel/modify, and a stop table
//!   of inactive stop orders, all behind one reader-writer lock.
//! - The matching pass ([`orderbook::OrderBook::match_order`]) — price-time
//!   priority execution that mutates the book atomically and emits
//!   [`orderbook::Trade`] records carrying price and quantity.
//! - [`engine::MatchingEngine`] — a multi-producer submission pipeline with
//!   a fixed worker pool, single-shot completion handles, a stop-activation
//!   cascade after trades, and per-order latency metrics.
//!
//! Settlement, persistence, network framing and market-data fan-out are
//! external collaborators; the engine hands emitted trades to a registered
//! fill handler and goes no further.

pub mod config;
pub mod engine;
pub mod orderbook;

pub use config::EngineConfig;
pub use engine::{CompletionHandle, EngineMetrics, MatchingEngine};
pub use orderbook::{
    MarketDepth, Order, OrderBook, OrderBookError, OrderId, OrderType, PriceLevel, Side, Trade,
    PRICE_SCALE, QTY_SCALE,
};
