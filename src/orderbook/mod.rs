//! Order book module
//!
//! Core data structures and matching logic for the single-instrument book:
//! price-ordered sides with FIFO levels, id-indexed order ownership, the
//! price-time priority matching pass, and stop-order activation.

pub mod book;
pub mod types;


pub use book::OrderBook;
pub use types::{
    lots_to_qty, price_to_ticks, qty_to_lots, ticks_to_price, MarketDepth, Order, OrderBookError,
    OrderId, OrderType, PriceLevel, Side, Trade, PRICE_SCALE, QTY_SCALE,
};
