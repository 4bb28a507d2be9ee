use std::collections::VecDeque;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed-point scaling factors for deterministic arithmetic
pub const PRICE_SCALE: u64 = 1_000_000; // 6 decimal places for price precision
pub const QTY_SCALE: u64 = 1_000_000; // 6 decimal places for quantity precision

/// Convert a price to its fixed-point tick representation.
///
/// Non-finite and negative inputs collapse to 0, which order validation
/// rejects.
pub fn price_to_ticks(price: f64) -> u64 {
    (price * PRICE_SCALE as f64).round() as u64
}

/// Convert a quantity to its fixed-point lot representation.
pub fn qty_to_lots(qty: f64) -> u64 {
    (qty * QTY_SCALE as f64).round() as u64
}

/// Convert fixed-point ticks back to a price.
pub fn ticks_to_price(ticks: u64) -> f64 {
    ticks as f64 / PRICE_SCALE as f64
}

/// Convert fixed-point lots back to a quantity.
pub fn lots_to_qty(lots: u64) -> f64 {
    lots as f64 / QTY_SCALE as f64
}

pub(crate) fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

/// Error types for order book operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderBookError {
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),
    #[error("Duplicate order id: {0}")]
    DuplicateOrder(OrderId),
    #[error("Invalid size: {0}")]
    InvalidSize(u64),
    #[error("Invalid price: {0}")]
    InvalidPrice(u64),
    #[error("Invalid stop price: {0}")]
    InvalidStopPrice(u64),
    #[error("Market orders cannot rest on the book")]
    MarketOrderNotRestable,
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),
}

/// Unique identifier for orders across the system
///
/// Identifiers are caller-supplied strings; the book treats them as opaque
/// and only requires uniqueness among live orders.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OrderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for OrderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Order side enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Rests at its limit price; matched when marketable
    Limit,
    /// Executes immediately against resting liquidity, never rests
    Market,
    /// Inactive until the last trade price crosses the stop price, then
    /// activated as a limit order at its stated price
    Stop,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Stop => write!(f, "STOP"),
        }
    }
}

/// Represents an order in the system
///
/// Identity and economic fields are fixed at construction; `quantity` is the
/// only field the matcher mutates (and `order_type` flips to `Limit` once a
/// stop order activates).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Unique identifier for this order
    pub id: OrderId,

    /// Order type (Limit, Market or Stop)
    pub order_type: OrderType,

    /// Order side (Buy or Sell)
    pub side: Side,

    /// Limit price in ticks; ignored for market orders
    pub price: u64,

    /// Remaining quantity in lots
    pub quantity: u64,

    /// Trigger price in ticks; meaningful only for stop orders
    pub stop_price: u64,

    /// Timestamp when the order was created (nanoseconds since epoch),
    /// used as the time-priority key
    pub timestamp: u64,
}

impl Order {
    /// Create a new limit order
    pub fn limit(id: impl Into<OrderId>, side: Side, price: f64, quantity: f64) -> Self {
        Self {
            id: id.into(),
            order_type: OrderType::Limit,
            side,
            price: price_to_ticks(price),
            quantity: qty_to_lots(quantity),
            stop_price: 0,
            timestamp: now_nanos(),
        }
    }

    /// Create a new market order
    pub fn market(id: impl Into<OrderId>, side: Side, quantity: f64) -> Self {
        Self {
            id: id.into(),
            order_type: OrderType::Market,
            side,
            price: 0,
            quantity: qty_to_lots(quantity),
            stop_price: 0,
            timestamp: now_nanos(),
        }
    }

    /// Create a new stop order resting at `price` once `stop_price` triggers
    pub fn stop(
        id: impl Into<OrderId>,
        side: Side,
        price: f64,
        quantity: f64,
        stop_price: f64,
    ) -> Self {
        Self {
            id: id.into(),
            order_type: OrderType::Stop,
            side,
            price: price_to_ticks(price),
            quantity: qty_to_lots(quantity),
            stop_price: price_to_ticks(stop_price),
            timestamp: now_nanos(),
        }
    }

    /// Validate order parameters
    pub fn validate(&self) -> Result<(), OrderBookError> {
        if self.quantity == 0 {
            return Err(OrderBookError::InvalidSize(self.quantity));
        }

        // Limit and stop orders must carry a positive limit price
        if self.order_type != OrderType::Market && self.price == 0 {
            return Err(OrderBookError::InvalidPrice(self.price));
        }

        if self.order_type == OrderType::Stop && self.stop_price == 0 {
            return Err(OrderBookError::InvalidStopPrice(self.stop_price));
        }

        Ok(())
    }
}

/// Represents a price level with FIFO order queue
///
/// Orders queue in arrival order, which realizes time priority within the
/// level. A level exists iff its queue is non-empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Price for this level (tick representation)
    pub price: u64,

    /// Total resting quantity at this level
    pub total_size: u64,

    /// FIFO queue of orders at this price level
    pub orders: VecDeque<OrderId>,
}

impl PriceLevel {
    pub fn new(price: u64) -> Self {
        Self {
            price,
            total_size: 0,
            orders: VecDeque::new(),
        }
    }

    /// Append an order at the tail of the queue
    pub fn push_back(&mut self, order_id: OrderId, size: u64) {
        self.total_size = self.total_size.saturating_add(size);
        self.orders.push_back(order_id);
    }

    /// Remove an order by id, returning whether it was present
    pub fn remove(&mut self, order_id: &OrderId, size: u64) -> bool {
        if let Some(pos) = self.orders.iter().position(|id| id == order_id) {
            self.orders.remove(pos);
            self.total_size = self.total_size.saturating_sub(size);
            true
        } else {
            false
        }
    }

    /// The first (oldest) order id in the FIFO queue
    pub fn front(&self) -> Option<&OrderId> {
        self.orders.front()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }
}

/// Trade execution record emitted by the matching pass
///
/// Carries the executed price and quantity alongside the (taker, maker)
/// pair, since the maker's remaining quantity has already been decremented
/// by the time the caller sees the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Unique trade identifier
    pub id: u64,

    /// Execution price in ticks (the maker's level price)
    pub price: u64,

    /// Executed quantity in lots
    pub size: u64,

    /// Trade execution timestamp (nanoseconds since epoch)
    pub timestamp: u64,

    /// Order id of the incoming (aggressing) order
    pub taker_order_id: OrderId,

    /// Order id of the resting order it matched against
    pub maker_order_id: OrderId,

    /// Side of the taker
    pub taker_side: Side,

    /// Book sequence number at execution time
    pub sequence: u64,
}

impl Trade {
    /// Order id of the buyer
    pub fn buyer_order_id(&self) -> &OrderId {
        match self.taker_side {
            Side::Buy => &self.taker_order_id,
            Side::Sell => &self.maker_order_id,
        }
    }

    /// Order id of the seller
    pub fn seller_order_id(&self) -> &OrderId {
        match self.taker_side {
            Side::Buy => &self.maker_order_id,
            Side::Sell => &self.taker_order_id,
        }
    }

    /// Notional value of this trade in fixed-point representation
    pub fn notional_value(&self) -> u64 {
        self.price.saturating_mul(self.size) / PRICE_SCALE
    }
}

/// Market depth snapshot for a bounded number of levels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDepth {
    /// Bid levels (price, size) sorted by price descending
    pub bids: Vec<(u64, u64)>,

    /// Ask levels (price, size) sorted by price ascending
    pub asks: Vec<(u64, u64)>,

    /// Timestamp when this snapshot was taken
    pub timestamp: u64,

    /// Book sequence number for this snapshot
    pub sequence: u64,
}

impl MarketDepth {
    pub fn best_bid(&self) -> Option<u64> {
        self.bids.first().map(|(price, _)| *price)
    }

    pub fn best_ask(&self) -> Option<u64> {
        self.asks.first().map(|(price, _)| *price)
    }

    pub fn spread(&self) -> Option<u64> {
        match (self.best_ask(), self.best_bid()) {
            (Some(ask), Some(bid)) => Some(ask.saturating_sub(bid)),
            _ => None,
        }
    }

    pub fn mid_price(&self) -> Option<u64> {
        match (self.best_ask(), self.best_bid()) {
            (Some(ask), Some(bid)) => Some((ask + bid) / 2),
            _ => None,
        }
    }
}
