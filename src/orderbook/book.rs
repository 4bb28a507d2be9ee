//! Price-time priority order book for a single instrument
//!
//! Maintains two price-ordered sides with FIFO queues per level, an id index
//! for O(1) cancel/modify, and a stop table of inactive stop orders keyed by
//! trigger price. All state sits behind one reader-writer lock: writers
//! (add, cancel, modify, matching, stop activation) serialize on the
//! exclusive side, best-price readers share the lock. A matching pass
//! mutates the book atomically and never leaves it crossed; only stop
//! activation can rest a crossing order, which awaits its own match cycle.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use super::types::{
    now_nanos, qty_to_lots, MarketDepth, Order, OrderBookError, OrderId, OrderType, PriceLevel,
    Side, Trade,
};

/// Book state guarded by the single reader-writer lock.
///
/// `orders` owns every live order; price levels and the stop table hold ids
/// only, so an order lives in the index plus exactly one container.
#[derive(Debug)]
struct BookState {
    /// Bid side price levels; best bid is the last key
    bids: BTreeMap<u64, PriceLevel>,

    /// Ask side price levels; best ask is the first key
    asks: BTreeMap<u64, PriceLevel>,

    /// Fast lookup map owning every live order
    orders: HashMap<OrderId, Order>,

    /// Inactive stop orders keyed by trigger price, insertion-ordered within
    /// a price so activation scans are deterministic
    stops: BTreeMap<u64, Vec<OrderId>>,

    /// Price of the last executed trade
    last_trade_price: Option<u64>,

    /// Next trade id to be assigned
    next_trade_id: u64,

    /// Monotonically increasing sequence number for all mutations
    sequence: u64,
}

impl BookState {
    fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            orders: HashMap::new(),
            stops: BTreeMap::new(),
            last_trade_price: None,
            next_trade_id: 1,
            sequence: 0,
        }
    }

    fn side_levels(&mut self, side: Side) -> &mut BTreeMap<u64, PriceLevel> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Best opposing price for a taker, if the opposite side is non-empty.
    fn best_opposing_price(&self, taker_side: Side) -> Option<u64> {
        match taker_side {
            Side::Buy => self.asks.keys().next().copied(),
            Side::Sell => self.bids.keys().next_back().copied(),
        }
    }

    fn insert(&mut self, order: Order) -> Result<(), OrderBookError> {
        order.validate()?;

        if self.orders.contains_key(&order.id) {
            return Err(OrderBookError::DuplicateOrder(order.id.clone()));
        }

        match order.order_type {
            OrderType::Market => return Err(OrderBookError::MarketOrderNotRestable),
            OrderType::Stop => {
                self.stops
                    .entry(order.stop_price)
                    .or_default()
                    .push(order.id.clone());
            }
            OrderType::Limit => {
                let price = order.price;
                let level = self
                    .side_levels(order.side)
                    .entry(price)
                    .or_insert_with(|| PriceLevel::new(price));
                level.push_back(order.id.clone(), order.quantity);
            }
        }

        self.orders.insert(order.id.clone(), order);
        self.sequence += 1;
        Ok(())
    }

    fn remove(&mut self, order_id: &OrderId) -> Result<Order, OrderBookError> {
        let (order_type, side, price, stop_price, quantity) = {
            let order = self
                .orders
                .get(order_id)
                .ok_or_else(|| OrderBookError::OrderNotFound(order_id.clone()))?;
            (
                order.order_type,
                order.side,
                order.price,
                order.stop_price,
                order.quantity,
            )
        };

        if order_type == OrderType::Stop {
            // A miss in the stop-price entry means the id index and the stop
            // table disagree; never fall through to the book sides.
            let removed = self
                .stops
                .get_mut(&stop_price)
                .map(|ids| {
                    let before = ids.len();
                    ids.retain(|id| id != order_id);
                    before != ids.len()
                })
                .unwrap_or(false);
            if !removed {
                return Err(OrderBookError::OrderNotFound(order_id.clone()));
            }
            if self.stops.get(&stop_price).is_some_and(|ids| ids.is_empty()) {
                self.stops.remove(&stop_price);
            }
        } else {
            let levels = self.side_levels(side);
            let level = levels
                .get_mut(&price)
                .expect("id index references a price level that does not exist");
            let removed = level.remove(order_id, quantity);
            assert!(
                removed,
                "id index references an order missing from its price level"
            );
            if level.is_empty() {
                levels.remove(&price);
            }
        }

        self.sequence += 1;
        let order = self
            .orders
            .remove(order_id)
            .expect("id index entry vanished during removal");
        Ok(order)
    }

    fn set_quantity(&mut self, order_id: &OrderId, new_quantity: u64) -> Result<(), OrderBookError> {
        if new_quantity == 0 {
            return self.remove(order_id).map(|_| ());
        }

        let (order_type, side, price, old_quantity) = {
            let order = self
                .orders
                .get(order_id)
                .ok_or_else(|| OrderBookError::OrderNotFound(order_id.clone()))?;
            (order.order_type, order.side, order.price, order.quantity)
        };

        // Resting limit orders keep their queue position; only the level's
        // running total moves.
        if order_type == OrderType::Limit {
            let level = self
                .side_levels(side)
                .get_mut(&price)
                .expect("id index references a price level that does not exist");
            level.total_size = level
                .total_size
                .saturating_sub(old_quantity)
                .saturating_add(new_quantity);
        }

        if let Some(order) = self.orders.get_mut(order_id) {
            order.quantity = new_quantity;
        }
        self.sequence += 1;
        Ok(())
    }

    /// Price-time priority matching pass (§ matching algorithm).
    ///
    /// Walks opposing levels best-first; within a level, makers fill in FIFO
    /// order. Limit takers stop at the first level priced worse than their
    /// limit; market takers sweep until filled or the side empties. Filled
    /// makers leave both their level and the id index; emptied levels are
    /// erased eagerly.
    fn execute_match(&mut self, taker: &mut Order) -> Vec<Trade> {
        let mut trades = Vec::new();
        let timestamp = now_nanos();

        while taker.quantity > 0 {
            let Some(level_price) = self.best_opposing_price(taker.side) else {
                break;
            };

            if taker.order_type == OrderType::Limit {
                let admissible = match taker.side {
                    Side::Buy => level_price <= taker.price,
                    Side::Sell => level_price >= taker.price,
                };
                if !admissible {
                    break;
                }
            }

            let opposing = match taker.side {
                Side::Buy => &mut self.asks,
                Side::Sell => &mut self.bids,
            };
            let level = opposing
                .get_mut(&level_price)
                .expect("best price key vanished mid-pass");

            while taker.quantity > 0 {
                let Some(maker_id) = level.front().cloned() else {
                    break;
                };

                let (match_qty, maker_filled) = {
                    let maker = self
                        .orders
                        .get_mut(&maker_id)
                        .expect("price level references an order missing from the id index");
                    let match_qty = taker.quantity.min(maker.quantity);
                    maker.quantity -= match_qty;
                    (match_qty, maker.quantity == 0)
                };

                taker.quantity -= match_qty;
                level.total_size = level.total_size.saturating_sub(match_qty);

                trades.push(Trade {
                    id: self.next_trade_id,
                    price: level_price,
                    size: match_qty,
                    timestamp,
                    taker_order_id: taker.id.clone(),
                    maker_order_id: maker_id.clone(),
                    taker_side: taker.side,
                    sequence: self.sequence,
                });
                self.next_trade_id += 1;

                if maker_filled {
                    level.orders.pop_front();
                    self.orders.remove(&maker_id);
                }
            }

            let level_emptied = level.is_empty();
            if level_emptied {
                opposing.remove(&level_price);
            }
        }

        if let Some(last) = trades.last() {
            self.last_trade_price = Some(last.price);
        }
        self.sequence += 1;
        trades
    }

    /// Scan the stop table and activate every order whose trigger is crossed
    /// by `last_trade_price`: buy stops at `last >= stop`, sell stops at
    /// `last <= stop`. Activated orders become resting limit orders at their
    /// original limit price; activation never matches by itself.
    fn activate_stops(&mut self, last_trade_price: u64) -> Vec<OrderId> {
        let mut triggered: Vec<(u64, OrderId)> = Vec::new();

        for (&stop_price, ids) in self.stops.iter() {
            for id in ids {
                let order = self
                    .orders
                    .get(id)
                    .expect("stop table references an order missing from the id index");
                let fire = match order.side {
                    Side::Buy => last_trade_price >= stop_price,
                    Side::Sell => last_trade_price <= stop_price,
                };
                if fire {
                    triggered.push((stop_price, id.clone()));
                }
            }
        }

        for (stop_price, id) in &triggered {
            let entry_emptied = self
                .stops
                .get_mut(stop_price)
                .map(|ids| {
                    ids.retain(|x| x != id);
                    ids.is_empty()
                })
                .unwrap_or(false);
            if entry_emptied {
                self.stops.remove(stop_price);
            }

            let (price, side, quantity) = {
                let order = self
                    .orders
                    .get_mut(id)
                    .expect("stop table references an order missing from the id index");
                order.order_type = OrderType::Limit;
                (order.price, order.side, order.quantity)
            };

            let level = self
                .side_levels(side)
                .entry(price)
                .or_insert_with(|| PriceLevel::new(price));
            level.push_back(id.clone(), quantity);
        }

        self.sequence += 1;
        triggered.into_iter().map(|(_, id)| id).collect()
    }

    fn verify_integrity(&self) -> Result<(), OrderBookError> {
        let violation = |msg: String| Err(OrderBookError::IntegrityViolation(msg));

        let mut contained = 0usize;
        for (side, levels) in [(Side::Buy, &self.bids), (Side::Sell, &self.asks)] {
            for (&price, level) in levels {
                if level.price != price {
                    return violation(format!("level price {} under key {}", level.price, price));
                }
                if level.is_empty() {
                    return violation(format!("empty level retained at {}", price));
                }
                let mut level_size = 0u64;
                for id in &level.orders {
                    let Some(order) = self.orders.get(id) else {
                        return violation(format!("level {} holds unindexed order {}", price, id));
                    };
                    if order.side != side || order.price != price {
                        return violation(format!("order {} misfiled at {} {}", id, side, price));
                    }
                    if order.order_type != OrderType::Limit {
                        return violation(format!("non-limit order {} resting at {}", id, price));
                    }
                    if order.quantity == 0 {
                        return violation(format!("zero-quantity order {} at {}", id, price));
                    }
                    level_size += order.quantity;
                    contained += 1;
                }
                if level.total_size != level_size {
                    return violation(format!(
                        "level {} size {} != member sum {}",
                        price, level.total_size, level_size
                    ));
                }
            }
        }

        for (&stop_price, ids) in &self.stops {
            if ids.is_empty() {
                return violation(format!("empty stop entry retained at {}", stop_price));
            }
            for id in ids {
                let Some(order) = self.orders.get(id) else {
                    return violation(format!("stop table holds unindexed order {}", id));
                };
                if order.order_type != OrderType::Stop || order.stop_price != stop_price {
                    return violation(format!("order {} misfiled in stop table", id));
                }
                if order.quantity == 0 {
                    return violation(format!("zero-quantity stop order {}", id));
                }
                contained += 1;
            }
        }

        if contained != self.orders.len() {
            return violation(format!(
                "id index holds {} orders but containers hold {}",
                self.orders.len(),
                contained
            ));
        }

        Ok(())
    }
}

/// Thread-safe order book facade
///
/// One exclusive lock covers bids, asks, the id index and the stop table as
/// a unit, so a matching pass mutates the book atomically and readers never
/// see partial state.
pub struct OrderBook {
    state: RwLock<BookState>,

    // Lifetime counters, readable without the book lock
    total_orders_processed: AtomicU64,
    total_matches_executed: AtomicU64,
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(BookState::new()),
            total_orders_processed: AtomicU64::new(0),
            total_matches_executed: AtomicU64::new(0),
        }
    }

    /// Insert a resting order: stop orders enter the stop table, limit
    /// orders join the tail of their price level (created on demand).
    /// Market orders never rest and are rejected.
    pub fn add_order(&self, order: Order) -> Result<(), OrderBookError> {
        self.state.write().insert(order)?;
        self.total_orders_processed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Cancel a live order by id, returning the removed order.
    pub fn cancel_order(&self, order_id: &OrderId) -> Result<Order, OrderBookError> {
        self.state.write().remove(order_id)
    }

    /// Replace an order's remaining quantity in place. Time priority is
    /// preserved; a non-positive quantity cancels the order instead.
    pub fn modify_order(&self, order_id: &OrderId, new_quantity: f64) -> Result<(), OrderBookError> {
        self.state
            .write()
            .set_quantity(order_id, qty_to_lots(new_quantity))
    }

    /// Best (highest) bid price, if any bids rest.
    pub fn best_bid(&self) -> Option<u64> {
        self.state.read().bids.keys().next_back().copied()
    }

    /// Best (lowest) ask price, if any asks rest.
    pub fn best_ask(&self) -> Option<u64> {
        self.state.read().asks.keys().next().copied()
    }

    pub fn spread(&self) -> Option<u64> {
        let state = self.state.read();
        match (
            state.asks.keys().next().copied(),
            state.bids.keys().next_back().copied(),
        ) {
            (Some(ask), Some(bid)) => Some(ask.saturating_sub(bid)),
            _ => None,
        }
    }

    pub fn mid_price(&self) -> Option<u64> {
        let state = self.state.read();
        match (
            state.asks.keys().next().copied(),
            state.bids.keys().next_back().copied(),
        ) {
            (Some(ask), Some(bid)) => Some((ask + bid) / 2),
            _ => None,
        }
    }

    /// Price of the most recent trade, if any has executed.
    pub fn last_trade_price(&self) -> Option<u64> {
        self.state.read().last_trade_price
    }

    /// Snapshot of the top `levels` levels per side.
    pub fn market_depth(&self, levels: usize) -> MarketDepth {
        let state = self.state.read();
        MarketDepth {
            bids: state
                .bids
                .iter()
                .rev()
                .take(levels)
                .map(|(&price, level)| (price, level.total_size))
                .collect(),
            asks: state
                .asks
                .iter()
                .take(levels)
                .map(|(&price, level)| (price, level.total_size))
                .collect(),
            timestamp: now_nanos(),
            sequence: state.sequence,
        }
    }

    /// Look up a live order by id.
    pub fn order(&self, order_id: &OrderId) -> Option<Order> {
        self.state.read().orders.get(order_id).cloned()
    }

    /// Number of live orders (resting plus inactive stops).
    pub fn len(&self) -> usize {
        self.state.read().orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().orders.is_empty()
    }

    /// Run one matching pass for `taker` against the opposing side,
    /// returning the emitted trades. The taker's quantity is decremented in
    /// place; any residual is the caller's to rest or discard. The whole
    /// pass holds the exclusive lock.
    pub fn match_order(&self, taker: &mut Order) -> Vec<Trade> {
        let trades = self.state.write().execute_match(taker);
        if !trades.is_empty() {
            self.total_matches_executed
                .fetch_add(trades.len() as u64, Ordering::Relaxed);
        }
        trades
    }

    /// Activation pass over the stop table for a completed trade at
    /// `last_trade_price`. Returns the ids of activated orders.
    pub fn check_stop_orders(&self, last_trade_price: u64) -> Vec<OrderId> {
        let activated = self.state.write().activate_stops(last_trade_price);
        if !activated.is_empty() {
            debug!(
                last_trade_price,
                count = activated.len(),
                "activated stop orders"
            );
        }
        activated
    }

    /// Lifetime count of orders accepted onto the book.
    pub fn total_orders_processed(&self) -> u64 {
        self.total_orders_processed.load(Ordering::Relaxed)
    }

    /// Lifetime count of trades emitted by matching passes.
    pub fn total_matches_executed(&self) -> u64 {
        self.total_matches_executed.load(Ordering::Relaxed)
    }

    /// Whether the best bid meets or exceeds the best ask. Matching never
    /// leaves the book crossed; stop activation can, transiently, since
    /// activated orders rest without matching.
    pub fn is_crossed(&self) -> bool {
        let state = self.state.read();
        match (
            state.bids.keys().next_back().copied(),
            state.asks.keys().next().copied(),
        ) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }

    /// Check the structural invariants: every indexed order lives in exactly
    /// one container and vice versa, level keys and sides agree with their
    /// members, level sizes add up, and quantities are positive.
    pub fn verify_integrity(&self) -> Result<(), OrderBookError> {
        self.state.read().verify_integrity()
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}
