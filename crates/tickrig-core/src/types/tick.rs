//! Market tick types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bid/ask quote for a single instrument at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickValue {
    pub bid: Decimal,
    pub ask: Decimal,
}

impl TickValue {
    pub fn new(bid: Decimal, ask: Decimal) -> Self {
        Self { bid, ask }
    }

    /// Quote with an artificial spread layered on top of the bid.
    pub fn with_spread(bid: Decimal, spread: Decimal) -> Self {
        Self {
            bid,
            ask: bid + spread,
        }
    }

    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }
}

/// One simulation step: quotes for every requested instrument at a single
/// timestamp. Iteration order over instruments is stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<String, TickValue>,
}

impl Tick {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, pair_name: impl Into<String>, value: TickValue) -> Self {
        self.values.insert(pair_name.into(), value);
        self
    }

    pub fn value_for(&self, pair_name: &str) -> Option<&TickValue> {
        self.values.get(pair_name)
    }
}

/// OHLC aggregate of bid prices over one interval bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}
