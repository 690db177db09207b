//! Order types for the virtual broker.

use crate::types::tick::TickValue;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(OrderSide::Buy),
            "sell" => Some(OrderSide::Sell),
            _ => None,
        }
    }
}

/// How an order executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Fill immediately at the current quote.
    Market,
    /// Fill once the quote crosses the limit price.
    Limit,
}

/// Exit thresholds attached to an order or position.
///
/// `take_profit` closes the position once the counter price reaches it in
/// the profitable direction; `loss_cut` once it reaches it in the losing
/// direction. Zero/absent thresholds are inactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClosingPolicy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loss_cut: Option<Decimal>,
}

impl ClosingPolicy {
    pub fn new(take_profit: Option<Decimal>, loss_cut: Option<Decimal>) -> Self {
        Self {
            take_profit,
            loss_cut,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.take_profit.is_none() && self.loss_cut.is_none()
    }
}

/// An order held by the virtual broker.
///
/// Market orders fill at submission; limit orders stay pending until a
/// tick crosses their price, so only limit orders survive into a
/// suspension snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub pair_name: String,
    pub side: OrderSide,
    pub units: i64,
    pub order_type: OrderType,
    /// Limit price; absent for market orders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "ClosingPolicy::is_empty")]
    pub closing_policy: ClosingPolicy,
    pub submitted_at: DateTime<Utc>,
}

impl Order {
    pub fn market(
        pair_name: impl Into<String>,
        side: OrderSide,
        units: i64,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pair_name: pair_name.into(),
            side,
            units,
            order_type: OrderType::Market,
            price: None,
            closing_policy: ClosingPolicy::default(),
            submitted_at,
        }
    }

    pub fn limit(
        pair_name: impl Into<String>,
        side: OrderSide,
        units: i64,
        price: Decimal,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pair_name: pair_name.into(),
            side,
            units,
            order_type: OrderType::Limit,
            price: Some(price),
            closing_policy: ClosingPolicy::default(),
            submitted_at,
        }
    }

    pub fn with_closing_policy(mut self, policy: ClosingPolicy) -> Self {
        self.closing_policy = policy;
        self
    }

    /// Price this order would execute at against the given quote.
    pub fn execution_price(&self, value: &TickValue) -> Decimal {
        match self.side {
            OrderSide::Buy => value.ask,
            OrderSide::Sell => value.bid,
        }
    }

    /// Whether a pending limit order is executable against the quote.
    ///
    /// A buy fills when the ask drops to the limit price, a sell when the
    /// bid rises to it. Market orders are always executable.
    pub fn is_executable(&self, value: &TickValue) -> bool {
        match self.order_type {
            OrderType::Market => true,
            OrderType::Limit => {
                let price = match self.price {
                    Some(p) => p,
                    None => return false,
                };
                match self.side {
                    OrderSide::Buy => value.ask <= price,
                    OrderSide::Sell => value.bid >= price,
                }
            }
        }
    }
}
