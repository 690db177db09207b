//! Position lifecycle types.

use crate::types::order::{ClosingPolicy, OrderSide};
use crate::types::tick::TickValue;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current state of a position in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    /// Entered and marked to market on every tick.
    Open,
    /// Exited, realized profit/loss is final.
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Open => "open",
            PositionStatus::Closed => "closed",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "open" => Some(PositionStatus::Open),
            "closed" => Some(PositionStatus::Closed),
            _ => None,
        }
    }
}

/// A holding opened by an order fill, owned by one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub backtest_id: Uuid,
    pub pair_name: String,
    pub side: OrderSide,
    pub units: i64,
    pub entry_price: Decimal,
    pub entered_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exited_at: Option<DateTime<Utc>>,
    pub status: PositionStatus,
    /// Unrealized while open, realized once closed.
    pub profit_or_loss: Decimal,
    #[serde(default, skip_serializing_if = "ClosingPolicy::is_empty")]
    pub closing_policy: ClosingPolicy,
}

impl Position {
    /// Open a position from an order fill.
    pub fn open(
        backtest_id: Uuid,
        pair_name: impl Into<String>,
        side: OrderSide,
        units: i64,
        entry_price: Decimal,
        entered_at: DateTime<Utc>,
        closing_policy: ClosingPolicy,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            backtest_id,
            pair_name: pair_name.into(),
            side,
            units,
            entry_price,
            entered_at,
            exit_price: None,
            exited_at: None,
            status: PositionStatus::Open,
            profit_or_loss: Decimal::ZERO,
            closing_policy,
        }
    }

    /// Price the position would exit at against the given quote.
    ///
    /// A long exits by selling at the bid, a short by buying at the ask.
    pub fn counter_price(&self, value: &TickValue) -> Decimal {
        match self.side {
            OrderSide::Buy => value.bid,
            OrderSide::Sell => value.ask,
        }
    }

    /// Mark the open position to market.
    pub fn update_price(&mut self, value: &TickValue) {
        if self.status != PositionStatus::Open {
            return;
        }
        self.profit_or_loss = self.profit_at(self.counter_price(value));
    }

    /// Whether the closing policy fires against the quote.
    pub fn should_close(&self, value: &TickValue) -> bool {
        if self.status != PositionStatus::Open {
            return false;
        }
        let counter = self.counter_price(value);
        let take_profit_hit = self.closing_policy.take_profit.is_some_and(|tp| match self.side {
            OrderSide::Buy => counter >= tp,
            OrderSide::Sell => counter <= tp,
        });
        let loss_cut_hit = self.closing_policy.loss_cut.is_some_and(|lc| match self.side {
            OrderSide::Buy => counter <= lc,
            OrderSide::Sell => counter >= lc,
        });
        take_profit_hit || loss_cut_hit
    }

    /// Close against the quote, fixing the realized profit/loss.
    ///
    /// Closing an already-closed position is an illegal state.
    pub fn close(&mut self, value: &TickValue, at: DateTime<Utc>) -> Result<()> {
        if self.status == PositionStatus::Closed {
            return Err(Error::illegal_state(format!(
                "position {} is already closed",
                self.id
            )));
        }
        let exit_price = self.counter_price(value);
        self.exit_price = Some(exit_price);
        self.exited_at = Some(at);
        self.profit_or_loss = self.profit_at(exit_price);
        self.status = PositionStatus::Closed;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    fn profit_at(&self, counter: Decimal) -> Decimal {
        let diff = match self.side {
            OrderSide::Buy => counter - self.entry_price,
            OrderSide::Sell => self.entry_price - counter,
        };
        diff * Decimal::from(self.units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(bid: i64, ask: i64) -> TickValue {
        TickValue::new(Decimal::new(bid, 2), Decimal::new(ask, 2))
    }

    fn open_long() -> Position {
        Position::open(
            Uuid::new_v4(),
            "USDJPY",
            OrderSide::Buy,
            100,
            Decimal::new(13530, 2), // 135.30
            Utc::now(),
            ClosingPolicy::default(),
        )
    }

    #[test]
    fn test_long_marked_to_market_on_bid() {
        let mut pos = open_long();
        pos.update_price(&quote(13550, 13553));
        // (135.50 - 135.30) * 100
        assert_eq!(pos.profit_or_loss, Decimal::new(2000, 2));

        pos.update_price(&quote(13510, 13513));
        assert_eq!(pos.profit_or_loss, Decimal::new(-2000, 2));
    }

    #[test]
    fn test_short_marked_to_market_on_ask() {
        let mut pos = Position::open(
            Uuid::new_v4(),
            "USDJPY",
            OrderSide::Sell,
            100,
            Decimal::new(13530, 2),
            Utc::now(),
            ClosingPolicy::default(),
        );
        pos.update_price(&quote(13510, 13513));
        // (135.30 - 135.13) * 100
        assert_eq!(pos.profit_or_loss, Decimal::new(1700, 2));
    }

    #[test]
    fn test_take_profit_fires_for_long() {
        let mut pos = open_long();
        pos.closing_policy = ClosingPolicy::new(Some(Decimal::new(13560, 2)), None);

        assert!(!pos.should_close(&quote(13550, 13553)));
        assert!(pos.should_close(&quote(13561, 13564)));
    }

    #[test]
    fn test_loss_cut_fires_for_long() {
        let mut pos = open_long();
        pos.closing_policy = ClosingPolicy::new(None, Some(Decimal::new(13500, 2)));

        assert!(!pos.should_close(&quote(13520, 13523)));
        assert!(pos.should_close(&quote(13499, 13502)));
    }

    #[test]
    fn test_close_fixes_realized_profit() {
        let mut pos = open_long();
        let closed_at = Utc::now();
        pos.close(&quote(13580, 13583), closed_at).unwrap();

        assert_eq!(pos.status, PositionStatus::Closed);
        assert_eq!(pos.exit_price, Some(Decimal::new(13580, 2)));
        assert_eq!(pos.profit_or_loss, Decimal::new(5000, 2));
        assert!(!pos.is_open());

        // Later quotes no longer move the realized number
        pos.update_price(&quote(13400, 13403));
        assert_eq!(pos.profit_or_loss, Decimal::new(5000, 2));
    }

    #[test]
    fn test_double_close_is_illegal() {
        let mut pos = open_long();
        pos.close(&quote(13580, 13583), Utc::now()).unwrap();
        let err = pos.close(&quote(13580, 13583), Utc::now()).unwrap_err();
        assert!(matches!(err, Error::IllegalState(_)));
    }
}
