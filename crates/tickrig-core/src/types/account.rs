//! Account state of a simulated broker.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Balance and aggregate profit/loss of one backtest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub balance: Decimal,
    /// Unrealized profit/loss across open positions.
    pub profit_or_loss: Decimal,
}

impl Account {
    pub fn new(balance: Decimal) -> Self {
        Self {
            balance,
            profit_or_loss: Decimal::ZERO,
        }
    }

    /// Book realized profit/loss into the balance.
    pub fn settle(&mut self, realized: Decimal) {
        self.balance += realized;
    }

    pub fn equity(&self) -> Decimal {
        self.balance + self.profit_or_loss
    }
}
