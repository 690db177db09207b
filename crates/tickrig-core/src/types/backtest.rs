//! Persistent backtest state.

use crate::types::agent::AgentSetting;
use crate::types::interval::Interval;
use crate::types::order::Order;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length of a backtest name.
pub const NAME_MAX_LEN: usize = 200;

/// Maximum length of a backtest memo.
pub const MEMO_MAX_LEN: usize = 2000;

/// Lifecycle status of a backtest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacktestStatus {
    /// Created, simulation not yet launched.
    WaitForStart,
    /// A worker is stepping through the tick range.
    Running,
    /// Suspended by request; resumable.
    Paused,
    /// Stopped by request or host restart; terminal.
    Cancelled,
    /// Ran out of ticks; terminal.
    Finished,
}

impl BacktestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BacktestStatus::WaitForStart => "wait_for_start",
            BacktestStatus::Running => "running",
            BacktestStatus::Paused => "paused",
            BacktestStatus::Cancelled => "cancelled",
            BacktestStatus::Finished => "finished",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "wait_for_start" => Some(BacktestStatus::WaitForStart),
            "running" => Some(BacktestStatus::Running),
            "paused" => Some(BacktestStatus::Paused),
            "cancelled" => Some(BacktestStatus::Cancelled),
            "finished" => Some(BacktestStatus::Finished),
            _ => None,
        }
    }
}

/// Broker state captured when a run is paused or cancelled.
///
/// Restoring a run re-seeds the broker from this snapshot and resumes
/// shortly after `cancelled_time` instead of the original start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelledSnapshot {
    pub cancelled_time: DateTime<Utc>,
    pub orders: Vec<Order>,
    pub balance: Decimal,
}

/// The persistent fields of a backtest.
///
/// Runtime components (worker, broker, agents) are attached by the engine
/// crate; everything here survives a host restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRecord {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Artificial spread added to historical bids, in price units.
    pub spread: Decimal,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub tick_interval: Interval,
    pub pair_names: Vec<String>,
    /// Initial account balance.
    pub balance: i64,
    #[serde(default)]
    pub agent_settings: Vec<AgentSetting>,
    pub status: BacktestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_state: Option<CancelledSnapshot>,
}

/// Parameters for creating a backtest.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBacktest {
    pub name: String,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub spread: Decimal,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub tick_interval: Interval,
    pub pair_names: Vec<String>,
    #[serde(default)]
    pub balance: i64,
    #[serde(default)]
    pub agent_settings: Vec<AgentSetting>,
}

impl BacktestRecord {
    /// Validate and build a record in `wait_for_start`.
    ///
    /// `created_at` stays unset until the engine wires the run up.
    pub fn create(params: NewBacktest) -> Result<Self> {
        let record = Self {
            id: Uuid::new_v4(),
            name: params.name,
            memo: params.memo,
            created_at: None,
            spread: params.spread,
            start_time: params.start_time,
            end_time: params.end_time,
            tick_interval: params.tick_interval,
            pair_names: params.pair_names,
            balance: params.balance,
            agent_settings: params.agent_settings,
            status: BacktestStatus::WaitForStart,
            cancelled_state: None,
        };
        record.validate()?;
        Ok(record)
    }

    /// Check the field bounds.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::validation("name must not be empty"));
        }
        if self.name.chars().count() > NAME_MAX_LEN {
            return Err(Error::validation(format!(
                "name must be at most {NAME_MAX_LEN} characters"
            )));
        }
        if let Some(memo) = &self.memo {
            if memo.chars().count() > MEMO_MAX_LEN {
                return Err(Error::validation(format!(
                    "memo must be at most {MEMO_MAX_LEN} characters"
                )));
            }
        }
        if self.start_time >= self.end_time {
            return Err(Error::validation("start_time must be before end_time"));
        }
        if self.pair_names.is_empty() {
            return Err(Error::validation("at least one pair is required"));
        }
        if self.balance < 0 {
            return Err(Error::validation("balance must not be negative"));
        }
        if self.spread < Decimal::ZERO {
            return Err(Error::validation("spread must not be negative"));
        }
        Ok(())
    }

    /// Whether a repository reload should relaunch this backtest.
    pub fn start_on_startup(&self) -> bool {
        matches!(
            self.status,
            BacktestStatus::WaitForStart | BacktestStatus::Paused
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn params() -> NewBacktest {
        NewBacktest {
            name: "trend sweep".to_string(),
            memo: Some("first run".to_string()),
            spread: Decimal::new(3, 3),
            start_time: Utc.timestamp_opt(100, 0).unwrap(),
            end_time: Utc.timestamp_opt(2000, 0).unwrap(),
            tick_interval: Interval::FifteenSeconds,
            pair_names: vec!["EURUSD".to_string(), "USDJPY".to_string()],
            balance: 100_000,
            agent_settings: vec![],
        }
    }

    #[test]
    fn test_create_starts_waiting() {
        let record = BacktestRecord::create(params()).unwrap();
        assert_eq!(record.status, BacktestStatus::WaitForStart);
        assert!(record.created_at.is_none());
        assert!(record.cancelled_state.is_none());
        assert!(record.start_on_startup());
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut p = params();
        p.name = String::new();
        let err = BacktestRecord::create(p).unwrap_err();
        assert!(matches!(err, Error::ValidationFailed(_)));
    }

    #[test]
    fn test_name_length_bound() {
        let mut p = params();
        p.name = "x".repeat(NAME_MAX_LEN);
        assert!(BacktestRecord::create(p).is_ok());

        let mut p = params();
        p.name = "x".repeat(NAME_MAX_LEN + 1);
        assert!(BacktestRecord::create(p).is_err());
    }

    #[test]
    fn test_memo_length_bound() {
        let mut p = params();
        p.memo = Some("y".repeat(MEMO_MAX_LEN + 1));
        assert!(BacktestRecord::create(p).is_err());
    }

    #[test]
    fn test_inverted_period_rejected() {
        let mut p = params();
        p.end_time = p.start_time;
        assert!(BacktestRecord::create(p).is_err());
    }

    #[test]
    fn test_empty_pairs_rejected() {
        let mut p = params();
        p.pair_names.clear();
        assert!(BacktestRecord::create(p).is_err());
    }

    #[test]
    fn test_negative_balance_rejected() {
        let mut p = params();
        p.balance = 0;
        assert!(BacktestRecord::create(p).is_ok());

        let mut p = params();
        p.balance = -1;
        assert!(BacktestRecord::create(p).is_err());
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            BacktestStatus::WaitForStart,
            BacktestStatus::Running,
            BacktestStatus::Paused,
            BacktestStatus::Cancelled,
            BacktestStatus::Finished,
        ] {
            assert_eq!(BacktestStatus::from_str_opt(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_only_waiting_and_paused_relaunch() {
        let mut record = BacktestRecord::create(params()).unwrap();
        record.status = BacktestStatus::Paused;
        assert!(record.start_on_startup());
        record.status = BacktestStatus::Running;
        assert!(!record.start_on_startup());
        record.status = BacktestStatus::Cancelled;
        assert!(!record.start_on_startup());
        record.status = BacktestStatus::Finished;
        assert!(!record.start_on_startup());
    }
}
