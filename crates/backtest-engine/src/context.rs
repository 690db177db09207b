//! Run state owned by one simulation worker.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use agent_rpc::AgentProxy;
use tickrig_core::types::BacktestStatus;

use crate::broker::BacktestBroker;

/// Live status of a run, as the worker sees it.
///
/// Richer than [`BacktestStatus`]: a failed run is visible here but is
/// persisted as cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    WaitForStart,
    Running,
    Paused,
    Cancelled,
    Finished,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::WaitForStart => "wait_for_start",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Finished => "finished",
            RunStatus::Failed => "failed",
        }
    }

    /// What this status persists as.
    pub fn to_record_status(self) -> BacktestStatus {
        match self {
            RunStatus::WaitForStart => BacktestStatus::WaitForStart,
            RunStatus::Running => BacktestStatus::Running,
            RunStatus::Paused => BacktestStatus::Paused,
            RunStatus::Cancelled | RunStatus::Failed => BacktestStatus::Cancelled,
            RunStatus::Finished => BacktestStatus::Finished,
        }
    }
}

impl From<BacktestStatus> for RunStatus {
    fn from(status: BacktestStatus) -> Self {
        match status {
            BacktestStatus::WaitForStart => RunStatus::WaitForStart,
            BacktestStatus::Running => RunStatus::Running,
            BacktestStatus::Paused => RunStatus::Paused,
            BacktestStatus::Cancelled => RunStatus::Cancelled,
            BacktestStatus::Finished => RunStatus::Finished,
        }
    }
}

/// Snapshot of the live fields, read through `post_exec`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveStatus {
    pub status: RunStatus,
    pub progress: f64,
    pub current_time: Option<DateTime<Utc>>,
}

/// One sample of the account balance over simulated time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BalancePoint {
    pub time: DateTime<Utc>,
    pub balance: Decimal,
}

/// Everything one run's worker mutates: the broker handle, the agent
/// team, lifecycle status and the observed progress fields.
pub struct TradingContext {
    backtest_id: Uuid,
    broker: BacktestBroker,
    agents: Vec<Arc<AgentProxy>>,
    status: RunStatus,
    progress: f64,
    current_time: Option<DateTime<Utc>>,
    balance_graph: Vec<BalancePoint>,
}

impl TradingContext {
    pub fn new(backtest_id: Uuid, broker: BacktestBroker, agents: Vec<Arc<AgentProxy>>) -> Self {
        Self {
            backtest_id,
            broker,
            agents,
            status: RunStatus::WaitForStart,
            progress: 0.0,
            current_time: None,
            balance_graph: Vec::new(),
        }
    }

    pub fn backtest_id(&self) -> Uuid {
        self.backtest_id
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn is_finished(&self) -> bool {
        self.status == RunStatus::Finished
    }

    pub fn broker(&self) -> &BacktestBroker {
        &self.broker
    }

    /// Agents in registration order; ticks are delivered in this order.
    pub fn agents(&self) -> &[Arc<AgentProxy>] {
        &self.agents
    }

    pub fn live_status(&self) -> LiveStatus {
        LiveStatus {
            status: self.status,
            progress: self.progress,
            current_time: self.current_time,
        }
    }

    pub fn balance_graph(&self) -> &[BalancePoint] {
        &self.balance_graph
    }

    pub(crate) fn begin(&mut self) {
        tracing::info!(backtest_id = %self.backtest_id, "simulation started");
        self.status = RunStatus::Running;
    }

    pub(crate) fn pause(&mut self) {
        tracing::info!(backtest_id = %self.backtest_id, "simulation paused");
        self.status = RunStatus::Paused;
    }

    pub(crate) fn cancel(&mut self) {
        tracing::info!(backtest_id = %self.backtest_id, "simulation cancelled");
        self.status = RunStatus::Cancelled;
    }

    pub(crate) fn finish(&mut self) {
        tracing::info!(backtest_id = %self.backtest_id, "simulation finished");
        self.status = RunStatus::Finished;
    }

    pub(crate) fn fail(&mut self) {
        tracing::info!(backtest_id = %self.backtest_id, "simulation failed");
        self.status = RunStatus::Failed;
    }

    /// Record the outcome of one delivered tick.
    pub(crate) fn observe_tick(
        &mut self,
        time: DateTime<Utc>,
        progress: f64,
        balance: Decimal,
    ) {
        self.current_time = Some(time);
        self.progress = progress;
        self.balance_graph.push(BalancePoint { time, balance });
    }
}

impl std::fmt::Debug for TradingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingContext")
            .field("backtest_id", &self.backtest_id)
            .field("status", &self.status)
            .field("progress", &self.progress)
            .field("current_time", &self.current_time)
            .finish()
    }
}
