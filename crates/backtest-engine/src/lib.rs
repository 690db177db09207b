//! Backtest Engine
//!
//! Simulation core of the tickrig host. Each backtest replays a historical
//! tick window through a dedicated worker:
//!
//! - [`rate_retriever::RateRetriever`] pages ticks out of storage and
//!   widens them by the configured spread;
//! - [`broker::BacktestBroker`] fills orders against the replayed prices
//!   and persists position history;
//! - [`process::Process`] owns the run on one tokio task, interleaving
//!   job steps with control commands and state queries;
//! - [`backtest::Backtest`] ties record, broker, worker and agent proxies
//!   into a resumable lifecycle, and [`registry::BacktestRegistry`] keeps
//!   the live set, reloading it across host restarts.

pub mod backtest;
pub mod broker;
pub mod context;
pub mod jobs;
pub mod process;
pub mod rate_retriever;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use backtest::{Backtest, BacktestView, EngineDeps};
pub use broker::BacktestBroker;
pub use context::{BalancePoint, LiveStatus, RunStatus, TradingContext};
pub use jobs::{Job, NotifyNextTickJob, StepOutcome};
pub use process::Process;
pub use rate_retriever::RateRetriever;
pub use registry::BacktestRegistry;
