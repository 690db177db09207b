//! Backtest lifecycle orchestration.
//!
//! A [`Backtest`] pairs the persistent [`BacktestRecord`] with the live
//! runtime pieces of a run: the simulation worker, the broker it drives
//! and the agent proxies wired to that broker. Starting builds the
//! runtime, pausing captures a resumable snapshot into the record, and
//! resuming rebuilds the runtime from that snapshot.

use std::sync::Arc;

use chrono::Duration;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Semaphore;
use uuid::Uuid;

use agent_rpc::{
    create_agent_proxy, AgentProxy, AgentProxyPool, AgentService, BrokerPort,
};
use tickrig_core::db::{BacktestStore, PositionStore, TickSource};
use tickrig_core::types::{
    AgentSetting, BacktestRecord, BacktestStatus, CancelledSnapshot, Interval, NewBacktest,
};
use tickrig_core::{Error, Result};

use crate::broker::BacktestBroker;
use crate::context::{BalancePoint, RunStatus, TradingContext};
use crate::jobs::NotifyNextTickJob;
use crate::process::Process;
use crate::rate_retriever::RateRetriever;

/// Gap between a suspension snapshot and the resumed feed, so the tick
/// that was in flight when the run stopped is not replayed.
const RESUME_GAP_SECS: i64 = 15;

/// Everything a backtest needs from the outside world.
#[derive(Clone)]
pub struct EngineDeps {
    pub backtest_store: Arc<dyn BacktestStore>,
    pub position_store: Arc<dyn PositionStore>,
    pub tick_source: Arc<dyn TickSource>,
    pub agent_service: Arc<dyn AgentService>,
    pub proxy_pool: Arc<AgentProxyPool>,
    pub simulation_pool: Arc<Semaphore>,
}

/// Live pieces of a started run. Dropped as a unit when the run is
/// restarted or destroyed.
struct RunComponents {
    process: Process,
    broker: BacktestBroker,
    agents: Vec<Arc<AgentProxy>>,
}

/// One backtest: its persistent record plus, once started, its runtime.
pub struct Backtest {
    record: BacktestRecord,
    deps: EngineDeps,
    runtime: Option<RunComponents>,
}

impl std::fmt::Debug for Backtest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backtest")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

impl Backtest {
    /// Wrap an already-persisted record, e.g. during a repository load.
    pub fn new(record: BacktestRecord, deps: EngineDeps) -> Self {
        Self {
            record,
            deps,
            runtime: None,
        }
    }

    /// Validate `params`, persist a fresh record and wrap it.
    pub async fn create(params: NewBacktest, deps: EngineDeps) -> Result<Self> {
        let mut record = BacktestRecord::create(params)?;
        record.created_at = Some(chrono::Utc::now());
        deps.backtest_store.save(&record).await?;
        tracing::info!(backtest_id = %record.id, name = %record.name, "backtest created");
        Ok(Self::new(record, deps))
    }

    pub fn id(&self) -> Uuid {
        self.record.id
    }

    pub fn record(&self) -> &BacktestRecord {
        &self.record
    }

    /// Whether a repository load should relaunch this run.
    pub fn start_on_startup(&self) -> bool {
        self.record.start_on_startup()
    }

    /// Launch the simulation worker.
    ///
    /// Accepted from `wait_for_start` and `paused`. A paused run resumes
    /// from its snapshot: the feed restarts shortly after the captured
    /// time, pending orders and open positions are re-seeded, and agents
    /// are rebuilt from their captured state.
    pub async fn start(&mut self) -> Result<()> {
        match self.record.status {
            BacktestStatus::WaitForStart | BacktestStatus::Paused => {}
            other => {
                return Err(Error::illegal_state(format!(
                    "cannot start a backtest in status '{}'",
                    other.as_str()
                )));
            }
        }
        self.dispose_runtime().await;

        let sim_start = match &self.record.cancelled_state {
            Some(snapshot) => {
                if self.record.tick_interval != Interval::FifteenSeconds {
                    tracing::warn!(
                        backtest_id = %self.record.id,
                        interval = self.record.tick_interval.id(),
                        "resume gap is fixed at {RESUME_GAP_SECS}s; coarser feeds may skip ticks"
                    );
                }
                snapshot.cancelled_time + Duration::seconds(RESUME_GAP_SECS)
            }
            None => self.record.start_time,
        };
        let retriever = RateRetriever::new(
            Arc::clone(&self.deps.tick_source),
            self.record.pair_names.clone(),
            sim_start,
            self.record.end_time,
            self.record.tick_interval,
            self.record.spread,
        )?;

        let initial_balance = match &self.record.cancelled_state {
            Some(snapshot) => snapshot.balance,
            None => Decimal::from(self.record.balance),
        };
        let broker = BacktestBroker::new(
            self.record.id,
            retriever,
            self.record.pair_names.clone(),
            initial_balance,
            Arc::clone(&self.deps.position_store),
        );
        if let Some(snapshot) = &self.record.cancelled_state {
            broker.restore_orders(snapshot.orders.clone()).await;
        }
        if self.record.status == BacktestStatus::Paused {
            let positions = self
                .deps
                .position_store
                .list_for_backtest(self.record.id)
                .await?;
            broker
                .restore_positions(positions.into_iter().filter(|p| p.is_open()).collect())
                .await;
        }

        let agents = self.create_agents(&broker).await?;
        let context = TradingContext::new(self.record.id, broker.clone(), agents.clone());
        let process = Process::spawn(context, Arc::clone(&self.deps.simulation_pool));
        // Progress is always measured against the original period, so a
        // resumed run picks up where the bar left off.
        process.start(vec![Box::new(NotifyNextTickJob::new(
            self.record.start_time,
            self.record.end_time,
        ))])?;
        self.runtime = Some(RunComponents {
            process,
            broker,
            agents,
        });

        self.record.status = BacktestStatus::Running;
        self.record.cancelled_state = None;
        self.deps.backtest_store.save(&self.record).await?;
        tracing::info!(backtest_id = %self.record.id, "backtest started");
        Ok(())
    }

    /// Suspend the run and persist a snapshot it can resume from.
    pub async fn pause(&mut self) -> Result<()> {
        let Some(runtime) = &self.runtime else {
            return Err(Error::illegal_state("backtest has no live worker"));
        };
        runtime.process.pause()?;
        self.save_state().await
    }

    /// Stop the run for good.
    ///
    /// A run whose feed already finished cannot be cancelled; a backtest
    /// that never started is left untouched.
    pub async fn cancel(&mut self) -> Result<()> {
        let Some(runtime) = &self.runtime else {
            return Ok(());
        };
        let finished = runtime
            .process
            .post_exec(|context| context.is_finished())
            .await?;
        if finished {
            return Err(Error::illegal_state("backtest already finished"));
        }
        runtime.process.cancel()?;
        self.save_state().await
    }

    /// Capture the run's current state into the record and persist it.
    ///
    /// The worker is queried at a step boundary; once the status answer
    /// arrives after a pause or cancel the worker is no longer stepping,
    /// so the broker can be read directly. A run that produced no tick
    /// yet gets no snapshot and would resume from the original start; a
    /// run whose feed already ended keeps its final status, also without
    /// a snapshot.
    pub async fn save_state(&mut self) -> Result<()> {
        let Some(runtime) = &self.runtime else {
            return Ok(());
        };
        let live = runtime
            .process
            .post_exec(|context| context.live_status())
            .await?;

        for (setting, proxy) in self.record.agent_settings.iter_mut().zip(&runtime.agents) {
            match proxy.state().await {
                Ok(state) => setting.state = Some(state),
                Err(err) => {
                    tracing::warn!(
                        backtest_id = %self.record.id,
                        agent = %proxy.agent_name(),
                        error = %err,
                        "agent state capture failed; resume will create it fresh"
                    );
                }
            }
        }

        self.record.status = live.status.to_record_status();
        let suspended = matches!(
            self.record.status,
            BacktestStatus::Paused | BacktestStatus::Cancelled
        );
        self.record.cancelled_state = match live.current_time {
            Some(cancelled_time) if suspended => Some(CancelledSnapshot {
                cancelled_time,
                orders: runtime.broker.orders().await?,
                balance: runtime.broker.account().await?.balance,
            }),
            _ => None,
        };
        runtime.broker.flush_positions().await?;
        self.deps.backtest_store.save(&self.record).await?;
        tracing::debug!(
            backtest_id = %self.record.id,
            status = self.record.status.as_str(),
            "backtest state saved"
        );
        Ok(())
    }

    /// Project the record for the API, overlaying live fields while the
    /// persisted status still says running.
    pub async fn view(&self) -> Result<BacktestView> {
        let mut view = BacktestView::from_record(&self.record);
        if self.record.status == BacktestStatus::Running {
            if let Some(runtime) = &self.runtime {
                let live = runtime
                    .process
                    .post_exec(|context| context.live_status())
                    .await?;
                view.status = live.status;
                view.progress = Some(live.progress);
                view.current_time = live.current_time;
            }
        }
        Ok(view)
    }

    /// Account balance over time, sampled per delivered tick.
    pub async fn balance_graph(&self) -> Result<Vec<BalancePoint>> {
        match &self.runtime {
            Some(runtime) => {
                runtime
                    .process
                    .post_exec(|context| context.balance_graph().to_vec())
                    .await
            }
            None => Ok(Vec::new()),
        }
    }

    /// Tear the run down and delete everything it persisted.
    pub async fn destroy(&mut self) -> Result<()> {
        self.dispose_runtime().await;
        self.deps
            .position_store
            .delete_for_backtest(self.record.id)
            .await?;
        self.deps.backtest_store.delete(self.record.id).await?;
        tracing::info!(backtest_id = %self.record.id, "backtest destroyed");
        Ok(())
    }

    async fn create_agents(&self, broker: &BacktestBroker) -> Result<Vec<Arc<AgentProxy>>> {
        let mut agents: Vec<Arc<AgentProxy>> = Vec::new();
        for setting in &self.record.agent_settings {
            match self.create_agent(broker, setting).await {
                Ok(proxy) => agents.push(proxy),
                Err(err) => {
                    self.dispose_agents(&agents).await;
                    return Err(err);
                }
            }
        }
        Ok(agents)
    }

    async fn create_agent(
        &self,
        broker: &BacktestBroker,
        setting: &AgentSetting,
    ) -> Result<Arc<AgentProxy>> {
        let proxy = create_agent_proxy(
            Arc::clone(&self.deps.agent_service),
            &self.deps.proxy_pool,
            setting,
        )
        .await?;
        proxy.bind_broker(Arc::new(broker.clone())).await;
        match &setting.state {
            Some(state) => proxy.restore_state(state).await?,
            None => proxy.post_create().await?,
        }
        Ok(proxy)
    }

    async fn dispose_runtime(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            let _ = runtime.process.cancel();
            self.dispose_agents(&runtime.agents).await;
        }
    }

    async fn dispose_agents(&self, agents: &[Arc<AgentProxy>]) {
        for proxy in agents {
            if let Err(err) = proxy.delete().await {
                tracing::warn!(
                    backtest_id = %self.record.id,
                    agent = %proxy.agent_name(),
                    error = %err,
                    "agent instance cleanup failed"
                );
            }
            self.deps.proxy_pool.remove(proxy.instance_id());
        }
    }
}

/// API projection of one backtest.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestView {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub spread: Decimal,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: chrono::DateTime<chrono::Utc>,
    pub tick_interval: Interval,
    pub pair_names: Vec<String>,
    pub balance: i64,
    pub agent_settings: Vec<AgentSetting>,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl BacktestView {
    fn from_record(record: &BacktestRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            memo: record.memo.clone(),
            created_at: record.created_at,
            spread: record.spread,
            start_time: record.start_time,
            end_time: record.end_time,
            tick_interval: record.tick_interval,
            pair_names: record.pair_names.clone(),
            balance: record.balance,
            agent_settings: record.agent_settings.clone(),
            status: record.status.into(),
            progress: None,
            current_time: None,
        }
    }
}
