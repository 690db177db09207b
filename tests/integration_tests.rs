//! Integration tests across the engine crates.
//!
//! Each test drives the public surface end to end: registry, worker,
//! agent runtime and stores wired together the way the server wires them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::Semaphore;
use uuid::Uuid;

use agent_rpc::{
    agent_service_router, Agent, AgentHost, AgentProxyPool, AgentService, RpcAgentService,
};
use backtest_engine::{BacktestRegistry, BacktestView, EngineDeps, RunStatus};
use tickrig_core::db::{MemoryBacktestStore, MemoryPositionStore, MemoryTickSource};
use tickrig_core::types::{
    AgentClass, AgentSetting, BacktestRecord, BacktestStatus, Interval, NewBacktest, Tick,
};
use tickrig_core::Result;

const COUNTING_CLASS: &str = "Counting@native";
const PACED_CLASS: &str = "Paced@native";

/// Counts delivered ticks; an optional pace keeps a run alive long
/// enough for control commands to land mid-feed.
struct TickCounter {
    ticks_seen: u64,
    pace: Option<Duration>,
}

#[async_trait::async_trait]
impl Agent for TickCounter {
    async fn next_tick(&mut self, _tick: &Tick) -> Result<()> {
        self.ticks_seen += 1;
        if let Some(pace) = self.pace {
            tokio::time::sleep(pace).await;
        }
        Ok(())
    }

    fn state(&self) -> serde_json::Value {
        json!({ "ticks_seen": self.ticks_seen })
    }

    fn restore_state(&mut self, state: &serde_json::Value) {
        self.ticks_seen = state
            .get("ticks_seen")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
    }
}

fn agent_host() -> Arc<AgentHost> {
    let host = AgentHost::new();
    host.register_class(
        AgentClass {
            name: COUNTING_CLASS.to_string(),
            description: "counts delivered ticks".to_string(),
            properties: vec![],
        },
        Box::new(|| {
            Box::new(TickCounter {
                ticks_seen: 0,
                pace: None,
            })
        }),
    );
    host.register_class(
        AgentClass {
            name: PACED_CLASS.to_string(),
            description: "counts ticks at a throttled pace".to_string(),
            properties: vec![],
        },
        Box::new(|| {
            Box::new(TickCounter {
                ticks_seen: 0,
                pace: Some(Duration::from_millis(1)),
            })
        }),
    );
    Arc::new(host)
}

fn memory_deps(agent_service: Arc<dyn AgentService>, workers: usize) -> EngineDeps {
    EngineDeps {
        backtest_store: Arc::new(MemoryBacktestStore::new()),
        position_store: Arc::new(MemoryPositionStore::new()),
        tick_source: Arc::new(MemoryTickSource::synthetic([
            ("EURUSD".to_string(), Decimal::new(11000, 4)),
            ("USDJPY".to_string(), Decimal::new(13530, 2)),
        ])),
        agent_service,
        proxy_pool: Arc::new(AgentProxyPool::new()),
        simulation_pool: Arc::new(Semaphore::new(workers)),
    }
}

fn run_params(name: &str, start_s: i64, end_s: i64, class_name: &str, balance: i64) -> NewBacktest {
    NewBacktest {
        name: name.to_string(),
        memo: None,
        spread: Decimal::ZERO,
        start_time: Utc.timestamp_opt(start_s, 0).unwrap(),
        end_time: Utc.timestamp_opt(end_s, 0).unwrap(),
        tick_interval: Interval::FifteenSeconds,
        pair_names: vec!["EURUSD".to_string(), "USDJPY".to_string()],
        balance,
        agent_settings: vec![AgentSetting::new(class_name)],
    }
}

fn captured_ticks(record: &BacktestRecord) -> u64 {
    record.agent_settings[0]
        .state
        .as_ref()
        .and_then(|state| state["ticks_seen"].as_u64())
        .unwrap_or(0)
}

async fn view_of(registry: &BacktestRegistry, id: Uuid) -> BacktestView {
    let entry = registry.get(id).expect("backtest registered");
    let view = entry.lock().await.view().await.expect("worker answers");
    view
}

async fn wait_for_live_view(registry: &BacktestRegistry, id: Uuid) -> BacktestView {
    for _ in 0..400 {
        let view = view_of(registry, id).await;
        if view.status == RunStatus::Running && view.current_time.is_some() {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("backtest {id} never went live");
}

async fn wait_for_status(registry: &BacktestRegistry, id: Uuid, status: RunStatus) {
    for _ in 0..400 {
        if view_of(registry, id).await.status == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("backtest {id} never reached {status:?}");
}

async fn wait_for_time_past(registry: &BacktestRegistry, id: Uuid, threshold: DateTime<Utc>) {
    for _ in 0..400 {
        let view = view_of(registry, id).await;
        if view.current_time.is_some_and(|t| t > threshold) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("backtest {id} never advanced past {threshold}");
}

/// A run observed live, cancelled, then read back through a fresh
/// registry as a restarted host would see it.
#[tokio::test]
async fn test_backtest_lifecycle_survives_a_restart() {
    let deps = memory_deps(agent_host(), 2);
    let registry = BacktestRegistry::new(deps.clone());

    let created = registry
        .create(run_params("eurusd probe", 0, 150_000, PACED_CLASS, 100_000))
        .await
        .unwrap();
    assert_eq!(registry.len(), 1);

    let live = wait_for_live_view(&registry, created.id).await;
    assert!(live.progress.is_some());

    let entry = registry.get(created.id).unwrap();
    entry.lock().await.cancel().await.unwrap();

    let reloaded = BacktestRegistry::new(deps.clone());
    reloaded.load().await.unwrap();

    let view = view_of(&reloaded, created.id).await;
    assert_eq!(view.status, RunStatus::Cancelled);
    assert!(view.progress.is_none());
    assert!(view.current_time.is_none());
    assert_eq!(view.name, "eurusd probe");
    assert_eq!(view.pair_names, vec!["EURUSD", "USDJPY"]);
    assert_eq!(view.balance, 100_000);
    assert_eq!(view.start_time, Utc.timestamp_opt(0, 0).unwrap());
    assert_eq!(view.end_time, Utc.timestamp_opt(150_000, 0).unwrap());

    let record = reloaded
        .get(created.id)
        .unwrap()
        .lock()
        .await
        .record()
        .clone();
    let snapshot = record
        .cancelled_state
        .as_ref()
        .expect("cancel wrote a snapshot");
    assert_eq!(snapshot.balance, Decimal::new(100_000, 0));
    assert!(captured_ticks(&record) >= 1);
}

/// Pausing captures agent state into the record; resuming restores the
/// counter and picks the feed up past the suspension point.
#[tokio::test]
async fn test_pause_and_resume_carry_agent_state() {
    let deps = memory_deps(agent_host(), 2);
    let registry = BacktestRegistry::new(deps.clone());
    let created = registry
        .create(run_params("carry trade", 0, 1_500_000, PACED_CLASS, 50_000))
        .await
        .unwrap();

    let entry = registry.get(created.id).unwrap();
    wait_for_live_view(&registry, created.id).await;

    entry.lock().await.pause().await.unwrap();
    let paused = entry.lock().await.record().clone();
    assert_eq!(paused.status, BacktestStatus::Paused);
    let captured = captured_ticks(&paused);
    assert!(captured >= 1);
    let suspended_at = paused
        .cancelled_state
        .as_ref()
        .expect("pause wrote a snapshot")
        .cancelled_time;

    entry.lock().await.start().await.unwrap();
    wait_for_time_past(&registry, created.id, suspended_at).await;

    let graph = entry.lock().await.balance_graph().await.unwrap();
    assert!(!graph.is_empty());

    entry.lock().await.cancel().await.unwrap();
    let finished = entry.lock().await.record().clone();
    assert_eq!(finished.status, BacktestStatus::Cancelled);
    assert!(captured_ticks(&finished) > captured);
}

/// Agents hosted behind a real HTTP boundary: the engine drives them
/// through `RpcAgentService` against a served router, and the captured
/// state shows every tick crossed the wire.
#[tokio::test]
async fn test_agents_run_behind_the_http_boundary() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, agent_service_router(agent_host()))
            .await
            .unwrap();
    });

    let service: Arc<dyn AgentService> =
        Arc::new(RpcAgentService::new(format!("http://{addr}")));
    assert!(service.available().await);

    let registry = BacktestRegistry::new(memory_deps(service, 2));
    let created = registry
        .create(run_params("wire probe", 0, 600, COUNTING_CLASS, 100_000))
        .await
        .unwrap();

    wait_for_status(&registry, created.id, RunStatus::Finished).await;

    let entry = registry.get(created.id).unwrap();
    entry.lock().await.pause().await.unwrap();
    let record = entry.lock().await.record().clone();
    assert_eq!(record.status, BacktestStatus::Finished);
    assert_eq!(captured_ticks(&record), 40);
}

/// With a single simulation slot the second run queues: it reports
/// wait_for_start until the first run gives the slot up.
#[tokio::test]
async fn test_worker_pool_queues_excess_runs() {
    let deps = memory_deps(agent_host(), 1);
    let registry = BacktestRegistry::new(deps);

    let first = registry
        .create(run_params("front runner", 0, 1_500_000, PACED_CLASS, 100_000))
        .await
        .unwrap();
    wait_for_live_view(&registry, first.id).await;

    let second = registry
        .create(run_params("queued run", 0, 1_500_000, PACED_CLASS, 100_000))
        .await
        .unwrap();
    assert_eq!(second.status, RunStatus::WaitForStart);
    assert_eq!(registry.views().await.unwrap().len(), 2);

    registry
        .get(first.id)
        .unwrap()
        .lock()
        .await
        .cancel()
        .await
        .unwrap();
    wait_for_live_view(&registry, second.id).await;

    registry
        .get(second.id)
        .unwrap()
        .lock()
        .await
        .cancel()
        .await
        .unwrap();
}
