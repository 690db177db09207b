//! Shared fixtures for engine tests.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use agent_rpc::{
    create_agent_proxy, Agent, AgentHost, AgentProxy, AgentProxyPool, AgentService,
};
use tickrig_core::db::{MemoryBacktestStore, MemoryPositionStore, MemoryTickSource};
use tickrig_core::types::{AgentClass, AgentSetting, Interval, NewBacktest, Tick};
use tickrig_core::Result;
use tokio::sync::Semaphore;

use crate::backtest::EngineDeps;
use crate::broker::BacktestBroker;
use crate::context::TradingContext;
use crate::rate_retriever::RateRetriever;

pub(crate) fn pairs() -> Vec<String> {
    vec!["EURUSD".to_string(), "USDJPY".to_string()]
}

/// Broker over a deterministic synthetic feed covering `[start, end)`.
pub(crate) fn feed_broker(start_s: i64, end_s: i64) -> BacktestBroker {
    let retriever = RateRetriever::new(
        Arc::new(MemoryTickSource::synthetic([
            ("EURUSD".to_string(), Decimal::new(11000, 4)),
            ("USDJPY".to_string(), Decimal::new(13530, 2)),
        ])),
        pairs(),
        Utc.timestamp_opt(start_s, 0).unwrap(),
        Utc.timestamp_opt(end_s, 0).unwrap(),
        Interval::FifteenSeconds,
        Decimal::ZERO,
    )
    .expect("valid test period");
    BacktestBroker::new(
        Uuid::new_v4(),
        retriever,
        pairs(),
        Decimal::new(100_000, 0),
        Arc::new(MemoryPositionStore::new()),
    )
}

pub(crate) fn context_over_feed(
    start_s: i64,
    end_s: i64,
    agents: Vec<Arc<AgentProxy>>,
) -> TradingContext {
    TradingContext::new(Uuid::new_v4(), feed_broker(start_s, end_s), agents)
}

/// Counts the ticks it receives; state round-trips the count.
struct CountingAgent {
    ticks_seen: u64,
}

#[async_trait::async_trait]
impl Agent for CountingAgent {
    async fn next_tick(&mut self, _tick: &Tick) -> Result<()> {
        self.ticks_seen += 1;
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

/// Errors on the first tick it receives.
struct ExplodingAgent;

#[async_trait::async_trait]
impl Agent for ExplodingAgent {
    async fn next_tick(&mut self, _tick: &Tick) -> Result<()> {
        Err(tickrig_core::Error::illegal_state("agent blew up"))
    }
}

pub(crate) const COUNTING_CLASS: &str = "Counting@native";
pub(crate) const EXPLODING_CLASS: &str = "Exploding@native";

pub(crate) fn agent_host() -> Arc<AgentHost> {
    let host = AgentHost::new();
    host.register_class(
        AgentClass {
            name: COUNTING_CLASS.to_string(),
            description: "counts delivered ticks".to_string(),
            properties: vec![],
        },
        Box::new(|| Box::new(CountingAgent { ticks_seen: 0 })),
    );
    host.register_class(
        AgentClass {
            name: EXPLODING_CLASS.to_string(),
            description: "fails on the first tick".to_string(),
            properties: vec![],
        },
        Box::new(|| Box::new(ExplodingAgent)),
    );
    Arc::new(host)
}

/// A context whose broker is bound to `count` counting agents.
pub(crate) async fn context_with_agents(
    start_s: i64,
    end_s: i64,
    count: usize,
) -> (TradingContext, Vec<Arc<AgentProxy>>) {
    let service: Arc<dyn AgentService> = agent_host();
    let pool = AgentProxyPool::new();
    let broker = feed_broker(start_s, end_s);

    let mut agents = Vec::new();
    for i in 0..count {
        let setting = AgentSetting::new(COUNTING_CLASS).named(format!("counter {i}"));
        let proxy = create_agent_proxy(Arc::clone(&service), &pool, &setting)
            .await
            .expect("counting class is registered");
        proxy.bind_broker(Arc::new(broker.clone())).await;
        agents.push(proxy);
    }

    let context = TradingContext::new(Uuid::new_v4(), broker, agents.clone());
    (context, agents)
}

pub(crate) async fn ticks_seen(proxy: &AgentProxy) -> u64 {
    proxy.state().await.expect("instance alive")["ticks_seen"]
        .as_u64()
        .expect("count present")
}

/// In-memory dependency bundle with both test agent classes registered.
pub(crate) fn engine_deps() -> EngineDeps {
    EngineDeps {
        backtest_store: Arc::new(MemoryBacktestStore::new()),
        position_store: Arc::new(MemoryPositionStore::new()),
        tick_source: Arc::new(MemoryTickSource::synthetic([
            ("EURUSD".to_string(), Decimal::new(11000, 4)),
            ("USDJPY".to_string(), Decimal::new(13530, 2)),
        ])),
        agent_service: agent_host(),
        proxy_pool: Arc::new(AgentProxyPool::new()),
        simulation_pool: Arc::new(Semaphore::new(4)),
    }
}

/// Creation parameters over `[start, end)` with one agent of `class_name`.
pub(crate) fn sweep_params(start_s: i64, end_s: i64, class_name: &str) -> NewBacktest {
    NewBacktest {
        name: "trend sweep".to_string(),
        memo: None,
        spread: Decimal::ZERO,
        start_time: Utc.timestamp_opt(start_s, 0).unwrap(),
        end_time: Utc.timestamp_opt(end_s, 0).unwrap(),
        tick_interval: Interval::FifteenSeconds,
        pair_names: pairs(),
        balance: 100_000,
        agent_settings: vec![AgentSetting::new(class_name)],
    }
}
