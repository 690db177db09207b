//! Agent instance proxies.
//!
//! An [`AgentProxy`] wraps one remote (or hosted) agent instance and owns
//! the engine side of its lifecycle. Proxies for every live backtest sit
//! in the shared [`AgentProxyPool`], which is how broker callbacks find
//! their way from an instance id back to the backtest that owns it.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use tickrig_core::types::{Account, AgentSetting, Order, Position, Property, Tick};
use tickrig_core::{Error, Result};

use crate::messages::{OrderRequest, OrderResult};
use crate::service::AgentService;

/// Broker operations an agent may invoke while handling a tick.
///
/// Each backtest binds its own implementation to the proxies it owns;
/// the callback router resolves the instance id through the pool and
/// dispatches here.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerPort: Send + Sync {
    async fn account(&self) -> Result<Account>;
    async fn pair_names(&self) -> Result<Vec<String>>;
    /// Tick most recently delivered; `None` before the first one.
    async fn current_tick(&self) -> Result<Option<Tick>>;
    async fn positions(&self) -> Result<Vec<Position>>;
    async fn orders(&self) -> Result<Vec<Order>>;
    async fn submit_order(&self, request: OrderRequest) -> Result<OrderResult>;
    async fn close_position(&self, position_id: Uuid) -> Result<Position>;
}

impl std::fmt::Debug for dyn BrokerPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerPort").finish_non_exhaustive()
    }
}

/// Engine-side handle for one agent instance.
pub struct AgentProxy {
    instance_id: String,
    agent_name: String,
    class_name: String,
    service: Arc<dyn AgentService>,
    broker: RwLock<Option<Arc<dyn BrokerPort>>>,
}

impl AgentProxy {
    pub fn new(
        instance_id: impl Into<String>,
        agent_name: impl Into<String>,
        class_name: impl Into<String>,
        service: Arc<dyn AgentService>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            agent_name: agent_name.into(),
            class_name: class_name.into(),
            service,
            broker: RwLock::new(None),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Attach the broker this instance's callbacks should reach.
    pub async fn bind_broker(&self, broker: Arc<dyn BrokerPort>) {
        *self.broker.write().await = Some(broker);
    }

    /// The bound broker; an unbound proxy cannot serve callbacks.
    pub async fn broker(&self) -> Result<Arc<dyn BrokerPort>> {
        self.broker.read().await.clone().ok_or_else(|| {
            Error::illegal_state(format!(
                "no broker bound to agent instance '{}'",
                self.instance_id
            ))
        })
    }

    pub async fn post_create(&self) -> Result<()> {
        self.service.exec_post_create(&self.instance_id).await
    }

    pub async fn restore_state(&self, state: &serde_json::Value) -> Result<()> {
        self.service.restore_state(&self.instance_id, state).await
    }

    pub async fn state(&self) -> Result<serde_json::Value> {
        self.service.agent_state(&self.instance_id).await
    }

    pub async fn set_properties(&self, properties: &[Property]) -> Result<()> {
        self.service
            .set_properties(&self.instance_id, properties)
            .await
    }

    pub async fn next_tick(&self, tick: &Tick) -> Result<()> {
        self.service.next_tick(&self.instance_id, tick).await
    }

    pub async fn send_action(&self, action: &str) -> Result<Option<String>> {
        self.service.send_action(&self.instance_id, action).await
    }

    /// Discard the remote instance.
    pub async fn delete(&self) -> Result<()> {
        self.service.delete_instance(&self.instance_id).await
    }
}

impl std::fmt::Debug for AgentProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentProxy")
            .field("instance_id", &self.instance_id)
            .field("agent_name", &self.agent_name)
            .field("class_name", &self.class_name)
            .finish()
    }
}

/// Live agent proxies across all backtests, keyed by instance id.
#[derive(Default)]
pub struct AgentProxyPool {
    proxies: DashMap<String, Arc<AgentProxy>>,
}

impl AgentProxyPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, proxy: Arc<AgentProxy>) {
        self.proxies.insert(proxy.instance_id().to_string(), proxy);
    }

    pub fn get(&self, instance_id: &str) -> Result<Arc<AgentProxy>> {
        self.proxies
            .get(instance_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::not_found(format!("agent instance '{}'", instance_id)))
    }

    pub fn remove(&self, instance_id: &str) -> Option<Arc<AgentProxy>> {
        self.proxies.remove(instance_id).map(|(_, proxy)| proxy)
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

/// Create an agent instance from its setting and register the proxy in
/// the pool.
///
/// The caller still binds a broker and runs the post-create hook; those
/// steps belong to the backtest that owns the agent.
pub async fn create_agent_proxy(
    service: Arc<dyn AgentService>,
    pool: &AgentProxyPool,
    setting: &AgentSetting,
) -> Result<Arc<AgentProxy>> {
    let instance_id = service
        .create_instance(
            &setting.class_name,
            setting.agent_name.as_deref(),
            &setting.properties,
        )
        .await?;

    let proxy = Arc::new(AgentProxy::new(
        instance_id,
        setting.display_name(),
        setting.class_name.clone(),
        Arc::clone(&service),
    ));
    pool.insert(Arc::clone(&proxy));
    Ok(proxy)
}
