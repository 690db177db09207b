//! In-process agent runtime.
//!
//! Agents compiled into the engine binary register a factory here and the
//! host serves the same [`AgentService`] contract the HTTP client does, so
//! the engine cannot tell a native agent from a remote one. Uploaded
//! sources are validated and recorded for bookkeeping; only natively
//! registered classes are instantiable.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use tickrig_core::types::{AgentClass, Property, Tick};
use tickrig_core::{Error, Result};

use crate::service::AgentService;

/// A trading agent hosted in the engine process.
///
/// Only `next_tick` is required; the other hooks default to no-ops so a
/// minimal agent stays minimal.
#[async_trait]
pub trait Agent: Send {
    /// Called once after creation, before any tick is delivered.
    async fn post_create(&mut self) -> Result<()> {
        Ok(())
    }

    /// Handle one tick.
    async fn next_tick(&mut self, tick: &Tick) -> Result<()>;

    /// Handle a UI action, optionally returning a message for the user.
    async fn action(&mut self, _action: &str) -> Result<Option<String>> {
        Ok(None)
    }

    /// Capture serializable state for a later restore.
    fn state(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    /// Restore from state previously captured by [`Self::state`].
    fn restore_state(&mut self, _state: &serde_json::Value) {}

    /// Apply property values.
    fn set_properties(&mut self, _properties: &[Property]) -> Result<()> {
        Ok(())
    }
}

/// Builds a fresh agent instance for one registered class.
pub type AgentFactory = Box<dyn Fn() -> Box<dyn Agent> + Send + Sync>;

type SharedAgent = Arc<Mutex<Box<dyn Agent>>>;

/// Registry of native agent classes and their live instances.
pub struct AgentHost {
    /// Registration order is the order `agent_classes` reports.
    classes: RwLock<Vec<(AgentClass, AgentFactory)>>,
    instances: DashMap<String, SharedAgent>,
    sources: DashMap<String, String>,
}

impl AgentHost {
    pub fn new() -> Self {
        Self {
            classes: RwLock::new(Vec::new()),
            instances: DashMap::new(),
            sources: DashMap::new(),
        }
    }

    /// Register a class and the factory that instantiates it.
    ///
    /// Re-registering a name replaces the earlier entry in place.
    pub fn register_class(&self, class: AgentClass, factory: AgentFactory) {
        let mut classes = match self.classes.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(slot) = classes.iter_mut().find(|(c, _)| c.name == class.name) {
            *slot = (class, factory);
        } else {
            classes.push((class, factory));
        }
    }

    fn build(&self, class_name: &str) -> Result<Box<dyn Agent>> {
        let classes = match self.classes.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        classes
            .iter()
            .find(|(class, _)| class.name == class_name)
            .map(|(_, factory)| factory())
            .ok_or_else(|| Error::not_found(format!("agent class '{}'", class_name)))
    }

    fn instance(&self, instance_id: &str) -> Result<SharedAgent> {
        self.instances
            .get(instance_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::not_found(format!("agent instance '{}'", instance_id)))
    }
}

impl Default for AgentHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentService for AgentHost {
    async fn available(&self) -> bool {
        true
    }

    async fn register_source(&self, name: &str, body: &str) -> Result<()> {
        if body.trim().is_empty() {
            return Err(Error::illegal_argument(format!(
                "agent source '{}' has an empty body",
                name
            )));
        }
        self.sources.insert(name.to_string(), body.to_string());
        Ok(())
    }

    async fn unregister_source(&self, name: &str) -> Result<()> {
        self.sources.remove(name);
        Ok(())
    }

    async fn agent_classes(&self) -> Result<Vec<AgentClass>> {
        let classes = match self.classes.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(classes.iter().map(|(class, _)| class.clone()).collect())
    }

    async fn create_instance(
        &self,
        class_name: &str,
        agent_name: Option<&str>,
        properties: &[Property],
    ) -> Result<String> {
        let mut agent = self.build(class_name)?;
        agent.set_properties(properties)?;

        let instance_id = Uuid::new_v4().to_string();
        tracing::debug!(
            class = %class_name,
            name = agent_name.unwrap_or(class_name),
            instance_id = %instance_id,
            "agent instance created"
        );
        self.instances
            .insert(instance_id.clone(), Arc::new(Mutex::new(agent)));
        Ok(instance_id)
    }

    async fn exec_post_create(&self, instance_id: &str) -> Result<()> {
        let agent = self.instance(instance_id)?;
        let mut agent = agent.lock().await;
        agent.post_create().await
    }

    async fn restore_state(&self, instance_id: &str, state: &serde_json::Value) -> Result<()> {
        let agent = self.instance(instance_id)?;
        let mut agent = agent.lock().await;
        agent.restore_state(state);
        Ok(())
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<()> {
        self.instances
            .remove(instance_id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("agent instance '{}'", instance_id)))
    }

    async fn agent_state(&self, instance_id: &str) -> Result<serde_json::Value> {
        let agent = self.instance(instance_id)?;
        let agent = agent.lock().await;
        Ok(agent.state())
    }

    async fn set_properties(&self, instance_id: &str, properties: &[Property]) -> Result<()> {
        let agent = self.instance(instance_id)?;
        let mut agent = agent.lock().await;
        agent.set_properties(properties)
    }

    async fn next_tick(&self, instance_id: &str, tick: &Tick) -> Result<()> {
        let agent = self.instance(instance_id)?;
        let mut agent = agent.lock().await;
        agent.next_tick(tick).await
    }

    async fn send_action(&self, instance_id: &str, action: &str) -> Result<Option<String>> {
        let agent = self.instance(instance_id)?;
        let mut agent = agent.lock().await;
        agent.action(action).await
    }
}
