//! Agent service contract.

use async_trait::async_trait;

use tickrig_core::types::{AgentClass, AgentSource, Property, Tick};
use tickrig_core::Result;

/// Operations the engine invokes against an agent runtime.
///
/// One implementation talks HTTP to an out-of-process runtime
/// ([`crate::client::RpcAgentService`]), the other hosts native agents in
/// the engine process ([`crate::host::AgentHost`]). The engine only ever
/// sees this trait.
#[async_trait]
pub trait AgentService: Send + Sync {
    /// Whether the runtime is reachable. Never errors; an unreachable
    /// runtime is reported as `false`.
    async fn available(&self) -> bool;

    /// Register or replace a named agent source.
    async fn register_source(&self, name: &str, body: &str) -> Result<()>;

    /// Remove a registered source. Unknown names are ignored.
    async fn unregister_source(&self, name: &str) -> Result<()>;

    /// List the agent classes the runtime can instantiate.
    async fn agent_classes(&self) -> Result<Vec<AgentClass>>;

    /// Create an instance of `class_name` and return its identifier.
    async fn create_instance(
        &self,
        class_name: &str,
        agent_name: Option<&str>,
        properties: &[Property],
    ) -> Result<String>;

    /// Run the instance's post-create hook.
    async fn exec_post_create(&self, instance_id: &str) -> Result<()>;

    /// Restore an instance from state captured by [`Self::agent_state`].
    async fn restore_state(&self, instance_id: &str, state: &serde_json::Value) -> Result<()>;

    /// Discard an instance.
    async fn delete_instance(&self, instance_id: &str) -> Result<()>;

    /// Capture the instance's serializable state.
    async fn agent_state(&self, instance_id: &str) -> Result<serde_json::Value>;

    /// Replace the instance's property values.
    async fn set_properties(&self, instance_id: &str, properties: &[Property]) -> Result<()>;

    /// Deliver one tick to the instance.
    async fn next_tick(&self, instance_id: &str, tick: &Tick) -> Result<()>;

    /// Deliver a UI action and return the handler's message, if any.
    async fn send_action(&self, instance_id: &str, action: &str) -> Result<Option<String>>;
}

/// Push a set of stored sources into the runtime, recording the outcome on
/// each one.
///
/// A source that fails to register is marked with the error and skipped;
/// registration of the remaining sources continues. This never fails the
/// caller, so a broken agent script cannot keep the engine from starting.
pub async fn register_sources(service: &dyn AgentService, sources: &mut [AgentSource]) {
    for source in sources.iter_mut() {
        match service.register_source(&source.name, &source.body).await {
            Ok(()) => {
                tracing::debug!(source = %source.name, "agent source registered");
                source.mark_normal();
            }
            Err(err) => {
                tracing::warn!(
                    source = %source.name,
                    error = %err,
                    "agent source failed to register"
                );
                source.mark_error(err.to_string());
            }
        }
    }
}
