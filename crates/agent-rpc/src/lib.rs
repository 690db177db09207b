//! Agent RPC Boundary
//!
//! Trading agents may live in a separate process. This crate carries both
//! directions of that boundary:
//!
//! - **Client side**: [`AgentService`] with one method per lifecycle
//!   operation, implemented over HTTP by [`client::RpcAgentService`] and
//!   in-process by [`host::AgentHost`]; [`proxy::AgentProxy`] wraps one
//!   remote instance and lives in the shared [`proxy::AgentProxyPool`].
//! - **Server side**: axum routers serving the same contract and the
//!   broker callbacks agents make while handling a tick, with engine
//!   errors folded onto RPC statuses at the boundary.

pub mod client;
pub mod host;
pub mod messages;
pub mod proxy;
pub mod server;
pub mod service;
pub mod status;

pub use client::RpcAgentService;
pub use host::{Agent, AgentHost};
pub use proxy::{create_agent_proxy, AgentProxy, AgentProxyPool, BrokerPort};
pub use server::{agent_service_router, broker_service_router};
pub use service::{register_sources, AgentService};
pub use status::{RpcError, RpcResult, StatusBody};
