//! Wire messages for the agent service and broker callback endpoints.
//!
//! Every request body that targets a specific agent carries the instance
//! identifier explicitly, so both routers stay free of path parameters and
//! the same structs serve the client and the server.

#[cfg(test)]
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tickrig_core::types::{
    Account, AgentClass, ClosingPolicy, Order, OrderSide, OrderType, Position, Property, Tick,
};

/// Empty payload for operations that return nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Empty {}

/// Health probe response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Request to register (or replace) an agent source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterSourceRequest {
    /// Source name, unique within the runtime.
    pub name: String,
    /// Full source body.
    pub body: String,
}

/// Request to remove a previously registered source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnregisterSourceRequest {
    pub name: String,
}

/// Agent classes currently known to the runtime.
#[derive(Debug, Serialize, Deserialize)]
pub struct AgentClassesResponse {
    pub classes: Vec<AgentClass>,
}

/// Request to instantiate an agent class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInstanceRequest {
    /// Class to instantiate.
    pub class_name: String,
    /// Display name for the instance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    /// Initial property values.
    #[serde(default)]
    pub properties: Vec<Property>,
}

/// Identifier of a freshly created instance.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateInstanceResponse {
    pub instance_id: String,
}

/// Request addressing an existing instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRequest {
    pub instance_id: String,
}

/// Request to restore an instance from captured state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreStateRequest {
    pub instance_id: String,
    /// State previously returned by the state endpoint.
    pub state: serde_json::Value,
}

/// Captured agent state.
#[derive(Debug, Serialize, Deserialize)]
pub struct AgentStateResponse {
    pub state: serde_json::Value,
}

/// Request to replace an instance's property values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetPropertiesRequest {
    pub instance_id: String,
    pub properties: Vec<Property>,
}

/// Request to deliver one tick to an instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextTickRequest {
    pub instance_id: String,
    pub tick: Tick,
}

/// Request to deliver a UI action to an instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendActionRequest {
    pub instance_id: String,
    pub action: String,
}

/// Optional message produced by an action handler.
#[derive(Debug, Serialize, Deserialize)]
pub struct SendActionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// Broker callbacks. Agents reach back into the engine through these while
// handling a tick, addressed by the instance id the engine handed them.

/// Account snapshot for the backtest the instance belongs to.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub account: Account,
}

/// Pairs traded by the backtest.
#[derive(Debug, Serialize, Deserialize)]
pub struct PairsResponse {
    pub pair_names: Vec<String>,
}

/// Tick most recently delivered to the backtest.
#[derive(Debug, Serialize, Deserialize)]
pub struct TickResponse {
    /// Absent before the first tick.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick: Option<Tick>,
}

/// Open positions of the backtest.
#[derive(Debug, Serialize, Deserialize)]
pub struct PositionsResponse {
    pub positions: Vec<Position>,
}

/// Pending orders of the backtest.
#[derive(Debug, Serialize, Deserialize)]
pub struct OrdersResponse {
    pub orders: Vec<Order>,
}

/// Order parameters as an agent submits them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub pair_name: String,
    pub side: OrderSide,
    pub units: i64,
    pub order_type: OrderType,
    /// Limit price, required for limit orders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closing_policy: Option<ClosingPolicy>,
}

/// Order submission, attributed to the submitting instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOrderRequest {
    pub instance_id: String,
    #[serde(flatten)]
    pub order: OrderRequest,
}

/// Outcome of an order submission.
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResult {
    /// The accepted order.
    pub order: Order,
    /// Position opened by an immediate fill, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened_position: Option<Position>,
}

/// Request to close an open position at the current price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosePositionRequest {
    pub instance_id: String,
    pub position_id: Uuid,
}

/// A single position, typically one just closed.
#[derive(Debug, Serialize, Deserialize)]
pub struct PositionResponse {
    pub position: Position,
}
