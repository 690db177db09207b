//! Agent configuration and source types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A configuration value for one agent property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Number(Decimal),
    String(String),
}

impl PropertyValue {
    pub fn string(value: impl Into<String>) -> Self {
        PropertyValue::String(value.into())
    }
}

/// One property in an ordered bag: identifier, display name, value.
///
/// Property bags are ordered triples, never open maps; registration order
/// is preserved end to end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: String,
    pub name: String,
    pub value: PropertyValue,
}

impl Property {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        value: PropertyValue,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            value,
        }
    }
}

/// A property slot an agent class declares, with its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyInfo {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<PropertyValue>,
}

/// An agent class exposed by a runtime, discovered via GetAgentClasses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentClass {
    /// Qualified name, `Class@source`.
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub properties: Vec<PropertyInfo>,
}

/// Configuration of one agent attached to a backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSetting {
    /// Qualified class name, `Class@source`.
    pub class_name: String,
    /// Display name; falls back to the class name when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub properties: Vec<Property>,
    /// Agent state captured when the run was suspended, replayed on resume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<serde_json::Value>,
}

impl AgentSetting {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            agent_name: None,
            properties: Vec::new(),
            state: None,
        }
    }

    pub fn named(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = Some(agent_name.into());
        self
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn display_name(&self) -> &str {
        self.agent_name.as_deref().unwrap_or(&self.class_name)
    }
}

/// Registration outcome of an uploaded agent source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Normal,
    Error,
}

/// An agent source file pushed to a runtime.
///
/// A failed registration marks only this source; other sources and engine
/// startup proceed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSource {
    pub name: String,
    pub body: String,
    pub status: SourceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentSource {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
            status: SourceStatus::Normal,
            error: None,
        }
    }

    pub fn mark_normal(&mut self) {
        self.status = SourceStatus::Normal;
        self.error = None;
    }

    pub fn mark_error(&mut self, cause: impl Into<String>) {
        self.status = SourceStatus::Error;
        self.error = Some(cause.into());
    }
}
