//! HTTP client for an out-of-process agent runtime.

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use tickrig_core::types::{AgentClass, Property, Tick};
use tickrig_core::{Error, Result};

use crate::messages::{
    AgentClassesResponse, AgentStateResponse, CreateInstanceRequest, CreateInstanceResponse,
    Empty, InstanceRequest, NextTickRequest, RegisterSourceRequest, RestoreStateRequest,
    SendActionRequest, SendActionResponse, SetPropertiesRequest, UnregisterSourceRequest,
};
use crate::service::AgentService;
use crate::status::{status_for_http, StatusBody};

/// [`AgentService`] implementation speaking JSON over HTTP.
#[derive(Clone)]
pub struct RpcAgentService {
    base_url: String,
    http_client: reqwest::Client,
}

impl RpcAgentService {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(30))
            .connect_timeout(StdDuration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            base_url: base_url.into(),
            http_client,
        }
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http_client.post(&url).json(body).send().await?;

        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(remote_error(status, &body))
        }
    }

    async fn get<Resp>(&self, path: &str) -> Result<Resp>
    where
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http_client.get(&url).send().await?;

        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(remote_error(status, &body))
        }
    }
}

/// Rebuild an engine error from a failed response.
///
/// The status body is authoritative when the peer sent one; otherwise the
/// status is recovered from the bare HTTP code.
fn remote_error(http: StatusCode, body: &str) -> Error {
    match serde_json::from_str::<StatusBody>(body) {
        Ok(parsed) => Error::RemoteStatus {
            status: parsed.status,
            detail: parsed.detail,
        },
        Err(_) => Error::RemoteStatus {
            status: status_for_http(http),
            detail: if body.trim().is_empty() {
                http.to_string()
            } else {
                body.to_string()
            },
        },
    }
}

#[async_trait]
impl AgentService for RpcAgentService {
    async fn available(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.http_client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(error = %err, url = %url, "agent runtime health probe failed");
                false
            }
        }
    }

    async fn register_source(&self, name: &str, body: &str) -> Result<()> {
        let request = RegisterSourceRequest {
            name: name.to_string(),
            body: body.to_string(),
        };
        let _: Empty = self.post("/sources/register", &request).await?;
        Ok(())
    }

    async fn unregister_source(&self, name: &str) -> Result<()> {
        let request = UnregisterSourceRequest {
            name: name.to_string(),
        };
        let _: Empty = self.post("/sources/unregister", &request).await?;
        Ok(())
    }

    async fn agent_classes(&self) -> Result<Vec<AgentClass>> {
        let response: AgentClassesResponse = self.get("/classes").await?;
        Ok(response.classes)
    }

    async fn create_instance(
        &self,
        class_name: &str,
        agent_name: Option<&str>,
        properties: &[Property],
    ) -> Result<String> {
        let request = CreateInstanceRequest {
            class_name: class_name.to_string(),
            agent_name: agent_name.map(str::to_string),
            properties: properties.to_vec(),
        };
        let response: CreateInstanceResponse = self.post("/instances", &request).await?;
        Ok(response.instance_id)
    }

    async fn exec_post_create(&self, instance_id: &str) -> Result<()> {
        let request = InstanceRequest {
            instance_id: instance_id.to_string(),
        };
        let _: Empty = self.post("/instances/post-create", &request).await?;
        Ok(())
    }

    async fn restore_state(&self, instance_id: &str, state: &serde_json::Value) -> Result<()> {
        let request = RestoreStateRequest {
            instance_id: instance_id.to_string(),
            state: state.clone(),
        };
        let _: Empty = self.post("/instances/restore-state", &request).await?;
        Ok(())
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<()> {
        let request = InstanceRequest {
            instance_id: instance_id.to_string(),
        };
        let _: Empty = self.post("/instances/delete", &request).await?;
        Ok(())
    }

    async fn agent_state(&self, instance_id: &str) -> Result<serde_json::Value> {
        let request = InstanceRequest {
            instance_id: instance_id.to_string(),
        };
        let response: AgentStateResponse = self.post("/instances/state", &request).await?;
        Ok(response.state)
    }

    async fn set_properties(&self, instance_id: &str, properties: &[Property]) -> Result<()> {
        let request = SetPropertiesRequest {
            instance_id: instance_id.to_string(),
            properties: properties.to_vec(),
        };
        let _: Empty = self.post("/instances/properties", &request).await?;
        Ok(())
    }

    async fn next_tick(&self, instance_id: &str, tick: &Tick) -> Result<()> {
        let request = NextTickRequest {
            instance_id: instance_id.to_string(),
            tick: tick.clone(),
        };
        let _: Empty = self.post("/instances/next-tick", &request).await?;
        Ok(())
    }

    async fn send_action(&self, instance_id: &str, action: &str) -> Result<Option<String>> {
        let request = SendActionRequest {
            instance_id: instance_id.to_string(),
            action: action.to_string(),
        };
        let response: SendActionResponse = self.post("/instances/action", &request).await?;
        Ok(response.message)
    }
}
