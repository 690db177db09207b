//! Configuration management for the tickrig engine.

use crate::{Error, Result};
use serde::Deserialize;
use std::env;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub agent_runtime: AgentRuntimeConfig,
    pub simulation: SimulationConfig,
    pub server: RpcServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Where the external agent runtime listens, if one is deployed.
///
/// When `url` is absent the engine hosts agents in-process.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AgentRuntimeConfig {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Upper bound on concurrently simulating backtests.
    pub workers: usize,
}

/// Bind address for the engine's RPC surface.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl RpcServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    /// Load configuration from environment variables.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| Error::Config {
                    message: "DATABASE_URL environment variable not set".to_string(),
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            },
            agent_runtime: AgentRuntimeConfig {
                url: env::var("AGENT_SERVICE_URL").ok(),
            },
            simulation: SimulationConfig {
                workers: env::var("SIMULATION_WORKERS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(4),
            },
            server: RpcServerConfig {
                host: env::var("RPC_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("RPC_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3000),
            },
        })
    }

    /// Load configuration for testing (with defaults).
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgres://localhost/tickrig_test".to_string(),
                max_connections: 2,
            },
            agent_runtime: AgentRuntimeConfig { url: None },
            simulation: SimulationConfig { workers: 2 },
            server: RpcServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
        }
    }
}
