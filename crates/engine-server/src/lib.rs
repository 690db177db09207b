//! Engine Server
//!
//! Composition root for the tickrig engine. Wires configuration, the
//! database pool and the agent runtime into a [`BacktestRegistry`],
//! reloads persisted backtests at boot and serves the RPC surface:
//! the agent-service contract plus the broker callbacks agents invoke
//! while handling a tick. Shutdown pauses every running backtest so the
//! next host can resume them.

use std::sync::Arc;

use axum::Router;
use sqlx::PgPool;
use tokio::sync::Semaphore;
use tower_http::trace::TraceLayer;

use agent_rpc::{
    agent_service_router, broker_service_router, AgentHost, AgentProxyPool, AgentService,
    RpcAgentService,
};
use backtest_engine::{BacktestRegistry, EngineDeps};
use tickrig_core::config::Config;
use tickrig_core::db::{PgBacktestStore, PgPositionStore, PgTickStore};

pub struct EngineServer {
    config: Config,
    registry: Arc<BacktestRegistry>,
    proxy_pool: Arc<AgentProxyPool>,
    agent_service: Arc<dyn AgentService>,
}

impl EngineServer {
    /// Assemble the engine around `pool`.
    ///
    /// Agents run against the configured external runtime when
    /// `AGENT_SERVICE_URL` is set, otherwise in-process.
    pub fn new(config: Config, pool: PgPool) -> Self {
        let proxy_pool = Arc::new(AgentProxyPool::new());
        let agent_service: Arc<dyn AgentService> = match &config.agent_runtime.url {
            Some(url) => {
                tracing::info!(url = %url, "using external agent runtime");
                Arc::new(RpcAgentService::new(url.clone()))
            }
            None => {
                tracing::info!("hosting agents in-process");
                Arc::new(AgentHost::new())
            }
        };

        let deps = EngineDeps {
            backtest_store: Arc::new(PgBacktestStore::new(pool.clone())),
            position_store: Arc::new(PgPositionStore::new(pool.clone())),
            tick_source: Arc::new(PgTickStore::new(pool)),
            agent_service: Arc::clone(&agent_service),
            proxy_pool: Arc::clone(&proxy_pool),
            simulation_pool: Arc::new(Semaphore::new(config.simulation.workers)),
        };
        let registry = Arc::new(BacktestRegistry::new(deps));

        Self {
            config,
            registry,
            proxy_pool,
            agent_service,
        }
    }

    pub fn registry(&self) -> Arc<BacktestRegistry> {
        Arc::clone(&self.registry)
    }

    /// The full RPC surface: agent-service contract and broker callbacks.
    pub fn router(&self) -> Router {
        agent_service_router(Arc::clone(&self.agent_service))
            .merge(broker_service_router(Arc::clone(&self.proxy_pool)))
            .layer(TraceLayer::new_for_http())
    }

    /// Reload persisted backtests, then serve until interrupted.
    pub async fn run(self) -> anyhow::Result<()> {
        if !self.agent_service.available().await {
            tracing::warn!("agent runtime unreachable; agent calls will fail until it comes up");
        }
        self.registry.load().await?;

        let addr = self.config.server.bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!(addr = %addr, "engine RPC listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("shutting down; pausing running backtests");
        self.registry.stop_all().await;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
