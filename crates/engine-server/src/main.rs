//! Engine server binary entrypoint.

use engine_server::EngineServer;
use tickrig_core::config::Config;
use tickrig_core::db;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "engine_server=debug,backtest_engine=debug,agent_rpc=debug,tickrig_core=debug,tower_http=info"
            .into()
    });
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v == "json");
    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    EngineServer::new(config, pool).run().await
}
