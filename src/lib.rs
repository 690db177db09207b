//! Tickrig: Backtest Orchestration Engine
//!
//! This is the root crate that provides benchmark access to the internal modules.
//! For actual functionality, use the individual crates directly:
//!
//! - `tickrig-core`: Shared types, error taxonomy, configuration, storage
//! - `agent-rpc`: Agent runtime contract, HTTP client, proxy pool, RPC routers
//! - `backtest-engine`: Tick feed, virtual broker, simulation workers, registry
//! - `engine-server`: Composition binary wiring it all together

// Re-export for benchmarks
pub use agent_rpc as rpc;
pub use backtest_engine as engine;
pub use tickrig_core as core;
