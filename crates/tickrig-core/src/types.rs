//! Core domain types shared across the workspace.

pub mod account;
pub mod agent;
pub mod backtest;
pub mod interval;
pub mod order;
pub mod position;
pub mod tick;

pub use account::*;
pub use agent::*;
pub use backtest::*;
pub use interval::*;
pub use order::*;
pub use position::*;
pub use tick::*;
