//! Tickrig Core Library
//!
//! Shared types, error taxonomy, configuration and database models for the
//! tickrig backtest engine.

pub mod config;
pub mod db;
pub mod error;
pub mod types;

pub use error::{Error, Result, RpcStatus};
