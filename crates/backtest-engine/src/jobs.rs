//! Units of work a simulation worker steps through.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use agent_rpc::BrokerPort;
use tickrig_core::Result;

use crate::context::TradingContext;

/// What the worker should do with a job after one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Re-run this job for another step.
    Continue,
    /// The job is done; drop it.
    Finished,
}

/// A resumable unit of work, stepped between control commands.
#[async_trait]
pub trait Job: Send {
    async fn step(&mut self, context: &mut TradingContext) -> Result<StepOutcome>;
}

/// Drives the whole simulation: one step consumes one tick.
///
/// Carries the original period of the backtest, which may be wider than
/// the feed's when resuming from a snapshot; progress is always measured
/// against the original range.
pub struct NotifyNextTickJob {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

impl NotifyNextTickJob {
    pub fn new(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            end_time,
        }
    }

    fn progress_at(&self, time: DateTime<Utc>) -> f64 {
        let total = (self.end_time - self.start_time).num_milliseconds();
        if total <= 0 {
            return 1.0;
        }
        let elapsed = (time - self.start_time).num_milliseconds();
        (elapsed as f64 / total as f64).clamp(0.0, 1.0)
    }
}

#[async_trait]
impl Job for NotifyNextTickJob {
    async fn step(&mut self, context: &mut TradingContext) -> Result<StepOutcome> {
        if !context.broker().has_next().await? {
            context.finish();
            return Ok(StepOutcome::Finished);
        }

        let tick = context.broker().retrieve_current_tick().await?;
        for agent in context.agents() {
            agent.next_tick(&tick).await?;
        }

        let balance = context.broker().account().await?.balance;
        let progress = self.progress_at(tick.timestamp);
        context.observe_tick(tick.timestamp, progress, balance);
        Ok(StepOutcome::Continue)
    }
}
