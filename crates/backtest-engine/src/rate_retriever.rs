//! Windowed tick feed for one simulation.
//!
//! Pulls historical ticks from a [`TickSource`] in large pages, buffers
//! them, and hands them out one at a time with the configured artificial
//! spread applied. The feed is exhausted once the buffer is empty and the
//! cursor has reached the end of the simulated period.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tickrig_core::db::TickSource;
use tickrig_core::types::{Interval, Rate, Tick, TickValue};
use tickrig_core::{Error, Result};

/// How many interval steps one page of ticks spans.
const STEPS_PER_PAGE: i32 = 1000;

/// Buffered tick feed over a fixed period.
pub struct RateRetriever {
    source: Arc<dyn TickSource>,
    pair_names: Vec<String>,
    spread: Decimal,
    interval: Interval,
    end_time: DateTime<Utc>,
    /// Start of the next page to fetch.
    cursor: DateTime<Utc>,
    buffer: VecDeque<Tick>,
    current: Option<Tick>,
}

impl std::fmt::Debug for RateRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateRetriever")
            .field("pair_names", &self.pair_names)
            .field("cursor", &self.cursor)
            .field("end_time", &self.end_time)
            .finish_non_exhaustive()
    }
}

impl RateRetriever {
    pub fn new(
        source: Arc<dyn TickSource>,
        pair_names: Vec<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        interval: Interval,
        spread: Decimal,
    ) -> Result<Self> {
        if start_time >= end_time {
            return Err(Error::illegal_argument(format!(
                "invalid period: {start_time} >= {end_time}"
            )));
        }
        Ok(Self {
            source,
            pair_names,
            spread,
            interval,
            end_time,
            cursor: start_time,
            buffer: VecDeque::new(),
            current: None,
        })
    }

    /// Whether another tick is available, fetching ahead if needed.
    pub async fn has_next(&mut self) -> Result<bool> {
        self.fill_buffer().await?;
        Ok(!self.buffer.is_empty())
    }

    /// Pop the next tick, apply the spread and remember it as current.
    pub async fn retrieve_current_tick(&mut self) -> Result<Tick> {
        self.fill_buffer().await?;
        let raw = self
            .buffer
            .pop_front()
            .ok_or_else(|| Error::illegal_state("tick feed is exhausted"))?;
        let tick = self.apply_spread(raw);
        self.current = Some(tick.clone());
        Ok(tick)
    }

    /// Tick most recently handed out; `None` before the first retrieve.
    pub fn current_tick(&self) -> Option<&Tick> {
        self.current.as_ref()
    }

    /// OHLC rates pass straight through to the underlying source.
    pub async fn retrieve_rate_history(
        &self,
        pair_name: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Rate>> {
        self.source.rate_history(pair_name, interval, start, end).await
    }

    /// Raw tick history is not served during a simulation.
    pub fn retrieve_tick_history(&self) -> Result<Vec<Tick>> {
        Err(Error::unsupported("tick history during a backtest"))
    }

    /// Fetch pages until a tick is buffered or the period runs out.
    ///
    /// Pages without data (market closed, missing history) advance the
    /// cursor and fetch again, so gaps never stall the feed.
    async fn fill_buffer(&mut self) -> Result<()> {
        while self.buffer.is_empty() && self.cursor < self.end_time {
            let page_end = std::cmp::min(
                self.cursor + self.interval.to_duration() * STEPS_PER_PAGE,
                self.end_time,
            );
            let ticks = self
                .source
                .fetch(&self.pair_names, self.cursor, page_end, self.interval)
                .await?;
            self.buffer.extend(ticks);
            self.cursor = page_end;
        }
        Ok(())
    }

    /// Rebuild every quote as bid / bid + spread.
    ///
    /// A zero spread leaves the stored quotes untouched.
    fn apply_spread(&self, raw: Tick) -> Tick {
        if self.spread.is_zero() {
            return raw;
        }
        let mut tick = Tick::new(raw.timestamp);
        for (pair_name, value) in raw.values {
            tick.values
                .insert(pair_name, TickValue::with_spread(value.bid, self.spread));
        }
        tick
    }
}
