//! In-memory store implementations.
//!
//! Back the engine in tests, demos and single-process runs where no
//! PostgreSQL instance is wired up.

use crate::db::{BacktestStore, PositionStore, TickSource};
use crate::types::{BacktestRecord, Interval, Position, Rate, Tick, TickValue};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

enum TickData {
    /// Fixed tick set; windows outside it come back empty.
    Seeded(Vec<Tick>),
    /// Deterministic generated quotes for every aligned step.
    Synthetic {
        bases: BTreeMap<String, Decimal>,
        pip: Decimal,
    },
}

/// Tick source serving from memory.
pub struct MemoryTickSource {
    data: TickData,
}

impl MemoryTickSource {
    /// Serve exactly the given ticks.
    pub fn seeded(ticks: Vec<Tick>) -> Self {
        Self {
            data: TickData::Seeded(ticks),
        }
    }

    /// Generate a deterministic price walk around per-pair base prices.
    pub fn synthetic(bases: impl IntoIterator<Item = (String, Decimal)>) -> Self {
        Self {
            data: TickData::Synthetic {
                bases: bases.into_iter().collect(),
                pip: Decimal::new(1, 4),
            },
        }
    }

    fn synthetic_tick(
        bases: &BTreeMap<String, Decimal>,
        pip: Decimal,
        pair_names: &[String],
        timestamp: DateTime<Utc>,
        step_secs: i64,
    ) -> Tick {
        // Triangle wave so prices move without drifting away
        let k = timestamp.timestamp() / step_secs;
        let phase = (k % 120 - 60).abs() - 30;
        let delta = pip * Decimal::from(phase);

        let mut tick = Tick::new(timestamp);
        for pair_name in pair_names {
            let base = bases
                .get(pair_name)
                .copied()
                .unwrap_or_else(|| Decimal::new(100, 0));
            let bid = base + delta;
            tick.values
                .insert(pair_name.clone(), TickValue::new(bid, bid + pip));
        }
        tick
    }

    fn ticks_in_window(
        &self,
        pair_names: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> Vec<Tick> {
        match &self.data {
            TickData::Seeded(ticks) => ticks
                .iter()
                .filter(|t| t.timestamp >= start && t.timestamp < end)
                .filter_map(|t| {
                    let mut filtered = Tick::new(t.timestamp);
                    for pair_name in pair_names {
                        if let Some(value) = t.value_for(pair_name) {
                            filtered.values.insert(pair_name.clone(), *value);
                        }
                    }
                    (!filtered.values.is_empty()).then_some(filtered)
                })
                .collect(),
            TickData::Synthetic { bases, pip } => {
                let step_secs = interval.to_duration().num_seconds();
                let mut epoch = start.timestamp();
                let rem = epoch.rem_euclid(step_secs);
                if rem != 0 {
                    epoch += step_secs - rem;
                }

                let mut ticks = Vec::new();
                while epoch < end.timestamp() {
                    let timestamp = Utc.timestamp_opt(epoch, 0).unwrap();
                    ticks.push(Self::synthetic_tick(
                        bases, *pip, pair_names, timestamp, step_secs,
                    ));
                    epoch += step_secs;
                }
                ticks
            }
        }
    }
}

#[async_trait]
impl TickSource for MemoryTickSource {
    async fn fetch(
        &self,
        pair_names: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> Result<Vec<Tick>> {
        Ok(self.ticks_in_window(pair_names, start, end, interval))
    }

    async fn rate_history(
        &self,
        pair_name: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Rate>> {
        let pair = vec![pair_name.to_string()];
        let ticks = self.ticks_in_window(&pair, start, end, interval);
        let bucket_secs = interval.to_duration().num_seconds();

        let mut rates: BTreeMap<i64, Rate> = BTreeMap::new();
        for tick in ticks {
            let Some(value) = tick.value_for(pair_name) else {
                continue;
            };
            let bucket = tick.timestamp.timestamp() / bucket_secs * bucket_secs;
            rates
                .entry(bucket)
                .and_modify(|r| {
                    r.high = r.high.max(value.bid);
                    r.low = r.low.min(value.bid);
                    r.close = value.bid;
                })
                .or_insert(Rate {
                    timestamp: Utc.timestamp_opt(bucket, 0).unwrap(),
                    open: value.bid,
                    high: value.bid,
                    low: value.bid,
                    close: value.bid,
                });
        }

        Ok(rates.into_values().collect())
    }
}

/// Backtest store holding records in a map.
#[derive(Default)]
pub struct MemoryBacktestStore {
    records: RwLock<HashMap<Uuid, BacktestRecord>>,
}

impl MemoryBacktestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BacktestStore for MemoryBacktestStore {
    async fn save(&self, record: &BacktestRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<BacktestRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<BacktestRecord>> {
        let mut records: Vec<BacktestRecord> =
            self.records.read().await.values().cloned().collect();
        // Same ordering as the SQL store: created_at ascending, unset last
        records.sort_by_key(|r| (r.created_at.is_none(), r.created_at, r.id));
        Ok(records)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.records.write().await.remove(&id);
        Ok(())
    }
}

/// Position store holding positions in a map.
#[derive(Default)]
pub struct MemoryPositionStore {
    positions: RwLock<HashMap<Uuid, Position>>,
}

impl MemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PositionStore for MemoryPositionStore {
    async fn upsert(&self, position: &Position) -> Result<()> {
        self.positions
            .write()
            .await
            .insert(position.id, position.clone());
        Ok(())
    }

    async fn list_for_backtest(&self, backtest_id: Uuid) -> Result<Vec<Position>> {
        let mut positions: Vec<Position> = self
            .positions
            .read()
            .await
            .values()
            .filter(|p| p.backtest_id == backtest_id)
            .cloned()
            .collect();
        positions.sort_by_key(|p| p.entered_at);
        Ok(positions)
    }

    async fn delete_for_backtest(&self, backtest_id: Uuid) -> Result<u64> {
        let mut positions = self.positions.write().await;
        let before = positions.len();
        positions.retain(|_, p| p.backtest_id != backtest_id);
        Ok((before - positions.len()) as u64)
    }
}
