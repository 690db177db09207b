//! Historical tick storage and retrieval.

use crate::types::{Interval, Rate, Tick, TickValue};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;

/// Source of historical ticks for the simulation feed.
///
/// `fetch` returns one `Tick` per timestamp at the requested granularity,
/// covering `[start, end)`, ordered by time. Windows without data return
/// an empty vec.
#[async_trait]
pub trait TickSource: Send + Sync {
    async fn fetch(
        &self,
        pair_names: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> Result<Vec<Tick>>;

    /// OHLC aggregation over `[start, end)` for one instrument.
    async fn rate_history(
        &self,
        pair_name: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Rate>>;
}

/// Tick storage backed by PostgreSQL.
pub struct PgTickStore {
    pool: PgPool,
}

impl PgTickStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert ticks in batch, one row per (pair, timestamp) quote.
    pub async fn insert_ticks(&self, ticks: &[Tick]) -> Result<usize> {
        let mut inserted = 0;
        for tick in ticks {
            for (pair_name, value) in &tick.values {
                sqlx::query(
                    r#"
                    INSERT INTO ticks (pair_name, timestamp, bid, ask)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (pair_name, timestamp) DO UPDATE SET
                        bid = EXCLUDED.bid,
                        ask = EXCLUDED.ask
                    "#,
                )
                .bind(pair_name)
                .bind(tick.timestamp)
                .bind(value.bid)
                .bind(value.ask)
                .execute(&self.pool)
                .await?;
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

#[async_trait]
impl TickSource for PgTickStore {
    async fn fetch(
        &self,
        pair_names: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> Result<Vec<Tick>> {
        let step = interval.to_duration().num_seconds();
        let rows = sqlx::query(
            r#"
            SELECT pair_name, timestamp, bid, ask
            FROM ticks
            WHERE pair_name = ANY($1)
              AND timestamp >= $2
              AND timestamp < $3
              AND EXTRACT(EPOCH FROM timestamp)::bigint % $4 = 0
            ORDER BY timestamp ASC, pair_name ASC
            "#,
        )
        .bind(pair_names)
        .bind(start)
        .bind(end)
        .bind(step)
        .fetch_all(&self.pool)
        .await?;

        let mut by_time: BTreeMap<DateTime<Utc>, Tick> = BTreeMap::new();
        for row in rows {
            let timestamp: DateTime<Utc> = row.get("timestamp");
            let pair_name: String = row.get("pair_name");
            let bid: Decimal = row.get("bid");
            let ask: Decimal = row.get("ask");
            by_time
                .entry(timestamp)
                .or_insert_with(|| Tick::new(timestamp))
                .values
                .insert(pair_name, TickValue::new(bid, ask));
        }

        Ok(by_time.into_values().collect())
    }

    async fn rate_history(
        &self,
        pair_name: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Rate>> {
        let bucket = interval.to_duration().num_seconds();
        let rows = sqlx::query(
            r#"
            SELECT
                to_timestamp(floor(EXTRACT(EPOCH FROM timestamp) / $4) * $4) AS bucket,
                (array_agg(bid ORDER BY timestamp ASC))[1] AS open,
                MAX(bid) AS high,
                MIN(bid) AS low,
                (array_agg(bid ORDER BY timestamp DESC))[1] AS close
            FROM ticks
            WHERE pair_name = $1
              AND timestamp >= $2
              AND timestamp < $3
            GROUP BY bucket
            ORDER BY bucket ASC
            "#,
        )
        .bind(pair_name)
        .bind(start)
        .bind(end)
        .bind(bucket)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Rate {
                timestamp: row.get("bucket"),
                open: row.get("open"),
                high: row.get("high"),
                low: row.get("low"),
                close: row.get("close"),
            })
            .collect())
    }
}
