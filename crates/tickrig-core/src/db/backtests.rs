//! Database operations for backtests.

use crate::types::{AgentSetting, BacktestRecord, BacktestStatus, CancelledSnapshot, Interval};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Persistence seam for backtest records.
#[async_trait]
pub trait BacktestStore: Send + Sync {
    /// Insert or update a record.
    async fn save(&self, record: &BacktestRecord) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<BacktestRecord>>;

    async fn list(&self) -> Result<Vec<BacktestRecord>>;

    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Backtest repository backed by PostgreSQL.
pub struct PgBacktestStore {
    pool: PgPool,
}

impl PgBacktestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Convert a database row to a BacktestRecord.
    fn row_to_record(r: &sqlx::postgres::PgRow) -> Result<BacktestRecord> {
        let status_str: String = r.get("status");
        let status = BacktestStatus::from_str_opt(&status_str).ok_or_else(|| {
            Error::validation(format!("unknown backtest status '{status_str}'"))
        })?;

        let interval_str: String = r.get("tick_interval");
        let tick_interval = Interval::from_id(&interval_str).ok_or_else(|| {
            Error::validation(format!("unknown tick interval '{interval_str}'"))
        })?;

        let agent_settings: Vec<AgentSetting> = r
            .get::<Option<String>, _>("agent_settings")
            .map(|s| serde_json::from_str(&s))
            .transpose()?
            .unwrap_or_default();

        let cancelled_state: Option<CancelledSnapshot> = r
            .get::<Option<String>, _>("cancelled_state")
            .map(|s| serde_json::from_str(&s))
            .transpose()?;

        Ok(BacktestRecord {
            id: r.get("id"),
            name: r.get("name"),
            memo: r.get("memo"),
            created_at: r.get::<Option<DateTime<Utc>>, _>("created_at"),
            spread: r.get::<Decimal, _>("spread"),
            start_time: r.get("start_time"),
            end_time: r.get("end_time"),
            tick_interval,
            pair_names: r.get::<Vec<String>, _>("pair_names"),
            balance: r.get::<i64, _>("balance"),
            agent_settings,
            status,
            cancelled_state,
        })
    }
}

#[async_trait]
impl BacktestStore for PgBacktestStore {
    async fn save(&self, record: &BacktestRecord) -> Result<()> {
        let agent_settings_json = serde_json::to_string(&record.agent_settings)?;
        let cancelled_state_json = record
            .cancelled_state
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO backtests (
                id, name, memo, created_at, spread, start_time, end_time,
                tick_interval, pair_names, balance, agent_settings, status,
                cancelled_state
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                memo = EXCLUDED.memo,
                created_at = EXCLUDED.created_at,
                spread = EXCLUDED.spread,
                start_time = EXCLUDED.start_time,
                end_time = EXCLUDED.end_time,
                tick_interval = EXCLUDED.tick_interval,
                pair_names = EXCLUDED.pair_names,
                balance = EXCLUDED.balance,
                agent_settings = EXCLUDED.agent_settings,
                status = EXCLUDED.status,
                cancelled_state = EXCLUDED.cancelled_state
            "#,
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(&record.memo)
        .bind(record.created_at)
        .bind(record.spread)
        .bind(record.start_time)
        .bind(record.end_time)
        .bind(record.tick_interval.id())
        .bind(&record.pair_names)
        .bind(record.balance)
        .bind(agent_settings_json)
        .bind(record.status.as_str())
        .bind(cancelled_state_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<BacktestRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, memo, created_at, spread, start_time, end_time,
                   tick_interval, pair_names, balance, agent_settings, status,
                   cancelled_state
            FROM backtests
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::row_to_record(&r)).transpose()
    }

    async fn list(&self) -> Result<Vec<BacktestRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, memo, created_at, spread, start_time, end_time,
                   tick_interval, pair_names, balance, agent_settings, status,
                   cancelled_state
            FROM backtests
            ORDER BY created_at ASC NULLS LAST
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        // Positions first so a crash never leaves orphans
        sqlx::query("DELETE FROM positions WHERE backtest_id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM backtests WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
