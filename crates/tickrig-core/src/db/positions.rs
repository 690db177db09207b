//! Database operations for positions.

use crate::types::{ClosingPolicy, OrderSide, Position, PositionStatus};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Persistence seam for positions.
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Insert or update one position.
    async fn upsert(&self, position: &Position) -> Result<()>;

    async fn list_for_backtest(&self, backtest_id: Uuid) -> Result<Vec<Position>>;

    /// Remove every position of a backtest, returning how many went away.
    async fn delete_for_backtest(&self, backtest_id: Uuid) -> Result<u64>;
}

/// Position repository backed by PostgreSQL.
pub struct PgPositionStore {
    pool: PgPool,
}

impl PgPositionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Convert a database row to a Position.
    fn row_to_position(r: &sqlx::postgres::PgRow) -> Result<Position> {
        let side_str: String = r.get("side");
        let side = OrderSide::from_str_opt(&side_str)
            .ok_or_else(|| Error::validation(format!("unknown order side '{side_str}'")))?;

        let status_str: String = r.get("status");
        let status = PositionStatus::from_str_opt(&status_str)
            .ok_or_else(|| Error::validation(format!("unknown position status '{status_str}'")))?;

        Ok(Position {
            id: r.get("id"),
            backtest_id: r.get("backtest_id"),
            pair_name: r.get("pair_name"),
            side,
            units: r.get::<i64, _>("units"),
            entry_price: r.get("entry_price"),
            entered_at: r.get("entered_at"),
            exit_price: r.get::<Option<Decimal>, _>("exit_price"),
            exited_at: r.get::<Option<DateTime<Utc>>, _>("exited_at"),
            status,
            profit_or_loss: r.get("profit_or_loss"),
            closing_policy: ClosingPolicy::new(
                r.get::<Option<Decimal>, _>("take_profit"),
                r.get::<Option<Decimal>, _>("loss_cut"),
            ),
        })
    }
}

#[async_trait]
impl PositionStore for PgPositionStore {
    async fn upsert(&self, position: &Position) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO positions (
                id, backtest_id, pair_name, side, units, entry_price,
                entered_at, exit_price, exited_at, status, profit_or_loss,
                take_profit, loss_cut
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                exit_price = EXCLUDED.exit_price,
                exited_at = EXCLUDED.exited_at,
                status = EXCLUDED.status,
                profit_or_loss = EXCLUDED.profit_or_loss,
                take_profit = EXCLUDED.take_profit,
                loss_cut = EXCLUDED.loss_cut
            "#,
        )
        .bind(position.id)
        .bind(position.backtest_id)
        .bind(&position.pair_name)
        .bind(position.side.as_str())
        .bind(position.units)
        .bind(position.entry_price)
        .bind(position.entered_at)
        .bind(position.exit_price)
        .bind(position.exited_at)
        .bind(position.status.as_str())
        .bind(position.profit_or_loss)
        .bind(position.closing_policy.take_profit)
        .bind(position.closing_policy.loss_cut)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_backtest(&self, backtest_id: Uuid) -> Result<Vec<Position>> {
        let rows = sqlx::query(
            r#"
            SELECT id, backtest_id, pair_name, side, units, entry_price,
                   entered_at, exit_price, exited_at, status, profit_or_loss,
                   take_profit, loss_cut
            FROM positions
            WHERE backtest_id = $1
            ORDER BY entered_at ASC
            "#,
        )
        .bind(backtest_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_position).collect()
    }

    async fn delete_for_backtest(&self, backtest_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM positions WHERE backtest_id = $1")
            .bind(backtest_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
