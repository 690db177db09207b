//! Virtual broker for one backtest run.
//!
//! Consumes the tick feed, fills orders against simulated quotes, marks
//! open positions to market and enforces their closing policies. The same
//! broker serves agent callbacks through [`BrokerPort`], so all state sits
//! behind an async mutex that is locked per operation and released before
//! any store write.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use agent_rpc::messages::{OrderRequest, OrderResult};
use agent_rpc::BrokerPort;
use tickrig_core::db::PositionStore;
use tickrig_core::types::{Account, Order, OrderType, Position, Tick, TickValue};
use tickrig_core::{Error, Result};

use crate::rate_retriever::RateRetriever;

struct BrokerCore {
    backtest_id: Uuid,
    account: Account,
    pair_names: Vec<String>,
    /// Pending limit orders; market orders never linger here.
    orders: Vec<Order>,
    /// Open positions, in entry order.
    positions: Vec<Position>,
    retriever: RateRetriever,
}

impl BrokerCore {
    /// Fill pending orders whose condition the tick satisfies.
    fn execute_pending_orders(&mut self, tick: &Tick) -> Vec<Position> {
        let mut opened = Vec::new();
        let mut i = 0;
        while i < self.orders.len() {
            let Some(value) = tick.value_for(&self.orders[i].pair_name).copied() else {
                i += 1;
                continue;
            };
            if self.orders[i].is_executable(&value) {
                let order = self.orders.remove(i);
                tracing::debug!(
                    order_id = %order.id,
                    pair = %order.pair_name,
                    "limit order filled"
                );
                let position = Position::open(
                    self.backtest_id,
                    order.pair_name.clone(),
                    order.side,
                    order.units,
                    order.execution_price(&value),
                    tick.timestamp,
                    order.closing_policy,
                );
                self.positions.push(position.clone());
                opened.push(position);
            } else {
                i += 1;
            }
        }
        opened
    }

    /// Mark open positions to market and close those whose policy fires.
    fn settle_open_positions(&mut self, tick: &Tick) -> Result<Vec<Position>> {
        let mut closed = Vec::new();
        let mut i = 0;
        while i < self.positions.len() {
            let Some(value) = tick.value_for(&self.positions[i].pair_name).copied() else {
                i += 1;
                continue;
            };
            self.positions[i].update_price(&value);
            if self.positions[i].should_close(&value) {
                let mut position = self.positions.remove(i);
                position.close(&value, tick.timestamp)?;
                tracing::debug!(
                    position_id = %position.id,
                    profit_or_loss = %position.profit_or_loss,
                    "closing policy fired"
                );
                self.account.settle(position.profit_or_loss);
                closed.push(position);
            } else {
                i += 1;
            }
        }
        Ok(closed)
    }

    fn refresh_unrealized(&mut self) {
        self.account.profit_or_loss = self.positions.iter().map(|p| p.profit_or_loss).sum();
    }

    fn current_value(&self, pair_name: &str) -> Result<(TickValue, DateTime<Utc>)> {
        let tick = self
            .retriever
            .current_tick()
            .ok_or_else(|| Error::illegal_state("no current tick"))?;
        let value = tick
            .value_for(pair_name)
            .copied()
            .ok_or_else(|| Error::illegal_argument(format!("unknown pair '{pair_name}'")))?;
        Ok((value, tick.timestamp))
    }
}

/// Simulated broker shared between the worker and agent callbacks.
#[derive(Clone)]
pub struct BacktestBroker {
    core: Arc<Mutex<BrokerCore>>,
    position_store: Arc<dyn PositionStore>,
}

impl BacktestBroker {
    pub fn new(
        backtest_id: Uuid,
        retriever: RateRetriever,
        pair_names: Vec<String>,
        initial_balance: Decimal,
        position_store: Arc<dyn PositionStore>,
    ) -> Self {
        Self {
            core: Arc::new(Mutex::new(BrokerCore {
                backtest_id,
                account: Account::new(initial_balance),
                pair_names,
                orders: Vec::new(),
                positions: Vec::new(),
                retriever,
            })),
            position_store,
        }
    }

    /// Re-seed pending orders from a suspension snapshot.
    pub async fn restore_orders(&self, orders: Vec<Order>) {
        let mut core = self.core.lock().await;
        tracing::debug!(count = orders.len(), "restoring pending orders");
        core.orders = orders;
    }

    /// Re-seed open positions persisted by the previous run.
    pub async fn restore_positions(&self, positions: Vec<Position>) {
        let mut core = self.core.lock().await;
        tracing::debug!(count = positions.len(), "restoring open positions");
        core.positions = positions;
        core.refresh_unrealized();
    }

    /// Whether the tick feed has more data.
    pub async fn has_next(&self) -> Result<bool> {
        self.core.lock().await.retriever.has_next().await
    }

    /// Advance the feed by one tick and settle orders and positions
    /// against it.
    ///
    /// Orders settle before positions, so a fill and its closing policy
    /// never race within one tick.
    pub async fn retrieve_current_tick(&self) -> Result<Tick> {
        let (tick, dirty) = {
            let mut core = self.core.lock().await;
            let tick = core.retriever.retrieve_current_tick().await?;
            let mut dirty = core.execute_pending_orders(&tick);
            dirty.extend(core.settle_open_positions(&tick)?);
            core.refresh_unrealized();
            (tick, dirty)
        };
        for position in &dirty {
            self.position_store.upsert(position).await?;
        }
        Ok(tick)
    }

    /// Persist the current mark-to-market state of every open position.
    pub async fn flush_positions(&self) -> Result<()> {
        let open = self.core.lock().await.positions.clone();
        for position in &open {
            self.position_store.upsert(position).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerPort for BacktestBroker {
    async fn account(&self) -> Result<Account> {
        Ok(self.core.lock().await.account)
    }

    async fn pair_names(&self) -> Result<Vec<String>> {
        Ok(self.core.lock().await.pair_names.clone())
    }

    async fn current_tick(&self) -> Result<Option<Tick>> {
        Ok(self.core.lock().await.retriever.current_tick().cloned())
    }

    async fn positions(&self) -> Result<Vec<Position>> {
        Ok(self.core.lock().await.positions.clone())
    }

    async fn orders(&self) -> Result<Vec<Order>> {
        Ok(self.core.lock().await.orders.clone())
    }

    async fn submit_order(&self, request: OrderRequest) -> Result<OrderResult> {
        if request.units <= 0 {
            return Err(Error::illegal_argument("units must be positive"));
        }
        let (result, opened) = {
            let mut core = self.core.lock().await;
            let (value, timestamp) = core.current_value(&request.pair_name)?;
            let policy = request.closing_policy.unwrap_or_default();

            match request.order_type {
                OrderType::Market => {
                    let order = Order::market(
                        &request.pair_name,
                        request.side,
                        request.units,
                        timestamp,
                    )
                    .with_closing_policy(policy);
                    let position = Position::open(
                        core.backtest_id,
                        &request.pair_name,
                        request.side,
                        request.units,
                        order.execution_price(&value),
                        timestamp,
                        policy,
                    );
                    tracing::debug!(
                        order_id = %order.id,
                        position_id = %position.id,
                        pair = %request.pair_name,
                        "market order filled"
                    );
                    core.positions.push(position.clone());
                    core.refresh_unrealized();
                    (
                        OrderResult {
                            order,
                            opened_position: Some(position.clone()),
                        },
                        Some(position),
                    )
                }
                OrderType::Limit => {
                    let price = request.price.ok_or_else(|| {
                        Error::illegal_argument("limit order requires a price")
                    })?;
                    let order = Order::limit(
                        &request.pair_name,
                        request.side,
                        request.units,
                        price,
                        timestamp,
                    )
                    .with_closing_policy(policy);
                    tracing::debug!(
                        order_id = %order.id,
                        pair = %request.pair_name,
                        price = %price,
                        "limit order accepted"
                    );
                    core.orders.push(order.clone());
                    (
                        OrderResult {
                            order,
                            opened_position: None,
                        },
                        None,
                    )
                }
            }
        };
        if let Some(position) = &opened {
            self.position_store.upsert(position).await?;
        }
        Ok(result)
    }

    async fn close_position(&self, position_id: Uuid) -> Result<Position> {
        let closed = {
            let mut core = self.core.lock().await;
            let index = core
                .positions
                .iter()
                .position(|p| p.id == position_id)
                .ok_or_else(|| Error::not_found(format!("position '{position_id}'")))?;
            let (value, timestamp) = {
                let pair_name = core.positions[index].pair_name.clone();
                core.current_value(&pair_name)?
            };
            let mut position = core.positions.remove(index);
            position.close(&value, timestamp)?;
            core.account.settle(position.profit_or_loss);
            core.refresh_unrealized();
            tracing::debug!(
                position_id = %position.id,
                profit_or_loss = %position.profit_or_loss,
                "position closed on request"
            );
            position
        };
        self.position_store.upsert(&closed).await?;
        Ok(closed)
    }
}
