//! Registry of live backtests.
//!
//! The registry owns every [`Backtest`] the host knows about, keyed by
//! id. At startup it reloads the persisted records, normalizes runs the
//! previous host left mid-flight and relaunches the ones that should
//! keep going. Request handlers lock an entry to drive its lifecycle.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use tickrig_core::types::{BacktestStatus, NewBacktest};
use tickrig_core::{Error, Result};

use crate::backtest::{Backtest, BacktestView, EngineDeps};

pub struct BacktestRegistry {
    deps: EngineDeps,
    backtests: DashMap<Uuid, Arc<Mutex<Backtest>>>,
}

impl BacktestRegistry {
    pub fn new(deps: EngineDeps) -> Self {
        Self {
            deps,
            backtests: DashMap::new(),
        }
    }

    /// Reload persisted backtests.
    ///
    /// A record still marked running belongs to a dead worker and is
    /// stamped cancelled; waiting and paused runs are relaunched. A
    /// relaunch failure is logged and skipped, so one broken run cannot
    /// keep the host from coming up.
    pub async fn load(&self) -> Result<()> {
        let records = self.deps.backtest_store.list().await?;
        tracing::info!(count = records.len(), "loading persisted backtests");
        for mut record in records {
            if record.status == BacktestStatus::Running {
                record.status = BacktestStatus::Cancelled;
                self.deps.backtest_store.save(&record).await?;
                tracing::warn!(
                    backtest_id = %record.id,
                    "interrupted run marked cancelled"
                );
            }
            let id = record.id;
            let backtest = Backtest::new(record, self.deps.clone());
            let relaunch = backtest.start_on_startup();
            let entry = Arc::new(Mutex::new(backtest));
            self.backtests.insert(id, Arc::clone(&entry));
            if relaunch {
                if let Err(err) = entry.lock().await.start().await {
                    tracing::warn!(
                        backtest_id = %id,
                        error = %err,
                        "backtest failed to relaunch"
                    );
                }
            }
        }
        Ok(())
    }

    /// Create, persist and immediately start a backtest.
    ///
    /// The entry is registered before the launch, so a failed start
    /// leaves it visible in `wait_for_start` for a retry or delete.
    pub async fn create(&self, params: NewBacktest) -> Result<BacktestView> {
        let backtest = Backtest::create(params, self.deps.clone()).await?;
        let id = backtest.id();
        let entry = Arc::new(Mutex::new(backtest));
        self.backtests.insert(id, Arc::clone(&entry));

        let mut backtest = entry.lock().await;
        backtest.start().await?;
        backtest.view().await
    }

    pub fn get(&self, id: Uuid) -> Result<Arc<Mutex<Backtest>>> {
        self.backtests
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::not_found(format!("backtest '{id}'")))
    }

    /// Project every registered backtest, newest first.
    pub async fn views(&self) -> Result<Vec<BacktestView>> {
        let entries: Vec<_> = self
            .backtests
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut views = Vec::with_capacity(entries.len());
        for entry in entries {
            views.push(entry.lock().await.view().await?);
        }
        views.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(views)
    }

    /// Tear a backtest down and forget it.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let (_, entry) = self
            .backtests
            .remove(&id)
            .ok_or_else(|| Error::not_found(format!("backtest '{id}'")))?;
        let result = entry.lock().await.destroy().await;
        result
    }

    /// Pause every running backtest, persisting resumable snapshots.
    /// Called at shutdown; the next host relaunches what was paused.
    pub async fn stop_all(&self) {
        let entries: Vec<_> = self
            .backtests
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let tasks = entries.into_iter().map(|entry| async move {
            let mut backtest = entry.lock().await;
            if backtest.record().status == BacktestStatus::Running {
                if let Err(err) = backtest.pause().await {
                    tracing::warn!(
                        backtest_id = %backtest.id(),
                        error = %err,
                        "pause failed during shutdown"
                    );
                }
            }
        });
        futures_util::future::join_all(tasks).await;
    }

    pub fn len(&self) -> usize {
        self.backtests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backtests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunStatus;
    use crate::testing::{engine_deps, sweep_params, COUNTING_CLASS};
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use std::time::Duration;
    use tickrig_core::db::BacktestStore;
    use tickrig_core::types::{BacktestRecord, CancelledSnapshot};

    async fn wait_until_finished(registry: &BacktestRegistry, id: Uuid) {
        for _ in 0..400 {
            let entry = registry.get(id).unwrap();
            let view = entry.lock().await.view().await.unwrap();
            if view.status == RunStatus::Finished {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("backtest {id} never finished");
    }

    #[tokio::test]
    async fn test_create_registers_and_launches() {
        let registry = BacktestRegistry::new(engine_deps());
        let view = registry
            .create(sweep_params(0, 600, COUNTING_CLASS))
            .await
            .unwrap();

        assert!(matches!(
            view.status,
            RunStatus::Running | RunStatus::Finished
        ));
        assert_eq!(registry.len(), 1);
        wait_until_finished(&registry, view.id).await;
    }

    #[tokio::test]
    async fn test_get_unknown_id_errors() {
        let registry = BacktestRegistry::new(engine_deps());
        assert!(matches!(
            registry.get(Uuid::new_v4()),
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_load_normalizes_interrupted_runs() {
        let deps = engine_deps();
        let mut record = BacktestRecord::create(sweep_params(0, 600, COUNTING_CLASS)).unwrap();
        record.status = BacktestStatus::Running;
        deps.backtest_store.save(&record).await.unwrap();

        let registry = BacktestRegistry::new(deps.clone());
        registry.load().await.unwrap();

        let entry = registry.get(record.id).unwrap();
        assert_eq!(entry.lock().await.record().status, BacktestStatus::Cancelled);
        let stored = deps.backtest_store.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BacktestStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_load_relaunches_waiting_and_paused_runs() {
        let deps = engine_deps();
        let waiting = BacktestRecord::create(sweep_params(0, 600, COUNTING_CLASS)).unwrap();
        deps.backtest_store.save(&waiting).await.unwrap();

        let mut paused = BacktestRecord::create(sweep_params(0, 600, COUNTING_CLASS)).unwrap();
        paused.status = BacktestStatus::Paused;
        paused.cancelled_state = Some(CancelledSnapshot {
            cancelled_time: Utc.timestamp_opt(300, 0).unwrap(),
            orders: vec![],
            balance: Decimal::new(100_000, 0),
        });
        deps.backtest_store.save(&paused).await.unwrap();

        let registry = BacktestRegistry::new(deps);
        registry.load().await.unwrap();

        wait_until_finished(&registry, waiting.id).await;
        wait_until_finished(&registry, paused.id).await;
    }

    #[tokio::test]
    async fn test_delete_destroys_and_unregisters() {
        let deps = engine_deps();
        let registry = BacktestRegistry::new(deps.clone());
        let view = registry
            .create(sweep_params(0, 600, COUNTING_CLASS))
            .await
            .unwrap();

        registry.delete(view.id).await.unwrap();
        assert!(registry.is_empty());
        assert!(registry.get(view.id).is_err());
        assert!(deps.backtest_store.get(view.id).await.unwrap().is_none());
        assert!(deps.proxy_pool.is_empty());
    }

    #[tokio::test]
    async fn test_stop_all_pauses_running_backtests() {
        let deps = engine_deps();
        let registry = BacktestRegistry::new(deps.clone());
        let view = registry
            .create(sweep_params(0, 1_500_000, COUNTING_CLASS))
            .await
            .unwrap();

        registry.stop_all().await;

        let entry = registry.get(view.id).unwrap();
        assert_eq!(entry.lock().await.record().status, BacktestStatus::Paused);
        let stored = deps.backtest_store.get(view.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BacktestStatus::Paused);
    }

    #[tokio::test]
    async fn test_views_lists_newest_first() {
        let registry = BacktestRegistry::new(engine_deps());
        let first = registry
            .create(sweep_params(0, 600, COUNTING_CLASS))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = registry
            .create(sweep_params(0, 600, COUNTING_CLASS))
            .await
            .unwrap();

        let views = registry.views().await.unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].id, second.id);
        assert_eq!(views[1].id, first.id);
    }
}
