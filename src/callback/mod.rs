//! Sharded callback-log reconciliation
//!
//! Scans every shard for due callback rows, invokes the tenant's callback
//! endpoint, and rewrites retry bookkeeping. Databases are walked in
//! parallel; tables within one database share a counting semaphore so a scan
//! cannot exhaust that database's connection pool.

mod breaker;
mod scheduler;

pub use breaker::{CircuitBreakerConfig, CircuitBreakerService, CircuitState};
pub use scheduler::{CallbackScheduler, SchedulerConfig};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::cache::BizConfigCache;
use crate::clock::Clock;
use crate::domain::{CallbackConfig, CallbackLog, CallbackLogStatus};
use crate::error::{KuryrError, Result};
use crate::sharding::{Dst, ShardStrategy};
use crate::store::{CallbackClientRegistry, CallbackLogStore, CallbackNotifyRequest};

/// One reconciliation pass over the callback logs.
#[async_trait]
pub trait CallbackService: Send + Sync {
    /// Process rows with `next_retry_at <= horizon_millis`, paging each shard
    /// table by `batch_size`.
    async fn send(&self, horizon_millis: i64, batch_size: usize) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Concurrent table scans allowed per database.
    pub per_db_concurrency: usize,
    /// Budget for one callback RPC.
    pub rpc_timeout: Duration,
    /// Rows per UPDATE statement.
    pub update_chunk: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            per_db_concurrency: 4,
            rpc_timeout: Duration::from_secs(3),
            update_chunk: 1_000,
        }
    }
}

/// Default reconciler over the sharded callback-log store.
///
/// Cheap to clone; shard scans run as tasks holding clones.
#[derive(Clone)]
pub struct CallbackReconciler {
    sharding: Arc<dyn ShardStrategy>,
    logs: Arc<dyn CallbackLogStore>,
    biz_configs: Arc<BizConfigCache>,
    registry: Arc<CallbackClientRegistry>,
    clock: Arc<dyn Clock>,
    config: ReconcilerConfig,
    /// Process-local memo of each tenant's callback config.
    config_memo: Arc<DashMap<u64, Option<CallbackConfig>>>,
}

impl CallbackReconciler {
    pub fn new(
        sharding: Arc<dyn ShardStrategy>,
        logs: Arc<dyn CallbackLogStore>,
        biz_configs: Arc<BizConfigCache>,
        registry: Arc<CallbackClientRegistry>,
        clock: Arc<dyn Clock>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            sharding,
            logs,
            biz_configs,
            registry,
            clock,
            config,
            config_memo: Arc::new(DashMap::new()),
        }
    }

    /// Drop memoized callback configs, forcing re-reads on the next pass.
    pub fn clear_config_memo(&self) {
        self.config_memo.clear();
    }

    async fn process_table(&self, dst: &Dst, horizon: i64, batch_size: usize) -> Result<()> {
        let mut cursor = 0u64;
        loop {
            let rows = self.logs.find_due(dst, horizon, cursor, batch_size).await?;
            let Some(last) = rows.last() else {
                return Ok(());
            };
            cursor = last.id;

            let mut mutated = Vec::with_capacity(rows.len());
            for row in rows {
                let row_id = row.id;
                // Rows are handled sequentially so a failure log points at
                // exactly one row and ordering within the page is preserved.
                match self.process_row(row).await {
                    Ok(updated) => mutated.push(updated),
                    Err(err) => {
                        tracing::warn!(
                            dst = %dst,
                            row_id,
                            %err,
                            "skipping callback row for this horizon"
                        );
                    }
                }
            }

            for chunk in mutated.chunks(self.config.update_chunk.max(1)) {
                self.logs.batch_update(dst, chunk).await?;
            }
        }
    }

    async fn process_row(&self, mut row: CallbackLog) -> Result<CallbackLog> {
        let config = self.callback_config(row.biz_id).await?;
        let now = self.clock.now_millis() as i64;

        match config {
            None => {
                // No endpoint to call; the row can never make progress.
                tracing::warn!(
                    biz_id = row.biz_id,
                    notification_id = row.notification_id,
                    "tenant has no callback config, terminating row"
                );
                row.status = CallbackLogStatus::Failure;
            }
            Some(config) => {
                if self.notify(&config, &row).await {
                    row.status = CallbackLogStatus::Success;
                } else {
                    let attempt = row.retried_times.max(0) as u32;
                    let (delay, more) = config.retry_policy.next(attempt);
                    row.retried_times += 1;
                    if more {
                        row.next_retry_at = now + delay.as_millis() as i64;
                        row.status = CallbackLogStatus::Pending;
                    } else {
                        row.status = CallbackLogStatus::Failure;
                    }
                }
            }
        }

        row.updated_at = now;
        Ok(row)
    }

    /// One callback RPC under the configured timeout.
    async fn notify(&self, config: &CallbackConfig, row: &CallbackLog) -> bool {
        let Some(client) = self.registry.get(&config.service_name) else {
            tracing::warn!(
                service_name = %config.service_name,
                biz_id = row.biz_id,
                "no callback client registered"
            );
            return false;
        };

        let req = CallbackNotifyRequest {
            notification_id: row.notification_id,
            biz_id: row.biz_id,
            biz_key: row.biz_key.clone(),
            status: row.notification_status,
        };

        match tokio::time::timeout(self.config.rpc_timeout, client.send_result_notify(req)).await
        {
            Ok(Ok(resp)) if resp.success => true,
            Ok(Ok(resp)) => {
                tracing::warn!(
                    notification_id = row.notification_id,
                    err_msg = resp.err_msg.as_deref().unwrap_or(""),
                    "tenant rejected callback"
                );
                false
            }
            Ok(Err(err)) => {
                tracing::warn!(notification_id = row.notification_id, %err, "callback failed");
                false
            }
            Err(_) => {
                tracing::warn!(
                    notification_id = row.notification_id,
                    timeout_ms = self.config.rpc_timeout.as_millis() as u64,
                    "callback timed out"
                );
                false
            }
        }
    }

    async fn callback_config(&self, biz_id: u64) -> Result<Option<CallbackConfig>> {
        if let Some(entry) = self.config_memo.get(&biz_id) {
            return Ok(entry.clone());
        }
        let config = self.biz_configs.callback_config(biz_id).await?;
        self.config_memo.insert(biz_id, config.clone());
        Ok(config)
    }
}

#[async_trait]
impl CallbackService for CallbackReconciler {
    async fn send(&self, horizon_millis: i64, batch_size: usize) -> Result<()> {
        let dsts = self.sharding.broadcast();
        let total = dsts.len();

        // Group tables by database, preserving the broadcast order.
        let mut groups: Vec<(String, Vec<Dst>)> = Vec::new();
        for dst in dsts {
            match groups.iter().position(|(db, _)| *db == dst.db) {
                Some(i) => groups[i].1.push(dst),
                None => groups.push((dst.db.clone(), vec![dst])),
            }
        }

        let failures: Arc<DashMap<String, String>> = Arc::new(DashMap::new());
        let mut databases = JoinSet::new();
        for (db, tables) in groups {
            let this = self.clone();
            let failures = failures.clone();
            databases.spawn(async move {
                let width = this.config.per_db_concurrency.max(1);
                let semaphore = Arc::new(Semaphore::new(width));

                let mut scans = JoinSet::new();
                for dst in tables {
                    let this = this.clone();
                    let failures = failures.clone();
                    let semaphore = semaphore.clone();
                    scans.spawn(async move {
                        let _permit = match semaphore.acquire_owned().await {
                            Ok(permit) => permit,
                            Err(_) => return,
                        };
                        if let Err(err) =
                            this.process_table(&dst, horizon_millis, batch_size).await
                        {
                            tracing::error!(dst = %dst, %err, "shard scan failed");
                            failures.insert(dst.to_string(), err.to_string());
                        }
                    });
                }
                while scans.join_next().await.is_some() {}
                tracing::debug!(db = %db, "database scan complete");
            });
        }
        while databases.join_next().await.is_some() {}

        if !failures.is_empty() {
            let failed = failures.len();
            tracing::warn!(failed, total, "some shards failed during callback reconciliation");
            return Err(KuryrError::internal(format!(
                "callback reconciliation: {failed} of {total} shards failed"
            )));
        }
        Ok(())
    }
}
