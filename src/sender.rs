//! Notification sender: delivery outcome recording and batch fan-out

use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

use crate::cache::BizConfigCache;
use crate::channel::ChannelSend;
use crate::clock::Clock;
use crate::domain::{BatchSendResp, CallbackLog, Notification, SendResp, SendResult, SendStatus};
use crate::error::{KuryrError, Result};
use crate::idgen::IdMinter;
use crate::sharding::ShardStrategy;
use crate::store::{CallbackLogStore, NotificationStore};

/// Default width of the batch task pool.
pub const DEFAULT_SEND_POOL_SIZE: usize = 32;

/// Drives one notification through its channel, records the outcome, and
/// leaves a prepared callback-log row for tenants that want callbacks.
///
/// Cheap to clone; batch sends hand clones to pool tasks.
#[derive(Clone)]
pub struct NotificationSender {
    channel: Arc<dyn ChannelSend>,
    notifications: Arc<dyn NotificationStore>,
    callback_logs: Arc<dyn CallbackLogStore>,
    sharding: Arc<dyn ShardStrategy>,
    biz_configs: Arc<BizConfigCache>,
    id_minter: Arc<IdMinter>,
    clock: Arc<dyn Clock>,
    pool: Arc<Semaphore>,
}

impl NotificationSender {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        channel: Arc<dyn ChannelSend>,
        notifications: Arc<dyn NotificationStore>,
        callback_logs: Arc<dyn CallbackLogStore>,
        sharding: Arc<dyn ShardStrategy>,
        biz_configs: Arc<BizConfigCache>,
        id_minter: Arc<IdMinter>,
        clock: Arc<dyn Clock>,
        pool_size: usize,
    ) -> Self {
        Self {
            channel,
            notifications,
            callback_logs,
            sharding,
            biz_configs,
            id_minter,
            clock,
            pool: Arc::new(Semaphore::new(pool_size.max(1))),
        }
    }

    /// Deliver one notification and record the result.
    ///
    /// Provider exhaustion is translated into a `failure` outcome rather than
    /// an error; the response always carries the terminal status.
    pub async fn send(&self, n: Notification) -> Result<SendResp> {
        let status = match self.channel.send(&n).await {
            Ok(result) => result.status,
            Err(err) => {
                tracing::warn!(notification_id = n.id, biz_id = n.biz_id, %err, "delivery failed");
                SendStatus::Failure
            }
        };

        self.mark_status(&n, status).await?;
        self.record_callback(&n, status).await;

        Ok(SendResp { result: SendResult { notification_id: n.id, status } })
    }

    /// Deliver a batch under the bounded task pool. Submission suspends when
    /// the pool is saturated; results are unordered.
    pub async fn batch_send(&self, ns: Vec<Notification>) -> Result<BatchSendResp> {
        if ns.is_empty() {
            return Ok(BatchSendResp::default());
        }

        let succeeded: Arc<Mutex<Vec<SendResult>>> = Arc::new(Mutex::new(Vec::new()));
        let failed: Arc<Mutex<Vec<SendResult>>> = Arc::new(Mutex::new(Vec::new()));

        let mut tasks = Vec::with_capacity(ns.len());
        for n in ns {
            let permit = self
                .pool
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| KuryrError::internal("send pool closed"))?;

            let sender = self.clone();
            let succeeded = succeeded.clone();
            let failed = failed.clone();
            tasks.push(tokio::spawn(async move {
                let notification_id = n.id;
                let outcome = sender.send(n).await;
                drop(permit);

                match outcome {
                    Ok(resp) if resp.result.status == SendStatus::Success => {
                        succeeded.lock().unwrap_or_else(|e| e.into_inner()).push(resp.result);
                    }
                    Ok(resp) => {
                        failed.lock().unwrap_or_else(|e| e.into_inner()).push(resp.result);
                    }
                    Err(err) => {
                        tracing::error!(notification_id, %err, "batch item failed to record");
                        failed
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .push(SendResult { notification_id, status: SendStatus::Failure });
                    }
                }
            }));
        }

        futures::future::join_all(tasks).await;

        // Merge whatever completed; on cancellation this is the partial view.
        let mut results = succeeded.lock().unwrap_or_else(|e| e.into_inner()).clone();
        results.extend(failed.lock().unwrap_or_else(|e| e.into_inner()).iter().copied());
        Ok(BatchSendResp { results })
    }

    /// Optimistic status mark with a single retry on version conflict.
    async fn mark_status(&self, n: &Notification, status: SendStatus) -> Result<()> {
        if self.notifications.mark_status(n.id, n.version, status).await? {
            return Ok(());
        }

        let current = self.notifications.find(n.id).await?;
        if self.notifications.mark_status(n.id, current.version, status).await? {
            return Ok(());
        }
        Err(KuryrError::internal(format!(
            "notification {}: status mark lost the version race twice",
            n.id
        )))
    }

    /// Best-effort bookkeeping: a failed insert never changes the send result.
    async fn record_callback(&self, n: &Notification, status: SendStatus) {
        let config = match self.biz_configs.callback_config(n.biz_id).await {
            Ok(config) => config,
            Err(err) => {
                tracing::error!(
                    notification_id = n.id,
                    biz_id = n.biz_id,
                    %err,
                    "callback config lookup failed, skipping callback log"
                );
                return;
            }
        };
        if config.is_none() {
            return;
        }

        let log = CallbackLog::prepared(
            self.id_minter.next_id(n.biz_id, &n.biz_key),
            n.biz_id,
            n.biz_key.clone(),
            n.id,
            status,
            self.clock.now_millis() as i64,
        );
        let dst = self.sharding.shard(n.biz_id, &n.biz_key);
        if let Err(err) = self.callback_logs.upsert(&dst, log).await {
            tracing::error!(
                notification_id = n.id,
                dst = %dst,
                %err,
                "failed to record callback log"
            );
        }
    }
}
