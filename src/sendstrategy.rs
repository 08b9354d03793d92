//! Send strategies and their dispatcher
//!
//! Immediate notifications are persisted and delivered in-line; every other
//! strategy is persisted for the async pipeline and answered with `prepare`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::BizConfigCache;
use crate::clock::Clock;
use crate::domain::{
    BatchSendResp, CallbackLog, Notification, SendResp, SendResult, SendStatus,
};
use crate::error::{KuryrError, Result};
use crate::idgen::IdMinter;
use crate::sender::NotificationSender;
use crate::store::NotificationStore;

/// One send behavior the dispatcher can route to.
#[async_trait]
pub trait StrategyExec: Send + Sync {
    async fn send(&self, n: Notification) -> Result<SendResp>;
    async fn batch_send(&self, ns: Vec<Notification>) -> Result<BatchSendResp>;
}

/// Shared persistence step: stamp the window, set the initial status, and
/// write the row together with its prepared callback-log entry when the
/// tenant wants callbacks.
struct Persister {
    notifications: Arc<dyn NotificationStore>,
    biz_configs: Arc<BizConfigCache>,
    id_minter: Arc<IdMinter>,
    clock: Arc<dyn Clock>,
}

impl Persister {
    async fn persist(&self, mut n: Notification, status: SendStatus) -> Result<Notification> {
        let now = self.clock.now();
        n.set_send_window(now);
        n.send_status = status;

        let log = match self.biz_configs.callback_config(n.biz_id).await? {
            Some(_) => Some(CallbackLog::prepared(
                self.id_minter.next_id(n.biz_id, &n.biz_key),
                n.biz_id,
                n.biz_key.clone(),
                n.id,
                status,
                self.clock.now_millis() as i64,
            )),
            None => None,
        };

        self.notifications.create_with_callback_log(n, log).await
    }
}

/// Persist then deliver in-line.
pub struct ImmediateStrategy {
    persister: Persister,
    sender: Arc<NotificationSender>,
}

impl ImmediateStrategy {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        biz_configs: Arc<BizConfigCache>,
        id_minter: Arc<IdMinter>,
        clock: Arc<dyn Clock>,
        sender: Arc<NotificationSender>,
    ) -> Self {
        Self {
            persister: Persister { notifications, biz_configs, id_minter, clock },
            sender,
        }
    }
}

#[async_trait]
impl StrategyExec for ImmediateStrategy {
    async fn send(&self, n: Notification) -> Result<SendResp> {
        let created = self.persister.persist(n, SendStatus::Sending).await?;
        self.sender.send(created).await
    }

    async fn batch_send(&self, ns: Vec<Notification>) -> Result<BatchSendResp> {
        let mut created = Vec::with_capacity(ns.len());
        for n in ns {
            created.push(self.persister.persist(n, SendStatus::Sending).await?);
        }
        self.sender.batch_send(created).await
    }
}

/// Persist only; delivery happens later inside the scheduled window.
pub struct DeferredStrategy {
    persister: Persister,
}

impl DeferredStrategy {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        biz_configs: Arc<BizConfigCache>,
        id_minter: Arc<IdMinter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { persister: Persister { notifications, biz_configs, id_minter, clock } }
    }
}

#[async_trait]
impl StrategyExec for DeferredStrategy {
    async fn send(&self, n: Notification) -> Result<SendResp> {
        let created = self.persister.persist(n, SendStatus::Prepare).await?;
        Ok(SendResp {
            result: SendResult { notification_id: created.id, status: SendStatus::Prepare },
        })
    }

    async fn batch_send(&self, ns: Vec<Notification>) -> Result<BatchSendResp> {
        let mut results = Vec::with_capacity(ns.len());
        for n in ns {
            let created = self.persister.persist(n, SendStatus::Prepare).await?;
            results.push(SendResult {
                notification_id: created.id,
                status: SendStatus::Prepare,
            });
        }
        Ok(BatchSendResp { results })
    }
}

/// Routes by the notification's strategy tag after validating input.
pub struct SendStrategyDispatcher {
    immediate: Arc<dyn StrategyExec>,
    deferred: Arc<dyn StrategyExec>,
    id_minter: Arc<IdMinter>,
    clock: Arc<dyn Clock>,
}

impl SendStrategyDispatcher {
    pub fn new(
        immediate: Arc<dyn StrategyExec>,
        deferred: Arc<dyn StrategyExec>,
        id_minter: Arc<IdMinter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { immediate, deferred, id_minter, clock }
    }

    fn prepare(&self, mut n: Notification) -> Result<Notification> {
        n.validate(self.clock.now())?;
        if n.id == 0 {
            n.id = self.id_minter.next_id(n.biz_id, &n.biz_key);
        }
        Ok(n)
    }

    fn strategy_for(&self, n: &Notification) -> &Arc<dyn StrategyExec> {
        if n.is_immediate() {
            &self.immediate
        } else {
            &self.deferred
        }
    }

    /// Synchronous ingress: immediate sends block for the delivery outcome.
    pub async fn send(&self, n: Notification) -> Result<SendResp> {
        let n = self.prepare(n)?;
        self.strategy_for(&n).send(n).await
    }

    /// Asynchronous ingress: always persist-only. An immediate strategy is
    /// downgraded to a short deadline so the async pipeline has a window.
    pub async fn async_send(&self, n: Notification) -> Result<SendResp> {
        let mut n = self.prepare(n)?;
        n.strategy.downgrade_async_immediate(self.clock.now());
        self.deferred.send(n).await
    }

    /// Batch ingress. All elements must share one strategy type; mixed
    /// batches are rejected before any side effect.
    pub async fn batch_send(&self, ns: Vec<Notification>) -> Result<BatchSendResp> {
        if ns.is_empty() {
            return Ok(BatchSendResp::default());
        }

        let kind = ns[0].strategy.kind();
        if ns.iter().any(|n| n.strategy.kind() != kind) {
            return Err(KuryrError::invalid_param(
                "batch elements must share one strategy type",
            ));
        }

        let mut prepared = Vec::with_capacity(ns.len());
        for n in ns {
            prepared.push(self.prepare(n)?);
        }

        self.strategy_for(&prepared[0]).batch_send(prepared).await
    }

    /// Asynchronous batch ingress; the same downgrade as `async_send`.
    pub async fn async_batch_send(&self, ns: Vec<Notification>) -> Result<BatchSendResp> {
        if ns.is_empty() {
            return Ok(BatchSendResp::default());
        }

        let now = self.clock.now();
        let mut prepared = Vec::with_capacity(ns.len());
        for n in ns {
            let mut n = self.prepare(n)?;
            n.strategy.downgrade_async_immediate(now);
            prepared.push(n);
        }
        self.deferred.batch_send(prepared).await
    }
}
