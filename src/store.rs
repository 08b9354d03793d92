//! Consumed persistence and RPC contracts
//!
//! The delivery core does not own storage or transport; it consumes these
//! traits. Real implementations bind them to the sharded databases and the
//! service registry, tests bind them to in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::domain::{
    BizConfig, CallbackLog, ChannelTemplate, Notification, Provider, SendStatus,
};
use crate::error::Result;
use crate::sharding::Dst;

/// Notification rows. `create` is an idempotent upsert on `id`.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(&self, n: Notification) -> Result<Notification>;

    /// Persist the notification and, when present, its prepared callback-log
    /// row in one step.
    async fn create_with_callback_log(
        &self,
        n: Notification,
        log: Option<CallbackLog>,
    ) -> Result<Notification>;

    /// Compare-and-set the status against `expected_version`. Returns `false`
    /// on a version conflict; the state machine itself is enforced and
    /// violations surface as `InvalidStatus`.
    async fn mark_status(&self, id: u64, expected_version: i32, status: SendStatus)
        -> Result<bool>;

    async fn find(&self, id: u64) -> Result<Notification>;
}

/// Sharded callback-log rows; every call is scoped to one destination.
#[async_trait]
pub trait CallbackLogStore: Send + Sync {
    /// Idempotent on `notification_id`: a second write for the same
    /// notification replaces the copy of its status, never adds a row.
    async fn upsert(&self, dst: &Dst, log: CallbackLog) -> Result<()>;

    /// Page of due rows: `id > cursor`, `next_retry_at <= horizon`, status in
    /// (prepare, pending), ascending id, at most `limit` rows.
    async fn find_due(
        &self,
        dst: &Dst,
        horizon: i64,
        cursor: u64,
        limit: usize,
    ) -> Result<Vec<CallbackLog>>;

    /// Column-selected update of `retried_times`, `next_retry_at`, `status`,
    /// `updated_at` for the given rows, atomically per call.
    async fn batch_update(&self, dst: &Dst, logs: &[CallbackLog]) -> Result<()>;

    async fn find_by_notification_ids(
        &self,
        dst: &Dst,
        notification_ids: &[u64],
    ) -> Result<Vec<CallbackLog>>;
}

/// Tenant configuration, unsharded.
#[async_trait]
pub trait BizConfigStore: Send + Sync {
    async fn find(&self, biz_id: u64) -> Result<BizConfig>;
}

/// Template trees (versions and provider bindings), unsharded.
#[async_trait]
pub trait ChannelTemplateStore: Send + Sync {
    async fn find(&self, tpl_id: u64) -> Result<ChannelTemplate>;
}

/// Provider endpoints; credentials come back decrypted.
#[async_trait]
pub trait ProviderStore: Send + Sync {
    async fn find(&self, provider_id: u64) -> Result<Provider>;
}

/// Payload of the outcome callback delivered to the tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackNotifyRequest {
    pub notification_id: u64,
    pub biz_id: u64,
    pub biz_key: String,
    pub status: SendStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallbackNotifyResponse {
    pub success: bool,
    #[serde(default)]
    pub err_msg: Option<String>,
}

/// Remote caller for one tenant callback service.
#[async_trait]
pub trait CallbackClient: Send + Sync {
    async fn send_result_notify(
        &self,
        req: CallbackNotifyRequest,
    ) -> Result<CallbackNotifyResponse>;
}

/// Name-to-caller registry, keyed by `callback_config.service_name`.
#[derive(Default)]
pub struct CallbackClientRegistry {
    clients: DashMap<String, Arc<dyn CallbackClient>>,
}

impl CallbackClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, service_name: impl Into<String>, client: Arc<dyn CallbackClient>) {
        self.clients.insert(service_name.into(), client);
    }

    pub fn get(&self, service_name: &str) -> Option<Arc<dyn CallbackClient>> {
        self.clients.get(service_name).map(|entry| entry.value().clone())
    }
}

impl std::fmt::Debug for CallbackClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackClientRegistry").field("len", &self.clients.len()).finish()
    }
}
