//! In-memory store implementations
//!
//! Reference bindings of the consumed contracts, used by the test suite and
//! handy for local development. They honor the same semantics the real
//! database bindings must: idempotent upserts, optimistic status marks, and
//! shard-scoped callback-log pages in ascending id order.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::{
    BizConfig, CallbackLog, ChannelTemplate, Notification, Provider, SecretCipher, SendStatus,
};
use crate::error::{KuryrError, Result};
use crate::sharding::{Dst, ShardStrategy};
use crate::store::{
    BizConfigStore, CallbackLogStore, ChannelTemplateStore, NotificationStore, ProviderStore,
};

/// Sharded callback-log rows, one ordered table per destination.
#[derive(Default)]
pub struct MemCallbackLogStore {
    tables: DashMap<(String, String), BTreeMap<u64, CallbackLog>>,
    by_notification: DashMap<u64, u64>,
}

impl MemCallbackLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table_key(dst: &Dst) -> (String, String) {
        (dst.db.clone(), dst.table.clone())
    }

    /// Seed a row directly, bypassing upsert semantics.
    pub fn seed(&self, dst: &Dst, log: CallbackLog) {
        self.by_notification.insert(log.notification_id, log.id);
        self.tables.entry(Self::table_key(dst)).or_default().insert(log.id, log);
    }

    /// Snapshot of one destination's rows in id order.
    pub fn rows(&self, dst: &Dst) -> Vec<CallbackLog> {
        self.tables
            .get(&Self::table_key(dst))
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|table| table.len()).sum()
    }
}

#[async_trait]
impl CallbackLogStore for MemCallbackLogStore {
    async fn upsert(&self, dst: &Dst, log: CallbackLog) -> Result<()> {
        let mut table = self.tables.entry(Self::table_key(dst)).or_default();
        let existing_id = self.by_notification.get(&log.notification_id).map(|id| *id);
        if let Some(existing_id) = existing_id {
            if let Some(existing) = table.get_mut(&existing_id) {
                existing.notification_status = log.notification_status;
                existing.updated_at = log.updated_at;
                return Ok(());
            }
        }
        self.by_notification.insert(log.notification_id, log.id);
        table.insert(log.id, log);
        Ok(())
    }

    async fn find_due(
        &self,
        dst: &Dst,
        horizon: i64,
        cursor: u64,
        limit: usize,
    ) -> Result<Vec<CallbackLog>> {
        let Some(table) = self.tables.get(&Self::table_key(dst)) else {
            return Ok(Vec::new());
        };
        Ok(table
            .range(cursor.saturating_add(1)..)
            .map(|(_, log)| log)
            .filter(|log| log.status.is_due_candidate() && log.next_retry_at <= horizon)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn batch_update(&self, dst: &Dst, logs: &[CallbackLog]) -> Result<()> {
        let mut table = self
            .tables
            .get_mut(&Self::table_key(dst))
            .ok_or_else(|| KuryrError::record_not_found(format!("table {dst}")))?;
        for log in logs {
            if let Some(stored) = table.get_mut(&log.id) {
                stored.retried_times = log.retried_times;
                stored.next_retry_at = log.next_retry_at;
                stored.status = log.status;
                stored.updated_at = log.updated_at;
            }
        }
        Ok(())
    }

    async fn find_by_notification_ids(
        &self,
        dst: &Dst,
        notification_ids: &[u64],
    ) -> Result<Vec<CallbackLog>> {
        let Some(table) = self.tables.get(&Self::table_key(dst)) else {
            return Ok(Vec::new());
        };
        Ok(table
            .values()
            .filter(|log| notification_ids.contains(&log.notification_id))
            .cloned()
            .collect())
    }
}

/// Notification rows plus the routing needed to co-write callback logs.
pub struct MemNotificationStore {
    rows: DashMap<u64, Notification>,
    callback_logs: Option<(Arc<MemCallbackLogStore>, Arc<dyn ShardStrategy>)>,
}

impl MemNotificationStore {
    pub fn new() -> Self {
        Self { rows: DashMap::new(), callback_logs: None }
    }

    pub fn with_callback_logs(
        logs: Arc<MemCallbackLogStore>,
        sharding: Arc<dyn ShardStrategy>,
    ) -> Self {
        Self { rows: DashMap::new(), callback_logs: Some((logs, sharding)) }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

impl Default for MemNotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationStore for MemNotificationStore {
    async fn create(&self, n: Notification) -> Result<Notification> {
        // Upsert on id: a re-submission returns the stored row untouched.
        let entry = self.rows.entry(n.id).or_insert(n);
        Ok(entry.clone())
    }

    async fn create_with_callback_log(
        &self,
        n: Notification,
        log: Option<CallbackLog>,
    ) -> Result<Notification> {
        let created = self.create(n).await?;
        if let Some(log) = log {
            let (logs, sharding) = self.callback_logs.as_ref().ok_or_else(|| {
                KuryrError::internal("notification store has no callback-log binding")
            })?;
            let dst = sharding.shard(log.biz_id, &log.biz_key);
            logs.upsert(&dst, log).await?;
        }
        Ok(created)
    }

    async fn mark_status(
        &self,
        id: u64,
        expected_version: i32,
        status: SendStatus,
    ) -> Result<bool> {
        let mut row = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| KuryrError::record_not_found(format!("notification {id}")))?;

        if !row.send_status.can_transition_to(status) {
            return Err(KuryrError::InvalidStatus(format!(
                "notification {id}: {} -> {}",
                row.send_status.as_str(),
                status.as_str()
            )));
        }
        if row.version != expected_version {
            return Ok(false);
        }
        row.send_status = status;
        row.version += 1;
        Ok(true)
    }

    async fn find(&self, id: u64) -> Result<Notification> {
        self.rows
            .get(&id)
            .map(|row| row.clone())
            .ok_or_else(|| KuryrError::record_not_found(format!("notification {id}")))
    }
}

/// Unsharded tenant configuration.
#[derive(Default)]
pub struct MemBizConfigStore {
    rows: DashMap<u64, BizConfig>,
}

impl MemBizConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, config: BizConfig) {
        self.rows.insert(config.biz_id, config);
    }
}

#[async_trait]
impl BizConfigStore for MemBizConfigStore {
    async fn find(&self, biz_id: u64) -> Result<BizConfig> {
        self.rows
            .get(&biz_id)
            .map(|row| row.clone())
            .ok_or_else(|| KuryrError::record_not_found(format!("biz config {biz_id}")))
    }
}

/// Template trees keyed by template id.
#[derive(Default)]
pub struct MemTemplateStore {
    rows: DashMap<u64, ChannelTemplate>,
}

impl MemTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, template: ChannelTemplate) {
        self.rows.insert(template.id, template);
    }
}

#[async_trait]
impl ChannelTemplateStore for MemTemplateStore {
    async fn find(&self, tpl_id: u64) -> Result<ChannelTemplate> {
        self.rows
            .get(&tpl_id)
            .map(|row| row.clone())
            .ok_or_else(|| KuryrError::record_not_found(format!("template {tpl_id}")))
    }
}

/// Providers with secrets sealed at rest and opened on read, matching what a
/// database binding does.
pub struct MemProviderStore {
    rows: DashMap<u64, Provider>,
    cipher: SecretCipher,
}

impl MemProviderStore {
    pub fn new(cipher: SecretCipher) -> Self {
        Self { rows: DashMap::new(), cipher }
    }

    pub fn insert(&self, mut provider: Provider) -> Result<()> {
        provider.api_secret = self.cipher.seal(&provider.api_secret)?;
        self.rows.insert(provider.id, provider);
        Ok(())
    }
}

#[async_trait]
impl ProviderStore for MemProviderStore {
    async fn find(&self, provider_id: u64) -> Result<Provider> {
        let mut provider = self
            .rows
            .get(&provider_id)
            .map(|row| row.clone())
            .ok_or_else(|| KuryrError::record_not_found(format!("provider {provider_id}")))?;
        provider.api_secret = self.cipher.open(&provider.api_secret)?;
        Ok(provider)
    }
}
