//! Two-tier tenant configuration cache
//!
//! Process-local TTL entries in front of a shared remote cache, falling back
//! to the store. A watcher task consumes remote key-change events and patches
//! the local tier so stale entries die before their TTL.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::clock::Clock;
use crate::domain::BizConfig;
use crate::error::{KuryrError, Result};
use crate::store::BizConfigStore;

const KEY_PREFIX: &str = "biz_config:";

/// Default lifetime of a local entry.
pub const DEFAULT_LOCAL_TTL: Duration = Duration::from_secs(15 * 60);

pub fn biz_config_cache_key(biz_id: u64) -> String {
    format!("{KEY_PREFIX}{biz_id}")
}

/// Shared cache the local tier sits in front of. Values are the JSON form of
/// `BizConfig`.
#[async_trait::async_trait]
pub trait RemoteCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> Result<()>;
}

/// Remote key-change event consumed by the invalidation watcher.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyChange {
    Set { key: String, value: String },
    Del { key: String },
}

struct LocalEntry {
    config: BizConfig,
    expires_at_millis: u64,
}

/// Read-through cache for `BizConfig`.
pub struct BizConfigCache {
    local: DashMap<u64, LocalEntry>,
    remote: Option<Arc<dyn RemoteCache>>,
    store: Arc<dyn BizConfigStore>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl BizConfigCache {
    pub fn new(
        store: Arc<dyn BizConfigStore>,
        remote: Option<Arc<dyn RemoteCache>>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { local: DashMap::new(), remote, store, ttl, clock }
    }

    /// Local tier, then remote tier, then the store; both tiers are
    /// populated on the way back.
    pub async fn get(&self, biz_id: u64) -> Result<BizConfig> {
        let now = self.clock.now_millis();
        if let Some(entry) = self.local.get(&biz_id) {
            if entry.expires_at_millis > now {
                return Ok(entry.config.clone());
            }
        }
        // Expired entries are overwritten below rather than removed here, so
        // a concurrent reader never observes a gap.

        if let Some(remote) = &self.remote {
            match remote.get(&biz_config_cache_key(biz_id)).await {
                Ok(Some(raw)) => match serde_json::from_str::<BizConfig>(&raw) {
                    Ok(config) => {
                        self.put_local(config.clone());
                        return Ok(config);
                    }
                    Err(err) => {
                        tracing::warn!(biz_id, %err, "remote cache entry is malformed, falling through");
                    }
                },
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(biz_id, %err, "remote cache read failed, falling through");
                }
            }
        }

        let config = self.store.find(biz_id).await?;
        self.put_local(config.clone());
        if let Some(remote) = &self.remote {
            if let Ok(raw) = serde_json::to_string(&config) {
                if let Err(err) = remote.set(&biz_config_cache_key(biz_id), raw).await {
                    tracing::warn!(biz_id, %err, "remote cache write failed");
                }
            }
        }
        Ok(config)
    }

    pub fn put_local(&self, config: BizConfig) {
        let expires_at_millis = self.clock.now_millis() + self.ttl.as_millis() as u64;
        self.local.insert(config.biz_id, LocalEntry { config, expires_at_millis });
    }

    pub fn invalidate(&self, biz_id: u64) {
        self.local.remove(&biz_id);
    }

    /// Consume key-change events until the channel closes.
    pub async fn watch(&self, mut events: mpsc::Receiver<KeyChange>) {
        while let Some(event) = events.recv().await {
            match event {
                KeyChange::Set { key, value } => {
                    let Some(biz_id) = parse_key(&key) else {
                        continue;
                    };
                    match serde_json::from_str::<BizConfig>(&value) {
                        Ok(config) => {
                            tracing::debug!(biz_id, "local biz config refreshed from key event");
                            self.put_local(config);
                        }
                        Err(err) => {
                            tracing::warn!(biz_id, %err, "dropping malformed key event, invalidating");
                            self.invalidate(biz_id);
                        }
                    }
                }
                KeyChange::Del { key } => {
                    if let Some(biz_id) = parse_key(&key) {
                        tracing::debug!(biz_id, "local biz config invalidated by key event");
                        self.invalidate(biz_id);
                    }
                }
            }
        }
    }

    /// Convenience lookup used by the pipeline: `RecordNotFound` becomes
    /// "tenant has no callback config".
    pub async fn callback_config(
        &self,
        biz_id: u64,
    ) -> Result<Option<crate::domain::CallbackConfig>> {
        match self.get(biz_id).await {
            Ok(config) => Ok(config.callback_config),
            Err(KuryrError::RecordNotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

impl std::fmt::Debug for BizConfigCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BizConfigCache")
            .field("local_len", &self.local.len())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

fn parse_key(key: &str) -> Option<u64> {
    key.strip_prefix(KEY_PREFIX)?.parse().ok()
}
