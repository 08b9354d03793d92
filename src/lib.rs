#![forbid(unsafe_code)]

//! # Kuryr
//!
//! Multi-tenant notification dispatch core. Tenants submit notifications over
//! SMS or email; Kuryr routes each through a send strategy, fails over across
//! third-party providers, records the outcome, and reports it back to the
//! tenant through a retried, circuit-breaker-protected callback pipeline that
//! reconciles sharded callback-log tables.
//!
//! ## Pieces
//!
//! - **Shard routing**: `(biz_id, biz_key)` hashes to a (database, table)
//!   pair; minted ids embed the hash so a bare id routes.
//! - **Send strategies**: immediate sends deliver in-line, everything else
//!   persists for the async pipeline.
//! - **Provider failover**: a per-send selector yields providers until one
//!   accepts or the list runs dry.
//! - **Outcome recording**: optimistic status marks plus a prepared
//!   callback-log row, batched under a bounded task pool.
//! - **Callback reconciliation**: scheduled shard scans with per-database
//!   bounded parallelism, exponential retry bookkeeping, and a circuit
//!   breaker over the whole pass.
//!
//! Storage and transport are consumed through traits ([`NotificationStore`],
//! [`CallbackLogStore`], [`CallbackClient`], ...); the `Mem*` types bind them
//! in memory for tests and local development.

mod backoff;
mod batch;
mod cache;
mod callback;
mod channel;
mod clock;
mod config;
mod domain;
mod error;
mod hash;
mod idgen;
mod memstore;
mod provider;
mod sender;
mod sendstrategy;
mod sharding;
mod store;

#[cfg(test)]
mod test_support;

pub use backoff::RetryPolicy;
pub use batch::{BatchAdjuster, DurationRing, FixedStepAdjuster, SlideWindowAdjuster};
pub use cache::{
    biz_config_cache_key, BizConfigCache, KeyChange, RemoteCache, DEFAULT_LOCAL_TTL,
};
pub use callback::{
    CallbackReconciler, CallbackScheduler, CallbackService, CircuitBreakerConfig,
    CircuitBreakerService, CircuitState, ReconcilerConfig, SchedulerConfig,
};
pub use channel::{ChannelDispatcher, ChannelSend, FailoverSender};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    AppConfig, DbConfig, DbLogLevel, DbNode, EtcdConfig, EtcdTlsConfig, GrpcClientConfig,
    GrpcConfig, GrpcKeepaliveConfig, KuryrConfig, LocalCacheConfig, NamedDbNode, RedisConfig,
    ShardTableConfig, ShardingConfig,
};
pub use domain::{
    ActiveStatus, AuditStatus, BatchSendResp, BizConfig, CallbackConfig, CallbackLog,
    CallbackLogStatus, Channel, ChannelConfig, ChannelItem, ChannelTemplate, Notification,
    OwnerType, Provider, ProviderBinding, Quota, QuotaConfig, SecretCipher, SendResp, SendResult,
    SendStatus, SendStrategy, TemplateRef, TemplateVersion,
};
pub use error::{ErrorCode, KuryrError, Result};
pub use idgen::{
    extract_hash, extract_sequence, extract_timestamp_millis, IdMinter, EPOCH_MILLIS,
};
pub use memstore::{
    MemBizConfigStore, MemCallbackLogStore, MemNotificationStore, MemProviderStore,
    MemTemplateStore,
};
pub use provider::{
    EmailApi, EmailProvider, EmailSendRequest, EmailSendResponse, ProviderDriver, Selector,
    SelectorBuilder, SeqSelector, SeqSelectorBuilder, SmsApi, SmsProvider, SmsSendRequest,
    SmsSendResponse, SmsSendStatus,
};
pub use sender::{NotificationSender, DEFAULT_SEND_POOL_SIZE};
pub use sendstrategy::{
    DeferredStrategy, ImmediateStrategy, SendStrategyDispatcher, StrategyExec,
};
pub use sharding::{BalancedSharding, BroadcastMode, Dst, HashSharding, ShardStrategy};
pub use store::{
    BizConfigStore, CallbackClient, CallbackClientRegistry, CallbackLogStore,
    CallbackNotifyRequest, CallbackNotifyResponse, ChannelTemplateStore, NotificationStore,
    ProviderStore,
};
