//! Recognized configuration options
//!
//! Bootstrap loads these from whatever source the deployment uses; the core
//! only defines the shapes and their defaults.

use serde::{Deserialize, Serialize};

use crate::sharding::BroadcastMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub addr: String,
    pub group: String,
    pub timeout_ms: u64,
    pub read_weight: u32,
    pub write_weight: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "kuryr".into(),
            addr: "0.0.0.0:9000".into(),
            group: "default".into(),
            timeout_ms: 3_000,
            read_weight: 1,
            write_weight: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbLogLevel {
    Silent,
    Error,
    #[default]
    Warn,
    Info,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DbNode {
    pub dsn: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamedDbNode {
    pub name: String,
    pub dsn: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub base: DbNode,
    pub sharding: Vec<NamedDbNode>,
    pub log_level: DbLogLevel,
    pub slow_threshold_ms: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            base: DbNode::default(),
            sharding: Vec::new(),
            log_level: DbLogLevel::default(),
            slow_threshold_ms: 200,
        }
    }
}

/// Shape of one sharded table family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardTableConfig {
    pub db_prefix: String,
    pub table_prefix: String,
    pub db_shard_count: u64,
    pub table_shard_count: u64,
    pub broadcast_mode: BroadcastMode,
}

impl Default for ShardTableConfig {
    fn default() -> Self {
        Self {
            db_prefix: "kuryr".into(),
            table_prefix: "callback_log".into(),
            db_shard_count: 2,
            table_shard_count: 4,
            broadcast_mode: BroadcastMode::Default,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardingConfig {
    pub callback_log: ShardTableConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub addr: String,
    pub password: String,
}

/// Process-local cache tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalCacheConfig {
    pub default_expiration_ms: u64,
    pub cleanup_interval_ms: u64,
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self { default_expiration_ms: 15 * 60 * 1_000, cleanup_interval_ms: 60 * 1_000 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtcdTlsConfig {
    pub ca_cert: String,
    pub client_cert: String,
    pub client_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtcdConfig {
    pub endpoints: Vec<String>,
    pub username: String,
    pub password: String,
    pub dial_timeout_ms: u64,
    pub tls: Option<EtcdTlsConfig>,
}

impl Default for EtcdConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            username: String::new(),
            password: String::new(),
            dial_timeout_ms: 3_000,
            tls: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrpcKeepaliveConfig {
    pub time_ms: u64,
    pub timeout_ms: u64,
    pub permit_without_stream: bool,
}

impl Default for GrpcKeepaliveConfig {
    fn default() -> Self {
        Self { time_ms: 30_000, timeout_ms: 10_000, permit_without_stream: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrpcClientConfig {
    pub name: String,
    pub timeout_ms: u64,
    pub keepalive: GrpcKeepaliveConfig,
}

impl Default for GrpcClientConfig {
    fn default() -> Self {
        Self { name: String::new(), timeout_ms: 3_000, keepalive: GrpcKeepaliveConfig::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrpcConfig {
    pub client: GrpcClientConfig,
}

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KuryrConfig {
    pub app: AppConfig,
    pub db: DbConfig,
    pub sharding: ShardingConfig,
    pub redis: RedisConfig,
    pub local_cache: LocalCacheConfig,
    pub etcd: EtcdConfig,
    pub grpc: GrpcConfig,
}
