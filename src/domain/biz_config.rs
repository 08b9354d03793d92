//! Per-tenant configuration

use serde::{Deserialize, Serialize};

use crate::backoff::RetryPolicy;
use crate::domain::types::{Channel, OwnerType};

/// One enabled channel and its ordering priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelItem {
    pub channel: Channel,
    pub priority: i32,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub channels: Vec<ChannelItem>,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub sms: i32,
    pub email: i32,
}

/// Quota ceilings; not enforced by the delivery core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default)]
    pub daily: Option<Quota>,
    #[serde(default)]
    pub monthly: Option<Quota>,
}

/// Where and how delivery outcomes are reported back to the tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackConfig {
    /// Service-registry name the callback client is resolved by.
    pub service_name: String,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BizConfig {
    pub biz_id: u64,
    pub owner_type: OwnerType,
    #[serde(default)]
    pub channel_config: Option<ChannelConfig>,
    #[serde(default)]
    pub quota_config: Option<QuotaConfig>,
    #[serde(default)]
    pub callback_config: Option<CallbackConfig>,
    /// Requests per second; not enforced by the delivery core.
    #[serde(default)]
    pub rate_limit: i32,
}
