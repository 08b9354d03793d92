//! Shared fixtures for unit tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::{
    ActiveStatus, AuditStatus, BizConfig, CallbackConfig, Channel, ChannelTemplate, Notification,
    OwnerType, Provider, ProviderBinding, SecretCipher, SendStatus, SendStrategy, TemplateRef,
    TemplateVersion,
};
use crate::error::Result;
use crate::provider::{SmsApi, SmsSendRequest, SmsSendResponse, SmsSendStatus};

pub(crate) use crate::memstore::{MemProviderStore, MemTemplateStore};

pub(crate) const TPL_ID: u64 = 100;
pub(crate) const TPL_VERSION_ID: u64 = 10;

pub(crate) fn sample_notification(biz_id: u64, biz_key: &str) -> Notification {
    Notification {
        id: 0,
        biz_id,
        biz_key: biz_key.into(),
        receivers: vec!["+8613800000001".into()],
        channel: Channel::Sms,
        template: TemplateRef {
            id: TPL_ID,
            version: TPL_VERSION_ID,
            params: HashMap::from([("code".into(), "123".into())]),
        },
        send_status: SendStatus::Prepare,
        scheduled_start: None,
        scheduled_end: None,
        version: 0,
        strategy: SendStrategy::Immediate,
    }
}

pub(crate) fn binding_for(provider_id: u64) -> ProviderBinding {
    ProviderBinding {
        id: provider_id * 10,
        tpl_id: TPL_ID,
        tpl_version_id: TPL_VERSION_ID,
        provider_id,
        provider_name: format!("provider-{provider_id}"),
        provider_channel: Channel::Sms,
        provider_tpl_id: format!("P-{provider_id}"),
        audit_status: AuditStatus::Approved,
    }
}

pub(crate) fn sample_template(provider_ids: &[u64]) -> ChannelTemplate {
    ChannelTemplate {
        id: TPL_ID,
        owner_id: 1,
        owner_type: OwnerType::Organization,
        name: "verify-code".into(),
        channel: Channel::Sms,
        activated_version_id: TPL_VERSION_ID,
        versions: vec![TemplateVersion {
            id: TPL_VERSION_ID,
            tpl_id: TPL_ID,
            name: "v1".into(),
            signature: "Kuryr".into(),
            content: "your code is {code}".into(),
            audit_status: AuditStatus::Approved,
            providers: provider_ids.iter().map(|&id| binding_for(id)).collect(),
        }],
    }
}

pub(crate) fn sample_provider(id: u64, active: bool) -> Provider {
    Provider {
        id,
        name: format!("provider-{id}"),
        channel: Channel::Sms,
        endpoint: "sms.example.com".into(),
        region: "ap-guangzhou".into(),
        api_id: "AKID".into(),
        api_secret: "secret".into(),
        weight: 10,
        qps_limit: 100,
        daily_limit: 10_000,
        active_status: if active { ActiveStatus::Active } else { ActiveStatus::Inactive },
    }
}

pub(crate) fn sample_biz_config(biz_id: u64, callback: Option<&str>) -> BizConfig {
    BizConfig {
        biz_id,
        owner_type: OwnerType::Organization,
        channel_config: None,
        quota_config: None,
        callback_config: callback.map(|service_name| CallbackConfig {
            service_name: service_name.into(),
            retry_policy: Default::default(),
        }),
        rate_limit: 0,
    }
}

impl MemTemplateStore {
    pub(crate) fn with_default_template() -> Self {
        let store = Self::new();
        store.insert(sample_template(&[50]));
        store
    }
}

impl MemProviderStore {
    pub(crate) fn with_active_provider(id: u64) -> Self {
        let store = Self::new(SecretCipher::new(&[9u8; 32]).unwrap());
        store.insert(sample_provider(id, true)).unwrap();
        store
    }

    pub(crate) fn with_inactive_provider(id: u64) -> Self {
        let store = Self::new(SecretCipher::new(&[9u8; 32]).unwrap());
        store.insert(sample_provider(id, false)).unwrap();
        store
    }
}

/// SMS client fake whose responses follow a fixed script.
#[derive(Clone)]
pub(crate) struct ScriptedSmsApi {
    code: Option<String>,
    drop_statuses: bool,
    requests: Arc<Mutex<Vec<SmsSendRequest>>>,
}

impl ScriptedSmsApi {
    pub(crate) fn accepting_all() -> Self {
        Self { code: Some("OK".into()), drop_statuses: false, requests: Default::default() }
    }

    pub(crate) fn with_code(code: &str) -> Self {
        Self { code: Some(code.into()), drop_statuses: false, requests: Default::default() }
    }

    pub(crate) fn dropping_statuses() -> Self {
        Self { code: None, drop_statuses: true, requests: Default::default() }
    }

    pub(crate) fn requests(&self) -> Vec<SmsSendRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmsApi for ScriptedSmsApi {
    async fn send(&self, req: SmsSendRequest) -> Result<SmsSendResponse> {
        let results = if self.drop_statuses {
            HashMap::new()
        } else {
            let code = self.code.clone().unwrap_or_else(|| "OK".into());
            req.phones
                .iter()
                .map(|phone| {
                    (
                        phone.clone(),
                        SmsSendStatus { code: code.clone(), message: "scripted".into() },
                    )
                })
                .collect()
        };
        self.requests.lock().unwrap().push(req);
        Ok(SmsSendResponse { request_id: "req-scripted".into(), results })
    }
}
