//! SMS provider driver over a Tencent-compatible vendor client

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Notification, SendResult, SendStatus};
use crate::error::{KuryrError, Result};
use crate::provider::{ProviderDriver, CODE_OK};
use crate::store::{ChannelTemplateStore, ProviderStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmsSendRequest {
    pub phones: Vec<String>,
    pub sign_name: String,
    pub template_id: String,
    pub params: HashMap<String, String>,
}

/// Per-receiver status code, "OK" (any case) meaning accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmsSendStatus {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmsSendResponse {
    pub request_id: String,
    /// phone -> status
    pub results: HashMap<String, SmsSendStatus>,
}

/// Vendor client contract. Template management calls live on the vendor side
/// of this trait but the delivery core only submits.
#[async_trait]
pub trait SmsApi: Send + Sync {
    async fn send(&self, req: SmsSendRequest) -> Result<SmsSendResponse>;
}

/// Driver for one configured SMS provider.
pub struct SmsProvider {
    provider_id: u64,
    api: Arc<dyn SmsApi>,
    templates: Arc<dyn ChannelTemplateStore>,
    providers: Arc<dyn ProviderStore>,
}

impl SmsProvider {
    pub fn new(
        provider_id: u64,
        api: Arc<dyn SmsApi>,
        templates: Arc<dyn ChannelTemplateStore>,
        providers: Arc<dyn ProviderStore>,
    ) -> Self {
        Self { provider_id, api, templates, providers }
    }
}

#[async_trait]
impl ProviderDriver for SmsProvider {
    async fn send(&self, n: &Notification) -> Result<SendResult> {
        let provider = self.providers.find(self.provider_id).await?;
        if !provider.is_active() {
            return Err(KuryrError::internal(format!(
                "provider {} is inactive",
                self.provider_id
            )));
        }

        let template = self.templates.find(n.template.id).await?;
        let (version, binding) = template.resolve_binding(self.provider_id)?;

        let resp = self
            .api
            .send(SmsSendRequest {
                phones: n.receivers.clone(),
                sign_name: version.signature.clone(),
                template_id: binding.provider_tpl_id.clone(),
                params: n.template.params.clone(),
            })
            .await?;

        // A single non-OK receiver fails the whole attempt; partial success
        // is not modeled at this layer.
        for phone in &n.receivers {
            match resp.results.get(phone) {
                Some(status) if status.code.eq_ignore_ascii_case(CODE_OK) => {}
                Some(status) => {
                    tracing::warn!(
                        notification_id = n.id,
                        provider_id = self.provider_id,
                        phone = %phone,
                        code = %status.code,
                        request_id = %resp.request_id,
                        "sms receiver rejected"
                    );
                    return Err(KuryrError::internal(format!(
                        "sms provider {} rejected {phone}: {}",
                        self.provider_id, status.code
                    )));
                }
                None => {
                    return Err(KuryrError::internal(format!(
                        "sms provider {} returned no status for {phone}",
                        self.provider_id
                    )));
                }
            }
        }

        Ok(SendResult { notification_id: n.id, status: SendStatus::Success })
    }

    fn provider_id(&self) -> u64 {
        self.provider_id
    }
}
