//! Email provider driver

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Notification, SendResult, SendStatus};
use crate::error::{KuryrError, Result};
use crate::provider::{ProviderDriver, CODE_OK};
use crate::store::{ChannelTemplateStore, ProviderStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailSendRequest {
    pub recipients: Vec<String>,
    pub sender_name: String,
    pub template_id: String,
    pub params: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailSendResponse {
    pub request_id: String,
    /// recipient -> status code, "OK" (any case) meaning accepted
    pub results: HashMap<String, String>,
}

/// Vendor client contract for transactional email.
#[async_trait]
pub trait EmailApi: Send + Sync {
    async fn send(&self, req: EmailSendRequest) -> Result<EmailSendResponse>;
}

pub struct EmailProvider {
    provider_id: u64,
    api: Arc<dyn EmailApi>,
    templates: Arc<dyn ChannelTemplateStore>,
    providers: Arc<dyn ProviderStore>,
}

impl EmailProvider {
    pub fn new(
        provider_id: u64,
        api: Arc<dyn EmailApi>,
        templates: Arc<dyn ChannelTemplateStore>,
        providers: Arc<dyn ProviderStore>,
    ) -> Self {
        Self { provider_id, api, templates, providers }
    }
}

#[async_trait]
impl ProviderDriver for EmailProvider {
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
            .send(EmailSendRequest {
                recipients: n.receivers.clone(),
                sender_name: version.signature.clone(),
                template_id: binding.provider_tpl_id.clone(),
                params: n.template.params.clone(),
            })
            .await?;

        for recipient in &n.receivers {
            match resp.results.get(recipient) {
                Some(code) if code.eq_ignore_ascii_case(CODE_OK) => {}
                Some(code) => {
                    tracing::warn!(
                        notification_id = n.id,
                        provider_id = self.provider_id,
                        recipient = %recipient,
                        code = %code,
                        request_id = %resp.request_id,
                        "email recipient rejected"
                    );
                    return Err(KuryrError::internal(format!(
                        "email provider {} rejected {recipient}: {code}",
                        self.provider_id
                    )));
                }
                None => {
                    return Err(KuryrError::internal(format!(
                        "email provider {} returned no status for {recipient}",
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
