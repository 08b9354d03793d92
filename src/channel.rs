//! Per-channel sending with provider failover

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{Channel, Notification, SendResult};
use crate::error::{KuryrError, Result};
use crate::provider::SelectorBuilder;

/// Sends one notification over its channel.
#[async_trait]
pub trait ChannelSend: Send + Sync {
    async fn send(&self, n: &Notification) -> Result<SendResult>;
}

/// Walks the channel's providers in selector order, stopping at the first
/// success. Selector exhaustion is the terminal send failure.
pub struct FailoverSender {
    selector_builder: Arc<dyn SelectorBuilder>,
}

impl FailoverSender {
    pub fn new(selector_builder: Arc<dyn SelectorBuilder>) -> Self {
        Self { selector_builder }
    }
}

#[async_trait]
impl ChannelSend for FailoverSender {
    async fn send(&self, n: &Notification) -> Result<SendResult> {
        let mut selector = self.selector_builder.build()?;

        loop {
            let provider = match selector.next(n) {
                Ok(provider) => provider,
                Err(err) => {
                    tracing::warn!(
                        notification_id = n.id,
                        biz_id = n.biz_id,
                        channel = %n.channel,
                        %err,
                        "providers exhausted"
                    );
                    return Err(KuryrError::FailedToSend { notification_id: n.id });
                }
            };

            match provider.send(n).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    tracing::warn!(
                        notification_id = n.id,
                        provider_id = provider.provider_id(),
                        %err,
                        "provider attempt failed, trying next"
                    );
                }
            }
        }
    }
}

/// Routes a notification to the sender registered for its channel.
pub struct ChannelDispatcher {
    senders: HashMap<Channel, Arc<dyn ChannelSend>>,
}

impl ChannelDispatcher {
    pub fn new(senders: HashMap<Channel, Arc<dyn ChannelSend>>) -> Self {
        Self { senders }
    }
}

#[async_trait]
impl ChannelSend for ChannelDispatcher {
    async fn send(&self, n: &Notification) -> Result<SendResult> {
        match self.senders.get(&n.channel) {
            Some(sender) => sender.send(n).await,
            None => Err(KuryrError::InvalidChannel(n.channel.to_string())),
        }
    }
}
