//! Provider drivers and provider selection

mod email;
mod selector;
mod sms;

pub use email::{EmailApi, EmailProvider, EmailSendRequest, EmailSendResponse};
pub use selector::{SeqSelector, SeqSelectorBuilder};
pub use sms::{SmsApi, SmsProvider, SmsSendRequest, SmsSendResponse, SmsSendStatus};

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{Notification, SendResult};
use crate::error::Result;

/// Response code a vendor reports for a receiver that was accepted.
pub(crate) const CODE_OK: &str = "ok";

/// One third-party vendor adapter. `send` resolves the provider-side template
/// binding, submits to the vendor API, and translates the response; any
/// failure is an error so the channel sender can fail over.
#[async_trait]
pub trait ProviderDriver: Send + Sync {
    async fn send(&self, n: &Notification) -> Result<SendResult>;

    /// Identity used in logs and failover traces.
    fn provider_id(&self) -> u64;
}

/// Yields candidate providers one at a time until exhausted. A selector
/// instance is single-use; callers obtain a fresh one per send.
pub trait Selector: Send {
    fn next(&mut self, n: &Notification) -> Result<Arc<dyn ProviderDriver>>;
}

/// Builds a fresh selector per send. Implementations decide ordering:
/// sequential today, weighted or health-aware variants plug in here.
pub trait SelectorBuilder: Send + Sync {
    fn build(&self) -> Result<Box<dyn Selector>>;
}
