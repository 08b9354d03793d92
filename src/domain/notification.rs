//! The notification: unit of work for the whole pipeline

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::strategy::SendStrategy;
use crate::domain::types::Channel;
use crate::error::{KuryrError, Result};

/// Delivery lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    Prepare,
    Pending,
    Sending,
    Success,
    Failure,
    Cancel,
}

impl SendStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Cancel)
    }

    /// Whether the state machine permits `self -> next`.
    pub fn can_transition_to(&self, next: SendStatus) -> bool {
        use SendStatus::*;
        match (self, next) {
            (Prepare, Pending) | (Prepare, Sending) | (Prepare, Cancel) => true,
            (Pending, Sending) | (Pending, Cancel) => true,
            (Sending, Success) | (Sending, Failure) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Cancel => "cancel",
        }
    }
}

/// Reference to a tenant template: id, version, and the parameter map passed
/// through to the provider untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRef {
    pub id: u64,
    pub version: u64,
    pub params: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub biz_id: u64,
    pub biz_key: String,
    pub receivers: Vec<String>,
    pub channel: Channel,
    pub template: TemplateRef,
    pub send_status: SendStatus,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub scheduled_end: Option<DateTime<Utc>>,
    /// Optimistic concurrency token.
    pub version: i32,
    pub strategy: SendStrategy,
}

impl Notification {
    /// Reject malformed input before any side effect.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        if self.biz_id == 0 {
            return Err(KuryrError::invalid_param("biz id cannot be zero"));
        }
        if self.biz_key.is_empty() {
            return Err(KuryrError::invalid_param("biz key cannot be empty"));
        }
        if self.receivers.is_empty() {
            return Err(KuryrError::invalid_param("receivers cannot be empty"));
        }
        if self.template.id == 0 {
            return Err(KuryrError::invalid_param("template id cannot be zero"));
        }
        if self.template.version == 0 {
            return Err(KuryrError::invalid_param("template version cannot be zero"));
        }
        if self.template.params.is_empty() {
            return Err(KuryrError::invalid_param("template params cannot be empty"));
        }
        self.strategy.validate(now)
    }

    /// Derive the scheduled window from the strategy.
    pub fn set_send_window(&mut self, now: DateTime<Utc>) {
        let (start, end) = self.strategy.send_window(now);
        self.scheduled_start = Some(start);
        self.scheduled_end = Some(end);
    }

    pub fn is_immediate(&self) -> bool {
        self.strategy.is_immediate()
    }
}

/// Outcome of one notification's delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    pub notification_id: u64,
    pub status: SendStatus,
}

/// Response to a single send request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendResp {
    pub result: SendResult,
}

/// Response to a batch send request; results are unordered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSendResp {
    pub results: Vec<SendResult>,
}
