//! Callback log: the reconciler's unit of bookkeeping

use serde::{Deserialize, Serialize};

use crate::domain::notification::SendStatus;

/// Outbound-callback lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackLogStatus {
    /// Row exists, no attempt yet.
    Prepare,
    /// Attempted at least once, retries remain.
    Pending,
    Success,
    Failure,
}

impl CallbackLogStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    /// Whether the reconciler should pick this row up.
    pub fn is_due_candidate(&self) -> bool {
        matches!(self, Self::Prepare | Self::Pending)
    }
}

/// One row per notification whose tenant wants an outcome callback.
///
/// Lives on the shard implied by `hash(biz_id, biz_key)`; the row id is
/// minted with that same hash so routing is recoverable from the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackLog {
    pub id: u64,
    pub biz_id: u64,
    pub biz_key: String,
    pub notification_id: u64,
    /// Copy of the notification's status at write time.
    pub notification_status: SendStatus,
    pub retried_times: i32,
    /// Epoch millis; 0 means due immediately.
    pub next_retry_at: i64,
    pub status: CallbackLogStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl CallbackLog {
    /// Fresh row ready for its first callback attempt.
    pub fn prepared(
        id: u64,
        biz_id: u64,
        biz_key: impl Into<String>,
        notification_id: u64,
        notification_status: SendStatus,
        now_millis: i64,
    ) -> Self {
        Self {
            id,
            biz_id,
            biz_key: biz_key.into(),
            notification_id,
            notification_status,
            retried_times: 0,
            next_retry_at: 0,
            status: CallbackLogStatus::Prepare,
            created_at: now_millis,
            updated_at: now_millis,
        }
    }
}
