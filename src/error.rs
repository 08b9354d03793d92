//! Error taxonomy for the delivery core

use thiserror::Error;

/// Unified error type for the delivery pipeline.
#[derive(Debug, Error)]
pub enum KuryrError {
    /// Input rejected before any side effect.
    #[error("invalid param: {0}")]
    InvalidParam(String),

    /// Entity transition denied by its state machine.
    #[error("invalid status: {0}")]
    InvalidStatus(String),

    /// Request references a channel with no registered sender.
    #[error("invalid channel: {0}")]
    InvalidChannel(String),

    /// Expected persisted entity is missing.
    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// Template exists but no version is activated.
    #[error("template {tpl_id} has no activated version")]
    NoActivatedTemplateVersion { tpl_id: u64 },

    /// Activation points at a version that never passed review.
    #[error("template {tpl_id} version {version_id} is not approved")]
    NotApprovedTemplateVersion { tpl_id: u64, version_id: u64 },

    /// Every candidate provider was exhausted without a successful delivery.
    #[error("failed to send notification {notification_id}")]
    FailedToSend { notification_id: u64 },

    /// The reconciler is rejecting work while its circuit breaker cools down.
    #[error("circuit breaker open after {failures} failures")]
    CircuitOpen { failures: usize },

    /// Unexpected failure: storage, network, serialization.
    #[error("internal: {0}")]
    Internal(String),
}

/// Response code the API layer maps errors onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidArgument,
    NotFound,
    Internal,
}

impl KuryrError {
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Self::InvalidParam(msg.into())
    }

    pub fn record_not_found(msg: impl Into<String>) -> Self {
        Self::RecordNotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error is a provider-exhaustion failure.
    pub fn is_failed_to_send(&self) -> bool {
        matches!(self, Self::FailedToSend { .. })
    }

    /// Check if this error came from an open circuit breaker.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    pub fn is_record_not_found(&self) -> bool {
        matches!(self, Self::RecordNotFound(_))
    }

    /// Map onto the structured codes exposed at the API boundary.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidParam(_) | Self::InvalidStatus(_) | Self::InvalidChannel(_) => {
                ErrorCode::InvalidArgument
            }
            Self::RecordNotFound(_)
            | Self::NoActivatedTemplateVersion { .. }
            | Self::NotApprovedTemplateVersion { .. } => ErrorCode::NotFound,
            Self::FailedToSend { .. } | Self::CircuitOpen { .. } | Self::Internal(_) => {
                ErrorCode::Internal
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, KuryrError>;
