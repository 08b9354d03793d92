//! Send strategies as a tagged union
//!
//! The dispatcher selects behavior by tag; every strategy reduces to a
//! `[scheduled_start, scheduled_end]` window once validated.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{KuryrError, Result};

/// Window length granted to an immediate send.
const IMMEDIATE_WINDOW_SECS: i64 = 30 * 60;
/// Tolerance around a scheduled instant.
const SCHEDULED_TOLERANCE_SECS: i64 = 10;
/// Deadline applied when an immediate notification is downgraded to async.
const ASYNC_IMMEDIATE_DEADLINE_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy_type", rename_all = "lowercase")]
pub enum SendStrategy {
    /// Synchronous in-line send.
    Immediate,
    /// Send after a fixed delay.
    Delayed { delay_ms: u64 },
    /// Send at an instant, give or take the tolerance.
    Scheduled { at: DateTime<Utc> },
    /// Send anywhere inside an explicit window.
    Window { start_at: DateTime<Utc>, end_at: DateTime<Utc> },
    /// Send any time before the deadline.
    Deadline { deadline: DateTime<Utc> },
}

impl SendStrategy {
    pub fn is_immediate(&self) -> bool {
        matches!(self, Self::Immediate)
    }

    /// Discriminant used to reject mixed-strategy batches.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Delayed { .. } => "delayed",
            Self::Scheduled { .. } => "scheduled",
            Self::Window { .. } => "window",
            Self::Deadline { .. } => "deadline",
        }
    }

    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        match self {
            Self::Immediate => Ok(()),
            Self::Delayed { delay_ms } => {
                if *delay_ms == 0 {
                    return Err(KuryrError::invalid_param("delay must be greater than 0"));
                }
                Ok(())
            }
            Self::Scheduled { at } => {
                if *at <= now {
                    return Err(KuryrError::invalid_param("scheduled_at must be in the future"));
                }
                Ok(())
            }
            Self::Window { start_at, end_at } => {
                if start_at > end_at {
                    return Err(KuryrError::invalid_param("start_at must not be after end_at"));
                }
                Ok(())
            }
            Self::Deadline { deadline } => {
                if *deadline <= now {
                    return Err(KuryrError::invalid_param("deadline must be in the future"));
                }
                Ok(())
            }
        }
    }

    /// Earliest and latest send instants for this strategy.
    pub fn send_window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            Self::Immediate => (now, now + ChronoDuration::seconds(IMMEDIATE_WINDOW_SECS)),
            Self::Delayed { delay_ms } => {
                (now, now + ChronoDuration::milliseconds(*delay_ms as i64))
            }
            Self::Scheduled { at } => (
                *at - ChronoDuration::seconds(SCHEDULED_TOLERANCE_SECS),
                *at + ChronoDuration::seconds(SCHEDULED_TOLERANCE_SECS),
            ),
            Self::Window { start_at, end_at } => (*start_at, *end_at),
            Self::Deadline { deadline } => (now, *deadline),
        }
    }

    /// Rewrite an immediate strategy submitted on an async path into a
    /// short-deadline one, so the async pipeline has a window to honor.
    pub fn downgrade_async_immediate(&mut self, now: DateTime<Utc>) {
        if self.is_immediate() {
            *self = Self::Deadline {
                deadline: now + ChronoDuration::seconds(ASYNC_IMMEDIATE_DEADLINE_SECS),
            };
        }
    }
}
