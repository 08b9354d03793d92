//! Id minting with the shard key embedded
//!
//! Layout, high to low: 41 bits of millis since the 2025-01-01 epoch, 10 bits
//! of the `(biz_id, biz_key)` hash, 12 bits of a process-global sequence.
//! Routing for a row is recoverable from its id alone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::hash::biz_hash;

const TIMESTAMP_BITS: u32 = 41;
const HASH_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;

const HASH_SHIFT: u32 = SEQUENCE_BITS;
const TIMESTAMP_SHIFT: u32 = HASH_SHIFT + HASH_BITS;

const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const HASH_MASK: u64 = (1 << HASH_BITS) - 1;
const TIMESTAMP_MASK: u64 = (1 << TIMESTAMP_BITS) - 1;

/// Milliseconds of 2025-01-01T00:00:00Z.
pub const EPOCH_MILLIS: u64 = 1_735_689_600_000;

/// Mints 64-bit ids whose middle bits carry the shard hash.
///
/// Sequence wrap-around within one millisecond is tolerated: only the hash
/// bits feed shard routing, and collision pressure in the timestamp+sequence
/// space is the caller's concern at extreme rates.
#[derive(Debug)]
pub struct IdMinter {
    sequence: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl Default for IdMinter {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl IdMinter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { sequence: AtomicU64::new(0), clock }
    }

    pub fn next_id(&self, biz_id: u64, biz_key: &str) -> u64 {
        let timestamp = self.clock.now_millis().saturating_sub(EPOCH_MILLIS);
        let hash = biz_hash(biz_id, biz_key);
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);

        (timestamp & TIMESTAMP_MASK) << TIMESTAMP_SHIFT
            | (hash & HASH_MASK) << HASH_SHIFT
            | (seq & SEQUENCE_MASK)
    }
}

/// The 10 hash bits carried by an id.
pub fn extract_hash(id: u64) -> u64 {
    (id >> HASH_SHIFT) & HASH_MASK
}

/// The sequence bits carried by an id.
pub fn extract_sequence(id: u64) -> u64 {
    id & SEQUENCE_MASK
}

/// Unix epoch milliseconds of the id's mint time.
pub fn extract_timestamp_millis(id: u64) -> u64 {
    ((id >> TIMESTAMP_SHIFT) & TIMESTAMP_MASK) + EPOCH_MILLIS
}
