//! Stable hashing of the tenant shard key

use std::hash::Hasher;

use twox_hash::XxHash64;

/// Hash `(biz_id, biz_key)` into the 64-bit value shard routing is derived from.
///
/// XXH64 with a zero seed; the value must be stable across processes and
/// restarts because ids embed its low bits.
pub fn biz_hash(biz_id: u64, biz_key: &str) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(biz_id.to_string().as_bytes());
    hasher.write(b":");
    hasher.write(biz_key.as_bytes());
    hasher.finish()
}
