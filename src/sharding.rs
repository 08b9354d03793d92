//! Shard routing for the callback-log tables
//!
//! Databases and tables are addressed by hash of the tenant shard key. The
//! broadcast enumeration used by the reconciler can be re-ordered by a
//! balancing decorator so full scans do not always hammer shard zero first.

use std::fmt;
use std::sync::Arc;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::hash::biz_hash;
use crate::idgen::extract_hash;

/// A (database, table) destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dst {
    pub db_suffix: u64,
    pub table_suffix: u64,
    pub db: String,
    pub table: String,
}

impl fmt::Display for Dst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.table)
    }
}

/// Routing strategy: key to destination, id to destination, full enumeration.
pub trait ShardStrategy: Send + Sync + fmt::Debug {
    fn shard(&self, biz_id: u64, biz_key: &str) -> Dst;
    fn shard_from_id(&self, id: u64) -> Dst;
    fn broadcast(&self) -> Vec<Dst>;
}

/// Hash sharding over fixed database and table counts.
#[derive(Debug, Clone)]
pub struct HashSharding {
    db_prefix: String,
    table_prefix: String,
    db_shard_count: u64,
    table_shard_count: u64,
}

impl HashSharding {
    pub fn new(
        db_prefix: impl Into<String>,
        table_prefix: impl Into<String>,
        db_shard_count: u64,
        table_shard_count: u64,
    ) -> Self {
        debug_assert!(db_shard_count > 0 && table_shard_count > 0);
        Self {
            db_prefix: db_prefix.into(),
            table_prefix: table_prefix.into(),
            db_shard_count,
            table_shard_count,
        }
    }

    fn dst(&self, hash: u64) -> Dst {
        let db_suffix = hash % self.db_shard_count;
        let table_suffix = (hash / self.db_shard_count) % self.table_shard_count;
        self.dst_for(db_suffix, table_suffix)
    }

    fn dst_for(&self, db_suffix: u64, table_suffix: u64) -> Dst {
        Dst {
            db_suffix,
            table_suffix,
            db: format!("{}_{}", self.db_prefix, db_suffix),
            table: format!("{}_{}", self.table_prefix, table_suffix),
        }
    }
}

impl ShardStrategy for HashSharding {
    fn shard(&self, biz_id: u64, biz_key: &str) -> Dst {
        self.dst(biz_hash(biz_id, biz_key))
    }

    fn shard_from_id(&self, id: u64) -> Dst {
        self.dst(extract_hash(id))
    }

    fn broadcast(&self) -> Vec<Dst> {
        let mut dsts = Vec::with_capacity((self.db_shard_count * self.table_shard_count) as usize);
        for db in 0..self.db_shard_count {
            for table in 0..self.table_shard_count {
                dsts.push(self.dst_for(db, table));
            }
        }
        dsts
    }
}

/// How a broadcast is ordered before the reconciler walks it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastMode {
    /// Database-major order as enumerated.
    #[default]
    Default,
    /// Interleave tables across databases to spread load.
    RoundRobin,
    /// Fisher-Yates shuffle.
    Shuffle,
}

/// Decorator that rebalances `broadcast` output; routing is delegated untouched.
#[derive(Debug, Clone)]
pub struct BalancedSharding {
    base: Arc<dyn ShardStrategy>,
    mode: BroadcastMode,
}

impl BalancedSharding {
    pub fn new(base: Arc<dyn ShardStrategy>, mode: BroadcastMode) -> Self {
        Self { base, mode }
    }

    fn round_robin(dsts: Vec<Dst>) -> Vec<Dst> {
        if dsts.is_empty() {
            return dsts;
        }

        let mut dbs: Vec<String> = Vec::new();
        let mut groups: Vec<Vec<Dst>> = Vec::new();
        for dst in dsts {
            match dbs.iter().position(|db| *db == dst.db) {
                Some(i) => groups[i].push(dst),
                None => {
                    dbs.push(dst.db.clone());
                    groups.push(vec![dst]);
                }
            }
        }

        let max_tables = groups.iter().map(Vec::len).max().unwrap_or(0);
        let mut out = Vec::with_capacity(groups.iter().map(Vec::len).sum());
        for round in 0..max_tables {
            for group in &groups {
                if let Some(dst) = group.get(round) {
                    out.push(dst.clone());
                }
            }
        }
        out
    }
}

impl ShardStrategy for BalancedSharding {
    fn shard(&self, biz_id: u64, biz_key: &str) -> Dst {
        self.base.shard(biz_id, biz_key)
    }

    fn shard_from_id(&self, id: u64) -> Dst {
        self.base.shard_from_id(id)
    }

    fn broadcast(&self) -> Vec<Dst> {
        let dsts = self.base.broadcast();
        match self.mode {
            BroadcastMode::Default => dsts,
            BroadcastMode::RoundRobin => Self::round_robin(dsts),
            BroadcastMode::Shuffle => {
                let mut shuffled = dsts;
                shuffled.shuffle(&mut rand::rng());
                shuffled
            }
        }
    }
}
