//! Shard controller contract: numbered configurations mapping shards to
//! replica groups, and the query interface groups use to observe them.

use std::collections::HashMap;

use crate::utils::ShardsetError;

use async_trait::async_trait;

use get_size::GetSize;

use serde::{Deserialize, Serialize};

/// Number of keyspace shards. Fixed for the life of a cluster.
pub const NUM_SHARDS: usize = 10;

/// Replica group ID type. 0 is the sentinel "no owner".
pub type GroupId = u64;

/// Configuration sequence number type. 0 is the initial empty configuration.
pub type ConfigNum = u64;

/// Shard index type.
pub type ShardId = usize;

/// Maps a key to the shard responsible for it.
#[inline]
pub fn key_to_shard(key: &str) -> ShardId {
    key.as_bytes().first().map_or(0, |b| (*b as usize) % NUM_SHARDS)
}

/// One immutable configuration published by the shard controller: the
/// shard-to-group assignment plus the server roster of each group.
#[derive(
    Debug, Default, PartialEq, Eq, Clone, Serialize, Deserialize, GetSize,
)]
pub struct ShardConfig {
    /// Configuration sequence number, strictly increasing.
    pub num: ConfigNum,

    /// Owning group of each shard; 0 means not yet assigned.
    pub shards: [GroupId; NUM_SHARDS],

    /// Map from group ID -> names of the servers in that group, resolvable
    /// by the RPC transport.
    pub groups: HashMap<GroupId, Vec<String>>,
}

/// Shard controller query interface.
///
/// Configurations are immutable once published. Querying `None` returns the
/// latest configuration; querying a known number returns that configuration;
/// querying past the latest returns the latest.
#[async_trait]
pub trait ConfigService: Send + Sync {
    /// Fetches the configuration with the given number (or the latest).
    async fn query(
        &self,
        num: Option<ConfigNum>,
    ) -> Result<ShardConfig, ShardsetError>;
}
