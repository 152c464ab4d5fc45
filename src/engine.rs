//! Consensus engine contract: operations submitted to the replicated log
//! and the ordered apply stream coming back out.

use std::collections::HashMap;

use crate::api::{ClientId, SerialNum};
use crate::ctrl::{GroupId, ShardConfig, ShardId};

use get_size::GetSize;

use serde::{Deserialize, Serialize};

/// A client command against the owning shard's map.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, GetSize)]
pub enum ClientOp {
    /// Get the value of given key.
    Get { key: String, shard: ShardId },

    /// Put a new value into key.
    Put {
        key: String,
        value: String,
        shard: ShardId,
    },

    /// Concatenate value onto key (absent key reads as empty).
    Append {
        key: String,
        value: String,
        shard: ShardId,
    },
}

impl ClientOp {
    /// Target shard of this operation.
    #[inline]
    pub fn shard(&self) -> ShardId {
        match self {
            ClientOp::Get { shard, .. }
            | ClientOp::Put { shard, .. }
            | ClientOp::Append { shard, .. } => *shard,
        }
    }
}

/// Tagged payload of one replicated log operation.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, GetSize)]
pub enum OpPayload {
    /// A client command.
    Client(ClientOp),

    /// A newly observed configuration, proposed by the leader's poller.
    Config(ShardConfig),

    /// Trigger entry re-arming the migration driver; carries no data so a
    /// new leader inheriting outbound shards re-drives them after a crash.
    MigrationOut,

    /// Shard data shipped in from another group.
    MigrationIn {
        sids: Vec<ShardId>,
        data: Vec<HashMap<String, String>>,
    },
}

/// One operation traversing the replicated log. Client payloads are
/// identified by `(client_id, serial)`; server-originated payloads use the
/// group ID and the configuration number instead.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, GetSize)]
pub struct LogOp {
    pub client_id: ClientId,
    pub serial: SerialNum,
    pub payload: OpPayload,
}

impl LogOp {
    /// Composes a migration-driver trigger entry for this group.
    pub fn migration_out(gid: GroupId) -> Self {
        LogOp {
            client_id: gid,
            serial: 0,
            payload: OpPayload::MigrationOut,
        }
    }

    /// Composes a configuration entry for this group.
    pub fn reconfig(gid: GroupId, config: ShardConfig) -> Self {
        LogOp {
            client_id: gid,
            serial: config.num,
            payload: OpPayload::Config(config),
        }
    }
}

/// One entry delivered on the engine's ordered apply stream.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ApplyEntry {
    /// A committed command at the given log index.
    Command { index: u64, op: LogOp },

    /// A snapshot replacing all state up to the given log index.
    Snapshot { index: u64, data: Vec<u8> },
}

/// Consensus engine contract. The engine totally orders submitted
/// operations, delivers them (and installed snapshots) on the apply stream
/// handed to the replica at construction, and persists whatever it needs to
/// survive restarts.
pub trait LogEngine: Send + Sync {
    /// Proposes an operation. Returns `(index, term, is_leader)`; when
    /// `is_leader` is false the operation was refused and the index is
    /// meaningless.
    fn submit(&self, op: LogOp) -> (u64, u64, bool);

    /// Returns `(term, is_leader)` for this server.
    fn get_state(&self) -> (u64, bool);

    /// Hands the engine an encoded state snapshot covering the log up to
    /// `index`, allowing it to truncate.
    fn snapshot(&self, index: u64, data: Vec<u8>);

    /// Current size in bytes of the engine's retained log state, used to
    /// pace snapshot emission.
    fn log_size(&self) -> usize;

    /// Shuts the engine down.
    fn kill(&self);
}
