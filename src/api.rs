//! RPC argument/reply types for the client-facing and inter-group APIs,
//! plus the transport seam used to reach a named server.

use std::collections::HashMap;

use crate::ctrl::{ConfigNum, ShardId};
use crate::utils::ShardsetError;

use async_trait::async_trait;

use serde::{Deserialize, Serialize};

/// Client ID type. Clients pick a random ID; migration senders use their
/// group ID.
pub type ClientId = u64;

/// Per-client request serial number type, strictly increasing.
pub type SerialNum = u64;

/// Reply error code shared by all Shardset RPCs.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum ErrCode {
    /// Success.
    Ok,

    /// Get on an absent key.
    NoKey,

    /// Target shard not owned (or not yet serveable) on this group.
    WrongGroup,

    /// Not the leader, or the response timed out.
    WrongLeader,

    /// Migration RPC for a configuration the destination has moved past;
    /// the sender treats this as success.
    OutdatedConfig,

    /// Destination currently mid-reconfiguration; the sender retries later.
    UpdatingConfig,
}

/// Which flavor of write a PutAppend RPC carries.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum UpdateKind {
    /// Overwrite the key's value.
    Put,

    /// Concatenate onto the key's value (absent key reads as empty).
    Append,
}

/// Get RPC arguments.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct GetArgs {
    pub key: String,
    pub shard: ShardId,
    pub client_id: ClientId,
    pub serial: SerialNum,
}

/// Get RPC reply.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct GetReply {
    pub value: String,
    pub err: ErrCode,
}

/// PutAppend RPC arguments.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct PutAppendArgs {
    pub key: String,
    pub value: String,
    pub kind: UpdateKind,
    pub shard: ShardId,
    pub client_id: ClientId,
    pub serial: SerialNum,
}

/// PutAppend RPC reply.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct PutAppendReply {
    pub err: ErrCode,
}

/// Inter-group MigrationIn RPC arguments. `client_id` is the source group's
/// ID and `serial` repeats `num`, so retried shipments fall into the
/// destination's duplicate table like any client request.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct MigrationArgs {
    /// Configuration number this handoff belongs to.
    pub num: ConfigNum,

    /// Shard IDs carried by this shipment.
    pub sids: Vec<ShardId>,

    /// Shard data, indexed by shard ID; only the listed IDs are populated.
    pub data: Vec<HashMap<String, String>>,

    pub client_id: ClientId,
    pub serial: SerialNum,
}

/// Inter-group MigrationIn RPC reply.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct MigrationReply {
    pub err: ErrCode,
}

/// Transport seam for reaching a server by its roster name. Implementations
/// own connection management and wire encoding; a transport-level failure
/// surfaces as `Err` and callers treat the server as unreachable.
#[async_trait]
pub trait ShardRpc: Send + Sync {
    /// Issues a Get RPC to the named server.
    async fn get(
        &self,
        server: &str,
        args: GetArgs,
    ) -> Result<GetReply, ShardsetError>;

    /// Issues a PutAppend RPC to the named server.
    async fn put_append(
        &self,
        server: &str,
        args: PutAppendArgs,
    ) -> Result<PutAppendReply, ShardsetError>;

    /// Issues an inter-group MigrationIn RPC to the named server.
    async fn migration_in(
        &self,
        server: &str,
        args: MigrationArgs,
    ) -> Result<MigrationReply, ShardsetError>;
}
