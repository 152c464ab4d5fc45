//! Public interface to the Shardset core library.
//!
//! Shardset partitions the keyspace into a fixed number of shards and
//! assigns each shard to one replica group at a time. Every server embeds a
//! [`ShardsetReplica`], which applies client commands off a replicated log,
//! observes numbered configurations from a shard controller, and hands
//! shards off between groups on reconfiguration. The consensus engine
//! underneath the log, the controller service, and the RPC transport are
//! external collaborators reached through the traits in this crate.

#![allow(clippy::uninlined_format_args)]

#[macro_use]
mod utils;

mod api;
mod client;
mod ctrl;
mod engine;
mod server;

pub use api::{
    ClientId, ErrCode, GetArgs, GetReply, MigrationArgs, MigrationReply,
    PutAppendArgs, PutAppendReply, SerialNum, ShardRpc, UpdateKind,
};
pub use client::ShardClerk;
pub use ctrl::{
    key_to_shard, ConfigNum, ConfigService, GroupId, ShardConfig, ShardId,
    NUM_SHARDS,
};
pub use engine::{ApplyEntry, ClientOp, LogEngine, LogOp, OpPayload};
pub use server::{
    ReplicaConfigShardset, ReplicaId, ShardStatus, ShardsetReplica,
};
pub use utils::ShardsetError;
