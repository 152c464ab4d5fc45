//! Shardset server replica module: client command application off the
//! replicated log, duplicate detection for exactly-once semantics, the
//! configuration-poll state machine, and the shard handoff protocol
//! between groups, all surviving restarts through engine snapshots.

mod applier;
mod migration;
mod polling;
mod request;
mod state;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::api::{
    ClientId, ErrCode, GetArgs, GetReply, MigrationArgs, MigrationReply,
    PutAppendArgs, PutAppendReply, SerialNum, ShardRpc, UpdateKind,
};
use crate::ctrl::{
    ConfigNum, ConfigService, GroupId, ShardConfig, ShardId, NUM_SHARDS,
};
use crate::engine::{ApplyEntry, ClientOp, LogEngine, LogOp, OpPayload};
use crate::utils::ShardsetError;

use serde::{Deserialize, Serialize};

use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::{self, Duration, MissedTickBehavior};

pub use state::ShardStatus;

pub(crate) use state::{ApplyEffect, OpResult, ReplicaState};

/// Server replica ID within its group.
pub type ReplicaId = u8;

/// Configuration parameters struct.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicaConfigShardset {
    /// Client response timeout in millisecs. Expiry reads as "leadership
    /// may have lapsed" and the caller is told to try elsewhere.
    pub resp_timeout_ms: u64,

    /// Shard controller polling interval in millisecs.
    pub poll_interval_ms: u64,

    /// Check snapshot pacing every this many applied entries.
    pub snap_check_interval: u64,

    /// Engine log size in bytes beyond which the replica hands down a
    /// snapshot for truncation. 0 means never snapshot.
    pub log_cap_bytes: usize,
}

#[allow(clippy::derivable_impls)]
impl Default for ReplicaConfigShardset {
    fn default() -> Self {
        ReplicaConfigShardset {
            resp_timeout_ms: 500,
            poll_interval_ms: 100,
            snap_check_interval: 64,
            log_cap_bytes: 0,
        }
    }
}

/// Shardset server replica module.
pub struct ShardsetReplica {
    /// Replica group ID this server belongs to.
    gid: GroupId,

    /// Replica ID in group.
    me: ReplicaId,

    /// Configuration parameters struct.
    config: ReplicaConfigShardset,

    /// Consensus engine underneath the replicated log.
    engine: Arc<dyn LogEngine>,

    /// Shard controller query stub.
    ctrl: Arc<dyn ConfigService>,

    /// Transport for inter-group migration RPCs.
    rpc: Arc<dyn ShardRpc>,

    /// All mutable replica state. The applier is the only writer of
    /// applied state; RPC handlers, the poller, and the migration driver
    /// read (and touch the reply registry) under this lock, releasing it
    /// before any suspension point.
    state: Mutex<ReplicaState>,

    /// Set true by `kill()`.
    dead: AtomicBool,

    /// Wake signal for the config poller; pending signals coalesce.
    poll_wake: Notify,

    /// Wake signal for the migration driver; pending signals coalesce.
    migrate_wake: Notify,
}

// ShardsetReplica common helpers
impl ShardsetReplica {
    /// Locks the replica state.
    #[inline]
    fn guard(&self) -> MutexGuard<'_, ReplicaState> {
        self.state.lock().unwrap()
    }

    /// Do I think I am the current leader of my group?
    #[inline]
    fn is_leader(&self) -> bool {
        self.engine.get_state().1
    }

    /// Has `kill()` been called on this replica?
    #[inline]
    fn killed(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }
}

// ShardsetReplica setup & teardown
impl ShardsetReplica {
    /// Creates a replica and spawns its three long-running tasks (applier,
    /// config poller, migration driver) onto the current tokio runtime,
    /// then kicks the poller once so a fresh group discovers its first
    /// configuration promptly. `apply_rx` is the engine's ordered apply
    /// stream for this server.
    pub fn new_and_setup(
        gid: GroupId,
        me: ReplicaId,
        engine: Arc<dyn LogEngine>,
        apply_rx: mpsc::UnboundedReceiver<ApplyEntry>,
        ctrl: Arc<dyn ConfigService>,
        rpc: Arc<dyn ShardRpc>,
        config_str: Option<&str>,
    ) -> Result<Arc<Self>, ShardsetError> {
        if gid == 0 {
            return logged_err!(gid, me; "group ID 0 is the unowned sentinel");
        }

        let config = parsed_config!(config_str => ReplicaConfigShardset;
                                    resp_timeout_ms, poll_interval_ms,
                                    snap_check_interval, log_cap_bytes)?;
        if config.resp_timeout_ms == 0 {
            return logged_err!(
                gid, me;
                "invalid config.resp_timeout_ms '{}'",
                config.resp_timeout_ms
            );
        }
        if config.poll_interval_ms == 0 {
            return logged_err!(
                gid, me;
                "invalid config.poll_interval_ms '{}'",
                config.poll_interval_ms
            );
        }
        if config.snap_check_interval == 0 {
            return logged_err!(
                gid, me;
                "invalid config.snap_check_interval '{}'",
                config.snap_check_interval
            );
        }

        let replica = Arc::new(ShardsetReplica {
            gid,
            me,
            config,
            engine,
            ctrl,
            rpc,
            state: Mutex::new(ReplicaState::new()),
            dead: AtomicBool::new(false),
            poll_wake: Notify::new(),
            migrate_wake: Notify::new(),
        });

        tokio::spawn(Arc::clone(&replica).run_applier(apply_rx));
        tokio::spawn(Arc::clone(&replica).run_config_poller());
        tokio::spawn(Arc::clone(&replica).run_migration_driver());

        replica.poll_wake.notify_one();
        pf_info!(gid, me; "replica created and tasks spawned");
        Ok(replica)
    }

    /// Sets the dead flag, shuts down the consensus engine, and nudges the
    /// background tasks so they observe the flag and exit.
    pub fn kill(&self) {
        self.dead.store(true, Ordering::SeqCst);
        self.engine.kill();
        self.poll_wake.notify_one();
        self.migrate_wake.notify_one();
        pf_debug!(self.gid, self.me; "replica killed");
    }

    /// Replica group ID this server belongs to.
    pub fn gid(&self) -> GroupId {
        self.gid
    }

    /// Replica ID in group.
    pub fn id(&self) -> ReplicaId {
        self.me
    }

    /// Number of the most recently applied configuration.
    pub fn config_num(&self) -> ConfigNum {
        self.guard().cur_config.num
    }

    /// Current migration status of every shard, for observability.
    pub fn shard_statuses(&self) -> Vec<ShardStatus> {
        self.guard().shards.iter().map(|s| s.status).collect()
    }
}
