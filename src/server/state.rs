//! Replica state: the shard store, duplicate table, current configuration,
//! and pending-reply registry, plus the deterministic apply logic the
//! applier task drives against them.

use super::*;

use rmp_serde::decode::from_slice as decode_from_slice;
use rmp_serde::encode::to_vec as encode_to_vec;

/// Migration status of one shard on this group.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum ShardStatus {
    /// Owned (or unclaimed) and serveable here.
    Ok,

    /// Halted pending shipment to the new owner.
    MigratingOut,

    /// Halted pending data arrival from the previous owner.
    MigratingIn,
}

/// One keyspace shard: its migration status and key-value data.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub(crate) struct Shard {
    pub(crate) status: ShardStatus,
    pub(crate) data: HashMap<String, String>,
}

/// Last applied serial of one client and its cached result.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub(crate) struct DupEntry {
    pub(crate) serial: SerialNum,
    pub(crate) value: String,
    pub(crate) err: ErrCode,
}

/// Result of one applied operation, handed through the reply registry.
/// Waiters accept it only when `(client_id, serial)` match their request;
/// a mismatch means the log index was reused after a leadership change.
#[derive(Debug, PartialEq, Eq, Clone)]
pub(crate) struct OpResult {
    pub(crate) client_id: ClientId,
    pub(crate) serial: SerialNum,
    pub(crate) value: String,
    pub(crate) err: ErrCode,
}

/// Side effect the applier must carry out after ingesting an entry.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ApplyEffect {
    /// Nothing beyond the state update itself.
    None,

    /// A configuration marked shards outbound; propose a migration trigger
    /// entry so the driver is (re-)armed through the log.
    TriggerMigration,

    /// A migration trigger committed; wake the migration driver.
    WakeMigration,
}

/// All mutable state of one replica other than the dead flag. The applier
/// is the only writer of applied state; the request path additionally
/// inserts into the reply registry.
pub(crate) struct ReplicaState {
    /// Shard store, indexed by shard ID. Snapshotted.
    pub(crate) shards: Vec<Shard>,

    /// Duplicate table: per-client last applied serial plus cached result.
    /// Snapshotted.
    pub(crate) dup_table: HashMap<ClientId, DupEntry>,

    /// Most recently applied configuration. Snapshotted.
    pub(crate) cur_config: ShardConfig,

    /// Pending-reply registry: log index -> one-shot rendezvous with the
    /// RPC handler that submitted the entry there. Volatile.
    pub(crate) reply_chans: HashMap<u64, oneshot::Sender<OpResult>>,

    /// Index of the last applied log entry. Volatile.
    pub(crate) last_applied: u64,
}

impl ReplicaState {
    /// Creates the startup state: every shard serveable and empty, initial
    /// configuration number 0 (everything owned by the 0 sentinel).
    pub(crate) fn new() -> Self {
        ReplicaState {
            shards: (0..NUM_SHARDS)
                .map(|_| Shard {
                    status: ShardStatus::Ok,
                    data: HashMap::new(),
                })
                .collect(),
            dup_table: HashMap::new(),
            cur_config: ShardConfig::default(),
            reply_chans: HashMap::new(),
            last_applied: 0,
        }
    }

    /// True iff no shard is currently migrating either way.
    pub(crate) fn all_shards_ok(&self) -> bool {
        self.shards.iter().all(|s| s.status == ShardStatus::Ok)
    }

    /// True iff some shard still awaits shipment to its new owner.
    pub(crate) fn needs_migration_out(&self) -> bool {
        self.shards
            .iter()
            .any(|s| s.status == ShardStatus::MigratingOut)
    }

    /// Delivers a result to the waiter registered at `index`, if any. The
    /// waiter may have timed out and gone; a dropped receiver is absorbed
    /// by the one-shot sender without blocking the applier.
    fn deliver(&mut self, index: u64, result: OpResult) {
        if let Some(tx) = self.reply_chans.remove(&index) {
            let _ = tx.send(result);
        }
    }

    /// Writes the result into the duplicate table, then delivers it.
    fn record_and_deliver(&mut self, index: u64, result: OpResult) {
        self.dup_table.insert(
            result.client_id,
            DupEntry {
                serial: result.serial,
                value: result.value.clone(),
                err: result.err,
            },
        );
        self.deliver(index, result);
    }

    /// Duplicate gate for client-identified payloads. When the recorded
    /// serial is at least the incoming one this entry must not mutate
    /// anything: an exact replay re-delivers the cached result, a strictly
    /// older serial is dropped together with any waiter parked at this
    /// index (the client has already observed a newer result). Returns
    /// true when the entry was suppressed.
    fn suppress_duplicate(
        &mut self,
        index: u64,
        client_id: ClientId,
        serial: SerialNum,
    ) -> bool {
        match self.dup_table.get(&client_id) {
            Some(entry) if entry.serial == serial => {
                let cached = OpResult {
                    client_id,
                    serial,
                    value: entry.value.clone(),
                    err: entry.err,
                };
                self.deliver(index, cached);
                true
            }
            Some(entry) if entry.serial > serial => {
                self.reply_chans.remove(&index);
                true
            }
            _ => false,
        }
    }

    /// Deterministically applies one committed command entry. All replicas
    /// of a group walk identical entries in identical order, so the state
    /// reached here is identical across the group.
    pub(crate) fn ingest_command(
        &mut self,
        gid: GroupId,
        index: u64,
        op: LogOp,
    ) -> ApplyEffect {
        self.last_applied = index;
        let LogOp {
            client_id,
            serial,
            payload,
        } = op;

        match payload {
            OpPayload::Client(cmd) => {
                if self.suppress_duplicate(index, client_id, serial) {
                    return ApplyEffect::None;
                }

                let mut result = OpResult {
                    client_id,
                    serial,
                    value: String::new(),
                    err: ErrCode::Ok,
                };
                match cmd {
                    ClientOp::Get { key, shard } => {
                        match self.shards[shard].data.get(&key) {
                            Some(value) => result.value = value.clone(),
                            None => result.err = ErrCode::NoKey,
                        }
                    }
                    ClientOp::Put { key, value, shard } => {
                        self.shards[shard].data.insert(key, value);
                    }
                    ClientOp::Append { key, value, shard } => {
                        self.shards[shard]
                            .data
                            .entry(key)
                            .or_default()
                            .push_str(&value);
                    }
                }
                self.record_and_deliver(index, result);
                ApplyEffect::None
            }

            OpPayload::Config(new_config) => {
                // not recorded in the duplicate table and never awaited
                if self.prepare_reconfig(gid, new_config) {
                    ApplyEffect::TriggerMigration
                } else {
                    ApplyEffect::None
                }
            }

            OpPayload::MigrationOut => ApplyEffect::WakeMigration,

            OpPayload::MigrationIn { sids, data } => {
                if self.suppress_duplicate(index, client_id, serial) {
                    return ApplyEffect::None;
                }

                // install only shards still waiting for data; a shard that
                // is already serveable got this payload through an earlier
                // delivery of the same handoff
                for sid in sids {
                    if self.shards[sid].status == ShardStatus::MigratingIn {
                        self.shards[sid].data = data[sid].clone();
                        self.shards[sid].status = ShardStatus::Ok;
                    }
                }
                let result = OpResult {
                    client_id,
                    serial,
                    value: String::new(),
                    err: ErrCode::Ok,
                };
                self.record_and_deliver(index, result);
                ApplyEffect::None
            }
        }
    }

    /// Applies a committed configuration entry. Only strictly newer numbers
    /// are accepted. Shards leaving this group halt as `MigratingOut`;
    /// shards arriving halt as `MigratingIn` unless the previous owner is
    /// the 0 sentinel (nothing to wait for, serve immediately). Returns
    /// true iff any shard went outbound.
    pub(crate) fn prepare_reconfig(
        &mut self,
        gid: GroupId,
        new_config: ShardConfig,
    ) -> bool {
        if self.cur_config.num >= new_config.num {
            return false; // stale or duplicate configuration
        }

        let mut outbound = false;
        for sid in 0..NUM_SHARDS {
            let old_owner = self.cur_config.shards[sid];
            let new_owner = new_config.shards[sid];
            if old_owner == new_owner {
                continue;
            }
            if old_owner == gid {
                self.shards[sid].status = ShardStatus::MigratingOut;
                outbound = true;
            }
            if new_owner == gid && old_owner != 0 {
                self.shards[sid].status = ShardStatus::MigratingIn;
            }
        }

        self.cur_config = new_config;
        outbound
    }

    /// Encodes the persisted triple (shards, duplicate table, current
    /// configuration) into one opaque blob. Encoding in-memory state cannot
    /// legitimately fail; an error here is fatal by design.
    pub(crate) fn encode_snapshot(&self) -> Vec<u8> {
        match encode_to_vec(&(&self.shards, &self.dup_table, &self.cur_config))
        {
            Ok(data) => data,
            Err(e) => panic!("snapshot encode error: {}", e),
        }
    }

    /// Replaces the persisted triple from a snapshot blob. Undecodable
    /// bytes mean state corruption and are fatal by design.
    pub(crate) fn ingest_snapshot(&mut self, data: &[u8]) {
        type SnapTriple =
            (Vec<Shard>, HashMap<ClientId, DupEntry>, ShardConfig);
        let (shards, dup_table, cur_config): SnapTriple =
            match decode_from_slice(data) {
                Ok(triple) => triple,
                Err(e) => panic!("snapshot decode error: {}", e),
            };

        self.shards = shards;
        self.dup_table = dup_table;
        self.cur_config = cur_config;
    }
}
