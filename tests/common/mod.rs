//! Shared helpers for integration tests: an in-process per-group log
//! engine with a switchable (and wedge-able) leader, an in-memory shard
//! controller, and a router-backed transport, so many servers of many
//! groups can run inside one test process.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use shardset::{
    ApplyEntry, ConfigNum, ConfigService, GetArgs, GetReply, GroupId,
    LogEngine, LogOp, MigrationArgs, MigrationReply, PutAppendArgs,
    PutAppendReply, ReplicaId, ShardClerk, ShardConfig, ShardRpc,
    ShardsetError, ShardsetReplica, NUM_SHARDS,
};

use async_trait::async_trait;

use get_size::GetSize;

use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant};

/// Picks a one-character key that maps to the given shard.
pub fn key_for_shard(sid: usize) -> String {
    (b'a'..=b'z')
        .map(|c| (c as char).to_string())
        .find(|k| shardset::key_to_shard(k) == sid)
        .expect("no single-letter key maps to shard")
}

/// Polls a condition until it holds or the deadline passes.
pub async fn wait_until(
    deadline_ms: u64,
    mut cond: impl FnMut() -> bool,
) -> bool {
    let deadline = Instant::now() + Duration::from_millis(deadline_ms);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// One group's shared in-memory total-order log. Stands in for the
/// consensus engine: whichever member the test designates as leader
/// commits submissions instantly, and every attached member receives the
/// committed entries on its own apply stream. A "wedged" member models a
/// partitioned server: its submissions are silently discarded while it
/// still believes whatever role it held at wedge time.
pub struct LocalLogGroup {
    inner: Arc<Mutex<LogInner>>,
}

struct LogInner {
    /// Committed operations at indices `truncated + 1 ..= truncated + len`.
    ops: Vec<LogOp>,

    /// Highest index covered by the latest installed snapshot.
    truncated: u64,

    /// Latest snapshot blob handed down for truncation.
    snapshot: Option<(u64, Vec<u8>)>,

    term: u64,
    leader: ReplicaId,

    /// Wedged members and whether each believed it was leader when wedged.
    wedged: HashMap<ReplicaId, bool>,

    /// Fake-index counter for submissions accepted from a wedged leader.
    wedged_extra: u64,

    /// Apply streams of the attached members.
    txs: HashMap<ReplicaId, mpsc::UnboundedSender<ApplyEntry>>,

    /// Approximate size of the retained (non-truncated) log.
    log_bytes: usize,
}

impl LocalLogGroup {
    pub fn new(leader: ReplicaId) -> Self {
        LocalLogGroup {
            inner: Arc::new(Mutex::new(LogInner {
                ops: Vec::new(),
                truncated: 0,
                snapshot: None,
                term: 1,
                leader,
                wedged: HashMap::new(),
                wedged_extra: 0,
                txs: HashMap::new(),
                log_bytes: 0,
            })),
        }
    }

    /// Attaches a member: returns its engine handle plus an apply stream
    /// primed with the current snapshot (if any) and the retained tail of
    /// the log, exactly what a restarting server must replay.
    pub fn attach(
        &self,
        me: ReplicaId,
    ) -> (Arc<LocalLogHandle>, mpsc::UnboundedReceiver<ApplyEntry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap();
        if let Some((index, data)) = &inner.snapshot {
            tx.send(ApplyEntry::Snapshot {
                index: *index,
                data: data.clone(),
            })
            .unwrap();
        }
        for (i, op) in inner.ops.iter().enumerate() {
            tx.send(ApplyEntry::Command {
                index: inner.truncated + 1 + i as u64,
                op: op.clone(),
            })
            .unwrap();
        }
        inner.txs.insert(me, tx);
        let handle = Arc::new(LocalLogHandle {
            me,
            inner: Arc::clone(&self.inner),
            dead: AtomicBool::new(false),
        });
        (handle, rx)
    }

    /// Moves leadership to another member (bumping the term).
    pub fn set_leader(&self, new_leader: ReplicaId) {
        let mut inner = self.inner.lock().unwrap();
        inner.term += 1;
        inner.leader = new_leader;
    }

    pub fn leader(&self) -> ReplicaId {
        self.inner.lock().unwrap().leader
    }

    /// Wedges a member: from now on its submissions go nowhere while it
    /// keeps believing the role it held at this instant.
    pub fn wedge(&self, me: ReplicaId) {
        let mut inner = self.inner.lock().unwrap();
        let believed_leader = inner.leader == me;
        inner.wedged.insert(me, believed_leader);
    }

    pub fn unwedge(&self, me: ReplicaId) {
        self.inner.lock().unwrap().wedged.remove(&me);
    }

    pub fn snapshot_index(&self) -> Option<u64> {
        self.inner.lock().unwrap().snapshot.as_ref().map(|(i, _)| *i)
    }

    pub fn committed_len(&self) -> u64 {
        let inner = self.inner.lock().unwrap();
        inner.truncated + inner.ops.len() as u64
    }
}

/// One member's handle onto its group's shared log.
pub struct LocalLogHandle {
    me: ReplicaId,
    inner: Arc<Mutex<LogInner>>,
    dead: AtomicBool,
}

impl LogEngine for LocalLogHandle {
    fn submit(&self, op: LogOp) -> (u64, u64, bool) {
        if self.dead.load(Ordering::SeqCst) {
            return (0, 0, false);
        }
        let mut inner = self.inner.lock().unwrap();

        if let Some(&believed_leader) = inner.wedged.get(&self.me) {
            if !believed_leader {
                return (0, inner.term, false);
            }
            // a partitioned leader accepts the entry into thin air; the
            // index it hands out may later be reused by a real commit
            inner.wedged_extra += 1;
            let fake = inner.truncated
                + inner.ops.len() as u64
                + inner.wedged_extra;
            return (fake, inner.term, true);
        }

        if inner.leader != self.me {
            return (0, inner.term, false);
        }

        inner.log_bytes += op.get_size();
        inner.ops.push(op.clone());
        let index = inner.truncated + inner.ops.len() as u64;
        for tx in inner.txs.values() {
            let _ = tx.send(ApplyEntry::Command {
                index,
                op: op.clone(),
            });
        }
        (index, inner.term, true)
    }

    fn get_state(&self) -> (u64, bool) {
        let inner = self.inner.lock().unwrap();
        if let Some(&believed_leader) = inner.wedged.get(&self.me) {
            return (inner.term, believed_leader);
        }
        (inner.term, inner.leader == self.me)
    }

    fn snapshot(&self, index: u64, data: Vec<u8>) {
        let mut inner = self.inner.lock().unwrap();
        if index <= inner.truncated {
            return;
        }
        let drop_count = (index - inner.truncated) as usize;
        inner.ops.drain(0..drop_count);
        inner.truncated = index;
        inner.log_bytes = inner.ops.iter().map(|op| op.get_size()).sum();
        inner.snapshot = Some((index, data));
    }

    fn log_size(&self) -> usize {
        self.inner.lock().unwrap().log_bytes
    }

    fn kill(&self) {
        self.dead.store(true, Ordering::SeqCst);
        // dropping the apply stream sender lets the applier task drain out
        self.inner.lock().unwrap().txs.remove(&self.me);
    }
}

/// In-memory shard controller: an append-only sequence of configurations.
pub struct TestCtrl {
    configs: Mutex<Vec<ShardConfig>>,
}

impl TestCtrl {
    pub fn new() -> Arc<Self> {
        Arc::new(TestCtrl {
            configs: Mutex::new(vec![ShardConfig::default()]),
        })
    }

    /// Publishes the next configuration and returns its number.
    pub fn push_config(
        &self,
        shards: [GroupId; NUM_SHARDS],
        groups: HashMap<GroupId, Vec<String>>,
    ) -> ConfigNum {
        let mut configs = self.configs.lock().unwrap();
        let num = configs.len() as ConfigNum;
        configs.push(ShardConfig {
            num,
            shards,
            groups,
        });
        num
    }

    pub fn latest_num(&self) -> ConfigNum {
        self.configs.lock().unwrap().last().unwrap().num
    }
}

#[async_trait]
impl ConfigService for TestCtrl {
    async fn query(
        &self,
        num: Option<ConfigNum>,
    ) -> Result<ShardConfig, ShardsetError> {
        let configs = self.configs.lock().unwrap();
        let config = match num {
            Some(n) if (n as usize) < configs.len() => &configs[n as usize],
            _ => configs.last().unwrap(),
        };
        Ok(config.clone())
    }
}

/// Routes RPCs to in-process replicas by roster name. Migration traffic
/// can be black-holed to model a severed inter-group link.
pub struct Router {
    servers: Mutex<HashMap<String, Arc<ShardsetReplica>>>,
    block_migration: AtomicBool,
}

impl Router {
    pub fn new() -> Arc<Self> {
        Arc::new(Router {
            servers: Mutex::new(HashMap::new()),
            block_migration: AtomicBool::new(false),
        })
    }

    pub fn register(&self, name: String, replica: Arc<ShardsetReplica>) {
        self.servers.lock().unwrap().insert(name, replica);
    }

    pub fn deregister(&self, name: &str) {
        self.servers.lock().unwrap().remove(name);
    }

    pub fn set_block_migration(&self, block: bool) {
        self.block_migration.store(block, Ordering::SeqCst);
    }

    fn lookup(
        &self,
        server: &str,
    ) -> Result<Arc<ShardsetReplica>, ShardsetError> {
        self.servers
            .lock()
            .unwrap()
            .get(server)
            .cloned()
            .ok_or_else(|| {
                ShardsetError::msg(format!("server '{}' unreachable", server))
            })
    }
}

#[async_trait]
impl ShardRpc for Router {
    async fn get(
        &self,
        server: &str,
        args: GetArgs,
    ) -> Result<GetReply, ShardsetError> {
        Ok(self.lookup(server)?.get(args).await)
    }

    async fn put_append(
        &self,
        server: &str,
        args: PutAppendArgs,
    ) -> Result<PutAppendReply, ShardsetError> {
        Ok(self.lookup(server)?.put_append(args).await)
    }

    async fn migration_in(
        &self,
        server: &str,
        args: MigrationArgs,
    ) -> Result<MigrationReply, ShardsetError> {
        if self.block_migration.load(Ordering::SeqCst) {
            return Err(ShardsetError::msg("migration link down"));
        }
        Ok(self.lookup(server)?.migration_in(args).await)
    }
}

/// One replica group under test.
pub struct TestGroup {
    pub gid: GroupId,
    pub log: LocalLogGroup,
    pub replicas: Vec<Option<Arc<ShardsetReplica>>>,
}

/// A whole cluster of groups wired through one controller and router.
pub struct TestCluster {
    pub ctrl: Arc<TestCtrl>,
    pub router: Arc<Router>,
    pub groups: HashMap<GroupId, TestGroup>,
    config_str: Option<String>,
}

impl TestCluster {
    /// Spins up `n_replicas` servers for each listed group. Replica 0 of
    /// each group starts as its leader.
    pub fn new(
        gids: &[GroupId],
        n_replicas: usize,
        config_str: Option<&str>,
    ) -> Result<Self, ShardsetError> {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut cluster = TestCluster {
            ctrl: TestCtrl::new(),
            router: Router::new(),
            groups: HashMap::new(),
            config_str: config_str.map(str::to_string),
        };
        for &gid in gids {
            cluster.groups.insert(
                gid,
                TestGroup {
                    gid,
                    log: LocalLogGroup::new(0),
                    replicas: (0..n_replicas).map(|_| None).collect(),
                },
            );
            for me in 0..n_replicas {
                cluster.start_replica(gid, me as ReplicaId)?;
            }
        }
        Ok(cluster)
    }

    pub fn server_name(gid: GroupId, me: ReplicaId) -> String {
        format!("s{}-{}", gid, me)
    }

    /// Roster of every group in this cluster, for `push_config`.
    pub fn rosters(&self) -> HashMap<GroupId, Vec<String>> {
        self.groups
            .iter()
            .map(|(&gid, group)| {
                let roster = (0..group.replicas.len())
                    .map(|me| Self::server_name(gid, me as ReplicaId))
                    .collect();
                (gid, roster)
            })
            .collect()
    }

    /// Starts (or restarts) one replica of a group and registers it with
    /// the router.
    pub fn start_replica(
        &mut self,
        gid: GroupId,
        me: ReplicaId,
    ) -> Result<(), ShardsetError> {
        let (engine, apply_rx) = self.groups[&gid].log.attach(me);
        let replica = ShardsetReplica::new_and_setup(
            gid,
            me,
            engine,
            apply_rx,
            Arc::clone(&self.ctrl) as Arc<dyn ConfigService>,
            Arc::clone(&self.router) as Arc<dyn ShardRpc>,
            self.config_str.as_deref(),
        )?;
        self.router
            .register(Self::server_name(gid, me), Arc::clone(&replica));
        self.groups.get_mut(&gid).unwrap().replicas[me as usize] =
            Some(replica);
        Ok(())
    }

    /// Kills one replica and makes it unreachable, as if the process died.
    pub fn kill_replica(&mut self, gid: GroupId, me: ReplicaId) {
        let group = self.groups.get_mut(&gid).unwrap();
        if let Some(replica) = group.replicas[me as usize].take() {
            replica.kill();
        }
        self.router.deregister(&Self::server_name(gid, me));
    }

    pub fn replica(&self, gid: GroupId, me: ReplicaId) -> Arc<ShardsetReplica> {
        Arc::clone(
            self.groups[&gid].replicas[me as usize]
                .as_ref()
                .expect("replica not running"),
        )
    }

    /// Current leader replica of a group.
    pub fn leader_of(&self, gid: GroupId) -> Arc<ShardsetReplica> {
        self.replica(gid, self.groups[&gid].log.leader())
    }

    pub fn clerk(&self) -> ShardClerk {
        ShardClerk::new(
            Arc::clone(&self.ctrl) as Arc<dyn ConfigService>,
            Arc::clone(&self.router) as Arc<dyn ShardRpc>,
        )
    }
}
