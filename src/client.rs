//! Shardset client clerk: shard-aware request routing with retries.

use std::collections::HashMap;
use std::sync::Arc;

use crate::api::{
    ClientId, ErrCode, GetArgs, PutAppendArgs, SerialNum, ShardRpc,
    UpdateKind,
};
use crate::ctrl::{key_to_shard, ConfigService, GroupId, ShardConfig};
use crate::utils::ShardsetError;

use tokio::time::{self, Duration};

/// Pause between clerk passes when no server of the owning group answered.
const RETRY_INTERVAL_MS: u64 = 100;

/// Client-side clerk. Maps each key to its shard, routes the request to
/// the group owning that shard in the latest configuration it has seen,
/// and retries until some server answers. Serial numbers increase by one
/// per operation (never per retry), which is what lets servers deduplicate
/// resubmitted requests.
pub struct ShardClerk {
    /// Random client ID, used by servers for duplicate detection.
    id: ClientId,

    /// Serial number of the in-flight (or last) operation.
    serial: SerialNum,

    /// Shard controller query stub.
    ctrl: Arc<dyn ConfigService>,

    /// Transport for reaching group servers.
    rpc: Arc<dyn ShardRpc>,

    /// Latest configuration this clerk has observed.
    config: ShardConfig,

    /// Per-group index of the last server that answered as leader.
    last_leader: HashMap<GroupId, usize>,
}

impl ShardClerk {
    /// Creates a new clerk with a fresh random client ID.
    pub fn new(
        ctrl: Arc<dyn ConfigService>,
        rpc: Arc<dyn ShardRpc>,
    ) -> Self {
        ShardClerk {
            id: rand::random(),
            serial: 0,
            ctrl,
            rpc,
            config: ShardConfig::default(),
            last_leader: HashMap::new(),
        }
    }

    /// Fetches the current value for a key; `None` if the key is absent.
    /// Keeps trying in the face of wrong-group and wrong-leader answers.
    pub async fn get(
        &mut self,
        key: &str,
    ) -> Result<Option<String>, ShardsetError> {
        self.serial += 1;
        let shard = key_to_shard(key);

        loop {
            let gid = self.config.shards[shard];
            if gid != 0 {
                if let Some(servers) = self.config.groups.get(&gid).cloned()
                {
                    let first =
                        self.last_leader.get(&gid).copied().unwrap_or(0);
                    for i in 0..servers.len() {
                        let si = (first + i) % servers.len();
                        let args = GetArgs {
                            key: key.to_string(),
                            shard,
                            client_id: self.id,
                            serial: self.serial,
                        };
                        match self.rpc.get(&servers[si], args).await {
                            Ok(reply) => match reply.err {
                                ErrCode::Ok => {
                                    self.last_leader.insert(gid, si);
                                    return Ok(Some(reply.value));
                                }
                                ErrCode::NoKey => {
                                    self.last_leader.insert(gid, si);
                                    return Ok(None);
                                }
                                ErrCode::WrongGroup => break,
                                _ => {} // wrong leader; try next server
                            },
                            Err(_) => {} // unreachable; try next server
                        }
                    }
                }
            }

            // nobody in the owning group could serve; refresh the
            // configuration and walk again
            time::sleep(Duration::from_millis(RETRY_INTERVAL_MS)).await;
            self.config = self.ctrl.query(None).await?;
        }
    }

    /// Overwrites the value of a key.
    pub async fn put(
        &mut self,
        key: &str,
        value: &str,
    ) -> Result<(), ShardsetError> {
        self.put_append(key, value, UpdateKind::Put).await
    }

    /// Concatenates onto the value of a key (absent key reads as empty).
    pub async fn append(
        &mut self,
        key: &str,
        value: &str,
    ) -> Result<(), ShardsetError> {
        self.put_append(key, value, UpdateKind::Append).await
    }

    /// Shared by Put and Append.
    async fn put_append(
        &mut self,
        key: &str,
        value: &str,
        kind: UpdateKind,
    ) -> Result<(), ShardsetError> {
        self.serial += 1;
        let shard = key_to_shard(key);

        loop {
            let gid = self.config.shards[shard];
            if gid != 0 {
                if let Some(servers) = self.config.groups.get(&gid).cloned()
                {
                    let first =
                        self.last_leader.get(&gid).copied().unwrap_or(0);
                    for i in 0..servers.len() {
                        let si = (first + i) % servers.len();
                        let args = PutAppendArgs {
                            key: key.to_string(),
                            value: value.to_string(),
                            kind,
                            shard,
                            client_id: self.id,
                            serial: self.serial,
                        };
                        match self.rpc.put_append(&servers[si], args).await {
                            Ok(reply) => match reply.err {
                                ErrCode::Ok => {
                                    self.last_leader.insert(gid, si);
                                    return Ok(());
                                }
                                ErrCode::WrongGroup => break,
                                _ => {} // wrong leader; try next server
                            },
                            Err(_) => {} // unreachable; try next server
                        }
                    }
                }
            }

            time::sleep(Duration::from_millis(RETRY_INTERVAL_MS)).await;
            self.config = self.ctrl.query(None).await?;
        }
    }

    /// Client ID of this clerk.
    pub fn id(&self) -> ClientId {
        self.id
    }
}
