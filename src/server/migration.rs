//! Shardset replica -- migration driver task, shipping outgoing shards to
//! their new owner group.

use super::*;

// ShardsetReplica migration driver task
impl ShardsetReplica {
    /// Migration driver task function. Blocks on its wake signal; on every
    /// wake, the leader groups halted outbound shards by destination and
    /// launches one best-effort shipment per destination group.
    pub(crate) async fn run_migration_driver(self: Arc<Self>) {
        pf_debug!(self.gid, self.me; "migration driver task spawned");

        while !self.killed() {
            self.migrate_wake.notified().await;
            if self.killed() {
                break;
            }
            if !self.is_leader() {
                continue; // only leaders ship shards
            }

            let (num, by_dest) = {
                let state = self.guard();
                let mut by_dest: HashMap<GroupId, Vec<ShardId>> =
                    HashMap::new();
                for (sid, shard) in state.shards.iter().enumerate() {
                    if shard.status == ShardStatus::MigratingOut {
                        // the current configuration is the new one, so its
                        // assignment is the destination
                        by_dest
                            .entry(state.cur_config.shards[sid])
                            .or_default()
                            .push(sid);
                    }
                }
                (state.cur_config.num, by_dest)
            };

            for (dest, sids) in by_dest {
                tokio::spawn(
                    Arc::clone(&self).ship_shards(dest, sids, num),
                );
            }
        }

        pf_debug!(self.gid, self.me; "migration driver task exited");
    }

    /// Ships the listed shards to one destination group, walking its
    /// server roster round-robin. Local statuses flip to `Ok` only once
    /// the destination has durably accepted the transfer (`Ok`) or moved
    /// past it (`OutdatedConfig`); after that the source may forget the
    /// shards. If every server refuses or is unreachable, the poller's
    /// next tick re-arms the driver and the shipment is retried.
    async fn ship_shards(
        self: Arc<Self>,
        dest: GroupId,
        sids: Vec<ShardId>,
        num: ConfigNum,
    ) {
        let (data, servers) = {
            let state = self.guard();
            let mut data = vec![HashMap::new(); NUM_SHARDS];
            for &sid in &sids {
                data[sid] = state.shards[sid].data.clone();
            }
            let servers = state
                .cur_config
                .groups
                .get(&dest)
                .cloned()
                .unwrap_or_default();
            (data, servers)
        };

        let args = MigrationArgs {
            num,
            sids: sids.clone(),
            data,
            client_id: self.gid,
            serial: num,
        };
        pf_debug!(self.gid, self.me;
                  "shipping shards {:?} to group {} for config {}",
                  sids, dest, num);

        for server in &servers {
            match self.rpc.migration_in(server, args.clone()).await {
                Ok(reply)
                    if reply.err == ErrCode::Ok
                        || reply.err == ErrCode::OutdatedConfig =>
                {
                    let mut state = self.guard();
                    for &sid in &sids {
                        state.shards[sid].status = ShardStatus::Ok;
                    }
                    pf_info!(self.gid, self.me;
                             "handed off shards {:?} to group {}",
                             sids, dest);
                    return;
                }
                Ok(reply) => {
                    pf_trace!(self.gid, self.me;
                              "migration to '{}' refused: {:?}",
                              server, reply.err);
                }
                Err(e) => {
                    pf_trace!(self.gid, self.me;
                              "migration rpc to '{}' failed: {}", server, e);
                }
            }
        }
    }
}
