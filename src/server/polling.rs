//! Shardset replica -- configuration polling task.

use super::*;

// ShardsetReplica config poller task
impl ShardsetReplica {
    /// Config poller task function. Ticks periodically (or on explicit
    /// wake-up) and drives reconfiguration one configuration at a time, in
    /// order.
    pub(crate) async fn run_config_poller(self: Arc<Self>) {
        pf_debug!(self.gid, self.me; "config poller task spawned");

        let mut interval = time::interval(Duration::from_millis(
            self.config.poll_interval_ms,
        ));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.killed() {
            tokio::select! {
                _ = interval.tick() => {},
                () = self.poll_wake.notified() => {},
            }
            if self.killed() {
                break;
            }

            if let Err(e) = self.poll_config_once().await {
                pf_warn!(self.gid, self.me; "config poll failed: {}", e);
            }
        }

        pf_debug!(self.gid, self.me; "config poller task exited");
    }

    /// One polling round. Pending outbound migrations take precedence over
    /// new configurations: re-proposing the trigger entry here is what
    /// makes migration wake-ups crash-tolerant, since a new leader
    /// inheriting halted shards re-drives them from this tick.
    async fn poll_config_once(&self) -> Result<(), ShardsetError> {
        let next_num = {
            let state = self.guard();
            if state.needs_migration_out() {
                self.engine.submit(LogOp::migration_out(self.gid));
                return Ok(());
            }
            state.cur_config.num + 1
        };

        // lock released across the controller query
        let new_config = self.ctrl.query(Some(next_num)).await?;

        let state = self.guard();
        if new_config.num != next_num {
            return Ok(()); // no newer configuration published yet
        }
        if state.cur_config.num + 1 != next_num || !state.all_shards_ok() {
            // either a reconfiguration landed while the query was in
            // flight, or one is still migrating; retry on a later tick
            return Ok(());
        }

        if self.is_leader() {
            pf_info!(self.gid, self.me;
                     "proposing config {}", new_config.num);
            self.engine.submit(LogOp::reconfig(self.gid, new_config));
        }
        Ok(())
    }
}
