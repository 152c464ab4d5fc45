//! Shardset replica -- applier task, the single consumer of the engine's
//! ordered apply stream.

use super::*;

// ShardsetReplica applier task
impl ShardsetReplica {
    /// Applier task function. Processes one entry at a time, which
    /// serializes every state update and keeps snapshots coherent.
    pub(crate) async fn run_applier(
        self: Arc<Self>,
        mut apply_rx: mpsc::UnboundedReceiver<ApplyEntry>,
    ) {
        pf_debug!(self.gid, self.me; "applier task spawned");

        while let Some(entry) = apply_rx.recv().await {
            if self.killed() {
                break;
            }

            match entry {
                ApplyEntry::Command { index, op } => {
                    pf_trace!(self.gid, self.me;
                              "applying command at index {}", index);
                    let effect = {
                        let mut state = self.guard();
                        state.ingest_command(self.gid, index, op)
                    };

                    match effect {
                        ApplyEffect::TriggerMigration => {
                            // re-arm the driver through the log; the engine
                            // refuses this on non-leaders
                            self.engine.submit(LogOp::migration_out(self.gid));
                        }
                        ApplyEffect::WakeMigration => {
                            self.migrate_wake.notify_one();
                        }
                        ApplyEffect::None => {}
                    }

                    self.maybe_snapshot(index);
                }

                ApplyEntry::Snapshot { index, data } => {
                    let mut state = self.guard();
                    if index > state.last_applied {
                        pf_debug!(self.gid, self.me;
                                  "installing snapshot at index {} over lastApplied {}",
                                  index, state.last_applied);
                        state.ingest_snapshot(&data);
                        state.last_applied = index;
                    }
                }
            }
        }

        pf_debug!(self.gid, self.me; "applier task exited");
    }

    /// Every `snap_check_interval` applied entries, hand the engine an
    /// encoded snapshot for log truncation if its retained state has
    /// outgrown the configured cap.
    fn maybe_snapshot(&self, index: u64) {
        if self.config.log_cap_bytes == 0
            || index % self.config.snap_check_interval != 0
        {
            return;
        }
        if self.engine.log_size() <= self.config.log_cap_bytes {
            return;
        }

        let data = self.guard().encode_snapshot();
        pf_debug!(self.gid, self.me;
                  "snapshotting at index {} ({} bytes)", index, data.len());
        self.engine.snapshot(index, data);
    }
}
