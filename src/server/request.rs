//! Shardset replica -- client & inter-group request entrance.

use super::*;

// ShardsetReplica request entrance
impl ShardsetReplica {
    /// Handler of client Get RPC.
    pub async fn get(&self, args: GetArgs) -> GetReply {
        let op = LogOp {
            client_id: args.client_id,
            serial: args.serial,
            payload: OpPayload::Client(ClientOp::Get {
                key: args.key,
                shard: args.shard,
            }),
        };
        let result = self.submit_and_wait(op).await;

        // accept the rendezvous result only if it is for this request;
        // otherwise the log index got reused across a leadership change
        if result.client_id == args.client_id && result.serial == args.serial
        {
            GetReply {
                value: result.value,
                err: result.err,
            }
        } else {
            GetReply {
                value: String::new(),
                err: ErrCode::WrongLeader,
            }
        }
    }

    /// Handler of client PutAppend RPC.
    pub async fn put_append(&self, args: PutAppendArgs) -> PutAppendReply {
        let cmd = match args.kind {
            UpdateKind::Put => ClientOp::Put {
                key: args.key,
                value: args.value,
                shard: args.shard,
            },
            UpdateKind::Append => ClientOp::Append {
                key: args.key,
                value: args.value,
                shard: args.shard,
            },
        };
        let op = LogOp {
            client_id: args.client_id,
            serial: args.serial,
            payload: OpPayload::Client(cmd),
        };
        let result = self.submit_and_wait(op).await;

        if result.client_id == args.client_id && result.serial == args.serial
        {
            PutAppendReply { err: result.err }
        } else {
            PutAppendReply {
                err: ErrCode::WrongLeader,
            }
        }
    }

    /// Handler of inter-group MigrationIn RPC. Shipments for a past
    /// configuration were already installed here (or superseded); shipments
    /// for a future one mean this group lags and must poll first.
    pub async fn migration_in(&self, args: MigrationArgs) -> MigrationReply {
        {
            let state = self.guard();
            if args.num < state.cur_config.num {
                return MigrationReply {
                    err: ErrCode::OutdatedConfig,
                };
            }
            if args.num > state.cur_config.num {
                self.poll_wake.notify_one();
                return MigrationReply {
                    err: ErrCode::UpdatingConfig,
                };
            }
        }

        let op = LogOp {
            client_id: args.client_id,
            serial: args.serial,
            payload: OpPayload::MigrationIn {
                sids: args.sids,
                data: args.data,
            },
        };
        pf_debug!(self.gid, self.me;
                  "taking in migration for config {}", args.num);
        let result = self.submit_and_wait(op).await;

        if result.client_id == args.client_id && result.serial == args.serial
        {
            MigrationReply { err: result.err }
        } else {
            MigrationReply {
                err: ErrCode::WrongLeader,
            }
        }
    }

    /// Common routine underneath all request handlers: duplicate fast-path,
    /// shard admission check, submit to the log, then rendezvous with the
    /// applier at the returned index (or time out).
    pub(crate) async fn submit_and_wait(&self, op: LogOp) -> OpResult {
        let mut result = OpResult {
            client_id: op.client_id,
            serial: op.serial,
            value: String::new(),
            err: ErrCode::Ok,
        };

        let rx = {
            let mut state = self.guard();

            // an exact-serial replay is answerable locally even on a
            // follower: the recorded result reflects a committed entry
            if let Some(entry) = state.dup_table.get(&op.client_id) {
                if entry.serial == op.serial {
                    result.value = entry.value.clone();
                    result.err = entry.err;
                    return result;
                }
            }

            // client commands are admitted only for shards this group owns
            // and currently serves
            if let OpPayload::Client(ref cmd) = op.payload {
                let sid = cmd.shard();
                if state.cur_config.shards[sid] != self.gid
                    || state.shards[sid].status != ShardStatus::Ok
                {
                    result.err = ErrCode::WrongGroup;
                    return result;
                }
            }

            let (index, _term, is_leader) = self.engine.submit(op);
            if !is_leader {
                result.err = ErrCode::WrongLeader;
                return result;
            }
            pf_trace!(self.gid, self.me;
                      "submitted op of client {} serial {} at index {}",
                      result.client_id, result.serial, index);

            // register the one-shot rendezvous before releasing the lock,
            // so the applier cannot race past this index unseen
            let (tx, rx) = oneshot::channel();
            state.reply_chans.insert(index, tx);
            rx
        };

        match time::timeout(
            Duration::from_millis(self.config.resp_timeout_ms),
            rx,
        )
        .await
        {
            Ok(Ok(delivered)) => delivered,
            _ => {
                // no reply in time (or the registration was displaced):
                // leadership may have lapsed, let the caller try elsewhere
                result.err = ErrCode::WrongLeader;
                result
            }
        }
    }
}
