//! The supervision loop (§4.5a, ADDED — supplemented from original_source):
//! a long-lived background task that drives the job framework while the
//! local Constituent reports LEADER. Modeled on
//! `pkg/datastore/src/meta/store.rs`'s background-task-plus-stop-flag
//! wiring, with the early-wakeup signal grounded on `watchers.rs`'s
//! channel-per-registration pattern (collapsed here to a single
//! bounded(1) channel, since there is only ever one waiter: this loop).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use common::async_std::channel;
use common::errors::*;

use crate::agent::AgentInterface;
use crate::constituent::{Constituent, ReplicatedLog, Role, VoteTransport};
use crate::job::{AddFollower, CleanOutServer, FailedLeader, Job, MoveShard, SupervisionJob};
use crate::node::{Path, Value};

fn string_field(doc: &Value, name: &str) -> Result<String> {
    doc.get_field(name)
        .and_then(|v| v.get_string())
        .map(|s| s.to_string())
        .ok_or_else(|| format_err!("job document missing field '{}'", name))
}

/// Rebuilds the typed `Job` a `ToDo`/`Pending` document represents, per
/// §4.5's "resuming a job from the replicated state" constructor usage.
fn job_from_document(job_id: &str, doc: &Value) -> Result<Job> {
    let kind = string_field(doc, "type")?;
    let creator = string_field(doc, "creator")?;

    match kind.as_str() {
        "cleanOutServer" => {
            let server = string_field(doc, "server")?;
            Ok(Job::CleanOutServer(CleanOutServer::new(
                job_id,
                creator,
                server,
                Box::new(crypto::random::clocked_rng()),
            )))
        }
        "moveShard" => {
            let database = string_field(doc, "database")?;
            let collection = string_field(doc, "collection")?;
            let shard = string_field(doc, "shard")?;
            let from_server = string_field(doc, "fromServer")?;
            let to_server = string_field(doc, "toServer")?;
            let is_leader = doc
                .get_field("isLeader")
                .and_then(|v| v.get_bool())
                .unwrap_or(false);
            Ok(Job::MoveShard(MoveShard::new(
                job_id,
                creator,
                database,
                collection,
                shard,
                from_server,
                to_server,
                is_leader,
            )))
        }
        "addFollower" => {
            let database = string_field(doc, "database")?;
            let collection = string_field(doc, "collection")?;
            let shard = string_field(doc, "shard")?;
            Ok(Job::AddFollower(AddFollower::new(
                job_id, creator, database, collection, shard,
            )))
        }
        "failedLeader" => {
            let database = string_field(doc, "database")?;
            let collection = string_field(doc, "collection")?;
            let shard = string_field(doc, "shard")?;
            let server = string_field(doc, "server")?;
            Ok(Job::FailedLeader(FailedLeader::new(
                job_id, creator, database, collection, shard, server,
            )))
        }
        other => Err(format_err!("unknown job type '{}'", other)),
    }
}

/// Drives `Target/ToDo`/`Target/Pending` against the job framework. Only
/// ever run on the current leader; `SupervisionLoop::wake()` is the hook
/// the Constituent calls (via `AgentInterface::lead()`) on a transition to
/// LEADER so the first tick doesn't wait out a full poll interval.
pub struct SupervisionLoop {
    poll_interval: Duration,
    stop: AtomicBool,
    wake_sender: channel::Sender<()>,
    wake_receiver: channel::Receiver<()>,
}

impl SupervisionLoop {
    pub fn new(poll_interval: Duration) -> Self {
        let (wake_sender, wake_receiver) = channel::bounded(1);
        Self {
            poll_interval,
            stop: AtomicBool::new(false),
            wake_sender,
            wake_receiver,
        }
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.wake();
    }

    fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Requests an early tick; coalesces naturally since the channel has
    /// capacity 1 (an already-pending wakeup makes a second one a no-op).
    pub fn wake(&self) {
        let _ = self.wake_sender.try_send(());
    }

    async fn sleep_until_woken_or_timeout(&self) {
        let _ = common::async_std::future::timeout(self.poll_interval, self.wake_receiver.recv()).await;
    }

    /// Runs until `stop()` is called. Sleeps (woken early by `wake()`)
    /// whenever the local node is not LEADER, instead of busy-polling role.
    pub async fn run<L: ReplicatedLog, V: VoteTransport>(
        &self,
        agent: &dyn AgentInterface,
        constituent: &Constituent<L, V>,
    ) -> Result<()> {
        while !self.is_stopped() {
            if constituent.role().await != Role::Leader {
                self.sleep_until_woken_or_timeout().await;
                continue;
            }

            if let Err(e) = self.tick(agent).await {
                eprintln!("supervision: tick failed: {}", e);
            }

            self.sleep_until_woken_or_timeout().await;
        }

        Ok(())
    }

    async fn tick(&self, agent: &dyn AgentInterface) -> Result<()> {
        let todo: Vec<(String, Value)> = {
            let snapshot = agent.read_db().await;
            match snapshot.get_path(&Path::parse("/Target/ToDo")).and_then(|v| v.object_fields()) {
                Some(fields) => fields
                    .filter(|(id, _)| !id.contains('-'))
                    .map(|(id, doc)| (id.to_string(), doc.clone()))
                    .collect(),
                None => vec![],
            }
        };

        for (id, doc) in todo {
            match job_from_document(&id, &doc) {
                Ok(job) => {
                    if let Err(e) = job.start(agent).await {
                        eprintln!("supervision: job {} failed to start: {}", id, e);
                    }
                }
                Err(e) => eprintln!("supervision: cannot parse ToDo job {}: {}", id, e),
            }
        }

        let pending: Vec<(String, Value)> = {
            let snapshot = agent.read_db().await;
            match snapshot
                .get_path(&Path::parse("/Target/Pending"))
                .and_then(|v| v.object_fields())
            {
                Some(fields) => fields
                    .filter(|(id, _)| !id.contains('-'))
                    .map(|(id, doc)| (id.to_string(), doc.clone()))
                    .collect(),
                None => vec![],
            }
        };

        for (id, doc) in pending {
            match job_from_document(&id, &doc) {
                Ok(job) => {
                    if let Err(e) = job.status(agent).await {
                        eprintln!("supervision: job {} failed to poll: {}", id, e);
                    }
                }
                Err(e) => eprintln!("supervision: cannot parse Pending job {}: {}", id, e),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::mock::MockAgent;
    use crate::agent::AgentConfig;

    fn config() -> AgentConfig {
        AgentConfig {
            id: "A".to_string(),
            size: 1,
            active: vec!["A".to_string()],
            pool: vec![],
            min_ping_ms: 150,
            max_ping_ms: 300,
            wait_for_sync: false,
        }
    }

    #[testcase]
    async fn tick_starts_todo_jobs_and_reaches_a_terminal_status() -> Result<()> {
        let agent = MockAgent::new(config());

        let job = AddFollower::new("1", "operator", "database", "collection", "shard");
        job.create(&agent).await?;

        let loop_ = SupervisionLoop::new(Duration::from_millis(1000));
        loop_.tick(&agent).await?;

        let snapshot = agent.read_db().await;
        assert!(snapshot
            .get_path(&crate::job::status_path(crate::job::JobStatus::Finished, "1"))
            .is_some());
        Ok(())
    }

    #[testcase]
    async fn wake_coalesces_without_blocking() -> Result<()> {
        let loop_ = SupervisionLoop::new(Duration::from_millis(1000));
        loop_.wake();
        loop_.wake();
        loop_.sleep_until_woken_or_timeout().await;
        Ok(())
    }
}
