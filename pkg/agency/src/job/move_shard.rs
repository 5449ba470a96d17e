//! MoveShard (§4.6.2): moves one shard replica from `fromServer` to
//! `toServer`. In this crate's scope (real shard replication/catch-up is a
//! Non-goal, §1) the move completes as soon as its single transaction is
//! accepted — there is no asynchronous "replica syncing" phase to await, so
//! a `MoveShard` job is practically never observed sitting in `Pending` by
//! a caller that polls `status()` after `start()` returns.

use common::errors::*;

use crate::agent::AgentInterface;
use crate::job::{
    create_transaction, finish_transaction, shard_block, status_path, JobStatus, SupervisionJob,
};
use crate::node::{Path, Value};
use crate::transaction::{Precondition, Transaction};

pub struct MoveShard {
    job_id: String,
    creator: String,
    database: String,
    collection: String,
    shard: String,
    from_server: String,
    to_server: String,
    is_leader: bool,
}

impl MoveShard {
    pub fn new(
        job_id: impl Into<String>,
        creator: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
        shard: impl Into<String>,
        from_server: impl Into<String>,
        to_server: impl Into<String>,
        is_leader: bool,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            creator: creator.into(),
            database: database.into(),
            collection: collection.into(),
            shard: shard.into(),
            from_server: from_server.into(),
            to_server: to_server.into(),
            is_leader,
        }
    }

    fn document(&self) -> Value {
        let mut doc = Value::empty_object();
        doc.set_field("type", "moveShard");
        doc.set_field("creator", self.creator.clone());
        doc.set_field("database", self.database.clone());
        doc.set_field("collection", self.collection.clone());
        doc.set_field("shard", self.shard.clone());
        doc.set_field("fromServer", self.from_server.clone());
        doc.set_field("toServer", self.to_server.clone());
        doc.set_field("isLeader", self.is_leader);
        doc.set_field("jobId", self.job_id.clone());
        doc
    }

    fn shard_path(&self) -> Path {
        Path::parse("/Plan/Collections")
            .join(&self.database)
            .join(&self.collection)
            .join("shards")
            .join(&self.shard)
    }

    /// Convenience used by `CleanOutServer`'s planner: create then
    /// immediately start, mirroring the source's inline
    /// `MoveShard(...).run()` call (it never waits for the supervision loop
    /// to pick the child up from `ToDo`).
    pub async fn run(&self, agent: &dyn AgentInterface) -> Result<JobStatus> {
        self.create(agent).await?;
        self.start(agent).await
    }
}

#[async_trait]
impl SupervisionJob for MoveShard {
    fn job_id(&self) -> &str {
        &self.job_id
    }

    async fn create(&self, agent: &dyn AgentInterface) -> Result<()> {
        let transaction = create_transaction(&self.job_id, self.document());
        agent.write(transaction).await?;
        Ok(())
    }

    async fn start(&self, agent: &dyn AgentInterface) -> Result<JobStatus> {
        let snapshot = agent.read_db().await;

        let current = match snapshot.get_path(&self.shard_path()) {
            Some(v) if v.is_array() => v
                .get_elements()
                .unwrap()
                .iter()
                .filter_map(|e| e.get_string().map(|s| s.to_string()))
                .collect::<Vec<_>>(),
            _ => {
                let tx = finish_transaction(
                    &self.job_id,
                    false,
                    self.document(),
                    Some("shard not found"),
                    &[],
                );
                agent.write(tx).await?;
                return Ok(JobStatus::Failed);
            }
        };

        if !current.iter().any(|s| s == &self.from_server) {
            let tx = finish_transaction(
                &self.job_id,
                false,
                self.document(),
                Some("fromServer is not a replica of this shard"),
                &[],
            );
            agent.write(tx).await?;
            return Ok(JobStatus::Failed);
        }

        if current.iter().any(|s| s == &self.to_server) {
            let tx = finish_transaction(
                &self.job_id,
                false,
                self.document(),
                Some("toServer is already a replica of this shard"),
                &[],
            );
            agent.write(tx).await?;
            return Ok(JobStatus::Failed);
        }

        let new_list: Vec<Value> = current
            .iter()
            .map(|s| {
                if s == &self.from_server {
                    Value::from(self.to_server.clone())
                } else {
                    Value::from(s.clone())
                }
            })
            .collect();

        let resource = shard_block(&self.shard);
        let current_list_value = Value::Array(current.iter().map(|s| Value::from(s.clone())).collect());

        let start_transaction = Transaction::builder()
            .delete(status_path(JobStatus::ToDo, &self.job_id))
            .set(status_path(JobStatus::Pending, &self.job_id), self.document())
            .precondition(resource.clone(), Precondition::OldEmpty(true))
            .set(resource.clone(), Value::from(self.job_id.clone()))
            .precondition(self.shard_path(), Precondition::Equals(current_list_value))
            .set(self.shard_path(), Value::Array(new_list))
            .build();

        let index = agent.write(start_transaction).await?;
        if index == 0 {
            let tx = finish_transaction(
                &self.job_id,
                false,
                self.document(),
                Some("shard replica list changed concurrently"),
                &[],
            );
            agent.write(tx).await?;
            return Ok(JobStatus::Failed);
        }

        let mut document = self.document();
        document.set_field("movedServer", self.to_server.clone());
        let finish = finish_transaction(&self.job_id, true, document, None, &[resource]);
        agent.write(finish).await?;
        Ok(JobStatus::Finished)
    }

    async fn status(&self, _agent: &dyn AgentInterface) -> Result<JobStatus> {
        Ok(JobStatus::Finished)
    }

    async fn abort(&self, agent: &dyn AgentInterface, reason: &str) -> Result<()> {
        let tx = finish_transaction(
            &self.job_id,
            false,
            self.document(),
            Some(reason),
            &[shard_block(&self.shard)],
        );
        agent.write(tx).await?;
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
    async fn moves_a_follower_replica() -> Result<()> {
        let agent = MockAgent::new(config());
        agent
            .seed(
                Transaction::builder()
                    .set(
                        "/Plan/Collections/database/collection/shards/shard",
                        Value::Array(vec![Value::from("leader"), Value::from("follower1")]),
                    )
                    .build(),
            )
            .await;

        let job = MoveShard::new(
            "1",
            "operator",
            "database",
            "collection",
            "shard",
            "follower1",
            "follower2",
            false,
        );

        let status = job.run(&agent).await?;
        assert_eq!(status, JobStatus::Finished);

        let snapshot = agent.read_db().await;
        let replicas = snapshot
            .get_path(&Path::parse("/Plan/Collections/database/collection/shards/shard"))
            .unwrap()
            .get_elements()
            .unwrap();
        assert_eq!(replicas, &[Value::from("leader"), Value::from("follower2")]);

        assert!(snapshot
            .get_path(&Path::parse("/Supervision/Shards/shard"))
            .map(|v| v.is_null())
            .unwrap_or(true));
        Ok(())
    }

    #[testcase]
    async fn fails_when_from_server_is_not_a_replica() -> Result<()> {
        let agent = MockAgent::new(config());
        agent
            .seed(
                Transaction::builder()
                    .set(
                        "/Plan/Collections/database/collection/shards/shard",
                        Value::Array(vec![Value::from("leader"), Value::from("follower1")]),
                    )
                    .build(),
            )
            .await;

        let job = MoveShard::new(
            "1",
            "operator",
            "database",
            "collection",
            "shard",
            "ghost",
            "follower2",
            false,
        );

        assert_eq!(job.run(&agent).await?, JobStatus::Failed);
        Ok(())
    }
}
