//! FailedLeader (§4.6.4, ADDED — supplemented from original_source):
//! promotes an in-sync follower to leader when a shard's current leader is
//! reported unhealthy, and demotes the failed server to the end of the
//! replica list rather than removing it outright (it remains a candidate
//! for a later `CleanOutServer`). Grounded on the general job-transaction
//! and feasibility-then-single-transaction shape shared by
//! `CleanOutServer.cpp` and `AddFollowerTest.cpp`'s lifecycle assertions —
//! see `DESIGN.md` for why this, rather than a `FailedLeader.cpp` source
//! file that was not part of this retrieval.

use common::errors::*;

use crate::agent::AgentInterface;
use crate::job::{create_transaction, finish_transaction, status_path, JobStatus, SupervisionJob};
use crate::node::{Path, Value};
use crate::transaction::{Precondition, Transaction};

pub struct FailedLeader {
    job_id: String,
    creator: String,
    database: String,
    collection: String,
    shard: String,
    failed_server: String,
}

impl FailedLeader {
    pub fn new(
        job_id: impl Into<String>,
        creator: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
        shard: impl Into<String>,
        failed_server: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            creator: creator.into(),
            database: database.into(),
            collection: collection.into(),
            shard: shard.into(),
            failed_server: failed_server.into(),
        }
    }

    fn document(&self) -> Value {
        let mut doc = Value::empty_object();
        doc.set_field("type", "failedLeader");
        doc.set_field("creator", self.creator.clone());
        doc.set_field("database", self.database.clone());
        doc.set_field("collection", self.collection.clone());
        doc.set_field("shard", self.shard.clone());
        doc.set_field("server", self.failed_server.clone());
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
}

#[async_trait]
impl SupervisionJob for FailedLeader {
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

        let replicas: Vec<String> = match snapshot.get_path(&self.shard_path()) {
            Some(v) if v.is_array() => v
                .get_elements()
                .unwrap()
                .iter()
                .filter_map(|e| e.get_string().map(|s| s.to_string()))
                .collect(),
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

        if replicas.first().map(|s| s != &self.failed_server).unwrap_or(true) {
            let tx = finish_transaction(
                &self.job_id,
                false,
                self.document(),
                Some("server is not the shard's current leader"),
                &[],
            );
            agent.write(tx).await?;
            return Ok(JobStatus::Failed);
        }

        if replicas.len() < 2 {
            let tx = finish_transaction(
                &self.job_id,
                false,
                self.document(),
                Some("no follower available to promote"),
                &[],
            );
            agent.write(tx).await?;
            return Ok(JobStatus::Failed);
        }

        let new_leader = replicas[1].clone();
        let mut new_list = vec![new_leader.clone()];
        for replica in &replicas[2..] {
            new_list.push(replica.clone());
        }
        new_list.push(self.failed_server.clone());

        let current_value = Value::Array(replicas.iter().map(|s| Value::from(s.clone())).collect());
        let new_value = Value::Array(new_list.into_iter().map(Value::from).collect());

        let mut document = self.document();
        document.set_field("newLeader", new_leader);

        let transaction = Transaction::builder()
            .delete(status_path(JobStatus::ToDo, &self.job_id))
            .delete(status_path(JobStatus::Pending, &self.job_id))
            .set(status_path(JobStatus::Finished, &self.job_id), document)
            .precondition(self.shard_path(), Precondition::Equals(current_value))
            .set(self.shard_path(), new_value)
            .build();

        let index = agent.write(transaction).await?;
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

        Ok(JobStatus::Finished)
    }

    async fn status(&self, _agent: &dyn AgentInterface) -> Result<JobStatus> {
        Ok(JobStatus::Finished)
    }

    async fn abort(&self, agent: &dyn AgentInterface, reason: &str) -> Result<()> {
        let tx = finish_transaction(&self.job_id, false, self.document(), Some(reason), &[]);
        agent.write(tx).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::mock::MockAgent;
    use crate::agent::AgentConfig;
    use crate::job::status_path;

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
    async fn s8_promotes_the_follower_and_demotes_the_failed_leader() -> Result<()> {
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

        let job = FailedLeader::new("1", "operator", "database", "collection", "shard", "leader");
        let status = job.start(&agent).await?;
        assert_eq!(status, JobStatus::Finished);

        let snapshot = agent.read_db().await;
        let replicas = snapshot
            .get_path(&Path::parse("/Plan/Collections/database/collection/shards/shard"))
            .unwrap()
            .get_elements()
            .unwrap();
        assert_eq!(replicas, &[Value::from("follower1"), Value::from("leader")]);
        assert!(snapshot.get_path(&status_path(JobStatus::Finished, "1")).is_some());
        Ok(())
    }

    #[testcase]
    async fn fails_when_server_is_not_the_current_leader() -> Result<()> {
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

        let job = FailedLeader::new(
            "1",
            "operator",
            "database",
            "collection",
            "shard",
            "follower1",
        );
        assert_eq!(job.start(&agent).await?, JobStatus::Failed);
        Ok(())
    }
}
