//! AddFollower (§4.6.3): adds one replica to a shard. Immediate-completion
//! job — it never passes through `Pending`, grounded on
//! `AddFollowerTest.cpp`'s four scenarios (spec S1-S4).

use common::errors::*;

use crate::agent::AgentInterface;
use crate::job::{create_transaction, finish_transaction, good_free_servers, JobStatus, SupervisionJob};
use crate::node::{Path, Value};

pub struct AddFollower {
    job_id: String,
    creator: String,
    database: String,
    collection: String,
    shard: String,
}

impl AddFollower {
    pub fn new(
        job_id: impl Into<String>,
        creator: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
        shard: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            creator: creator.into(),
            database: database.into(),
            collection: collection.into(),
            shard: shard.into(),
        }
    }

    fn document(&self) -> Value {
        let mut doc = Value::empty_object();
        doc.set_field("type", "addFollower");
        doc.set_field("creator", self.creator.clone());
        doc.set_field("database", self.database.clone());
        doc.set_field("collection", self.collection.clone());
        doc.set_field("shard", self.shard.clone());
        doc.set_field("jobId", self.job_id.clone());
        doc
    }

    fn collection_path(&self) -> Path {
        Path::parse("/Plan/Collections")
            .join(&self.database)
            .join(&self.collection)
    }

    fn current_replicas(&self, collection: &Value) -> Vec<String> {
        collection
            .get_field("shards")
            .and_then(|v| v.get_field(&self.shard))
            .and_then(|v| v.get_elements())
            .map(|elements| {
                elements
                    .iter()
                    .filter_map(|e| e.get_string().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl SupervisionJob for AddFollower {
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

        let collection = match snapshot.get_path(&self.collection_path()) {
            Some(c) => c,
            None => {
                // Collection is gone: nothing left to add a follower to.
                // The source treats this as trivially done, not a failure.
                let tx = finish_transaction(&self.job_id, true, self.document(), None, &[]);
                agent.write(tx).await?;
                return Ok(JobStatus::Finished);
            }
        };

        let distribute_shards_like = collection
            .get_field("distributeShardsLike")
            .and_then(|v| v.get_string())
            .map(|s| !s.is_empty())
            .unwrap_or(false);

        if distribute_shards_like {
            let tx = finish_transaction(
                &self.job_id,
                false,
                self.document(),
                Some("distributeShardsLike is non-empty"),
                &[],
            );
            agent.write(tx).await?;
            return Ok(JobStatus::Failed);
        }

        let replicas = self.current_replicas(collection);
        // Deterministic (lowest id) selection: unlike CleanOutServer's
        // multi-shard fan-out, the source never randomizes a single
        // AddFollower's destination.
        let candidates = good_free_servers(&snapshot);

        if candidates.is_empty() {
            let tx = finish_transaction(
                &self.job_id,
                false,
                self.document(),
                Some("no free GOOD server available"),
                &[],
            );
            agent.write(tx).await?;
            return Ok(JobStatus::Failed);
        }

        let destination = candidates
            .iter()
            .find(|id| !replicas.contains(id))
            .cloned();

        let destination = match destination {
            Some(d) => d,
            None => {
                // Every candidate is already in the replica list: the
                // shard already has the intended follower.
                let tx = finish_transaction(&self.job_id, true, self.document(), None, &[]);
                agent.write(tx).await?;
                return Ok(JobStatus::Finished);
            }
        };

        let shard_path = self
            .collection_path()
            .join("shards")
            .join(&self.shard);

        let mut document = self.document();
        document.set_field("addedServer", destination.clone());

        let transaction = crate::transaction::Transaction::builder()
            .delete(crate::job::status_path(JobStatus::ToDo, &self.job_id))
            .delete(crate::job::status_path(JobStatus::Pending, &self.job_id))
            .set(crate::job::status_path(JobStatus::Finished, &self.job_id), document)
            .push(shard_path.clone(), Value::from(destination))
            .precondition(
                shard_path,
                crate::transaction::Precondition::Equals(Value::from(
                    collection
                        .get_field("shards")
                        .and_then(|v| v.get_field(&self.shard))
                        .cloned()
                        .unwrap_or(Value::Array(vec![])),
                )),
            )
            .build();

        agent.write(transaction).await?;
        Ok(JobStatus::Finished)
    }

    async fn status(&self, _agent: &dyn AgentInterface) -> Result<JobStatus> {
        // Immediate-completion job: by the time `start()` returns it has
        // already reached a terminal status, so nothing is ever polled.
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
    use crate::transaction::Transaction;

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

    fn baseline_collection(shard_replicas: Vec<&str>) -> Transaction {
        Transaction::builder()
            .set(
                "/Plan/Collections/database/collection/shards/shard",
                Value::Array(shard_replicas.into_iter().map(Value::from).collect()),
            )
            .set(
                "/Supervision/Health/free",
                {
                    let mut v = Value::empty_object();
                    v.set_field("state", "GOOD");
                    v
                },
            )
            .build()
    }

    #[testcase]
    async fn s1_create_emits_a_single_precondition_free_insert() -> Result<()> {
        let agent = MockAgent::new(config());
        let job = AddFollower::new("1", "operator", "database", "collection", "shard");
        job.create(&agent).await?;

        let submitted = agent.submitted_transactions().await;
        assert_eq!(submitted.len(), 1);
        assert!(submitted[0].preconditions().is_empty());
        assert_eq!(submitted[0].writes().len(), 1);
        assert_eq!(submitted[0].writes()[0].0, status_path(JobStatus::ToDo, "1"));
        Ok(())
    }

    #[testcase]
    async fn s2_start_with_missing_collection_finishes_immediately() -> Result<()> {
        let agent = MockAgent::new(config());
        let job = AddFollower::new("1", "operator", "database", "collection", "shard");

        let status = job.start(&agent).await?;
        assert_eq!(status, JobStatus::Finished);

        let snapshot = agent.read_db().await;
        assert!(snapshot.get_path(&status_path(JobStatus::Finished, "1")).is_some());
        assert!(snapshot.get_path(&status_path(JobStatus::ToDo, "1")).is_none());
        Ok(())
    }

    #[testcase]
    async fn s3_distribute_shards_like_fails_the_job() -> Result<()> {
        let agent = MockAgent::new(config());
        agent
            .seed(
                Transaction::builder()
                    .set(
                        "/Plan/Collections/database/collection/distributeShardsLike",
                        "PENG",
                    )
                    .build(),
            )
            .await;

        let job = AddFollower::new("1", "operator", "database", "collection", "shard");
        let status = job.start(&agent).await?;
        assert_eq!(status, JobStatus::Failed);

        let snapshot = agent.read_db().await;
        assert!(snapshot.get_path(&status_path(JobStatus::Failed, "1")).is_some());
        assert!(snapshot.get_path(&status_path(JobStatus::Finished, "1")).is_none());
        Ok(())
    }

    #[testcase]
    async fn s4_shard_already_has_intended_follower_finishes_without_writing() -> Result<()> {
        let agent = MockAgent::new(config());
        agent
            .seed(baseline_collection(vec!["leader", "follower1", "free"]))
            .await;

        let job = AddFollower::new("1", "operator", "database", "collection", "shard");
        let status = job.start(&agent).await?;
        assert_eq!(status, JobStatus::Finished);

        let snapshot = agent.read_db().await;
        assert!(snapshot.get_path(&status_path(JobStatus::Finished, "1")).is_some());
        assert!(snapshot.get_path(&status_path(JobStatus::Failed, "1")).is_none());
        assert!(snapshot.get_path(&status_path(JobStatus::Pending, "1")).is_none());
        Ok(())
    }
}
