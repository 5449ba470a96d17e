//! CleanOutServer (§4.6.1): evacuates every shard replica off a server,
//! then records it in `Target/CleanedServers`. Grounded on
//! `examples/original_source/arangod/Agency/CleanOutServer.cpp`.

use std::sync::atomic::{AtomicUsize, Ordering};

use common::async_std::sync::Mutex;
use common::errors::*;
use crypto::random::{Rng, RngExt};

use crate::agent::AgentInterface;
use crate::job::move_shard::MoveShard;
use crate::job::{
    create_transaction, db_server_block, finish_transaction, start_transaction, status_path,
    JobStatus, SupervisionJob,
};
use crate::node::{Path, Value};
use crate::transaction::Transaction;

/// Default bound from the design decision closing the source's timeout
/// FIXME (§9): a `Pending` clean-out whose children haven't all terminated
/// after this long is surfaced as `Failed` rather than polled forever.
const DEFAULT_STALLED_AFTER_SECS: i64 = 3600;

pub struct CleanOutServer {
    job_id: String,
    creator: String,
    server: String,
    stalled_after_secs: i64,
    rng: Mutex<Box<dyn Rng + Send>>,
    sub_counter: AtomicUsize,
}

impl CleanOutServer {
    /// `rng` drives destination selection (REDESIGN, §9): callers pass a
    /// seeded `MersenneTwisterRng` in tests for determinism and
    /// `crypto::random::clocked_rng()` in production, rather than the
    /// source's ambient `rand() % n`.
    pub fn new(
        job_id: impl Into<String>,
        creator: impl Into<String>,
        server: impl Into<String>,
        rng: Box<dyn Rng + Send>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            creator: creator.into(),
            server: server.into(),
            stalled_after_secs: DEFAULT_STALLED_AFTER_SECS,
            rng: Mutex::new(rng),
            sub_counter: AtomicUsize::new(0),
        }
    }

    pub fn with_stalled_after_secs(mut self, secs: i64) -> Self {
        self.stalled_after_secs = secs;
        self
    }

    fn document(&self) -> Value {
        let mut doc = Value::empty_object();
        doc.set_field("type", "cleanOutServer");
        doc.set_field("creator", self.creator.clone());
        doc.set_field("server", self.server.clone());
        doc.set_field("jobId", self.job_id.clone());
        doc
    }

    fn pending_document(&self, snapshot: &Value) -> Value {
        snapshot
            .get_path(&status_path(JobStatus::Pending, &self.job_id))
            .cloned()
            .unwrap_or_else(|| self.document())
    }

    fn next_sub_id(&self) -> String {
        let i = self.sub_counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.job_id, i)
    }

    /// Checks 1-6 of §4.6.1's feasibility preflight against `snapshot`.
    fn check_feasibility(&self, snapshot: &Value) -> std::result::Result<(), String> {
        let db_servers = match snapshot
            .get_path(&Path::parse("/Plan/DBServers"))
            .and_then(|v| v.object_fields())
        {
            Some(fields) => fields.map(|(id, _)| id.to_string()).collect::<Vec<_>>(),
            None => vec![],
        };

        if !db_servers.iter().any(|id| id == &self.server) {
            return Err(format!("server {} is not a member of /Plan/DBServers", self.server));
        }

        let cleaned = snapshot
            .get_path(&Path::parse("/Target/CleanedServers"))
            .and_then(|v| v.get_elements())
            .map(|elements| {
                elements
                    .iter()
                    .filter_map(|e| e.get_string().map(|s| s.to_string()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        if cleaned.iter().any(|id| id == &self.server) {
            return Err(format!("server {} is already a cleaned server", self.server));
        }

        let failed = snapshot
            .get_path(&Path::parse("/Target/FailedServers"))
            .and_then(|v| v.object_fields())
            .map(|fields| fields.map(|(id, _)| id.to_string()).collect::<Vec<_>>())
            .unwrap_or_default();

        if failed.iter().any(|id| id == &self.server) {
            return Err(format!("server {} is a failed server", self.server));
        }

        if !crate::job::resource_is_free(snapshot, &db_server_block(&self.server)) {
            return Err(format!("server {} is already being cleaned", self.server));
        }

        let remaining = db_servers
            .iter()
            .filter(|id| *id != &self.server && !cleaned.contains(id))
            .count();

        if remaining == 0 {
            return Err("no DB server would remain after clean-out".to_string());
        }

        if let Some(databases) = snapshot
            .get_path(&Path::parse("/Plan/Collections"))
            .and_then(|v| v.object_fields())
        {
            for (_, collections) in databases {
                if let Some(collections) = collections.object_fields() {
                    for (name, collection) in collections {
                        let distribute_shards_like = collection
                            .get_field("distributeShardsLike")
                            .and_then(|v| v.get_string())
                            .map(|s| !s.is_empty())
                            .unwrap_or(false);
                        if distribute_shards_like {
                            continue;
                        }

                        let replication_factor = collection
                            .get_field("replicationFactor")
                            .and_then(|v| v.get_int())
                            .unwrap_or(1);

                        if replication_factor as usize > remaining {
                            return Err(format!(
                                "collection {} needs replicationFactor {} but only {} servers would remain",
                                name, replication_factor, remaining
                            ));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// The planner: one `MoveShard` child per shard replica held by
    /// `self.server`, run synchronously (§4.6.1; see the module doc comment
    /// on why `MoveShard` never lingers in `Pending` in this crate).
    async fn schedule_move_shards(
        &self,
        agent: &dyn AgentInterface,
        snapshot: &Value,
    ) -> std::result::Result<(), String> {
        let pool: Vec<String> = snapshot
            .get_path(&Path::parse("/Plan/DBServers"))
            .and_then(|v| v.object_fields())
            .map(|fields| fields.map(|(id, _)| id.to_string()).collect())
            .unwrap_or_default();

        let databases = match snapshot
            .get_path(&Path::parse("/Plan/Collections"))
            .and_then(|v| v.object_fields())
        {
            Some(fields) => fields
                .map(|(db, v)| (db.to_string(), v.clone()))
                .collect::<Vec<_>>(),
            None => vec![],
        };

        for (db_name, collections) in databases {
            let collections = match collections.object_fields() {
                Some(fields) => fields.map(|(c, v)| (c.to_string(), v.clone())).collect::<Vec<_>>(),
                None => continue,
            };

            for (collection_name, collection) in collections {
                let distribute_shards_like = collection
                    .get_field("distributeShardsLike")
                    .and_then(|v| v.get_string())
                    .map(|s| !s.is_empty())
                    .unwrap_or(false);
                if distribute_shards_like {
                    continue;
                }

                let shards = match collection.get_field("shards").and_then(|v| v.object_fields()) {
                    Some(fields) => fields.map(|(s, v)| (s.to_string(), v.clone())).collect::<Vec<_>>(),
                    None => continue,
                };

                for (shard_name, replicas) in shards {
                    let replicas: Vec<String> = match replicas.get_elements() {
                        Some(elements) => elements
                            .iter()
                            .filter_map(|e| e.get_string().map(|s| s.to_string()))
                            .collect(),
                        None => continue,
                    };

                    if !replicas.iter().any(|s| s == &self.server) {
                        continue;
                    }

                    let is_leader = replicas.first().map(|s| s == &self.server).unwrap_or(false);

                    let candidates: Vec<String> = pool
                        .iter()
                        .filter(|id| *id != &self.server && !replicas.contains(id))
                        .cloned()
                        .collect();

                    if candidates.is_empty() {
                        return Err(format!(
                            "no destination server available for shard {}",
                            shard_name
                        ));
                    }

                    let destination = {
                        let mut rng = self.rng.lock().await;
                        rng.choose(&candidates).clone()
                    };

                    let child = MoveShard::new(
                        self.next_sub_id(),
                        self.creator.clone(),
                        db_name.clone(),
                        collection_name.clone(),
                        shard_name.clone(),
                        self.server.clone(),
                        destination,
                        is_leader,
                    );

                    child
                        .run(agent)
                        .await
                        .map_err(|e| format!("moving shard {} failed: {}", shard_name, e))?;
                }
            }
        }

        Ok(())
    }

    fn first_failed_child_reason(&self, snapshot: &Value, prefix: &str) -> Option<String> {
        let fields = snapshot
            .get_path(&Path::parse("/Target/Failed"))
            .and_then(|v| v.object_fields())?;

        for (id, doc) in fields {
            if id.starts_with(prefix) {
                let reason = doc
                    .get_field("reason")
                    .and_then(|v| v.get_string())
                    .unwrap_or("a child move-shard job failed")
                    .to_string();
                return Some(reason);
            }
        }
        None
    }

    fn any_child_outstanding(&self, snapshot: &Value, prefix: &str) -> bool {
        for root in ["/Target/ToDo", "/Target/Pending"] {
            if let Some(fields) = snapshot.get_path(&Path::parse(root)).and_then(|v| v.object_fields()) {
                if fields.filter(|(id, _)| id.starts_with(prefix)).count() > 0 {
                    return true;
                }
            }
        }
        false
    }

    fn is_stalled(&self, snapshot: &Value) -> bool {
        let started = match snapshot
            .get_path(&status_path(JobStatus::Pending, &self.job_id))
            .and_then(|doc| doc.get_field("timeStarted"))
            .and_then(|v| v.get_string())
        {
            Some(s) => s,
            None => return false,
        };

        let started = match common::chrono::DateTime::parse_from_rfc3339(started) {
            Ok(t) => t,
            Err(_) => return false,
        };

        let elapsed = common::chrono::Utc::now().signed_duration_since(started);
        elapsed.num_seconds() > self.stalled_after_secs
    }
}

#[async_trait]
impl SupervisionJob for CleanOutServer {
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
        let resource = db_server_block(&self.server);

        let transaction = start_transaction(&self.job_id, self.document(), &[resource.clone()]);
        let index = agent.write(transaction).await?;
        if index == 0 {
            // Another job already holds this server's resource block; the
            // job stays in ToDo and is retried on the next supervision tick.
            return Ok(JobStatus::ToDo);
        }

        if let Err(reason) = self.check_feasibility(&snapshot) {
            let document = self.pending_document(&agent.read_db().await);
            let tx = finish_transaction(&self.job_id, false, document, Some(&reason), &[resource]);
            agent.write(tx).await?;
            return Ok(JobStatus::Failed);
        }

        match self.schedule_move_shards(agent, &snapshot).await {
            Ok(()) => Ok(JobStatus::Pending),
            Err(reason) => {
                let document = self.pending_document(&agent.read_db().await);
                let tx = finish_transaction(&self.job_id, false, document, Some(&reason), &[resource]);
                agent.write(tx).await?;
                Ok(JobStatus::Failed)
            }
        }
    }

    async fn status(&self, agent: &dyn AgentInterface) -> Result<JobStatus> {
        let snapshot = agent.read_db().await;

        if snapshot
            .get_path(&status_path(JobStatus::Finished, &self.job_id))
            .is_some()
        {
            return Ok(JobStatus::Finished);
        }
        if snapshot
            .get_path(&status_path(JobStatus::Failed, &self.job_id))
            .is_some()
        {
            return Ok(JobStatus::Failed);
        }

        let prefix = format!("{}-", self.job_id);
        let resource = db_server_block(&self.server);

        // Partial-failure semantics (§9 decision): any one child found
        // under `Target/Failed/<jobId>-*` fails the whole clean-out rather
        // than waiting for the rest to terminate.
        if let Some(reason) = self.first_failed_child_reason(&snapshot, &prefix) {
            let document = self.pending_document(&snapshot);
            let tx = finish_transaction(&self.job_id, false, document, Some(&reason), &[resource]);
            agent.write(tx).await?;
            return Ok(JobStatus::Failed);
        }

        if self.any_child_outstanding(&snapshot, &prefix) {
            if self.is_stalled(&snapshot) {
                let document = self.pending_document(&snapshot);
                let tx = finish_transaction(
                    &self.job_id,
                    false,
                    document,
                    Some("clean-out stalled"),
                    &[resource],
                );
                agent.write(tx).await?;
                return Ok(JobStatus::Failed);
            }
            return Ok(JobStatus::Pending);
        }

        let document = self.pending_document(&snapshot);
        let transaction = Transaction::builder()
            .delete(status_path(JobStatus::ToDo, &self.job_id))
            .delete(status_path(JobStatus::Pending, &self.job_id))
            .set(status_path(JobStatus::Finished, &self.job_id), document)
            .push("/Target/CleanedServers", Value::from(self.server.clone()))
            .delete(resource)
            .build();
        agent.write(transaction).await?;
        Ok(JobStatus::Finished)
    }

    /// §9 decision: transitions the parent to `Failed` and leaves
    /// already-dispatched `MoveShard` children to run to their own
    /// completion — there is no cross-job cancellation primitive, and
    /// forcibly killing one mid-flight would leave a shard's replica list
    /// in an ambiguous state.
    async fn abort(&self, agent: &dyn AgentInterface, reason: &str) -> Result<()> {
        let snapshot = agent.read_db().await;
        let document = self.pending_document(&snapshot);
        let tx = finish_transaction(
            &self.job_id,
            false,
            document,
            Some(reason),
            &[db_server_block(&self.server)],
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
    use crypto::random::MersenneTwisterRng;

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

    fn rng() -> Box<dyn Rng + Send> {
        Box::new(MersenneTwisterRng::mt19937())
    }

    fn seed_pool() -> Transaction {
        Transaction::builder()
            .set("/Plan/DBServers/S", Value::from(true))
            .set("/Plan/DBServers/T", Value::from(true))
            .build()
    }

    #[testcase]
    async fn s5_feasibility_failure_reports_reason() -> Result<()> {
        let agent = MockAgent::new(config());
        agent.seed(seed_pool()).await;
        agent
            .seed(
                Transaction::builder()
                    .set(
                        "/Plan/Collections/database/collection/shards/shard",
                        Value::Array(vec![Value::from("S"), Value::from("T")]),
                    )
                    .set("/Plan/Collections/database/collection/replicationFactor", 2i64)
                    .build(),
            )
            .await;

        let job = CleanOutServer::new("1", "operator", "S", rng());
        job.create(&agent).await?;
        let status = job.start(&agent).await?;
        assert_eq!(status, JobStatus::Failed);

        let snapshot = agent.read_db().await;
        let failed = snapshot
            .get_path(&status_path(JobStatus::Failed, "1"))
            .unwrap();
        assert!(failed
            .get_field("reason")
            .and_then(|v| v.get_string())
            .unwrap()
            .contains("replicationFactor"));
        Ok(())
    }

    #[testcase]
    async fn clean_out_with_single_candidate_reaches_finished_after_one_status_poll() -> Result<()> {
        let agent = MockAgent::new(config());
        agent.seed(seed_pool()).await;
        agent
            .seed(
                Transaction::builder()
                    .set(
                        "/Plan/Collections/database/collection/shards/shard",
                        Value::Array(vec![Value::from("S")]),
                    )
                    .set("/Plan/Collections/database/collection/replicationFactor", 1i64)
                    .build(),
            )
            .await;

        let job = CleanOutServer::new("1", "operator", "S", rng());
        job.create(&agent).await?;
        let status = job.start(&agent).await?;
        assert_eq!(status, JobStatus::Pending);

        let status = job.status(&agent).await?;
        assert_eq!(status, JobStatus::Finished);

        let snapshot = agent.read_db().await;
        let cleaned = snapshot
            .get_path(&Path::parse("/Target/CleanedServers"))
            .unwrap()
            .get_elements()
            .unwrap();
        assert_eq!(cleaned, &[Value::from("S")]);

        let replicas = snapshot
            .get_path(&Path::parse("/Plan/Collections/database/collection/shards/shard"))
            .unwrap()
            .get_elements()
            .unwrap();
        assert!(!replicas.iter().any(|v| v.get_string() == Some("S")));
        Ok(())
    }
}
