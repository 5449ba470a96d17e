//! The Supervision Job Framework (component E): lifecycle plumbing shared
//! by every concrete maintenance job (component F, in the sibling modules).

pub mod add_follower;
pub mod clean_out_server;
pub mod failed_leader;
pub mod move_shard;

pub use add_follower::AddFollower;
pub use clean_out_server::CleanOutServer;
pub use failed_leader::FailedLeader;
pub use move_shard::MoveShard;

use common::errors::*;

use crate::agent::AgentInterface;
use crate::node::{Path, Value};
use crate::transaction::{Precondition, Transaction};

/// Where a job currently sits in its lifecycle (§4.5's status roots).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    ToDo,
    Pending,
    Finished,
    Failed,
}

impl JobStatus {
    fn root(self) -> &'static str {
        match self {
            JobStatus::ToDo => "ToDo",
            JobStatus::Pending => "Pending",
            JobStatus::Finished => "Finished",
            JobStatus::Failed => "Failed",
        }
    }
}

/// `/Target/<status>/<jobId>`.
pub fn status_path(status: JobStatus, job_id: &str) -> Path {
    Path::parse("/Target").join(status.root()).join(job_id)
}

/// The capability every concrete job implements. REDESIGN applied (§9):
/// jobs are a closed `enum Job` plus this trait, rather than a base class
/// hierarchy — matching `AgentInterface`'s "trait at the seam" shape.
#[async_trait]
pub trait SupervisionJob: Send + Sync {
    fn job_id(&self) -> &str;

    /// Emits the `ToDo` insertion transaction.
    async fn create(&self, agent: &dyn AgentInterface) -> Result<()>;

    /// Drives `ToDo -> Pending` (or straight to a terminal status, for
    /// immediate-completion jobs) and runs the planner.
    async fn start(&self, agent: &dyn AgentInterface) -> Result<JobStatus>;

    /// Polled for `Pending` jobs; returns the job's current status after
    /// checking completion predicates.
    async fn status(&self, agent: &dyn AgentInterface) -> Result<JobStatus>;

    /// Operator-requested cancellation.
    async fn abort(&self, agent: &dyn AgentInterface, reason: &str) -> Result<()>;
}

/// The closed set of job kinds the supervision loop dispatches over.
pub enum Job {
    CleanOutServer(CleanOutServer),
    MoveShard(MoveShard),
    AddFollower(AddFollower),
    FailedLeader(FailedLeader),
}

#[async_trait]
impl SupervisionJob for Job {
    fn job_id(&self) -> &str {
        match self {
            Job::CleanOutServer(j) => j.job_id(),
            Job::MoveShard(j) => j.job_id(),
            Job::AddFollower(j) => j.job_id(),
            Job::FailedLeader(j) => j.job_id(),
        }
    }

    async fn create(&self, agent: &dyn AgentInterface) -> Result<()> {
        match self {
            Job::CleanOutServer(j) => j.create(agent).await,
            Job::MoveShard(j) => j.create(agent).await,
            Job::AddFollower(j) => j.create(agent).await,
            Job::FailedLeader(j) => j.create(agent).await,
        }
    }

    async fn start(&self, agent: &dyn AgentInterface) -> Result<JobStatus> {
        match self {
            Job::CleanOutServer(j) => j.start(agent).await,
            Job::MoveShard(j) => j.start(agent).await,
            Job::AddFollower(j) => j.start(agent).await,
            Job::FailedLeader(j) => j.start(agent).await,
        }
    }

    async fn status(&self, agent: &dyn AgentInterface) -> Result<JobStatus> {
        match self {
            Job::CleanOutServer(j) => j.status(agent).await,
            Job::MoveShard(j) => j.status(agent).await,
            Job::AddFollower(j) => j.status(agent).await,
            Job::FailedLeader(j) => j.status(agent).await,
        }
    }

    async fn abort(&self, agent: &dyn AgentInterface, reason: &str) -> Result<()> {
        match self {
            Job::CleanOutServer(j) => j.abort(agent, reason).await,
            Job::MoveShard(j) => j.abort(agent, reason).await,
            Job::AddFollower(j) => j.abort(agent, reason).await,
            Job::FailedLeader(j) => j.abort(agent, reason).await,
        }
    }
}

/// `/Supervision/DBServers/<id>` or `/Supervision/Shards/<id>`, naming the
/// resource-block path a job acquires via an `oldEmpty` precondition.
pub fn db_server_block(server: &str) -> Path {
    Path::parse("/Supervision/DBServers").join(server)
}

pub fn shard_block(shard: &str) -> Path {
    Path::parse("/Supervision/Shards").join(shard)
}

/// Whether a resource-block path is unoccupied: absent, or present as
/// `Null` (the shape `apply_write`'s `Delete` leaves behind). Planners use
/// this to pre-filter candidates before committing to a precondition that
/// would otherwise just get rejected at the transaction boundary.
pub fn resource_is_free(snapshot: &Value, path: &Path) -> bool {
    snapshot.get_path(path).map(|v| v.is_null()).unwrap_or(true)
}

/// Every server named under `/Supervision/Health` with state `GOOD` and an
/// unoccupied `/Supervision/DBServers/<id>` block, sorted for determinism.
pub fn good_free_servers(snapshot: &Value) -> Vec<String> {
    let mut servers = match snapshot
        .get_path(&Path::parse("/Supervision/Health"))
        .and_then(|v| v.object_fields())
    {
        Some(fields) => fields
            .filter(|(_, record)| {
                record.get_field("state").and_then(|v| v.get_string()) == Some("GOOD")
            })
            .map(|(id, _)| id.to_string())
            .filter(|id| resource_is_free(snapshot, &db_server_block(id)))
            .collect::<Vec<_>>(),
        None => vec![],
    };
    servers.sort();
    servers
}

/// Current time as an ISO-8601 UTC string, for `timeCreated`/`timeStarted`.
pub fn now_iso8601() -> String {
    common::chrono::Utc::now().to_rfc3339()
}

/// Builds the single-write, no-precondition `create()` transaction (§4.5):
/// insert `document` (already carrying job-specific fields) under
/// `Target/ToDo/<jobId>`, with `timeCreated` stamped in.
pub fn create_transaction(job_id: &str, mut document: Value) -> Transaction {
    document.set_field("timeCreated", now_iso8601());
    Transaction::builder()
        .set(status_path(JobStatus::ToDo, job_id), document)
        .build()
}

/// Builds the `ToDo -> Pending` transition transaction: copies `document`
/// (already carrying `timeStarted`) to `Pending/<jobId>`, deletes
/// `ToDo/<jobId>`, and acquires every path in `resources` behind an
/// `oldEmpty` precondition (§4.5/§5).
pub fn start_transaction(job_id: &str, mut document: Value, resources: &[Path]) -> Transaction {
    document.set_field("timeStarted", now_iso8601());

    let mut builder = Transaction::builder()
        .delete(status_path(JobStatus::ToDo, job_id))
        .set(status_path(JobStatus::Pending, job_id), document);

    for resource in resources {
        builder = builder
            .precondition(resource.clone(), Precondition::OldEmpty(true))
            .set(resource.clone(), Value::from(job_id));
    }

    builder.build()
}

/// Builds the terminal transition transaction (§4.5's `finish`): deletes
/// both `ToDo/<jobId>` and `Pending/<jobId>` defensively (whichever one is
/// actually populated; the other is a harmless no-op, matching the exact
/// shape asserted by the source's `AddFollowerTest`), creates exactly one
/// of `Finished/<jobId>`/`Failed/<jobId>`, and releases every resource
/// block the job held.
pub fn finish_transaction(
    job_id: &str,
    successful: bool,
    mut document: Value,
    reason: Option<&str>,
    resources: &[Path],
) -> Transaction {
    if let Some(reason) = reason {
        document.set_field("reason", reason);
    }

    let terminal = if successful {
        JobStatus::Finished
    } else {
        JobStatus::Failed
    };

    let mut builder = Transaction::builder()
        .delete(status_path(JobStatus::ToDo, job_id))
        .delete(status_path(JobStatus::Pending, job_id))
        .set(status_path(terminal, job_id), document);

    for resource in resources {
        builder = builder.delete(resource.clone());
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_transaction_always_deletes_both_todo_and_pending() {
        let transaction = finish_transaction(
            "1",
            true,
            Value::Object(
                vec![("collection".to_string(), Value::from("c"))]
                    .into_iter()
                    .collect(),
            ),
            None,
            &[],
        );

        let paths: Vec<&Path> = transaction.writes().iter().map(|(p, _)| p).collect();
        assert!(paths.contains(&&status_path(JobStatus::ToDo, "1")));
        assert!(paths.contains(&&status_path(JobStatus::Pending, "1")));
        assert!(paths.contains(&&status_path(JobStatus::Finished, "1")));
        assert!(!paths.contains(&&status_path(JobStatus::Failed, "1")));
    }
}
