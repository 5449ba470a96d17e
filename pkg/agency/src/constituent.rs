//! The Constituent (component D): the Raft-style role machine. A single
//! background task per node owns every role/term/vote transition, all of
//! them atomic under one lock (`CastState` behind a `common::condvar::Condvar`).

use std::time::{Duration, Instant};

use common::condvar::Condvar;
use common::errors::*;
use crypto::random::{MersenneTwisterRng, RngExt};

use crate::agent::{AgentConfig, AgentInterface, LastLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

/// `{term, voted_for}`, keyed by a zero-padded term on persistence (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionRecord {
    pub term: u64,
    pub voted_for: Option<String>,
}

impl ElectionRecord {
    /// 20-digit zero-padded decimal so lexicographic order equals numeric order.
    pub fn key(&self) -> String {
        format!("{:020}", self.term)
    }
}

/// Durable persistence of the election record. Spec.md treats this as an
/// external collaborator (§1); this trait is the seam.
#[async_trait]
pub trait ElectionStore: Send + Sync {
    async fn persist(&self, record: &ElectionRecord) -> Result<()>;

    /// Returns the record with the greatest term, if any have been persisted.
    async fn load_latest(&self) -> Result<Option<ElectionRecord>>;
}

/// In-memory `ElectionStore`, used by tests and single-process deployments
/// that accept losing the vote record on crash.
pub struct MemoryElectionStore {
    records: common::async_std::sync::Mutex<Vec<ElectionRecord>>,
}

impl MemoryElectionStore {
    pub fn new() -> Self {
        Self {
            records: common::async_std::sync::Mutex::new(vec![]),
        }
    }
}

#[async_trait]
impl ElectionStore for MemoryElectionStore {
    async fn persist(&self, record: &ElectionRecord) -> Result<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn load_latest(&self) -> Result<Option<ElectionRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .max_by_key(|r| r.term)
            .cloned())
    }
}

/// `ElectionStore` backed by a single append-only file under `Config::dir`:
/// one `term voted_for` line per persisted record. The record with the
/// greatest term on restart is authoritative, matching §6.
pub struct FileElectionStore {
    path: std::path::PathBuf,
}

impl FileElectionStore {
    pub fn new(path: std::path::PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ElectionStore for FileElectionStore {
    async fn persist(&self, record: &ElectionRecord) -> Result<()> {
        use std::io::Write;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        writeln!(
            file,
            "{} {}",
            record.key(),
            record.voted_for.as_deref().unwrap_or("")
        )?;
        Ok(())
    }

    async fn load_latest(&self) -> Result<Option<ElectionRecord>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut latest: Option<ElectionRecord> = None;
        for line in contents.lines() {
            let mut parts = line.splitn(2, ' ');
            let key = parts.next().unwrap_or("");
            let voted_for = parts.next().unwrap_or("");

            let term: u64 = match key.parse() {
                Ok(t) => t,
                Err(_) => continue,
            };

            let record = ElectionRecord {
                term,
                voted_for: if voted_for.is_empty() {
                    None
                } else {
                    Some(voted_for.to_string())
                },
            };

            if latest.as_ref().map(|r| r.term).unwrap_or(0) <= record.term {
                latest = Some(record);
            }
        }

        Ok(latest)
    }
}

/// The opaque replicated log (§1): only `last_log()` is consumed by the
/// election's log-freshness comparison; full replication mechanics are out
/// of scope.
pub trait ReplicatedLog: Send + Sync {
    fn last_log(&self) -> LastLog;
}

/// Stands in for a log that has never been written to (single-node startup,
/// tests).
pub struct EmptyReplicatedLog;

impl ReplicatedLog for EmptyReplicatedLog {
    fn last_log(&self) -> LastLog {
        LastLog { index: 0, term: 0 }
    }
}

#[derive(Debug, Clone)]
pub struct VoteRequest {
    pub term: u64,
    pub candidate_id: String,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteReply {
    pub term: u64,
    pub vote_granted: bool,
}

/// The vote RPC, dispatched to every peer during an election. Concrete
/// transports (HTTP, in-process for tests) implement this; the wire listener
/// itself is out of scope (§1).
#[async_trait]
pub trait VoteTransport: Send + Sync {
    async fn request_vote(&self, peer: &str, request: VoteRequest) -> Result<VoteReply>;
}

/// The fields protected by the single `castLock` (§5), encapsulated so that
/// every transition method takes `&mut CastState` directly instead of the
/// source's `*NoLock`-suffixed double API.
struct CastState {
    role: Role,
    term: u64,
    voted_for: Option<String>,
    leader_id: Option<String>,
    last_heartbeat_seen: Instant,
}

impl CastState {
    fn become_follower(&mut self, term: u64) {
        self.role = Role::Follower;
        self.term = term;
        self.voted_for = None;
        self.leader_id = None;
    }
}

pub struct Constituent<L, V> {
    state: Condvar<CastState>,
    election_store: Box<dyn ElectionStore>,
    replicated_log: L,
    vote_transport: V,
    rng: common::async_std::sync::Mutex<MersenneTwisterRng>,
    stop: std::sync::atomic::AtomicBool,
}

impl<L: ReplicatedLog, V: VoteTransport> Constituent<L, V> {
    pub fn new(election_store: Box<dyn ElectionStore>, replicated_log: L, vote_transport: V) -> Self {
        Self {
            state: Condvar::new(CastState {
                role: Role::Follower,
                term: 0,
                voted_for: None,
                leader_id: None,
                last_heartbeat_seen: Instant::now(),
            }),
            election_store,
            replicated_log,
            vote_transport,
            rng: common::async_std::sync::Mutex::new(crypto::random::clocked_rng()),
            stop: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub async fn role(&self) -> Role {
        self.state.lock().await.role
    }

    pub async fn term(&self) -> u64 {
        self.state.lock().await.term
    }

    pub async fn leader_id(&self) -> Option<String> {
        self.state.lock().await.leader_id.clone()
    }

    /// Requests shutdown and wakes any task parked in `follower_wait` so it
    /// observes the stop flag instead of sleeping out the rest of its
    /// election timeout (§4.4).
    pub async fn stop(&self) {
        self.stop.store(true, std::sync::atomic::Ordering::SeqCst);
        self.state.lock().await.notify_all();
    }

    fn is_stopped(&self) -> bool {
        self.stop.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Loads the most recent persisted election record and seeds `_term`
    /// and `_votedFor` from it (bootstrap, §4.4).
    pub async fn bootstrap(&self) -> Result<()> {
        if let Some(record) = self.election_store.load_latest().await? {
            let mut guard = self.state.lock().await;
            guard.term = record.term;
            guard.voted_for = record.voted_for;
        }
        Ok(())
    }

    /// §4.4a vote rule, corrected per the design notes to compare against
    /// `self._term` (the source compared against a locally-zeroed `t = 0`,
    /// making any positive term an automatic win) and to additionally check
    /// log freshness via `(prevLogTerm, prevLogIndex)`.
    pub async fn vote(&self, request: VoteRequest) -> Result<VoteReply> {
        let mut guard = self.state.lock().await;

        if request.term > guard.term {
            if !self.candidate_log_is_fresh(&request) {
                return Ok(VoteReply {
                    term: guard.term,
                    vote_granted: false,
                });
            }

            guard.become_follower(request.term);
            guard.voted_for = Some(request.candidate_id.clone());
            self.persist_vote(&guard).await?;
            return Ok(VoteReply {
                term: guard.term,
                vote_granted: true,
            });
        }

        if request.term == guard.term {
            match &guard.voted_for {
                None => {
                    if !self.candidate_log_is_fresh(&request) {
                        return Ok(VoteReply {
                            term: guard.term,
                            vote_granted: false,
                        });
                    }

                    guard.role = Role::Follower;
                    guard.voted_for = Some(request.candidate_id.clone());
                    self.persist_vote(&guard).await?;
                    return Ok(VoteReply {
                        term: guard.term,
                        vote_granted: true,
                    });
                }
                Some(id) if id == &request.candidate_id => {
                    return Ok(VoteReply {
                        term: guard.term,
                        vote_granted: true,
                    });
                }
                Some(_) => {
                    return Ok(VoteReply {
                        term: guard.term,
                        vote_granted: false,
                    });
                }
            }
        }

        Ok(VoteReply {
            term: guard.term,
            vote_granted: false,
        })
    }

    fn candidate_log_is_fresh(&self, request: &VoteRequest) -> bool {
        let last = self.replicated_log.last_log();
        (request.prev_log_term, request.prev_log_index) >= (last.term, last.index)
    }

    async fn persist_vote(&self, guard: &CastState) -> Result<()> {
        self.election_store
            .persist(&ElectionRecord {
                term: guard.term,
                voted_for: guard.voted_for.clone(),
            })
            .await
    }

    /// `checkLeader`: heartbeat/append-entries acknowledgment from the
    /// current leader. Updates `lastHeartbeatSeen` only when `term >=
    /// self.term` (§8 round-trip property).
    pub async fn check_leader(&self, term: u64, leader_id: &str) -> bool {
        let mut guard = self.state.lock().await;
        if term < guard.term {
            return false;
        }

        if term > guard.term {
            guard.become_follower(term);
        } else {
            guard.role = Role::Follower;
        }

        guard.leader_id = Some(leader_id.to_string());
        guard.last_heartbeat_seen = Instant::now();
        guard.notify_all();
        true
    }

    /// Runs the Constituent loop until `stop()` is called. Declares
    /// immediate leadership for a single-node cluster (§4.4).
    pub async fn run(&self, agent: &dyn AgentInterface) -> Result<()> {
        self.bootstrap().await?;

        if agent.config().size == 1 {
            let mut guard = self.state.lock().await;
            guard.role = Role::Leader;
            guard.leader_id = Some(agent.config().id.clone());
            drop(guard);
            agent.lead().await;
            return Ok(());
        }

        while !self.is_stopped() {
            match self.role().await {
                Role::Follower => self.follower_wait(agent).await,
                Role::Candidate => self.run_election(agent).await?,
                Role::Leader => self.leader_idle(agent).await,
            }
        }

        Ok(())
    }

    /// Waits out the election timeout, re-arming on every wakeup: a
    /// `notify_all()` from `check_leader()` only refreshes
    /// `last_heartbeat_seen`, so the wait is re-checked against the current
    /// elapsed time rather than unconditionally converting to CANDIDATE —
    /// an intervening heartbeat must cancel the election (§4.4).
    async fn follower_wait(&self, agent: &dyn AgentInterface) {
        let config = agent.config();
        let wait_ms = {
            let mut rng = self.rng.lock().await;
            rng.between(config.min_ping_ms, config.max_ping_ms)
        };
        let wait_duration = Duration::from_millis(wait_ms);

        loop {
            if self.is_stopped() {
                return;
            }

            let guard = self.state.lock().await;
            let elapsed = guard.last_heartbeat_seen.elapsed();
            let remaining = match wait_duration.checked_sub(elapsed) {
                Some(d) if !d.is_zero() => d,
                _ => {
                    drop(guard);
                    self.become_candidate().await;
                    return;
                }
            };

            common::async_std::future::timeout(remaining, guard.wait(()))
                .await
                .ok();

            if self.is_stopped() {
                return;
            }

            // The wait may have resolved via `notify_all()` before
            // `remaining` actually elapsed (a heartbeat, or a shutdown
            // racing this check); loop back and re-measure instead of
            // assuming the timeout fired.
            let elapsed_now = self.state.lock().await.last_heartbeat_seen.elapsed();
            if elapsed_now >= wait_duration {
                self.become_candidate().await;
                return;
            }
        }
    }

    async fn become_candidate(&self) {
        let mut guard = self.state.lock().await;
        if guard.role == Role::Follower {
            guard.role = Role::Candidate;
            guard.leader_id = None;
        }
    }

    async fn leader_idle(&self, agent: &dyn AgentInterface) {
        let idle = Duration::from_millis((agent.config().min_ping_ms as f64 * 0.1) as u64);
        common::async_std::task::sleep(idle).await;
    }

    /// Election procedure (CANDIDATE), §4.4. Peer RPC timing is reframed
    /// per the design notes: each peer call is awaited concurrently with a
    /// hard per-peer deadline; an unresolved future counts as a denial
    /// instead of being collected after a fixed blind sleep.
    async fn run_election(&self, agent: &dyn AgentInterface) -> Result<()> {
        let config = agent.config();

        let (candidacy_term, request) = {
            let mut guard = self.state.lock().await;
            guard.term += 1;
            guard.voted_for = Some(config.id.clone());
            let last = self.replicated_log.last_log();
            let request = VoteRequest {
                term: guard.term,
                candidate_id: config.id.clone(),
                prev_log_index: last.index,
                prev_log_term: last.term,
            };
            self.persist_vote(&guard).await?;
            (guard.term, request)
        };

        let response_timeout = Duration::from_millis((config.min_ping_ms as f64 * 0.9) as u64);
        let peers: Vec<String> = config.peers().map(|p| p.to_string()).collect();
        let cluster_size = config.size;

        let calls = peers.iter().map(|peer| {
            let request = request.clone();
            async move {
                match common::async_std::future::timeout(
                    response_timeout,
                    self.vote_transport.request_vote(peer, request),
                )
                .await
                {
                    Ok(Ok(reply)) => Some(reply),
                    _ => None,
                }
            }
        });

        let replies: Vec<Option<VoteReply>> = futures::future::join_all(calls).await;

        let mut granted_votes = 1; // the candidate always votes for itself.
        for reply in replies.into_iter().flatten() {
            if reply.term > candidacy_term {
                let mut guard = self.state.lock().await;
                guard.become_follower(reply.term);
                return Ok(());
            }
            if reply.vote_granted {
                granted_votes += 1;
            }
        }

        let mut guard = self.state.lock().await;
        if guard.term != candidacy_term {
            // Something else (a higher term observed elsewhere) already
            // moved us on; leave that transition alone.
            return Ok(());
        }

        if granted_votes > cluster_size / 2 {
            guard.role = Role::Leader;
            guard.leader_id = Some(config.id.clone());
            drop(guard);
            agent.lead().await;
        } else {
            guard.role = Role::Follower;
            guard.leader_id = None;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::mock::MockAgent;
    use crate::agent::AgentConfig;

    fn config(id: &str, size: usize, active: &[&str]) -> AgentConfig {
        AgentConfig {
            id: id.to_string(),
            size,
            active: active.iter().map(|s| s.to_string()).collect(),
            pool: vec![],
            min_ping_ms: 10,
            max_ping_ms: 20,
            wait_for_sync: false,
        }
    }

    fn request(term: u64, candidate_id: &str) -> VoteRequest {
        VoteRequest {
            term,
            candidate_id: candidate_id.to_string(),
            prev_log_index: 0,
            prev_log_term: 0,
        }
    }

    /// Denies every vote, for exercising the majority-lost path
    /// deterministically without a real RPC transport.
    struct DenyAllVotes;

    #[async_trait]
    impl VoteTransport for DenyAllVotes {
        async fn request_vote(&self, _peer: &str, request: VoteRequest) -> Result<VoteReply> {
            Ok(VoteReply {
                term: request.term,
                vote_granted: false,
            })
        }
    }

    fn new_constituent() -> Constituent<EmptyReplicatedLog, DenyAllVotes> {
        Constituent::new(
            Box::new(MemoryElectionStore::new()),
            EmptyReplicatedLog,
            DenyAllVotes,
        )
    }

    /// S6: a single-node cluster declares itself LEADER immediately, at
    /// term 0, without running an election.
    #[testcase]
    async fn single_node_cluster_declares_itself_leader_at_term_zero() -> Result<()> {
        let agent = MockAgent::new(config("A", 1, &["A"]));
        let c = new_constituent();

        c.run(&agent).await?;

        assert_eq!(c.role().await, Role::Leader);
        assert_eq!(c.term().await, 0);
        assert_eq!(c.leader_id().await, Some("A".to_string()));
        Ok(())
    }

    /// S7: losing the majority vote reverts CANDIDATE to FOLLOWER at the
    /// term it campaigned for, with no leader recognized.
    #[testcase]
    async fn losing_the_majority_reverts_to_follower_at_the_candidacy_term() -> Result<()> {
        let agent = MockAgent::new(config("A", 3, &["A", "B", "C"]));
        let c = new_constituent();

        c.become_candidate().await;
        assert_eq!(c.role().await, Role::Candidate);

        c.run_election(&agent).await?;

        assert_eq!(c.role().await, Role::Follower);
        assert_eq!(c.term().await, 1);
        assert_eq!(c.leader_id().await, None);
        Ok(())
    }

    /// S9: a candidate at the current term, already having voted for
    /// someone else, is denied.
    #[testcase]
    async fn vote_denies_a_second_candidate_at_the_same_term() -> Result<()> {
        let c = new_constituent();

        let granted = c.vote(request(1, "X")).await?;
        assert!(granted.vote_granted);

        let denied = c.vote(request(1, "Y")).await?;
        assert!(!denied.vote_granted);
        assert_eq!(denied.term, 1);
        Ok(())
    }

    /// S9: a candidate campaigning at a stale term (3) is denied outright
    /// against a constituent already at term 5.
    #[testcase]
    async fn vote_denies_a_stale_term() -> Result<()> {
        let c = new_constituent();

        let granted = c.vote(request(5, "X")).await?;
        assert!(granted.vote_granted);
        assert_eq!(c.term().await, 5);

        let denied = c.vote(request(3, "Y")).await?;
        assert!(!denied.vote_granted);
        assert_eq!(denied.term, 5);
        Ok(())
    }

    /// `check_leader` accepts a heartbeat at the current term, recording
    /// the leader id and resetting the role to FOLLOWER.
    #[testcase]
    async fn check_leader_accepts_a_current_term_heartbeat() -> Result<()> {
        let c = new_constituent();

        let accepted = c.check_leader(0, "L").await;
        assert!(accepted);
        assert_eq!(c.role().await, Role::Follower);
        assert_eq!(c.leader_id().await, Some("L".to_string()));
        Ok(())
    }

    /// `check_leader` rejects a heartbeat from a stale term.
    #[testcase]
    async fn check_leader_rejects_a_stale_term() -> Result<()> {
        let c = new_constituent();
        c.vote(request(5, "X")).await?;

        let accepted = c.check_leader(3, "L").await;
        assert!(!accepted);
        assert_eq!(c.leader_id().await, None);
        Ok(())
    }
}
