//! Wires one agency node together: `Agent` plus `Constituent` plus the
//! supervision loop, joined via a `TaskBundle` (mirrors
//! `datastore::meta::store::run`'s task wiring).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use common::bundle::TaskBundle;
use common::errors::*;

use crate::agent::{Agent, AgentInterface};
use crate::config::Config;
use crate::constituent::{
    Constituent, ElectionStore, EmptyReplicatedLog, FileElectionStore, VoteReply, VoteRequest,
    VoteTransport,
};
use crate::supervision::SupervisionLoop;

/// Grants every vote instantly. Stands in for the RPC vote dialer/listener
/// (out of scope, §1) until a wire transport is plugged in; sufficient for
/// the single-node deployments this crate's Constituent shortcuts anyway.
pub struct LoopbackVoteTransport;

#[async_trait]
impl VoteTransport for LoopbackVoteTransport {
    async fn request_vote(&self, _peer: &str, request: VoteRequest) -> Result<VoteReply> {
        Ok(VoteReply {
            term: request.term,
            vote_granted: true,
        })
    }
}

/// Starts one node and runs until either background task exits.
pub async fn run(config: &Config) -> Result<()> {
    std::fs::create_dir_all(&config.dir)?;

    let agent = Arc::new(Agent::new(config.to_agent_config()?));

    let election_store: Box<dyn ElectionStore> = Box::new(FileElectionStore::new(
        PathBuf::from(&config.dir).join("election.log"),
    ));
    let constituent = Arc::new(Constituent::new(
        election_store,
        EmptyReplicatedLog,
        LoopbackVoteTransport,
    ));

    let supervision = Arc::new(SupervisionLoop::new(Duration::from_millis(
        config.supervision_poll_ms,
    )));

    {
        let supervision = supervision.clone();
        agent.set_on_lead(move || supervision.wake());
    }

    let mut task_bundle = TaskBundle::new();

    {
        let agent = agent.clone();
        let constituent = constituent.clone();
        task_bundle.add(async move {
            if let Err(e) = constituent.run(agent.as_ref()).await {
                eprintln!("constituent: {}", e);
            }
        });
    }

    {
        let agent = agent.clone();
        let constituent = constituent.clone();
        let supervision = supervision.clone();
        task_bundle.add(async move {
            if let Err(e) = supervision.run(agent.as_ref(), constituent.as_ref()).await {
                eprintln!("supervision: {}", e);
            }
        });
    }

    task_bundle.join().await;
    Ok(())
}
