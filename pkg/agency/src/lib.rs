//! Agency: a hierarchical replicated store plus the Raft-style election
//! state machine and supervision job framework that run on top of it.
//!
//! See the component breakdown in the crate's design notes: the `node`
//! module is the hierarchical store, `transaction` is the precondition/write
//! engine, `agent` is the facade supervision code consumes, `constituent` is
//! the leader-election role machine, and `job`/`supervision` are the
//! maintenance-job framework and its driving loop.

#[macro_use]
extern crate common;
#[macro_use]
extern crate macros;

pub mod agent;
pub mod config;
pub mod constituent;
pub mod job;
pub mod node;
pub mod run;
pub mod supervision;
pub mod transaction;

pub use agent::{Agent, AgentConfig, AgentInterface};
pub use config::Config;
pub use constituent::{Constituent, ElectionStore, FileElectionStore, MemoryElectionStore, Role};
pub use job::{Job, SupervisionJob};
pub use node::{Path, Value, WriteOperation};
pub use run::run;
pub use supervision::SupervisionLoop;
pub use transaction::{Precondition, Transaction, TransactionEngine};
