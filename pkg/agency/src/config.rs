//! Ambient configuration surface (ADDED, §1.1): the CLI-facing struct this
//! node is started with, parsed via `common::args::parse_args`.

use common::args::list::CommaSeparated;
use common::errors::*;

use crate::agent::AgentConfig;

/// Command-line configuration for one agency node, mirroring
/// `datastore`'s `bin/metastore.rs` argument struct.
#[derive(Args)]
pub struct Config {
    /// This node's own id, as it appears in `pool` and `active`.
    pub id: String,

    /// Total number of agents in the cluster.
    pub size: usize,

    /// Ids of the agents currently considered part of the cluster.
    pub active: CommaSeparated<String>,

    /// `id=endpoint` pairs for every agent in the pool.
    pub pool: CommaSeparated<String>,

    #[arg(default = 150)]
    pub min_ping_ms: u64,

    #[arg(default = 300)]
    pub max_ping_ms: u64,

    #[arg(default = false)]
    pub wait_for_sync: bool,

    /// Directory used to persist the election record.
    pub dir: String,

    /// Poll interval of the supervision loop, in milliseconds (ADDED, §4.5a).
    #[arg(default = 1000)]
    pub supervision_poll_ms: u64,
}

impl Config {
    /// Builds the `AgentConfig` the Constituent/supervision layers consume,
    /// parsing each `pool` entry as `id=endpoint`.
    pub fn to_agent_config(&self) -> Result<AgentConfig> {
        let mut pool = Vec::with_capacity(self.pool.values.len());
        for entry in &self.pool.values {
            let mut parts = entry.splitn(2, '=');
            let id = parts
                .next()
                .ok_or_else(|| format_err!("Malformed pool entry: {}", entry))?;
            let endpoint = parts
                .next()
                .ok_or_else(|| format_err!("Malformed pool entry (missing '='): {}", entry))?;
            pool.push((id.to_string(), endpoint.to_string()));
        }

        Ok(AgentConfig {
            id: self.id.clone(),
            size: self.size,
            active: self.active.values.clone(),
            pool,
            min_ping_ms: self.min_ping_ms,
            max_ping_ms: self.max_ping_ms,
            wait_for_sync: self.wait_for_sync,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::args::{ArgType, RawArgValue};

    fn comma_separated(s: &str) -> CommaSeparated<String> {
        CommaSeparated::parse_raw_arg(RawArgValue::String(s.to_string())).unwrap()
    }

    #[test]
    fn parses_pool_entries() {
        let config = Config {
            id: "A".to_string(),
            size: 2,
            active: comma_separated("A,B"),
            pool: comma_separated("A=10.0.0.1:8000,B=10.0.0.2:8000"),
            min_ping_ms: 150,
            max_ping_ms: 300,
            wait_for_sync: false,
            dir: "/tmp/agency".to_string(),
            supervision_poll_ms: 1000,
        };

        let agent_config = config.to_agent_config().unwrap();
        assert_eq!(agent_config.endpoint("B"), Some("10.0.0.2:8000"));
    }
}
