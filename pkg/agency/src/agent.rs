//! The Agent Interface (component C): the facade supervision code uses to
//! submit transactions and read cluster configuration.

use common::async_std::sync::Mutex;
use common::errors::*;

use crate::node::Value;
use crate::transaction::{Transaction, TransactionEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ok,
    Timeout,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastLog {
    pub index: u64,
    pub term: u64,
}

/// Cluster configuration as read by the Constituent and supervision layers.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub id: String,
    pub size: usize,
    pub active: Vec<String>,
    pub pool: Vec<(String, String)>,
    pub min_ping_ms: u64,
    pub max_ping_ms: u64,
    pub wait_for_sync: bool,
}

impl AgentConfig {
    pub fn endpoint(&self, id: &str) -> Option<&str> {
        self.pool
            .iter()
            .find(|(peer, _)| peer == id)
            .map(|(_, endpoint)| endpoint.as_str())
    }

    pub fn peers(&self) -> impl Iterator<Item = &str> {
        self.active.iter().filter(move |id| *id != &self.id).map(|id| id.as_str())
    }
}

/// The surface supervision code consumes. Deliberately a trait: job unit
/// tests swap in a recording double that asserts the exact transaction
/// payload (mirrors the source's `Mock<AgentInterface>`).
#[async_trait]
pub trait AgentInterface: Send + Sync {
    async fn write(&self, transaction: Transaction) -> Result<u64> {
        let indices = self.transact(vec![transaction]).await?;
        Ok(indices.into_iter().next().unwrap_or(0))
    }

    async fn transact(&self, batch: Vec<Transaction>) -> Result<Vec<u64>>;

    async fn wait_for(&self, index: u64) -> Result<WaitOutcome>;

    /// A consistent point-in-time read of the whole tree (the source's
    /// "read_db" view) — what supervision jobs plan their transactions
    /// against.
    async fn read_db(&self) -> Value;

    fn config(&self) -> &AgentConfig;

    fn last_log(&self) -> LastLog;

    /// Invoked by the Constituent on transition to LEADER to rebuild
    /// leader-only caches (the source's "spearhead"/"read_db" views).
    async fn lead(&self);
}

/// The real implementation: an in-process `TransactionEngine` plus the
/// static `AgentConfig` this node was started with.
pub struct Agent {
    engine: TransactionEngine,
    config: AgentConfig,
    committed: Mutex<u64>,
    on_lead: std::sync::Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            engine: TransactionEngine::new(),
            config,
            committed: Mutex::new(0),
            on_lead: std::sync::Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &TransactionEngine {
        &self.engine
    }

    /// Registers the hook `lead()` invokes on a transition to LEADER.
    /// Used to wire the supervision loop's early wakeup (§4.5a) without
    /// this module depending on it directly.
    pub fn set_on_lead(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.on_lead.lock().unwrap() = Some(Box::new(callback));
    }
}

#[async_trait]
impl AgentInterface for Agent {
    async fn transact(&self, batch: Vec<Transaction>) -> Result<Vec<u64>> {
        let result = self.engine.execute(batch).await?;

        let mut committed = self.committed.lock().await;
        if let Some(max) = result.indices.iter().copied().max() {
            if max > *committed {
                *committed = max;
            }
        }

        Ok(result.indices)
    }

    async fn wait_for(&self, index: u64) -> Result<WaitOutcome> {
        if index == 0 {
            return Ok(WaitOutcome::Ok);
        }

        let committed = self.committed.lock().await;
        if *committed >= index {
            Ok(WaitOutcome::Ok)
        } else {
            Ok(WaitOutcome::Unknown)
        }
    }

    async fn read_db(&self) -> Value {
        self.engine.snapshot().await
    }

    fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn last_log(&self) -> LastLog {
        LastLog {
            index: 0,
            term: 0,
        }
    }

    async fn lead(&self) {
        eprintln!("agent[{}]: rebuilding leader caches", self.config.id);
        if let Some(callback) = self.on_lead.lock().unwrap().as_ref() {
            callback();
        }
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use common::async_std::sync::Mutex as AsyncMutex;

    /// Runs a real `TransactionEngine` (so jobs see realistic
    /// accept/reject behavior and `read_db()` reflects prior writes) while
    /// also recording every submitted batch verbatim, so job unit tests can
    /// assert the exact transaction shape the source's `AddFollowerTest`
    /// checks for (the `Mock<AgentInterface>` / `fakeWriteResult` pattern).
    pub struct MockAgent {
        pub config: AgentConfig,
        engine: TransactionEngine,
        pub submitted: AsyncMutex<Vec<Transaction>>,
    }

    impl MockAgent {
        pub fn new(config: AgentConfig) -> Self {
            Self {
                config,
                engine: TransactionEngine::new(),
                submitted: AsyncMutex::new(vec![]),
            }
        }

        /// Seeds the backing tree by running a single unconditional write
        /// transaction before the test proceeds.
        pub async fn seed(&self, write: Transaction) {
            self.engine.execute(vec![write]).await.unwrap();
        }

        pub async fn submitted_transactions(&self) -> Vec<Transaction> {
            self.submitted.lock().await.clone()
        }
    }

    #[async_trait]
    impl AgentInterface for MockAgent {
        async fn transact(&self, batch: Vec<Transaction>) -> Result<Vec<u64>> {
            {
                let mut submitted = self.submitted.lock().await;
                submitted.extend(batch.iter().cloned());
            }
            let result = self.engine.execute(batch).await?;
            Ok(result.indices)
        }

        async fn wait_for(&self, _index: u64) -> Result<WaitOutcome> {
            Ok(WaitOutcome::Ok)
        }

        async fn read_db(&self) -> Value {
            self.engine.snapshot().await
        }

        fn config(&self) -> &AgentConfig {
            &self.config
        }

        fn last_log(&self) -> LastLog {
            LastLog { index: 0, term: 0 }
        }

        async fn lead(&self) {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Value;
    use crate::transaction::Precondition;

    fn test_config() -> AgentConfig {
        AgentConfig {
            id: "A".to_string(),
            size: 1,
            active: vec!["A".to_string()],
            pool: vec![("A".to_string(), "localhost:9000".to_string())],
            min_ping_ms: 150,
            max_ping_ms: 300,
            wait_for_sync: false,
        }
    }

    #[testcase]
    async fn write_returns_zero_when_rejected() -> Result<()> {
        let agent = Agent::new(test_config());

        let create = Transaction::builder().set("/a", "one").build();
        let index = agent.write(create).await?;
        assert!(index > 0);

        let conflicting = Transaction::builder()
            .set("/a", "two")
            .precondition("/a", Precondition::Equals(Value::from("nope")))
            .build();
        let index = agent.write(conflicting).await?;
        assert_eq!(index, 0);

        Ok(())
    }

    #[testcase]
    async fn wait_for_reports_ok_once_committed() -> Result<()> {
        let agent = Agent::new(test_config());

        let create = Transaction::builder().set("/a", "one").build();
        let index = agent.write(create).await?;

        assert_eq!(agent.wait_for(index).await?, WaitOutcome::Ok);
        Ok(())
    }
}
