//! The transaction engine (component B): applies arrays of
//! `{writes, preconditions}` atomically against a single in-memory tree.

use common::async_std::sync::Mutex;
use common::errors::*;

use crate::node::{apply_write, Path, Value, WriteOperation};

/// A predicate evaluated against the pre-transaction snapshot. All
/// predicates in a transaction evaluate against the same snapshot; if any
/// fails, none of the transaction's writes apply.
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    /// The node must equal this exact value.
    Equals(Value),
    /// The node must be empty (absent or `Null`) if `true`, non-empty if `false`.
    OldEmpty(bool),
    /// The node must (not) be an array.
    IsArray(bool),
    /// The node (an array) must contain this value.
    In(Value),
    /// The node (an array) must not contain this value.
    NotIn(Value),
    /// The node must equal this exact value (named distinctly from `Equals`
    /// to mirror the source's `old` precondition key, which is evaluated
    /// identically).
    Old(Value),
}

impl Precondition {
    fn evaluate(&self, snapshot: &Value, path: &Path) -> bool {
        let node = snapshot.get_path(path);

        match self {
            Precondition::Equals(expected) | Precondition::Old(expected) => {
                node == Some(expected)
            }
            Precondition::OldEmpty(expect_empty) => {
                let is_empty = match node {
                    None => true,
                    Some(v) => v.is_null(),
                };
                is_empty == *expect_empty
            }
            Precondition::IsArray(expect_array) => {
                let is_array = node.map(|v| v.is_array()).unwrap_or(false);
                is_array == *expect_array
            }
            Precondition::In(needle) => node.map(|v| v.contains(needle)).unwrap_or(false),
            Precondition::NotIn(needle) => !node.map(|v| v.contains(needle)).unwrap_or(false),
        }
    }
}

/// One `{writes, preconditions}` transaction, built via `TransactionBuilder`.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    writes: Vec<(Path, WriteOperation)>,
    preconditions: Vec<(Path, Precondition)>,
}

impl Transaction {
    pub fn builder() -> TransactionBuilder {
        TransactionBuilder::default()
    }

    pub fn writes(&self) -> &[(Path, WriteOperation)] {
        &self.writes
    }

    pub fn preconditions(&self) -> &[(Path, Precondition)] {
        &self.preconditions
    }

    fn precondition_holds(&self, snapshot: &Value) -> bool {
        self.preconditions
            .iter()
            .all(|(path, pred)| pred.evaluate(snapshot, path))
    }
}

/// Typed builder replacing the source's ad-hoc open/close object DSL (§9).
#[derive(Debug, Default)]
pub struct TransactionBuilder {
    writes: Vec<(Path, WriteOperation)>,
    preconditions: Vec<(Path, Precondition)>,
}

impl TransactionBuilder {
    pub fn write(mut self, path: impl Into<Path>, op: WriteOperation) -> Self {
        self.writes.push((path.into(), op));
        self
    }

    pub fn set(self, path: impl Into<Path>, value: impl Into<Value>) -> Self {
        self.write(path, WriteOperation::Set(value.into()))
    }

    pub fn delete(self, path: impl Into<Path>) -> Self {
        self.write(path, WriteOperation::Delete)
    }

    pub fn merge(self, path: impl Into<Path>, value: impl Into<Value>) -> Self {
        self.write(path, WriteOperation::Merge(value.into()))
    }

    pub fn push(self, path: impl Into<Path>, value: impl Into<Value>) -> Self {
        self.write(path, WriteOperation::Push(value.into()))
    }

    pub fn precondition(mut self, path: impl Into<Path>, pred: Precondition) -> Self {
        self.preconditions.push((path.into(), pred));
        self
    }

    pub fn build(self) -> Transaction {
        Transaction {
            writes: self.writes,
            preconditions: self.preconditions,
        }
    }
}

/// Index into the replicated log; `0` means "rejected, never logged".
pub type LogIndex = u64;

#[derive(Debug, Clone, Default)]
pub struct TransactResult {
    pub indices: Vec<LogIndex>,
}

impl TransactResult {
    pub fn accepted(&self, i: usize) -> bool {
        self.indices.get(i).copied().unwrap_or(0) != 0
    }
}

struct EngineState {
    store: Value,
    next_index: LogIndex,
}

/// Applies batches of transactions atomically against a single shared tree.
///
/// Grounded on `TransactionManager::execute`/`verify_reads` in the teacher's
/// metastore: every transaction's preconditions are re-verified against one
/// snapshot taken under the lock immediately before its writes are applied.
pub struct TransactionEngine {
    state: Mutex<EngineState>,
}

impl TransactionEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EngineState {
                store: Value::empty_object(),
                next_index: 1,
            }),
        }
    }

    pub async fn snapshot(&self) -> Value {
        self.state.lock().await.store.clone()
    }

    /// Runs every transaction in `batch` against the same shared store,
    /// committing each in turn and producing one log index per input
    /// transaction (0 = rejected by its own preconditions).
    pub async fn execute(&self, batch: Vec<Transaction>) -> Result<TransactResult> {
        let mut state = self.state.lock().await;
        let mut indices = Vec::with_capacity(batch.len());

        for transaction in &batch {
            let snapshot = state.store.clone();
            if !transaction.precondition_holds(&snapshot) {
                indices.push(0);
                continue;
            }

            for (path, op) in transaction.writes.clone() {
                apply_write(&mut state.store, &path, op)?;
            }

            let index = state.next_index;
            state.next_index += 1;
            indices.push(index);
        }

        Ok(TransactResult { indices })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[testcase]
    async fn precondition_gates_the_whole_transaction() -> Result<()> {
        let engine = TransactionEngine::new();

        let create = Transaction::builder().set("/a", "one").build();
        let result = engine.execute(vec![create]).await?;
        assert!(result.accepted(0));

        let conflicting = Transaction::builder()
            .set("/a", "two")
            .precondition("/a", Precondition::Equals(Value::from("wrong")))
            .build();
        let result = engine.execute(vec![conflicting]).await?;
        assert!(!result.accepted(0));

        assert_eq!(
            engine.snapshot().await.get_path(&Path::parse("/a")),
            Some(&Value::from("one"))
        );
        Ok(())
    }

    #[testcase]
    async fn old_empty_precondition_guards_resource_acquisition() -> Result<()> {
        let engine = TransactionEngine::new();

        let acquire = Transaction::builder()
            .set("/Supervision/DBServers/S", Value::from("job-1"))
            .precondition("/Supervision/DBServers/S", Precondition::OldEmpty(true))
            .build();

        let first = engine.execute(vec![acquire.clone()]).await?;
        assert!(first.accepted(0));

        let second = engine.execute(vec![acquire]).await?;
        assert!(!second.accepted(0));
        Ok(())
    }

    #[testcase]
    async fn indices_are_monotone_across_a_batch() -> Result<()> {
        let engine = TransactionEngine::new();

        let batch = vec![
            Transaction::builder().set("/a", "1").build(),
            Transaction::builder().set("/b", "2").build(),
        ];

        let result = engine.execute(batch).await?;
        assert_eq!(result.indices, vec![1, 2]);
        Ok(())
    }
}
