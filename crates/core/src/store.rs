//! History persistence boundary
//!
//! The store owns the database connection and the history ledger; the
//! runner drives it through this trait and never touches SQL dialects or
//! connection handling itself.

use async_trait::async_trait;

use crate::error::MigraticResult;
use crate::history::HistoryRecord;
use crate::migration::Migration;

/// Persistence collaborator for the applied-migration ledger.
///
/// One implementation owns one database connection. The runner opens at
/// most one transactional scope at a time via [`begin_transaction`] /
/// [`commit_transaction`] / [`rollback_transaction`] and runs every script
/// and history write inside it; an open scope always runs to commit or
/// rollback before the call returns. Two runner processes sharing one
/// history table require external mutual exclusion — no locking primitive
/// is provided here, and concurrent runs can race on already-applied
/// detection.
///
/// [`begin_transaction`]: HistoryStore::begin_transaction
/// [`commit_transaction`]: HistoryStore::commit_transaction
/// [`rollback_transaction`]: HistoryStore::rollback_transaction
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Tag recorded in each history row's `provider_type` column
    fn provider_type(&self) -> &str;

    async fn history_schema_exists(&self) -> MigraticResult<bool>;

    async fn history_table_exists(&self) -> MigraticResult<bool>;

    /// Create the history schema; callers gate this on
    /// [`history_schema_exists`](HistoryStore::history_schema_exists)
    async fn create_history_schema(&self) -> MigraticResult<()>;

    /// Create the history table; callers gate this on
    /// [`history_table_exists`](HistoryStore::history_table_exists)
    async fn create_history_table(&self) -> MigraticResult<()>;

    async fn get_history(&self) -> MigraticResult<Vec<HistoryRecord>>;

    async fn insert_history_entry(&self, migration: &Migration) -> MigraticResult<()>;

    /// Insert a batch of entries; runs inside the caller's open scope, so
    /// the batch commits or rolls back as one unit
    async fn insert_history_entries(&self, migrations: &[Migration]) -> MigraticResult<()>;

    /// Identity stamped into `applied_by` on inserted rows
    async fn current_user(&self) -> MigraticResult<String>;

    /// Run one migration script inside the currently open scope
    async fn execute_script(&self, sql: &str) -> MigraticResult<()>;

    async fn begin_transaction(&self) -> MigraticResult<()>;

    async fn commit_transaction(&self) -> MigraticResult<()>;

    async fn rollback_transaction(&self) -> MigraticResult<()>;
}
