//! Error types for migration orchestration
//!
//! Every fallible operation returns an explicit [`MigraticError`] value;
//! nothing panics across the orchestration boundary. Each layer adds its own
//! context as the error travels back to the caller, so the terminal result
//! names the first failure, the migration that caused it, and how much of the
//! run remains committed.

use std::fmt;

use crate::version::MigrationVersion;

/// Result type alias for migration operations
pub type MigraticResult<T> = Result<T, MigraticError>;

/// Which part of the history bootstrap failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    Schema,
    Table,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitStage::Schema => write!(f, "history schema"),
            InitStage::Table => write!(f, "history table"),
        }
    }
}

/// Error types for migration operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum MigraticError {
    /// Creating the history schema or table failed; the run never started
    #[error("failed to create {stage}: {cause}")]
    Initialization { stage: InitStage, cause: String },

    /// A migration source failed outright (I/O, decoding, registry).
    /// Individual unparseable entries are skipped, never reported here.
    #[error("migration provider '{provider}' failed: {cause}")]
    Discovery { provider: String, cause: String },

    /// A migration script failed against the database
    #[error(
        "migration {version} ({description}) failed, rolling back; \
         {committed} migration(s) committed, {remaining} not attempted: {cause}"
    )]
    Execution {
        version: MigrationVersion,
        description: String,
        /// Migrations from this run that remain committed
        committed: usize,
        /// Migrations that were never attempted
        remaining: usize,
        cause: String,
    },

    /// A migration applied but its history entry could not be recorded;
    /// the enclosing scope is rolled back rather than left unaudited
    #[error("failed to record migration history ({context}), rolling back: {cause}")]
    Persistence { context: String, cause: String },

    /// Raw failure from the history store, before the runner adds context
    #[error("history store error: {0}")]
    Store(String),

    /// The runner was assembled with an unusable configuration
    #[error("configuration error: {0}")]
    Configuration(String),
}
