//! Persisted history records
//!
//! One row per attempted migration. Rows are created by the history store
//! on insert and are read-only to the core afterwards; this core never
//! deletes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::migration::Migration;
use crate::version::MigrationVersion;

/// One row of the applied-migration ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: i64,
    pub major: i32,
    pub minor: Option<i32>,
    pub patch: Option<i32>,
    pub description: String,
    /// Tag of the store that applied the migration
    pub provider_type: String,
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
    pub applied_by: String,
    pub success: bool,
}

impl HistoryRecord {
    /// Version reconstructed from the stored components; `None` when the
    /// stored values are invalid. Records without a resolvable version are
    /// excluded from reconciliation rather than failing it.
    pub fn version(&self) -> Option<MigrationVersion> {
        MigrationVersion::new(self.major, self.minor, self.patch)
    }
}

/// Read-only snapshot of the ledger and the pending set
#[derive(Debug, Clone)]
pub struct MigraticStatus {
    /// Every recorded attempt, as returned by the store
    pub history: Vec<HistoryRecord>,
    /// Rows recorded as successful
    pub applied: Vec<HistoryRecord>,
    /// Rows recorded as failed
    pub failed: Vec<HistoryRecord>,
    /// Discovered migrations newer than the highest applied version
    pub pending: Vec<Migration>,
}
