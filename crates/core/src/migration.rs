//! Migration records and their classification
//!
//! A [`Migration`] is an immutable unit of schema change produced by a
//! provider at discovery time. Post-execution state (`applied_at`,
//! `applied_by`, `success`) is only ever set by producing a new value.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::version::MigrationVersion;

/// Kinds of migration, distinguished by their configured name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MigrationType {
    /// Applied once, in version order
    Versioned,
    /// Intended to be re-runnable; still carries a version for ordering
    Repeatable,
    /// Marks an existing schema as the starting point
    Baseline,
}

impl MigrationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationType::Versioned => "Versioned",
            MigrationType::Repeatable => "Repeatable",
            MigrationType::Baseline => "Baseline",
        }
    }
}

impl fmt::Display for MigrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Policy governing how a run's migrations are committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStrategy {
    /// Each migration commits in its own transactional scope; a failure
    /// keeps everything committed before it
    PerMigration,
    /// The whole run shares one scope; a failure rolls everything back
    AllOrNothing,
}

impl TransactionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStrategy::PerMigration => "PerMigration",
            TransactionStrategy::AllOrNothing => "AllOrNothing",
        }
    }
}

impl fmt::Display for TransactionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One versioned, checksummed unit of schema change
#[derive(Debug, Clone)]
pub struct Migration {
    migration_type: MigrationType,
    version: MigrationVersion,
    description: String,
    script: String,
    checksum: OnceCell<String>,
    applied_at: Option<DateTime<Utc>>,
    applied_by: Option<String>,
    success: bool,
}

impl Migration {
    pub fn new(
        migration_type: MigrationType,
        version: MigrationVersion,
        description: impl Into<String>,
        script: impl Into<String>,
    ) -> Self {
        Self {
            migration_type,
            version,
            description: description.into(),
            script: script.into(),
            checksum: OnceCell::new(),
            applied_at: None,
            applied_by: None,
            success: false,
        }
    }

    pub fn migration_type(&self) -> MigrationType {
        self.migration_type
    }

    pub fn version(&self) -> MigrationVersion {
        self.version
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    /// Uppercase hex SHA-256 of the script text, computed on first access
    /// and cached. Hashing always uses the script's UTF-8 bytes, independent
    /// of the encoding the script was read with, so identical text yields an
    /// identical checksum on every platform.
    pub fn checksum(&self) -> &str {
        self.checksum
            .get_or_init(|| hex::encode_upper(Sha256::digest(self.script.as_bytes())))
    }

    pub fn applied_at(&self) -> Option<DateTime<Utc>> {
        self.applied_at
    }

    pub fn applied_by(&self) -> Option<&str> {
        self.applied_by.as_deref()
    }

    pub fn success(&self) -> bool {
        self.success
    }

    /// New value marked successful and stamped with the current time
    pub fn mark_succeeded(self) -> Self {
        Self {
            success: true,
            applied_at: Some(Utc::now()),
            ..self
        }
    }

    /// New value stamped with the identity that applied it
    pub fn with_applied_by(self, applied_by: impl Into<String>) -> Self {
        Self {
            applied_by: Some(applied_by.into()),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Migration {
        Migration::new(
            MigrationType::Versioned,
            MigrationVersion::from_major(1).unwrap(),
            "create_users",
            "CREATE TABLE users (id BIGINT PRIMARY KEY);",
        )
    }

    #[test]
    fn test_checksum_is_deterministic() {
        let a = sample();
        let b = sample();
        assert_eq!(a.checksum(), b.checksum());
        // cached value survives repeated access
        assert_eq!(a.checksum(), a.checksum());
    }

    #[test]
    fn test_checksum_is_uppercase_hex() {
        let migration = sample();
        let checksum = migration.checksum();
        assert_eq!(checksum.len(), 64);
        assert!(checksum
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_checksum_changes_with_script() {
        let a = sample();
        let b = Migration::new(
            MigrationType::Versioned,
            MigrationVersion::from_major(1).unwrap(),
            "create_users",
            "CREATE TABLE users (id BIGINT PRIMARY KEY) ;",
        );
        assert_ne!(a.checksum(), b.checksum());
    }

    #[test]
    fn test_mark_succeeded_produces_new_value() {
        let migration = sample();
        assert!(!migration.success());
        assert!(migration.applied_at().is_none());

        let applied = migration.mark_succeeded();
        assert!(applied.success());
        assert!(applied.applied_at().is_some());
    }

    #[test]
    fn test_with_applied_by() {
        let applied = sample().mark_succeeded().with_applied_by("deploy_user");
        assert_eq!(applied.applied_by(), Some("deploy_user"));
        assert!(applied.success());
    }
}
