//! Code-registered migration discovery

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::MigrationProvider;
use crate::config::MigraticConfig;
use crate::error::MigraticResult;
use crate::migration::Migration;
use crate::naming;

/// A migration implemented in code rather than as a script on disk.
///
/// The handle name follows the same convention as script file names, minus
/// the extension, e.g. `V3__backfill_totals`.
pub trait CodeMigration: Send + Sync {
    /// Handle name carrying the type prefix, version, and description
    fn name(&self) -> &str;

    /// SQL to execute for this migration
    fn script(&self) -> String;
}

/// Serves migrations registered directly with the runner
pub struct CodeMigrationProvider {
    config: MigraticConfig,
    registrations: Vec<Arc<dyn CodeMigration>>,
}

impl CodeMigrationProvider {
    pub fn new(config: MigraticConfig, registrations: Vec<Arc<dyn CodeMigration>>) -> Self {
        Self {
            config,
            registrations,
        }
    }
}

#[async_trait]
impl MigrationProvider for CodeMigrationProvider {
    fn name(&self) -> &str {
        "code registrations"
    }

    async fn get_migrations(&self) -> MigraticResult<Vec<Migration>> {
        let mut migrations = Vec::new();
        for registration in &self.registrations {
            let handle = registration.name();
            let parsed = match naming::parse_script_name(handle, &self.config) {
                Some(parsed) => parsed,
                None => {
                    debug!(handle, "skipping code migration with unparseable handle name");
                    continue;
                }
            };
            migrations.push(Migration::new(
                parsed.migration_type,
                parsed.version,
                parsed.description,
                registration.script(),
            ));
        }
        Ok(migrations)
    }
}
