//! Migration orchestration
//!
//! [`Migratic`] drives one `migrate` invocation through initialize →
//! discover → order → reconcile → execute, committing work under the
//! configured [`TransactionStrategy`]. Migrations run strictly one after
//! another; later migrations may depend on earlier schema changes, so the
//! computed order is never reshuffled or parallelized.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::config::MigraticConfig;
use crate::error::{InitStage, MigraticError, MigraticResult};
use crate::history::{HistoryRecord, MigraticStatus};
use crate::migration::{Migration, TransactionStrategy};
use crate::providers::MigrationProvider;
use crate::store::HistoryStore;
use crate::version::MigrationVersion;

/// Observes each migration's execution. Hooks run in registration order;
/// `after_execute` sees the outcome but cannot veto or alter it.
#[async_trait]
pub trait MigrationHook: Send + Sync {
    async fn before_execute(&self, _migration: &Migration) {}

    async fn after_execute(&self, _migration: &Migration, _result: &MigraticResult<()>) {}
}

/// Result of one successful `migrate` run
#[derive(Debug, Clone)]
pub struct MigrationRunReport {
    /// Number of migrations applied in this run
    pub applied_count: usize,
    /// Versions applied, in execution order
    pub applied_versions: Vec<MigrationVersion>,
    /// Discovered migrations that were already applied
    pub skipped_count: usize,
    /// Total wall-clock time for the run
    pub execution_time_ms: u128,
}

/// Assembles a [`Migratic`] runner from explicit parts; there is no
/// ambient container or registry behind it
pub struct MigraticBuilder {
    config: MigraticConfig,
    providers: Vec<Box<dyn MigrationProvider>>,
    hooks: Vec<Box<dyn MigrationHook>>,
    store: Option<Arc<dyn HistoryStore>>,
}

impl MigraticBuilder {
    fn new() -> Self {
        Self {
            config: MigraticConfig::default(),
            providers: Vec::new(),
            hooks: Vec::new(),
            store: None,
        }
    }

    pub fn with_config(mut self, config: MigraticConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_provider(mut self, provider: Box<dyn MigrationProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_hook(mut self, hook: Box<dyn MigrationHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn build(self) -> MigraticResult<Migratic> {
        let store = self.store.ok_or_else(|| {
            MigraticError::Configuration("a history store is required".to_string())
        })?;
        Ok(Migratic {
            config: self.config,
            providers: self.providers,
            hooks: self.hooks,
            store,
        })
    }
}

/// Migration runner: discovers, orders, reconciles, and applies migrations
/// through a [`HistoryStore`]
pub struct Migratic {
    config: MigraticConfig,
    providers: Vec<Box<dyn MigrationProvider>>,
    hooks: Vec<Box<dyn MigrationHook>>,
    store: Arc<dyn HistoryStore>,
}

impl Migratic {
    pub fn builder() -> MigraticBuilder {
        MigraticBuilder::new()
    }

    pub fn config(&self) -> &MigraticConfig {
        &self.config
    }

    /// Apply every discovered migration newer than the highest version in
    /// the history ledger, under the configured transaction strategy.
    pub async fn migrate(&self) -> MigraticResult<MigrationRunReport> {
        let started = Instant::now();

        self.initialize().await?;

        let mut discovered = self.discover().await?;
        if discovered.is_empty() {
            info!("no migrations found");
            return Ok(self.report(Vec::new(), 0, started));
        }
        discovered.sort_by_key(|m| m.version());

        let history = self.store.get_history().await?;
        let discovered_count = discovered.len();
        let pending = unapplied_migrations(discovered, &history);
        let skipped_count = discovered_count - pending.len();

        if pending.is_empty() {
            info!("no migrations to apply");
            return Ok(self.report(Vec::new(), skipped_count, started));
        }

        info!(
            count = pending.len(),
            strategy = %self.config.transaction_strategy,
            "applying migrations"
        );

        let user = self.store.current_user().await?;
        let applied_versions = match self.config.transaction_strategy {
            TransactionStrategy::AllOrNothing => {
                self.execute_all_or_nothing(&pending, &user).await?
            }
            TransactionStrategy::PerMigration => {
                self.execute_per_migration(&pending, &user).await?
            }
        };

        Ok(self.report(applied_versions, skipped_count, started))
    }

    /// Read-only snapshot: full history, applied/failed partitions, and the
    /// migrations that a `migrate` call would apply next
    pub async fn status(&self) -> MigraticResult<MigraticStatus> {
        let history = self.store.get_history().await?;
        let mut discovered = self.discover().await?;
        discovered.sort_by_key(|m| m.version());
        let pending = unapplied_migrations(discovered, &history);
        let applied = history.iter().filter(|h| h.success).cloned().collect();
        let failed = history.iter().filter(|h| !h.success).cloned().collect();
        Ok(MigraticStatus {
            history,
            applied,
            failed,
            pending,
        })
    }

    fn report(
        &self,
        applied_versions: Vec<MigrationVersion>,
        skipped_count: usize,
        started: Instant,
    ) -> MigrationRunReport {
        MigrationRunReport {
            applied_count: applied_versions.len(),
            applied_versions,
            skipped_count,
            execution_time_ms: started.elapsed().as_millis(),
        }
    }

    /// Create the history schema and table when absent; both calls are
    /// gated on existence checks, so re-running is a no-op
    async fn initialize(&self) -> MigraticResult<()> {
        let schema_exists = self
            .store
            .history_schema_exists()
            .await
            .map_err(|e| initialization_error(InitStage::Schema, e))?;
        if !schema_exists {
            info!(schema = %self.config.schema, "history schema not found, creating it");
            self.store
                .create_history_schema()
                .await
                .map_err(|e| initialization_error(InitStage::Schema, e))?;
        }

        let table_exists = self
            .store
            .history_table_exists()
            .await
            .map_err(|e| initialization_error(InitStage::Table, e))?;
        if !table_exists {
            info!(table = %self.config.qualified_table(), "history table not found, creating it");
            self.store
                .create_history_table()
                .await
                .map_err(|e| initialization_error(InitStage::Table, e))?;
        }
        Ok(())
    }

    /// Collect migrations from every provider; any provider-level failure
    /// fails discovery for the whole run
    async fn discover(&self) -> MigraticResult<Vec<Migration>> {
        let mut discovered = Vec::new();
        for provider in &self.providers {
            let mut migrations = provider.get_migrations().await.map_err(|e| match e {
                err @ MigraticError::Discovery { .. } => err,
                other => MigraticError::Discovery {
                    provider: provider.name().to_string(),
                    cause: other.to_string(),
                },
            })?;
            debug!(
                provider = provider.name(),
                count = migrations.len(),
                "provider discovery complete"
            );
            discovered.append(&mut migrations);
        }
        Ok(discovered)
    }

    async fn execute_script(&self, migration: &Migration) -> MigraticResult<()> {
        for hook in &self.hooks {
            hook.before_execute(migration).await;
        }
        let result = self.store.execute_script(migration.script()).await;
        for hook in &self.hooks {
            hook.after_execute(migration, &result).await;
        }
        result
    }

    /// One scope for the whole run: a failure anywhere rolls back every
    /// migration in the batch, and history entries are inserted only after
    /// every script has succeeded
    async fn execute_all_or_nothing(
        &self,
        pending: &[Migration],
        user: &str,
    ) -> MigraticResult<Vec<MigrationVersion>> {
        self.store.begin_transaction().await?;
        for (index, migration) in pending.iter().enumerate() {
            info!(
                version = %migration.version(),
                description = migration.description(),
                "applying migration"
            );
            if let Err(e) = self.execute_script(migration).await {
                error!(
                    version = %migration.version(),
                    "migration failed, rolling back all migrations in this run"
                );
                self.rollback_scope().await;
                return Err(MigraticError::Execution {
                    version: migration.version(),
                    description: migration.description().to_string(),
                    committed: 0,
                    remaining: pending.len() - index - 1,
                    cause: e.to_string(),
                });
            }
        }

        let applied: Vec<Migration> = pending
            .iter()
            .map(|m| m.clone().mark_succeeded().with_applied_by(user))
            .collect();
        if let Err(e) = self.store.insert_history_entries(&applied).await {
            self.rollback_scope().await;
            return Err(MigraticError::Persistence {
                context: format!("batch of {} entries", applied.len()),
                cause: e.to_string(),
            });
        }
        self.store
            .commit_transaction()
            .await
            .map_err(|e| MigraticError::Persistence {
                context: "transaction commit".to_string(),
                cause: e.to_string(),
            })?;

        Ok(applied.iter().map(|m| m.version()).collect())
    }

    /// A fresh scope per migration: a failure keeps everything committed
    /// before it and reports how many migrations already went through
    async fn execute_per_migration(
        &self,
        pending: &[Migration],
        user: &str,
    ) -> MigraticResult<Vec<MigrationVersion>> {
        let mut applied_versions = Vec::new();
        for (index, migration) in pending.iter().enumerate() {
            info!(
                version = %migration.version(),
                description = migration.description(),
                "applying migration"
            );
            self.store.begin_transaction().await?;
            if let Err(e) = self.execute_script(migration).await {
                error!(
                    version = %migration.version(),
                    committed = index,
                    "migration failed, rolling back its scope"
                );
                self.rollback_scope().await;
                return Err(MigraticError::Execution {
                    version: migration.version(),
                    description: migration.description().to_string(),
                    committed: index,
                    remaining: pending.len() - index - 1,
                    cause: e.to_string(),
                });
            }

            let applied = migration.clone().mark_succeeded().with_applied_by(user);
            if let Err(e) = self.store.insert_history_entry(&applied).await {
                self.rollback_scope().await;
                return Err(MigraticError::Persistence {
                    context: format!("{} ({})", migration.version(), migration.description()),
                    cause: e.to_string(),
                });
            }
            self.store
                .commit_transaction()
                .await
                .map_err(|e| MigraticError::Persistence {
                    context: "transaction commit".to_string(),
                    cause: e.to_string(),
                })?;
            applied_versions.push(migration.version());
        }
        Ok(applied_versions)
    }

    /// The original failure is already on its way to the caller; a rollback
    /// failure on top of it is only logged
    async fn rollback_scope(&self) {
        if let Err(e) = self.store.rollback_transaction().await {
            error!(cause = %e, "rollback failed; the history table may need manual repair");
        }
    }
}

fn initialization_error(stage: InitStage, cause: MigraticError) -> MigraticError {
    MigraticError::Initialization {
        stage,
        cause: cause.to_string(),
    }
}

/// The to-apply set: every migration when nothing has been applied yet,
/// otherwise only those strictly newer than the highest recorded version.
/// History rows without a resolvable version carry no signal.
fn unapplied_migrations(migrations: Vec<Migration>, history: &[HistoryRecord]) -> Vec<Migration> {
    let max_applied = history.iter().filter_map(HistoryRecord::version).max();
    match max_applied {
        None => migrations,
        Some(max) => migrations
            .into_iter()
            .filter(|m| m.version() > max)
            .collect(),
    }
}
