//! Runner behavior against an in-memory history store
//!
//! These tests drive the full initialize → discover → order → reconcile →
//! execute pipeline with a fake store that records every scope transition,
//! so rollback and partial-commit semantics are observable without a
//! database.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use migratic_core::{
    HistoryRecord, HistoryStore, InitStage, Migratic, MigraticConfig, MigraticError,
    MigraticResult, Migration, MigrationHook, MigrationProvider, MigrationType,
    MigrationVersion, TransactionStrategy,
};

#[derive(Default)]
struct StoreState {
    schema_exists: bool,
    table_exists: bool,
    /// Durable rows, visible to `get_history`
    committed: Vec<HistoryRecord>,
    /// Rows inserted inside the currently open scope
    scope_rows: Vec<HistoryRecord>,
    /// Scripts executed inside the currently open scope
    scope_scripts: Vec<String>,
    /// Scripts whose scope committed
    committed_scripts: Vec<String>,
    scope_open: bool,
    begins: usize,
    commits: usize,
    rollbacks: usize,
    next_id: i64,
}

#[derive(Default)]
struct FakeStore {
    state: Mutex<StoreState>,
    fail_schema_create: bool,
    fail_table_create: bool,
    /// Script text that fails when executed
    fail_on_script: Option<String>,
    fail_inserts: bool,
}

impl FakeStore {
    fn initialized() -> Self {
        let store = Self::default();
        {
            let mut state = store.state.lock().unwrap();
            state.schema_exists = true;
            state.table_exists = true;
        }
        store
    }

    fn with_history(records: Vec<HistoryRecord>) -> Self {
        let store = Self::initialized();
        store.state.lock().unwrap().committed = records;
        store
    }

    fn committed_rows(&self) -> Vec<HistoryRecord> {
        self.state.lock().unwrap().committed.clone()
    }

    fn committed_scripts(&self) -> Vec<String> {
        self.state.lock().unwrap().committed_scripts.clone()
    }

    fn counts(&self) -> (usize, usize, usize) {
        let state = self.state.lock().unwrap();
        (state.begins, state.commits, state.rollbacks)
    }

    fn record_for(&self, state: &mut StoreState, migration: &Migration) -> HistoryRecord {
        state.next_id += 1;
        let version = migration.version();
        HistoryRecord {
            id: state.next_id,
            major: version.major(),
            minor: version.minor(),
            patch: version.patch(),
            description: migration.description().to_string(),
            provider_type: self.provider_type().to_string(),
            checksum: migration.checksum().to_string(),
            applied_at: migration.applied_at().unwrap_or_else(Utc::now),
            applied_by: migration.applied_by().unwrap_or_default().to_string(),
            success: migration.success(),
        }
    }
}

#[async_trait]
impl HistoryStore for FakeStore {
    fn provider_type(&self) -> &str {
        "fake"
    }

    async fn history_schema_exists(&self) -> MigraticResult<bool> {
        Ok(self.state.lock().unwrap().schema_exists)
    }

    async fn history_table_exists(&self) -> MigraticResult<bool> {
        Ok(self.state.lock().unwrap().table_exists)
    }

    async fn create_history_schema(&self) -> MigraticResult<()> {
        if self.fail_schema_create {
            return Err(MigraticError::Store("permission denied".to_string()));
        }
        self.state.lock().unwrap().schema_exists = true;
        Ok(())
    }

    async fn create_history_table(&self) -> MigraticResult<()> {
        if self.fail_table_create {
            return Err(MigraticError::Store("permission denied".to_string()));
        }
        self.state.lock().unwrap().table_exists = true;
        Ok(())
    }

    async fn get_history(&self) -> MigraticResult<Vec<HistoryRecord>> {
        Ok(self.committed_rows())
    }

    async fn insert_history_entry(&self, migration: &Migration) -> MigraticResult<()> {
        if self.fail_inserts {
            return Err(MigraticError::Store("insert rejected".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        let record = self.record_for(&mut state, migration);
        state.scope_rows.push(record);
        Ok(())
    }

    async fn insert_history_entries(&self, migrations: &[Migration]) -> MigraticResult<()> {
        if self.fail_inserts {
            return Err(MigraticError::Store("insert rejected".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        for migration in migrations {
            let record = self.record_for(&mut state, migration);
            state.scope_rows.push(record);
        }
        Ok(())
    }

    async fn current_user(&self) -> MigraticResult<String> {
        Ok("fake_user".to_string())
    }

    async fn execute_script(&self, sql: &str) -> MigraticResult<()> {
        if self.fail_on_script.as_deref() == Some(sql) {
            return Err(MigraticError::Store("syntax error".to_string()));
        }
        self.state.lock().unwrap().scope_scripts.push(sql.to_string());
        Ok(())
    }

    async fn begin_transaction(&self) -> MigraticResult<()> {
        let mut state = self.state.lock().unwrap();
        assert!(!state.scope_open, "runner opened overlapping scopes");
        state.scope_open = true;
        state.begins += 1;
        Ok(())
    }

    async fn commit_transaction(&self) -> MigraticResult<()> {
        let mut state = self.state.lock().unwrap();
        assert!(state.scope_open, "commit without an open scope");
        state.scope_open = false;
        state.commits += 1;
        let rows = std::mem::take(&mut state.scope_rows);
        state.committed.extend(rows);
        let scripts = std::mem::take(&mut state.scope_scripts);
        state.committed_scripts.extend(scripts);
        Ok(())
    }

    async fn rollback_transaction(&self) -> MigraticResult<()> {
        let mut state = self.state.lock().unwrap();
        assert!(state.scope_open, "rollback without an open scope");
        state.scope_open = false;
        state.rollbacks += 1;
        state.scope_rows.clear();
        state.scope_scripts.clear();
        Ok(())
    }
}

struct StaticProvider {
    migrations: Vec<Migration>,
}

#[async_trait]
impl MigrationProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn get_migrations(&self) -> MigraticResult<Vec<Migration>> {
        Ok(self.migrations.clone())
    }
}

struct FailingProvider;

#[async_trait]
impl MigrationProvider for FailingProvider {
    fn name(&self) -> &str {
        "broken"
    }

    async fn get_migrations(&self) -> MigraticResult<Vec<Migration>> {
        Err(MigraticError::Store("registry unavailable".to_string()))
    }
}

fn versioned(major: i32, description: &str) -> Migration {
    Migration::new(
        MigrationType::Versioned,
        MigrationVersion::from_major(major).unwrap(),
        description,
        format!("-- {}\nSELECT {};", description, major),
    )
}

fn applied_record(major: i32) -> HistoryRecord {
    HistoryRecord {
        id: major as i64,
        major,
        minor: None,
        patch: None,
        description: format!("step_{}", major),
        provider_type: "fake".to_string(),
        checksum: String::new(),
        applied_at: Utc::now(),
        applied_by: "fake_user".to_string(),
        success: true,
    }
}

fn runner(
    store: Arc<FakeStore>,
    strategy: TransactionStrategy,
    migrations: Vec<Migration>,
) -> Migratic {
    let config = MigraticConfig {
        transaction_strategy: strategy,
        ..Default::default()
    };
    Migratic::builder()
        .with_config(config)
        .with_store(store)
        .with_provider(Box::new(StaticProvider { migrations }))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_schema_creation_failure_aborts_the_run() {
    let store = Arc::new(FakeStore {
        fail_schema_create: true,
        ..Default::default()
    });
    let migratic = runner(store.clone(), TransactionStrategy::PerMigration, vec![]);

    let err = migratic.migrate().await.unwrap_err();
    match err {
        MigraticError::Initialization { stage, .. } => assert_eq!(stage, InitStage::Schema),
        other => panic!("expected initialization error, got {:?}", other),
    }
    assert_eq!(store.counts(), (0, 0, 0));
}

#[tokio::test]
async fn test_table_creation_failure_aborts_the_run() {
    let store = Arc::new(FakeStore {
        fail_table_create: true,
        ..Default::default()
    });
    store.state.lock().unwrap().schema_exists = true;
    let migratic = runner(store.clone(), TransactionStrategy::PerMigration, vec![]);

    let err = migratic.migrate().await.unwrap_err();
    match err {
        MigraticError::Initialization { stage, .. } => assert_eq!(stage, InitStage::Table),
        other => panic!("expected initialization error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_initialization_creates_schema_and_table_once() {
    let store = Arc::new(FakeStore::default());
    let migratic = runner(store.clone(), TransactionStrategy::PerMigration, vec![]);

    let report = migratic.migrate().await.unwrap();
    assert_eq!(report.applied_count, 0);
    {
        let state = store.state.lock().unwrap();
        assert!(state.schema_exists);
        assert!(state.table_exists);
    }

    // second run finds both present and succeeds trivially
    let report = migratic.migrate().await.unwrap();
    assert_eq!(report.applied_count, 0);
}

#[tokio::test]
async fn test_provider_failure_fails_discovery() {
    let store = Arc::new(FakeStore::initialized());
    let config = MigraticConfig::default();
    let migratic = Migratic::builder()
        .with_config(config)
        .with_store(store.clone())
        .with_provider(Box::new(StaticProvider {
            migrations: vec![versioned(1, "init")],
        }))
        .with_provider(Box::new(FailingProvider))
        .build()
        .unwrap();

    let err = migratic.migrate().await.unwrap_err();
    match err {
        MigraticError::Discovery { provider, .. } => assert_eq!(provider, "broken"),
        other => panic!("expected discovery error, got {:?}", other),
    }
    // nothing was executed or recorded
    assert_eq!(store.counts(), (0, 0, 0));
    assert!(store.committed_rows().is_empty());
}

#[tokio::test]
async fn test_applies_only_migrations_newer_than_max_applied() {
    let store = Arc::new(FakeStore::with_history(vec![applied_record(1)]));
    // discovery order is shuffled on purpose; execution must be sorted
    let migratic = runner(
        store.clone(),
        TransactionStrategy::PerMigration,
        vec![
            versioned(3, "seed"),
            versioned(1, "init"),
            versioned(2, "add_col"),
        ],
    );

    let report = migratic.migrate().await.unwrap();
    assert_eq!(report.applied_count, 2);
    assert_eq!(report.skipped_count, 1);
    assert_eq!(
        report.applied_versions,
        vec![
            MigrationVersion::from_major(2).unwrap(),
            MigrationVersion::from_major(3).unwrap(),
        ]
    );

    let scripts = store.committed_scripts();
    assert_eq!(scripts.len(), 2);
    assert!(scripts[0].contains("add_col"));
    assert!(scripts[1].contains("seed"));
}

#[tokio::test]
async fn test_empty_history_applies_everything_in_order() {
    let store = Arc::new(FakeStore::initialized());
    let migratic = runner(
        store.clone(),
        TransactionStrategy::PerMigration,
        vec![versioned(2, "add_col"), versioned(1, "init")],
    );

    let report = migratic.migrate().await.unwrap();
    assert_eq!(report.applied_count, 2);
    assert_eq!(report.skipped_count, 0);

    let rows = store.committed_rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].major, 1);
    assert_eq!(rows[1].major, 2);
}

#[tokio::test]
async fn test_all_or_nothing_rolls_back_everything_on_failure() {
    let failing = versioned(2, "add_col");
    let store = Arc::new(FakeStore {
        fail_on_script: Some(failing.script().to_string()),
        ..FakeStore::initialized()
    });
    let migratic = runner(
        store.clone(),
        TransactionStrategy::AllOrNothing,
        vec![versioned(1, "init"), failing, versioned(3, "seed")],
    );

    let err = migratic.migrate().await.unwrap_err();
    match err {
        MigraticError::Execution {
            version,
            committed,
            remaining,
            ..
        } => {
            assert_eq!(version, MigrationVersion::from_major(2).unwrap());
            assert_eq!(committed, 0);
            assert_eq!(remaining, 1);
        }
        other => panic!("expected execution error, got {:?}", other),
    }

    // no history rows, no committed scripts, one rolled-back scope
    assert!(store.committed_rows().is_empty());
    assert!(store.committed_scripts().is_empty());
    assert_eq!(store.counts(), (1, 0, 1));
}

#[tokio::test]
async fn test_all_or_nothing_commits_one_scope_with_batch_history() {
    let store = Arc::new(FakeStore::initialized());
    let migratic = runner(
        store.clone(),
        TransactionStrategy::AllOrNothing,
        vec![versioned(1, "init"), versioned(2, "add_col")],
    );

    let report = migratic.migrate().await.unwrap();
    assert_eq!(report.applied_count, 2);
    assert_eq!(store.counts(), (1, 1, 0));
    assert_eq!(store.committed_rows().len(), 2);
}

#[tokio::test]
async fn test_per_migration_failure_keeps_earlier_commits() {
    let failing = versioned(3, "seed");
    let store = Arc::new(FakeStore {
        fail_on_script: Some(failing.script().to_string()),
        ..FakeStore::initialized()
    });
    let migratic = runner(
        store.clone(),
        TransactionStrategy::PerMigration,
        vec![versioned(1, "init"), versioned(2, "add_col"), failing],
    );

    let err = migratic.migrate().await.unwrap_err();
    match err {
        MigraticError::Execution {
            version,
            committed,
            remaining,
            ..
        } => {
            assert_eq!(version, MigrationVersion::from_major(3).unwrap());
            assert_eq!(committed, 2);
            assert_eq!(remaining, 0);
        }
        other => panic!("expected execution error, got {:?}", other),
    }

    // the two earlier migrations stay committed and recorded
    let rows = store.committed_rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].major, 1);
    assert_eq!(rows[1].major, 2);
    assert_eq!(store.counts(), (3, 2, 1));
}

#[tokio::test]
async fn test_rerun_with_nothing_pending_writes_nothing() {
    let store = Arc::new(FakeStore::with_history(vec![
        applied_record(1),
        applied_record(2),
    ]));
    let migratic = runner(
        store.clone(),
        TransactionStrategy::PerMigration,
        vec![versioned(1, "init"), versioned(2, "add_col")],
    );

    let report = migratic.migrate().await.unwrap();
    assert_eq!(report.applied_count, 0);
    assert_eq!(report.skipped_count, 2);
    assert_eq!(store.counts(), (0, 0, 0));
    assert_eq!(store.committed_rows().len(), 2);
}

#[tokio::test]
async fn test_history_insert_failure_rolls_back_the_scope() {
    let store = Arc::new(FakeStore {
        fail_inserts: true,
        ..FakeStore::initialized()
    });
    let migratic = runner(
        store.clone(),
        TransactionStrategy::PerMigration,
        vec![versioned(1, "init")],
    );

    let err = migratic.migrate().await.unwrap_err();
    assert!(matches!(err, MigraticError::Persistence { .. }));
    // the applied-but-unrecorded change must not survive
    assert!(store.committed_scripts().is_empty());
    assert_eq!(store.counts(), (1, 0, 1));
}

#[tokio::test]
async fn test_history_rows_are_stamped() {
    let store = Arc::new(FakeStore::initialized());
    let migration = versioned(1, "init");
    let expected_checksum = migration.checksum().to_string();
    let migratic = runner(
        store.clone(),
        TransactionStrategy::PerMigration,
        vec![migration],
    );

    migratic.migrate().await.unwrap();

    let rows = store.committed_rows();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].success);
    assert_eq!(rows[0].applied_by, "fake_user");
    assert_eq!(rows[0].checksum, expected_checksum);
    assert_eq!(rows[0].description, "init");
}

#[tokio::test]
async fn test_status_reports_pending_and_partitions_history() {
    let mut failed = applied_record(2);
    failed.success = false;
    let store = Arc::new(FakeStore::with_history(vec![applied_record(1), failed]));
    let migratic = runner(
        store.clone(),
        TransactionStrategy::PerMigration,
        vec![versioned(1, "init"), versioned(3, "seed")],
    );

    let status = migratic.status().await.unwrap();
    assert_eq!(status.history.len(), 2);
    assert_eq!(status.applied.len(), 1);
    assert_eq!(status.failed.len(), 1);
    // max applied version is 2, so only V3 is pending
    assert_eq!(status.pending.len(), 1);
    assert_eq!(
        status.pending[0].version(),
        MigrationVersion::from_major(3).unwrap()
    );
    // status never writes
    assert_eq!(store.counts(), (0, 0, 0));
}

struct CountingHook {
    before: AtomicUsize,
    after: AtomicUsize,
}

#[async_trait]
impl MigrationHook for CountingHook {
    async fn before_execute(&self, _migration: &Migration) {
        self.before.fetch_add(1, Ordering::SeqCst);
    }

    async fn after_execute(&self, _migration: &Migration, result: &MigraticResult<()>) {
        if result.is_ok() {
            self.after.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn test_hooks_wrap_each_execution() {
    let store = Arc::new(FakeStore::initialized());
    let hook = Arc::new(CountingHook {
        before: AtomicUsize::new(0),
        after: AtomicUsize::new(0),
    });

    struct SharedHook(Arc<CountingHook>);

    #[async_trait]
    impl MigrationHook for SharedHook {
        async fn before_execute(&self, migration: &Migration) {
            self.0.before_execute(migration).await;
        }

        async fn after_execute(&self, migration: &Migration, result: &MigraticResult<()>) {
            self.0.after_execute(migration, result).await;
        }
    }

    let migratic = Migratic::builder()
        .with_store(store)
        .with_provider(Box::new(StaticProvider {
            migrations: vec![versioned(1, "init"), versioned(2, "add_col")],
        }))
        .with_hook(Box::new(SharedHook(hook.clone())))
        .build()
        .unwrap();

    migratic.migrate().await.unwrap();
    assert_eq!(hook.before.load(Ordering::SeqCst), 2);
    assert_eq!(hook.after.load(Ordering::SeqCst), 2);
}
