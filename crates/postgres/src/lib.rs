//! # migratic-postgres: PostgreSQL history store
//!
//! `sqlx`-backed implementation of [`HistoryStore`] over a single dedicated
//! connection. The runner drives `BEGIN`/`COMMIT`/`ROLLBACK` on that
//! connection one scope at a time, so migration scripts and their history
//! entries share a transaction.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Connection, Executor, Row};
use tokio::sync::Mutex;
use tracing::debug;

use migratic_core::{
    HistoryRecord, HistoryStore, MigraticConfig, MigraticError, MigraticResult, Migration,
};

/// SQL to create the history table
fn create_history_table_sql(config: &MigraticConfig) -> String {
    format!(
        "CREATE TABLE {} (\n    \
            id BIGSERIAL PRIMARY KEY,\n    \
            major INT NOT NULL,\n    \
            minor INT,\n    \
            patch INT,\n    \
            description VARCHAR(255) NOT NULL,\n    \
            provider_type VARCHAR(255) NOT NULL,\n    \
            checksum VARCHAR(255) NOT NULL,\n    \
            applied_at TIMESTAMPTZ NOT NULL,\n    \
            applied_by VARCHAR(255) NOT NULL,\n    \
            success BOOLEAN NOT NULL\n\
        )",
        config.qualified_table()
    )
}

/// SQL to insert one history row
fn insert_history_entry_sql(config: &MigraticConfig) -> String {
    format!(
        "INSERT INTO {} (\
            major, minor, patch, description, provider_type, \
            checksum, applied_at, applied_by, success\
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        config.qualified_table()
    )
}

/// SQL to read the full history ledger
fn select_history_sql(config: &MigraticConfig) -> String {
    format!(
        "SELECT id, major, minor, patch, description, provider_type, \
         checksum, applied_at, applied_by, success FROM {} ORDER BY id",
        config.qualified_table()
    )
}

/// History store over one PostgreSQL connection
pub struct PostgresHistoryStore {
    config: MigraticConfig,
    connection: Mutex<PgConnection>,
}

impl PostgresHistoryStore {
    pub fn new(config: MigraticConfig, connection: PgConnection) -> Self {
        Self {
            config,
            connection: Mutex::new(connection),
        }
    }

    /// Open a dedicated connection from a database URL
    pub async fn connect(config: MigraticConfig, database_url: &str) -> MigraticResult<Self> {
        let connection = PgConnection::connect(database_url)
            .await
            .map_err(|e| MigraticError::Store(format!("failed to connect to database: {}", e)))?;
        Ok(Self::new(config, connection))
    }

    fn store_error(e: sqlx::Error) -> MigraticError {
        MigraticError::Store(e.to_string())
    }

    fn history_row(row: &PgRow) -> Result<HistoryRecord, sqlx::Error> {
        Ok(HistoryRecord {
            id: row.try_get("id")?,
            major: row.try_get("major")?,
            minor: row.try_get("minor")?,
            patch: row.try_get("patch")?,
            description: row.try_get("description")?,
            provider_type: row.try_get("provider_type")?,
            checksum: row.try_get("checksum")?,
            applied_at: row.try_get("applied_at")?,
            applied_by: row.try_get("applied_by")?,
            success: row.try_get("success")?,
        })
    }

    async fn insert_locked(
        &self,
        connection: &mut PgConnection,
        migration: &Migration,
    ) -> MigraticResult<()> {
        let version = migration.version();
        sqlx::query(&insert_history_entry_sql(&self.config))
            .bind(version.major())
            .bind(version.minor())
            .bind(version.patch())
            .bind(migration.description())
            .bind(self.provider_type())
            .bind(migration.checksum())
            .bind(migration.applied_at().unwrap_or_else(Utc::now))
            .bind(migration.applied_by().unwrap_or_default())
            .bind(migration.success())
            .execute(connection)
            .await
            .map_err(Self::store_error)?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for PostgresHistoryStore {
    fn provider_type(&self) -> &str {
        "postgres"
    }

    async fn history_schema_exists(&self) -> MigraticResult<bool> {
        let mut connection = self.connection.lock().await;
        let row = sqlx::query(
            "SELECT COUNT(*) FROM information_schema.schemata WHERE schema_name = $1",
        )
        .bind(&self.config.schema)
        .fetch_one(&mut *connection)
        .await
        .map_err(Self::store_error)?;
        let count: i64 = row.try_get(0).map_err(Self::store_error)?;
        Ok(count > 0)
    }

    async fn history_table_exists(&self) -> MigraticResult<bool> {
        let mut connection = self.connection.lock().await;
        let row = sqlx::query(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = $1 AND table_name = $2",
        )
        .bind(&self.config.schema)
        .bind(&self.config.table)
        .fetch_one(&mut *connection)
        .await
        .map_err(Self::store_error)?;
        let count: i64 = row.try_get(0).map_err(Self::store_error)?;
        Ok(count > 0)
    }

    async fn create_history_schema(&self) -> MigraticResult<()> {
        debug!(schema = %self.config.schema, "creating history schema");
        let mut connection = self.connection.lock().await;
        let sql = format!("CREATE SCHEMA {}", self.config.schema);
        (&mut *connection)
            .execute(sql.as_str())
            .await
            .map_err(Self::store_error)?;
        Ok(())
    }

    async fn create_history_table(&self) -> MigraticResult<()> {
        debug!(table = %self.config.qualified_table(), "creating history table");
        let mut connection = self.connection.lock().await;
        let sql = create_history_table_sql(&self.config);
        (&mut *connection)
            .execute(sql.as_str())
            .await
            .map_err(Self::store_error)?;
        Ok(())
    }

    async fn get_history(&self) -> MigraticResult<Vec<HistoryRecord>> {
        let mut connection = self.connection.lock().await;
        let rows = sqlx::query(&select_history_sql(&self.config))
            .fetch_all(&mut *connection)
            .await
            .map_err(Self::store_error)?;
        rows.iter()
            .map(|row| Self::history_row(row).map_err(Self::store_error))
            .collect()
    }

    async fn insert_history_entry(&self, migration: &Migration) -> MigraticResult<()> {
        let mut connection = self.connection.lock().await;
        self.insert_locked(&mut connection, migration).await
    }

    async fn insert_history_entries(&self, migrations: &[Migration]) -> MigraticResult<()> {
        // runs inside the caller's open scope, so the batch commits or
        // rolls back as one unit
        let mut connection = self.connection.lock().await;
        for migration in migrations {
            self.insert_locked(&mut connection, migration).await?;
        }
        Ok(())
    }

    async fn current_user(&self) -> MigraticResult<String> {
        let mut connection = self.connection.lock().await;
        let row = sqlx::query("SELECT CURRENT_USER")
            .fetch_one(&mut *connection)
            .await
            .map_err(Self::store_error)?;
        row.try_get(0).map_err(Self::store_error)
    }

    async fn execute_script(&self, sql: &str) -> MigraticResult<()> {
        let mut connection = self.connection.lock().await;
        // raw execution: migration scripts may hold multiple statements
        (&mut *connection)
            .execute(sql)
            .await
            .map_err(Self::store_error)?;
        Ok(())
    }

    async fn begin_transaction(&self) -> MigraticResult<()> {
        let mut connection = self.connection.lock().await;
        (&mut *connection)
            .execute("BEGIN")
            .await
            .map_err(Self::store_error)?;
        Ok(())
    }

    async fn commit_transaction(&self) -> MigraticResult<()> {
        let mut connection = self.connection.lock().await;
        (&mut *connection)
            .execute("COMMIT")
            .await
            .map_err(Self::store_error)?;
        Ok(())
    }

    async fn rollback_transaction(&self) -> MigraticResult<()> {
        let mut connection = self.connection.lock().await;
        (&mut *connection)
            .execute("ROLLBACK")
            .await
            .map_err(Self::store_error)?;
        Ok(())
    }
}
