//! Migration discovery
//!
//! A provider turns one configured source into zero or more migrations.
//! The failure policy is asymmetric on purpose: a provider that fails
//! outright (I/O, decoding, registry) fails discovery for the whole run,
//! while an individual entry whose name does not parse is silently skipped.

mod code;
mod embedded;
mod file;

pub use code::{CodeMigration, CodeMigrationProvider};
pub use embedded::EmbeddedMigrationProvider;
pub use file::FileMigrationProvider;

use async_trait::async_trait;

use crate::error::MigraticResult;
use crate::migration::Migration;

/// A source of migrations
#[async_trait]
pub trait MigrationProvider: Send + Sync {
    /// Short human-readable source name, used in discovery errors
    fn name(&self) -> &str;

    async fn get_migrations(&self) -> MigraticResult<Vec<Migration>>;
}
