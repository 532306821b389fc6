//! Runner configuration
//!
//! Explicit configuration values passed into the runner and providers at
//! construction time; there is no ambient container or global state.

use std::path::PathBuf;
use std::string::FromUtf8Error;

use serde::{Deserialize, Serialize};

use crate::migration::TransactionStrategy;

/// How provider file bytes are decoded into script text.
///
/// Decoding only affects reading; checksums always hash the decoded text's
/// UTF-8 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileEncoding {
    /// Reject scripts that are not valid UTF-8
    Utf8,
    /// Replace invalid sequences with U+FFFD instead of failing
    Utf8Lossy,
}

impl FileEncoding {
    pub fn decode(&self, bytes: Vec<u8>) -> Result<String, FromUtf8Error> {
        match self {
            FileEncoding::Utf8 => String::from_utf8(bytes),
            FileEncoding::Utf8Lossy => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        }
    }
}

/// Configuration for the migration system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigraticConfig {
    /// Schema holding the history table
    pub schema: String,
    /// History table name
    pub table: String,
    /// Commit policy for a run
    pub transaction_strategy: TransactionStrategy,
    /// Name prefix marking a versioned migration
    pub versioned_prefix: String,
    /// Name prefix marking a repeatable migration
    pub repeatable_prefix: String,
    /// Name prefix marking a baseline migration
    pub baseline_prefix: String,
    /// Separator between version components inside a name
    pub version_separator: String,
    /// Separator between the version part and the description
    pub name_separator: String,
    /// Extension stripped from script names before parsing
    pub file_extension: String,
    /// Directories scanned by the file provider
    pub search_paths: Vec<PathBuf>,
    /// Filename suffix filters; falls back to `file_extension` when empty
    pub search_patterns: Vec<String>,
    /// Decoding applied to script files on disk
    pub file_encoding: FileEncoding,
}

impl MigraticConfig {
    /// Schema-qualified history table name
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

impl Default for MigraticConfig {
    fn default() -> Self {
        Self {
            schema: "migratic".to_string(),
            table: "migratic_history".to_string(),
            transaction_strategy: TransactionStrategy::PerMigration,
            versioned_prefix: "V".to_string(),
            repeatable_prefix: "R".to_string(),
            baseline_prefix: "B".to_string(),
            version_separator: "_".to_string(),
            name_separator: "__".to_string(),
            file_extension: ".sql".to_string(),
            search_paths: Vec::new(),
            search_patterns: Vec::new(),
            file_encoding: FileEncoding::Utf8,
        }
    }
}
