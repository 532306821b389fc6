//! File-system migration discovery

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::MigrationProvider;
use crate::config::MigraticConfig;
use crate::error::{MigraticError, MigraticResult};
use crate::migration::Migration;
use crate::naming;

/// Scans the configured search paths for migration scripts
pub struct FileMigrationProvider {
    config: MigraticConfig,
}

impl FileMigrationProvider {
    pub fn new(config: MigraticConfig) -> Self {
        Self { config }
    }

    fn discovery_error(&self, cause: String) -> MigraticError {
        MigraticError::Discovery {
            provider: self.name().to_string(),
            cause,
        }
    }

    /// Relative search paths resolve against the working directory
    fn resolve(&self, dir: &Path) -> MigraticResult<PathBuf> {
        if dir.is_absolute() {
            return Ok(dir.to_path_buf());
        }
        let cwd = std::env::current_dir()
            .map_err(|e| self.discovery_error(format!("working directory unavailable: {}", e)))?;
        Ok(cwd.join(dir))
    }

    fn matches_patterns(&self, file_name: &str) -> bool {
        if self.config.search_patterns.is_empty() {
            file_name.ends_with(self.config.file_extension.as_str())
        } else {
            self.config
                .search_patterns
                .iter()
                .any(|pattern| file_name.ends_with(pattern.as_str()))
        }
    }

    fn scan_directory(&self, dir: &Path, migrations: &mut Vec<Migration>) -> MigraticResult<()> {
        let entries = fs::read_dir(dir)
            .map_err(|e| self.discovery_error(format!("failed to read {}: {}", dir.display(), e)))?;
        for entry in entries {
            let entry = entry.map_err(|e| {
                self.discovery_error(format!("failed to read entry in {}: {}", dir.display(), e))
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let file_name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => continue,
            };
            if !self.matches_patterns(file_name) {
                continue;
            }
            let parsed = match naming::parse_script_name(file_name, &self.config) {
                Some(parsed) => parsed,
                None => {
                    debug!(file = file_name, "skipping file with unparseable migration name");
                    continue;
                }
            };
            let bytes = fs::read(&path).map_err(|e| {
                self.discovery_error(format!("failed to read {}: {}", path.display(), e))
            })?;
            let script = self.config.file_encoding.decode(bytes).map_err(|e| {
                self.discovery_error(format!("{} is not valid UTF-8: {}", path.display(), e))
            })?;
            migrations.push(Migration::new(
                parsed.migration_type,
                parsed.version,
                parsed.description,
                script,
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MigrationProvider for FileMigrationProvider {
    fn name(&self) -> &str {
        "file system"
    }

    async fn get_migrations(&self) -> MigraticResult<Vec<Migration>> {
        let mut migrations = Vec::new();
        for dir in &self.config.search_paths {
            let path = self.resolve(dir)?;
            if !path.is_dir() {
                return Err(
                    self.discovery_error(format!("search path {} does not exist", path.display()))
                );
            }
            self.scan_directory(&path, &mut migrations)?;
        }
        Ok(migrations)
    }
}
