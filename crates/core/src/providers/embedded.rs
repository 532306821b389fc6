//! Embedded-resource migration discovery
//!
//! Scripts compiled into the binary through `rust_embed` are discovered the
//! same way file scripts are: the final path segment of each resource name
//! is parsed against the naming convention, and non-matching resources are
//! skipped.

use std::marker::PhantomData;

use async_trait::async_trait;
use rust_embed::RustEmbed;
use tracing::debug;

use super::MigrationProvider;
use crate::config::MigraticConfig;
use crate::error::{MigraticError, MigraticResult};
use crate::migration::Migration;
use crate::naming;

/// Serves migrations embedded under a `RustEmbed` asset folder
pub struct EmbeddedMigrationProvider<E> {
    config: MigraticConfig,
    _assets: PhantomData<E>,
}

impl<E> EmbeddedMigrationProvider<E>
where
    E: RustEmbed,
{
    pub fn new(config: MigraticConfig) -> Self {
        Self {
            config,
            _assets: PhantomData,
        }
    }
}

#[async_trait]
impl<E> MigrationProvider for EmbeddedMigrationProvider<E>
where
    E: RustEmbed + Send + Sync,
{
    fn name(&self) -> &str {
        "embedded resources"
    }

    async fn get_migrations(&self) -> MigraticResult<Vec<Migration>> {
        let mut migrations = Vec::new();
        for resource in E::iter() {
            let resource_name: &str = resource.as_ref();
            // resource names keep their relative path; only the final
            // segment is a script name
            let file_name = resource_name
                .rsplit('/')
                .next()
                .unwrap_or(resource_name);
            let parsed = match naming::parse_script_name(file_name, &self.config) {
                Some(parsed) => parsed,
                None => {
                    debug!(
                        resource = resource_name,
                        "skipping resource with unparseable migration name"
                    );
                    continue;
                }
            };
            let file = E::get(resource_name).ok_or_else(|| MigraticError::Discovery {
                provider: "embedded resources".to_string(),
                cause: format!("embedded resource {} could not be loaded", resource_name),
            })?;
            let script = std::str::from_utf8(file.data.as_ref())
                .map_err(|e| MigraticError::Discovery {
                    provider: "embedded resources".to_string(),
                    cause: format!("resource {} is not valid UTF-8: {}", resource_name, e),
                })?
                .to_string();
            migrations.push(Migration::new(
                parsed.migration_type,
                parsed.version,
                parsed.description,
                script,
            ));
        }
        Ok(migrations)
    }
}
