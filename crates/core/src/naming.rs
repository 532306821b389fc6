//! Script name parsing
//!
//! Every migration source names its entries the same way:
//! `<TypePrefix><Major>[<VSep><Minor>[<VSep><Patch>]]<NameSep><Description><Ext>`,
//! e.g. `V1_2_3__add_users_table.sql`. A name that does not follow the
//! convention is a discovery filter miss, never an error.

use crate::config::MigraticConfig;
use crate::migration::MigrationType;
use crate::version::MigrationVersion;

pub(crate) struct ParsedName {
    pub migration_type: MigrationType,
    pub version: MigrationVersion,
    pub description: String,
}

/// Parse a script, resource, or handle name into its migration identity.
///
/// Returns `None` (skip the entry) on an unknown prefix, a missing name
/// separator, or a version whose major component is missing or not a
/// non-negative integer.
pub(crate) fn parse_script_name(name: &str, config: &MigraticConfig) -> Option<ParsedName> {
    let stem = name
        .strip_suffix(config.file_extension.as_str())
        .unwrap_or(name);
    let (migration_type, rest) = strip_type_prefix(stem, config)?;
    let (version_part, description) = rest.split_once(config.name_separator.as_str())?;
    let version = MigrationVersion::parse(version_part, &config.version_separator)?;
    Some(ParsedName {
        migration_type,
        version,
        description: description.to_string(),
    })
}

/// The longest configured prefix that matches wins, so prefixes sharing a
/// leading character stay unambiguous.
fn strip_type_prefix<'a>(
    stem: &'a str,
    config: &MigraticConfig,
) -> Option<(MigrationType, &'a str)> {
    let mut prefixes = [
        (MigrationType::Versioned, config.versioned_prefix.as_str()),
        (MigrationType::Repeatable, config.repeatable_prefix.as_str()),
        (MigrationType::Baseline, config.baseline_prefix.as_str()),
    ];
    prefixes.sort_by_key(|(_, prefix)| std::cmp::Reverse(prefix.len()));
    prefixes.iter().find_map(|(migration_type, prefix)| {
        if prefix.is_empty() {
            return None;
        }
        stem.strip_prefix(prefix)
            .map(|rest| (*migration_type, rest))
    })
}
