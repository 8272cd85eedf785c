//! Configuration file loading and merging
//!
//! Merge order: built-in defaults, then the global file, then the local
//! file. Merging happens on TOML values before deserialization, so a local
//! file can override a single key without restating its whole section.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::RepolensConfig;

/// Global config file name under the platform config dir
const GLOBAL_DIR: &str = "repolens";
const GLOBAL_FILE: &str = "config.toml";

/// Local config file name, looked up in the working directory
const LOCAL_FILE: &str = "repolens.toml";

/// Loads and merges configuration files.
pub struct ConfigLoader {
    global_path: Option<PathBuf>,
    local_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Loader over the default file locations.
    pub fn new() -> Self {
        let global_path = dirs::config_dir().map(|dir| dir.join(GLOBAL_DIR).join(GLOBAL_FILE));
        Self {
            global_path,
            local_path: Some(PathBuf::from(LOCAL_FILE)),
        }
    }

    /// Loader over explicit paths (used by tests and `--config`).
    pub fn with_paths(global: Option<PathBuf>, local: Option<PathBuf>) -> Self {
        Self {
            global_path: global,
            local_path: local,
        }
    }

    /// Load, merge, and validate the configuration.
    pub fn load(&self) -> Result<RepolensConfig> {
        let mut merged = toml::Table::new();

        for path in [&self.global_path, &self.local_path].into_iter().flatten() {
            if let Some(table) = read_table(path)? {
                debug!("Merging config from {:?}", path);
                merge_tables(&mut merged, table);
            }
        }

        let config: RepolensConfig = toml::Value::Table(merged)
            .try_into()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Read one TOML file into a table; a missing file is not an error.
fn read_table(path: &Path) -> Result<Option<toml::Table>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)?;
    let table = content.parse::<toml::Table>().map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    Ok(Some(table))
}

/// Deep-merge `overlay` into `base`: tables merge recursively, everything
/// else replaces.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(overlay_table)) => {
                merge_tables(base_table, overlay_table);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
