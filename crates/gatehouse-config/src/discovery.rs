//! Config file discovery.
//!
//! Resolution order:
//! 1. An explicit path (must exist)
//! 2. `./gatehouse.toml` if present
//! 3. Built-in defaults
//!
//! CLI arguments are layered on top by the caller.

use std::path::{Path, PathBuf};

use crate::{ConfigError, GatehouseConfig, Result};

/// Default config filename for project-local config.
pub const PROJECT_CONFIG_FILE: &str = "gatehouse.toml";

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: GatehouseConfig,
    /// File the config came from, if any.
    pub source: Option<PathBuf>,
}

/// Load configuration from `path`, or discover it in the working directory.
pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = path {
        return Ok(LoadedConfig {
            config: load_config_file(path)?,
            source: Some(path.to_path_buf()),
        });
    }

    let project = PathBuf::from(PROJECT_CONFIG_FILE);
    if project.exists() {
        return Ok(LoadedConfig {
            config: load_config_file(&project)?,
            source: Some(project),
        });
    }

    Ok(LoadedConfig {
        config: GatehouseConfig::default(),
        source: None,
    })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<GatehouseConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    GatehouseConfig::from_toml(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "upstreams = [\"http://127.0.0.1:8080/\"]").unwrap();

        let loaded = load_config(Some(file.path())).unwrap();
        assert_eq!(loaded.config.upstreams, vec!["http://127.0.0.1:8080/"]);
        assert_eq!(loaded.source.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }
}
