//! Configuration management for the blobschema CLI

use crate::memory::pattern::DEFAULT_BLOCK_SIZE;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Substring of the target executable name
    pub process_name: Option<String>,
    /// Directory holding exported schemas, one subdirectory per schema
    pub schema_dir: Option<PathBuf>,
    /// Bytes read per block while scanning for signatures
    pub scan_block_size: Option<usize>,
    /// Expected parser hash per table, checked when decoding
    pub parser_hashes: BTreeMap<String, u32>,
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("blobschema");

        Ok(config_dir.join("config.toml"))
    }

    /// Load configuration from file, or create default if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&contents).context("Failed to parse config file")
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory at {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        Ok(())
    }

    pub fn block_size(&self) -> usize {
        self.scan_block_size.unwrap_or(DEFAULT_BLOCK_SIZE)
    }

    /// Schema directory, falling back to `schemas/` under the data directory
    pub fn schema_root(&self) -> Result<PathBuf> {
        match &self.schema_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(dirs::data_dir()
                .context("Could not determine data directory")?
                .join("blobschema")
                .join("schemas")),
        }
    }

    /// Resolve a schema given by name or by path
    pub fn schema_path(&self, schema: &str) -> Result<PathBuf> {
        let direct = Path::new(schema);
        if direct.is_dir() || direct.is_file() {
            return Ok(direct.to_path_buf());
        }
        Ok(self.schema_root()?.join(schema))
    }

    pub fn parser_hash(&self, table: &str) -> Option<u32> {
        self.parser_hashes.get(table).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.block_size(), DEFAULT_BLOCK_SIZE);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config {
            process_name: Some("client".to_string()),
            schema_dir: Some(PathBuf::from("/srv/schemas")),
            scan_block_size: Some(4096),
            ..Default::default()
        };
        config.parser_hashes.insert("Items".to_string(), 0xAABBCCDD);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.block_size(), 4096);
        assert_eq!(loaded.parser_hash("Items"), Some(0xAABBCCDD));
        assert_eq!(loaded.parser_hash("Other"), None);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "process_name = \"game\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.process_name.as_deref(), Some("game"));
        assert!(config.parser_hashes.is_empty());
    }

    #[test]
    fn test_schema_path_by_name() {
        let config = Config {
            schema_dir: Some(PathBuf::from("/srv/schemas")),
            ..Default::default()
        };
        assert_eq!(
            config.schema_path("no-such-schema").unwrap(),
            PathBuf::from("/srv/schemas/no-such-schema")
        );
    }
}
