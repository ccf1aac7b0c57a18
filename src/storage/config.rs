//! Persisted storage configuration and well-known paths.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{Error, Result};
use crate::storage::ProviderType;

/// Directory under the home directory holding application data.
pub const DATA_DIR_NAME: &str = ".mcp-ai-prompts";

/// File name of the prompts collection.
pub const PROMPTS_FILE_NAME: &str = "prompts-data.json";

/// File name of the persisted storage configuration.
pub const CONFIG_FILE_NAME: &str = "storage-config.json";

/// Well-known locations derived from the application data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    data_dir: PathBuf,
}

impl StoragePaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// `$HOME/.mcp-ai-prompts`, or a relative directory when no home is known.
    pub fn from_home() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(home.join(DATA_DIR_NAME))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Default prompts file used by the local provider and by every fallback.
    pub fn default_prompts_file(&self) -> PathBuf {
        self.data_dir.join(PROMPTS_FILE_NAME)
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE_NAME)
    }
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::from_home()
    }
}

/// Optional device/account annotations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_account_id: Option<String>,
}

/// Storage configuration persisted to `storage-config.json`.
///
/// `provider` is the provider the user asked for. When that provider is not
/// available and `fallback_to_local` is set, the coordinator runs on local
/// storage while keeping this value unchanged, so `provider` does not always
/// name the backend in use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    pub provider: ProviderType,
    pub path: PathBuf,
    #[serde(default = "default_true")]
    pub auto_sync: bool,
    #[serde(default = "default_true")]
    pub fallback_to_local: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<StorageMetadata>,
}

fn default_true() -> bool {
    true
}

impl StorageConfig {
    /// Local provider writing to the default prompts file.
    pub fn local_default(paths: &StoragePaths) -> Self {
        Self {
            provider: ProviderType::Local,
            path: paths.default_prompts_file(),
            auto_sync: true,
            fallback_to_local: true,
            last_sync_at: None,
            metadata: None,
        }
    }

    /// Reads a configuration file. `Ok(None)` when the file does not exist.
    pub async fn read_from(path: &Path) -> anyhow::Result<Option<Self>> {
        use anyhow::Context;

        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read storage config: {}", path.display())
                })
            }
        };

        let config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse storage config: {}", path.display()))?;
        Ok(Some(config))
    }

    /// Writes the configuration as pretty JSON, creating the parent directory.
    pub async fn write_to(&self, path: &Path) -> Result<()> {
        let persist_failed = |source: io::Error| Error::ConfigPersistFailed {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(persist_failed)?;
        }
        let contents = serde_json::to_string_pretty(self).map_err(io::Error::other).map_err(persist_failed)?;
        fs::write(path, contents).await.map_err(persist_failed)
    }
}
