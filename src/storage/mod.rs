use crate::error::{Error, Result};
use crate::models::prompt::Prompt;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub mod config;
pub mod coordinator;
pub mod detection;
pub mod filesystem;

pub use config::{StorageConfig, StorageMetadata, StoragePaths};
pub use coordinator::StorageCoordinator;
pub use detection::Detector;
pub use filesystem::{DiagnosticSink, FileSystemProvider, LoadIssue, LoadIssueKind};

/// The fixed set of storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Local,
    OneDrive,
    GoogleDrive,
    Dropbox,
    ICloud,
}

impl ProviderType {
    pub const ALL: [ProviderType; 5] = [
        ProviderType::Local,
        ProviderType::OneDrive,
        ProviderType::GoogleDrive,
        ProviderType::Dropbox,
        ProviderType::ICloud,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Local => "local",
            ProviderType::OneDrive => "onedrive",
            ProviderType::GoogleDrive => "googledrive",
            ProviderType::Dropbox => "dropbox",
            ProviderType::ICloud => "icloud",
        }
    }

    /// Human-readable provider name.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderType::Local => "Local Storage",
            ProviderType::OneDrive => "OneDrive",
            ProviderType::GoogleDrive => "Google Drive",
            ProviderType::Dropbox => "Dropbox",
            ProviderType::ICloud => "iCloud Drive",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ProviderType::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownProvider(s.to_string()))
    }
}

/// Availability report for one registered provider.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProviderStatus {
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    pub name: String,
    pub available: bool,
    pub active: bool,
}

/// Trait defining the operations of one storage backend.
///
/// Implementations are stateless: every path is passed per call, so a single
/// instance can be shared freely.
#[async_trait]
pub trait StorageProvider: Send + Sync + 'static { // Ensure Send + Sync for Arc<dyn T>
    fn provider_type(&self) -> ProviderType;

    fn name(&self) -> &str {
        self.provider_type().display_name()
    }

    /// Whether this backend can be used on the current machine. Never fails.
    async fn is_available(&self) -> bool;

    /// Suggested absolute file path for the prompts file.
    ///
    /// Fails with `ProviderUnavailable` when the backend's root is not detected.
    fn default_path(&self) -> Result<PathBuf>;

    /// Checks that `path` is writable, creating its parent directory if needed.
    /// Never fails; any I/O problem yields `false`.
    async fn validate_path(&self, path: &Path) -> bool;

    /// Loads the prompt collection stored at `path`.
    /// A missing file is an empty collection.
    async fn load(&self, path: &Path) -> Result<Vec<Prompt>>;

    /// Overwrites the collection stored at `path`.
    async fn save(&self, path: &Path, prompts: &[Prompt]) -> Result<()>;

    async fn exists(&self, path: &Path) -> bool;
}
