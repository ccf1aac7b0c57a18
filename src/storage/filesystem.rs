use crate::error::{Error, Result};
use crate::models::prompt::{Prompt, PromptsFile};
use crate::storage::detection::{Detector, CLOUD_SUBFOLDER};
use crate::storage::config::PROMPTS_FILE_NAME;
use crate::storage::{ProviderType, StorageProvider};
use async_trait::async_trait;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, error, warn};

/// Why a load fell back to an empty collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadIssueKind {
    Unreadable(String),
    Malformed(String),
}

/// A load error that was swallowed rather than returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadIssue {
    pub provider: ProviderType,
    pub path: PathBuf,
    pub kind: LoadIssueKind,
}

/// Receives every swallowed load error.
pub type DiagnosticSink = Arc<dyn Fn(&LoadIssue) + Send + Sync>;

#[derive(Debug, Clone)]
enum Location {
    /// Local storage: always available, fixed default file.
    Fixed(PathBuf),
    /// Cloud storage: root resolved through the detection table.
    Detected(Detector),
}

/// JSON-file storage provider.
///
/// One implementation serves every provider type; they only differ in how the
/// root folder is found.
#[derive(Clone)]
pub struct FileSystemProvider {
    kind: ProviderType,
    location: Location,
    diagnostics: Option<DiagnosticSink>,
}

impl fmt::Debug for FileSystemProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystemProvider")
            .field("kind", &self.kind)
            .field("location", &self.location)
            .field("diagnostics", &self.diagnostics.is_some())
            .finish()
    }
}

impl FileSystemProvider {
    /// Local provider whose default path is `default_file`.
    pub fn local<P: AsRef<Path>>(default_file: P) -> Self {
        Self {
            kind: ProviderType::Local,
            location: Location::Fixed(default_file.as_ref().to_path_buf()),
            diagnostics: None,
        }
    }

    /// Cloud-folder provider located through `detector`.
    pub fn cloud(kind: ProviderType, detector: Detector) -> Self {
        Self {
            kind,
            location: Location::Detected(detector),
            diagnostics: None,
        }
    }

    pub fn with_diagnostics(mut self, sink: DiagnosticSink) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    fn cloud_root(&self) -> Option<PathBuf> {
        match &self.location {
            Location::Fixed(_) => None,
            Location::Detected(detector) => detector.detect_root(self.kind),
        }
    }

    fn report(&self, path: &Path, kind: LoadIssueKind) {
        let issue = LoadIssue {
            provider: self.kind,
            path: path.to_path_buf(),
            kind,
        };
        warn!(provider = %self.kind, path = %path.display(), issue = ?issue.kind, "Returning empty prompt collection");
        if let Some(sink) = &self.diagnostics {
            sink(&issue);
        }
    }

    async fn ensure_parent(path: &Path) -> io::Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent).await,
            _ => Ok(()),
        }
    }

    async fn probe_write(path: &Path) -> io::Result<()> {
        Self::ensure_parent(path).await?;
        let mut probe = path.as_os_str().to_owned();
        probe.push(".test");
        let probe = PathBuf::from(probe);
        fs::write(&probe, "test").await?;
        fs::remove_file(&probe).await
    }
}

#[async_trait]
impl StorageProvider for FileSystemProvider {
    fn provider_type(&self) -> ProviderType {
        self.kind
    }

    async fn is_available(&self) -> bool {
        match &self.location {
            Location::Fixed(_) => true,
            Location::Detected(_) => self.cloud_root().is_some(),
        }
    }

    fn default_path(&self) -> Result<PathBuf> {
        match &self.location {
            Location::Fixed(file) => Ok(file.clone()),
            Location::Detected(_) => self
                .cloud_root()
                .map(|root| root.join(CLOUD_SUBFOLDER).join(PROMPTS_FILE_NAME))
                .ok_or(Error::ProviderUnavailable(self.kind)),
        }
    }

    async fn validate_path(&self, path: &Path) -> bool {
        if let Some(root) = self.cloud_root() {
            if !path.starts_with(&root) {
                warn!(provider = %self.kind, path = %path.display(), root = %root.display(), "Path is outside the synced folder");
            }
        }

        match Self::probe_write(path).await {
            Ok(()) => true,
            Err(e) => {
                error!(provider = %self.kind, path = %path.display(), error = %e, "Storage path is not writable");
                false
            }
        }
    }

    async fn load(&self, path: &Path) -> Result<Vec<Prompt>> {
        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                self.report(path, LoadIssueKind::Unreadable(e.to_string()));
                return Ok(Vec::new());
            }
        };

        match serde_json::from_str::<PromptsFile>(&contents) {
            Ok(file) => {
                debug!(provider = %self.kind, path = %path.display(), count = file.prompts.len(), "Loaded prompts");
                Ok(file.prompts)
            }
            Err(e) => {
                self.report(path, LoadIssueKind::Malformed(e.to_string()));
                Ok(Vec::new())
            }
        }
    }

    async fn save(&self, path: &Path, prompts: &[Prompt]) -> Result<()> {
        let save_failed = |source: io::Error| Error::SaveFailed {
            path: path.to_path_buf(),
            source,
        };

        let file = PromptsFile {
            prompts: prompts.to_vec(),
        };
        let contents = serde_json::to_string_pretty(&file)
            .map_err(io::Error::other)
            .map_err(save_failed)?;

        // Ensure directory exists before writing
        Self::ensure_parent(path).await.map_err(save_failed)?;
        fs::write(path, contents.as_bytes()).await.map_err(save_failed)?;

        debug!(provider = %self.kind, path = %path.display(), count = prompts.len(), "Saved prompts");
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }
}
