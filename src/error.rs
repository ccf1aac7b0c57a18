//! Error types shared by the storage layer and the prompt library.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::storage::ProviderType;

/// Failures surfaced by storage providers, the coordinator and the library.
#[derive(Error, Debug)]
pub enum Error {
    /// The requested backend's root folder was not detected on this machine.
    #[error("Storage provider '{0}' is not available on this system")]
    ProviderUnavailable(ProviderType),

    /// The requested provider is not registered (or the name is not recognised).
    #[error("Unknown storage provider: {0}")]
    UnknownProvider(String),

    /// Path validation (directory creation or write probe) failed.
    #[error("Invalid storage path: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("Failed to save prompts to {}", path.display())]
    SaveFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to load prompts from {}", path.display())]
    LoadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing the storage configuration file failed.
    #[error("Failed to persist storage configuration to {}", path.display())]
    ConfigPersistFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No prompt matches the given id or name.
    #[error("Prompt not found: {0}")]
    NotFound(String),

    /// A prompt with this name already exists.
    #[error("A prompt named \"{0}\" already exists")]
    DuplicateName(String),

    /// A lookup was requested without an id or a name.
    #[error("Provide either the prompt id or its name")]
    MissingIdentifier,

    #[error("Unknown context stage: {0} (expected metadata, summary or full)")]
    InvalidStage(String),
}

/// Result type for prompt library operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for failures caused by the caller's request rather than by I/O.
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            Error::SaveFailed { .. } | Error::LoadFailed { .. } | Error::ConfigPersistFailed { .. }
        )
    }
}
