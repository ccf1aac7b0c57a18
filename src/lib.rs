//! A personal library of AI prompts served over MCP.
//!
//! Prompts live in one JSON file, either in a local data directory or inside a
//! cloud-synced folder (OneDrive, Google Drive, Dropbox, iCloud Drive). The
//! [`storage::StorageCoordinator`] picks the active location and falls back to
//! local storage when a cloud folder goes missing. [`compaction`] keeps list
//! responses small for LLM callers.

pub mod compaction;
pub mod error;
pub mod library;
pub mod models;
pub mod server;
pub mod storage;

pub use error::{Error, Result};
pub use library::PromptLibrary;
pub use server::PromptServer;
pub use storage::{StorageCoordinator, StoragePaths};
