//! Storage coordinator: owns the active provider and configuration.
//!
//! # Fallback to local
//!
//! When `fallback_to_local` is set, three situations are masked by switching to
//! the local provider at the default prompts file:
//!
//! - `set_config` names a provider that is not available: the requested config
//!   is persisted as-is, but the local provider becomes active.
//! - `load_prompts` fails on a non-local provider: the local default file is read.
//! - `save_prompts` fails on a non-local provider: the local default file is written.
//!
//! The prompts file itself is never cached. Every load reads the whole file and
//! every save rewrites it, with no locking across calls.

use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::models::prompt::Prompt;
use crate::storage::config::{StorageConfig, StoragePaths};
use crate::storage::detection::Detector;
use crate::storage::filesystem::FileSystemProvider;
use crate::storage::{ProviderStatus, ProviderType, StorageProvider};

#[derive(Debug, Clone)]
struct ActiveState {
    config: StorageConfig,
    active: ProviderType,
    active_path: PathBuf,
}

/// Selects the storage provider and applies the fallback policy.
///
/// Construct one per process, call [`initialize`](Self::initialize) at
/// startup, then share it behind an `Arc`.
pub struct StorageCoordinator {
    paths: StoragePaths,
    providers: BTreeMap<ProviderType, Arc<dyn StorageProvider>>,
    state: RwLock<ActiveState>,
}

impl StorageCoordinator {
    /// Coordinator with every provider registered, detecting cloud folders on
    /// this machine.
    pub fn new(paths: StoragePaths) -> Self {
        Self::with_detector(paths, Detector::system())
    }

    pub fn with_detector(paths: StoragePaths, detector: Detector) -> Self {
        let mut providers: BTreeMap<ProviderType, Arc<dyn StorageProvider>> = BTreeMap::new();
        providers.insert(
            ProviderType::Local,
            Arc::new(FileSystemProvider::local(paths.default_prompts_file())),
        );
        for kind in ProviderType::ALL.into_iter().filter(|k| *k != ProviderType::Local) {
            providers.insert(kind, Arc::new(FileSystemProvider::cloud(kind, detector.clone())));
        }

        let config = StorageConfig::local_default(&paths);
        let state = ActiveState {
            active: ProviderType::Local,
            active_path: config.path.clone(),
            config,
        };

        Self {
            paths,
            providers,
            state: RwLock::new(state),
        }
    }

    /// Replaces the provider registered for the same type.
    pub fn register_provider(&mut self, provider: Arc<dyn StorageProvider>) {
        self.providers.insert(provider.provider_type(), provider);
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    /// Applies the persisted configuration, if any. Never fails: any problem
    /// leaves the built-in local configuration in place.
    #[instrument(skip(self), fields(config_file = %self.paths.config_file().display()))]
    pub async fn initialize(&self) {
        let config_file = self.paths.config_file();
        match StorageConfig::read_from(&config_file).await {
            Ok(Some(config)) => {
                let requested = config.provider;
                match self.set_config(config).await {
                    Ok(()) => info!(provider = %requested, "Restored storage configuration"),
                    Err(e) => warn!(provider = %requested, error = %e, "Ignoring saved storage configuration"),
                }
            }
            Ok(None) => debug!("No saved storage configuration, using local defaults"),
            Err(e) => warn!(error = ?e, "Failed to load storage configuration, using local defaults"),
        }
    }

    /// Every registered provider with its availability. `active` marks the
    /// provider named by the configuration.
    pub async fn list_providers(&self) -> Vec<ProviderStatus> {
        let configured = self.state.read().await.config.provider;
        let mut statuses = Vec::with_capacity(self.providers.len());
        for (kind, provider) in &self.providers {
            statuses.push(ProviderStatus {
                provider_type: *kind,
                name: provider.name().to_string(),
                available: provider.is_available().await,
                active: *kind == configured,
            });
        }
        statuses
    }

    /// The configuration as requested. Under fallback this may name a provider
    /// other than [`active_provider`](Self::active_provider).
    pub async fn config(&self) -> StorageConfig {
        self.state.read().await.config.clone()
    }

    /// The provider that actually serves loads and saves.
    pub async fn active_provider(&self) -> ProviderType {
        self.state.read().await.active
    }

    /// The file that loads and saves go to.
    pub async fn active_path(&self) -> PathBuf {
        self.state.read().await.active_path.clone()
    }

    /// Suggested prompts file for `kind`.
    pub fn default_path(&self, kind: ProviderType) -> Result<PathBuf> {
        self.provider(kind)?.default_path()
    }

    /// Validates and activates `config`, then persists it.
    ///
    /// On error nothing changes, in memory or on disk.
    #[instrument(skip(self, config), fields(provider = %config.provider, path = %config.path.display()))]
    pub async fn set_config(&self, config: StorageConfig) -> Result<()> {
        let provider = self.provider(config.provider)?;

        let available = provider.is_available().await;
        if !available && !config.fallback_to_local {
            return Err(Error::ProviderUnavailable(config.provider));
        }

        if available && !provider.validate_path(&config.path).await {
            return Err(Error::InvalidPath(config.path));
        }

        let (active, active_path) = if available {
            (config.provider, config.path.clone())
        } else {
            warn!("Provider unavailable, falling back to local storage");
            (ProviderType::Local, self.paths.default_prompts_file())
        };

        // Held across the write: the config file and memory change together.
        let mut state = self.state.write().await;
        config.write_to(&self.paths.config_file()).await?;
        *state = ActiveState {
            config,
            active,
            active_path,
        };
        drop(state);
        info!(active = %active, "Storage configuration applied");
        Ok(())
    }

    /// Reads the whole prompt collection from the active provider.
    #[instrument(skip(self))]
    pub async fn load_prompts(&self) -> Result<Vec<Prompt>> {
        let state = self.snapshot().await;
        let provider = self.provider(state.active)?;

        match provider.load(&state.active_path).await {
            Ok(prompts) => Ok(prompts),
            Err(e) if self.should_fall_back(&state) => {
                warn!(provider = %state.active, error = %e, "Load failed, reading local fallback");
                self.local()?.load(&self.paths.default_prompts_file()).await
            }
            Err(e) => Err(e),
        }
    }

    /// Overwrites the prompt collection through the active provider.
    #[instrument(skip(self, prompts), fields(count = prompts.len()))]
    pub async fn save_prompts(&self, prompts: &[Prompt]) -> Result<()> {
        let state = self.snapshot().await;
        let provider = self.provider(state.active)?;

        match provider.save(&state.active_path, prompts).await {
            Ok(()) => {
                let mut guard = self.state.write().await;
                let mut config = guard.config.clone();
                config.last_sync_at = Some(Utc::now());
                config.write_to(&self.paths.config_file()).await?;
                guard.config = config;
                Ok(())
            }
            Err(e) if self.should_fall_back(&state) => {
                let fallback = self.paths.default_prompts_file();
                warn!(provider = %state.active, error = %e, fallback = %fallback.display(), "Save failed, writing local fallback");
                self.local()?.save(&fallback, prompts).await
            }
            Err(e) => Err(e),
        }
    }

    /// Copies the collection at `from` to `to`.
    ///
    /// Reads with `from_provider` (or the active provider when absent or not
    /// registered) and writes with the active provider. Returns the number of
    /// prompts copied; an empty source copies nothing. The source is never
    /// modified.
    #[instrument(skip(self), fields(from = %from.display(), to = %to.display()))]
    pub async fn migrate_data(
        &self,
        from: &Path,
        to: &Path,
        from_provider: Option<ProviderType>,
    ) -> Result<usize> {
        let active = self.provider(self.active_provider().await)?;
        let source = from_provider
            .and_then(|kind| self.providers.get(&kind).cloned())
            .unwrap_or_else(|| active.clone());

        let prompts = source.load(from).await?;
        if prompts.is_empty() {
            info!("No prompts to migrate");
            return Ok(0);
        }

        active.save(to, &prompts).await?;
        info!(count = prompts.len(), "Migrated prompts");
        Ok(prompts.len())
    }

    async fn snapshot(&self) -> ActiveState {
        self.state.read().await.clone()
    }

    fn should_fall_back(&self, state: &ActiveState) -> bool {
        state.config.fallback_to_local && state.active != ProviderType::Local
    }

    fn provider(&self, kind: ProviderType) -> Result<Arc<dyn StorageProvider>> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::UnknownProvider(kind.to_string()))
    }

    fn local(&self) -> Result<Arc<dyn StorageProvider>> {
        self.provider(ProviderType::Local)
    }
}
