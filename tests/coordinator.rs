use async_trait::async_trait;
use mcp_ai_prompts::models::{NewPrompt, Prompt};
use mcp_ai_prompts::storage::{
    Detector, FileSystemProvider, ProviderType, StorageConfig, StorageCoordinator, StoragePaths, StorageProvider,
};
use mcp_ai_prompts::{Error, Result};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// A cloud provider that looks healthy but fails every read and write.
#[derive(Default)]
struct BrokenCloud {
    saves: AtomicUsize,
    loads: AtomicUsize,
}

#[async_trait]
impl StorageProvider for BrokenCloud {
    fn provider_type(&self) -> ProviderType {
        ProviderType::OneDrive
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn default_path(&self) -> Result<PathBuf> {
        Ok(PathBuf::from("/broken/AIPrompts/prompts-data.json"))
    }

    async fn validate_path(&self, _path: &Path) -> bool {
        true
    }

    async fn load(&self, path: &Path) -> Result<Vec<Prompt>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Err(Error::LoadFailed {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::TimedOut, "sync client offline"),
        })
    }

    async fn save(&self, path: &Path, _prompts: &[Prompt]) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Err(Error::SaveFailed {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::TimedOut, "sync client offline"),
        })
    }

    async fn exists(&self, _path: &Path) -> bool {
        false
    }
}

struct Setup {
    _dir: TempDir,
    home: PathBuf,
    coordinator: StorageCoordinator,
    broken: Arc<BrokenCloud>,
}

fn setup() -> Setup {
    let dir = TempDir::new().unwrap();
    let home = dir.path().join("home");
    std::fs::create_dir_all(&home).unwrap();

    let mut coordinator = StorageCoordinator::with_detector(
        StoragePaths::new(dir.path().join("data")),
        Detector::new(&home),
    );
    let broken = Arc::new(BrokenCloud::default());
    coordinator.register_provider(broken.clone());

    Setup {
        _dir: dir,
        home,
        coordinator,
        broken,
    }
}

fn config(provider: ProviderType, path: PathBuf, fallback_to_local: bool) -> StorageConfig {
    StorageConfig {
        provider,
        path,
        auto_sync: true,
        fallback_to_local,
        last_sync_at: None,
        metadata: None,
    }
}

fn prompts() -> Vec<Prompt> {
    ["first", "second"]
        .into_iter()
        .map(|name| {
            Prompt::new(NewPrompt {
                name: name.to_string(),
                content: format!("{name} content"),
                category: "general".to_string(),
                ..Default::default()
            })
        })
        .collect()
}

#[tokio::test]
async fn test_failed_cloud_save_falls_back_to_local() {
    let s = setup();
    let cloud_path = s.home.join("cloud.json");
    s.coordinator
        .set_config(config(ProviderType::OneDrive, cloud_path, true))
        .await
        .unwrap();
    assert_eq!(s.coordinator.active_provider().await, ProviderType::OneDrive);

    let data = prompts();
    s.coordinator.save_prompts(&data).await.unwrap();
    assert_eq!(s.broken.saves.load(Ordering::SeqCst), 1);

    let local_file = s.coordinator.paths().default_prompts_file();
    assert!(local_file.is_file());

    let loaded = s.coordinator.load_prompts().await.unwrap();
    assert_eq!(s.broken.loads.load(Ordering::SeqCst), 1);
    assert_eq!(loaded, data);
}

#[tokio::test]
async fn test_failed_cloud_save_without_fallback_is_an_error() {
    let s = setup();
    s.coordinator
        .set_config(config(ProviderType::OneDrive, s.home.join("cloud.json"), false))
        .await
        .unwrap();

    let err = s.coordinator.save_prompts(&prompts()).await.unwrap_err();
    assert!(matches!(err, Error::SaveFailed { .. }));
    assert!(!err.is_user_error());
    assert!(!s.coordinator.paths().default_prompts_file().exists());

    let err = s.coordinator.load_prompts().await.unwrap_err();
    assert!(matches!(err, Error::LoadFailed { .. }));
}

#[tokio::test]
async fn test_failed_save_does_not_stamp_sync_time() {
    let s = setup();
    s.coordinator
        .set_config(config(ProviderType::OneDrive, s.home.join("cloud.json"), true))
        .await
        .unwrap();

    s.coordinator.save_prompts(&prompts()).await.unwrap();
    assert!(s.coordinator.config().await.last_sync_at.is_none());
}

#[tokio::test]
async fn test_unavailable_provider_runs_on_local_storage() {
    let s = setup();
    let requested = s.home.join("Dropbox").join("AIPrompts").join("prompts-data.json");
    s.coordinator
        .set_config(config(ProviderType::Dropbox, requested.clone(), true))
        .await
        .unwrap();

    let config = s.coordinator.config().await;
    assert_eq!(config.provider, ProviderType::Dropbox);
    assert_eq!(config.path, requested);
    assert_eq!(s.coordinator.active_provider().await, ProviderType::Local);

    let data = prompts();
    s.coordinator.save_prompts(&data).await.unwrap();
    assert!(s.coordinator.paths().default_prompts_file().is_file());
    assert!(!requested.exists());
    assert_eq!(s.coordinator.load_prompts().await.unwrap(), data);

    let statuses = s.coordinator.list_providers().await;
    let dropbox = statuses
        .iter()
        .find(|p| p.provider_type == ProviderType::Dropbox)
        .unwrap();
    assert!(dropbox.active && !dropbox.available);
}

#[tokio::test]
async fn test_divergent_config_survives_restart() {
    let s = setup();
    let requested = s.home.join("Dropbox").join("AIPrompts").join("prompts-data.json");
    s.coordinator
        .set_config(config(ProviderType::Dropbox, requested.clone(), true))
        .await
        .unwrap();

    // The Dropbox client shows up before the next start.
    std::fs::create_dir(s.home.join("Dropbox")).unwrap();
    let restarted = StorageCoordinator::with_detector(
        StoragePaths::new(s.coordinator.paths().data_dir()),
        Detector::new(&s.home),
    );
    restarted.initialize().await;

    assert_eq!(restarted.active_provider().await, ProviderType::Dropbox);
    assert_eq!(restarted.active_path().await, requested);
}

#[tokio::test]
async fn test_migrate_reads_with_source_provider() {
    let s = setup();
    let source = s.home.join("old.json");
    let local = FileSystemProvider::local(&source);
    local.save(&source, &prompts()).await.unwrap();

    let dest = s.home.join("new").join("prompts.json");
    let count = s
        .coordinator
        .migrate_data(&source, &dest, Some(ProviderType::Local))
        .await
        .unwrap();
    assert_eq!(count, 2);
    assert_eq!(local.load(&dest).await.unwrap().len(), 2);

    // Reading through the broken provider fails.
    let err = s
        .coordinator
        .migrate_data(&source, &dest, Some(ProviderType::OneDrive))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::LoadFailed { .. }));
}
