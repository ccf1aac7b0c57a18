//! Cloud-folder detection.
//!
//! Each cloud provider has an ordered list of probes. The first probe that
//! resolves to an existing directory is the provider's root.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::storage::ProviderType;

/// Subfolder created inside a cloud root to hold the prompts file.
pub const CLOUD_SUBFOLDER: &str = "AIPrompts";

/// A single candidate location for a provider's root folder.
#[derive(Debug, Clone, Copy)]
pub enum Probe {
    /// Directory named by an environment variable.
    Env(&'static str),
    /// Directory relative to the home directory.
    Home(&'static [&'static str]),
    /// Absolute directory, optionally only on one OS.
    Absolute {
        path: &'static str,
        os: Option<&'static str>,
    },
    /// Dropbox `info.json`, relative to the home directory.
    DropboxInfo(&'static [&'static str]),
}

/// Probes for one provider, evaluated in order.
#[derive(Debug, Clone, Copy)]
pub struct DetectionStrategy {
    pub provider: ProviderType,
    /// Detection is skipped entirely on other operating systems.
    pub os: Option<&'static str>,
    pub probes: &'static [Probe],
}

pub const STRATEGIES: &[DetectionStrategy] = &[
    DetectionStrategy {
        provider: ProviderType::OneDrive,
        os: None,
        probes: &[
            Probe::Home(&["OneDrive"]),
            Probe::Home(&["OneDrive - Personal"]),
            Probe::Env("OneDrive"),
            Probe::Env("OneDriveConsumer"),
            Probe::Env("OneDriveCommercial"),
            Probe::Home(&["Library", "CloudStorage", "OneDrive-Personal"]),
        ],
    },
    DetectionStrategy {
        provider: ProviderType::GoogleDrive,
        os: None,
        probes: &[
            Probe::Env("GOOGLE_DRIVE_PATH"),
            Probe::Env("GOOGLEDRIVE"),
            Probe::Home(&["Google Drive"]),
            Probe::Absolute {
                path: "G:\\",
                os: Some("windows"),
            },
            Probe::Absolute {
                path: "H:\\",
                os: Some("windows"),
            },
            Probe::Absolute {
                path: "/Volumes/GoogleDrive",
                os: Some("macos"),
            },
            Probe::Home(&["Library", "CloudStorage", "GoogleDrive"]),
            Probe::Home(&["GoogleDrive"]),
            Probe::Home(&["google-drive"]),
            Probe::Home(&["My Drive"]),
        ],
    },
    DetectionStrategy {
        provider: ProviderType::Dropbox,
        os: None,
        probes: &[
            Probe::DropboxInfo(&["AppData", "Local", "Dropbox", "info.json"]),
            Probe::DropboxInfo(&[".dropbox", "info.json"]),
            Probe::Home(&["Dropbox"]),
            Probe::Home(&["Dropbox (Personal)"]),
            Probe::Home(&["Dropbox (Business)"]),
            Probe::Env("DROPBOX_PATH"),
        ],
    },
    DetectionStrategy {
        provider: ProviderType::ICloud,
        os: Some("macos"),
        probes: &[Probe::Home(&[
            "Library",
            "Mobile Documents",
            "com~apple~CloudDocs",
        ])],
    },
];

pub fn strategy_for(provider: ProviderType) -> Option<&'static DetectionStrategy> {
    STRATEGIES.iter().find(|s| s.provider == provider)
}

#[derive(Debug, Deserialize)]
struct DropboxInfo {
    personal: Option<DropboxAccount>,
    business: Option<DropboxAccount>,
}

#[derive(Debug, Deserialize)]
struct DropboxAccount {
    path: Option<PathBuf>,
}

/// Evaluates detection strategies against a home directory, an environment
/// snapshot and an operating system name.
#[derive(Debug, Clone, Default)]
pub struct Detector {
    home: Option<PathBuf>,
    env: BTreeMap<String, String>,
    os: String,
}

impl Detector {
    /// Detector for the current machine.
    pub fn system() -> Self {
        let env = STRATEGIES
            .iter()
            .flat_map(|s| s.probes.iter())
            .filter_map(|probe| match probe {
                Probe::Env(var) => std::env::var(var).ok().map(|v| (var.to_string(), v)),
                _ => None,
            })
            .collect();

        Self {
            home: dirs::home_dir(),
            env,
            os: std::env::consts::OS.to_string(),
        }
    }

    /// Detector rooted at `home` with an empty environment.
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: Some(home.into()),
            env: BTreeMap::new(),
            os: std::env::consts::OS.to_string(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = os.into();
        self
    }

    /// Root folder of `provider`, if one exists on disk.
    pub fn detect_root(&self, provider: ProviderType) -> Option<PathBuf> {
        let strategy = strategy_for(provider)?;
        if strategy.os.is_some_and(|os| os != self.os) {
            debug!(provider = %provider, os = %self.os, "Provider not supported on this OS");
            return None;
        }

        let found = strategy
            .probes
            .iter()
            .filter_map(|probe| self.resolve(probe))
            .find(|candidate| candidate.is_dir());

        match &found {
            Some(root) => debug!(provider = %provider, root = %root.display(), "Detected cloud folder"),
            None => debug!(provider = %provider, "Cloud folder not found in any known location"),
        }
        found
    }

    fn resolve(&self, probe: &Probe) -> Option<PathBuf> {
        match probe {
            Probe::Env(var) => self
                .env
                .get(*var)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from),
            Probe::Home(segments) => self.home_join(segments),
            Probe::Absolute { path, os } => match os {
                Some(os) if *os != self.os => None,
                _ => Some(PathBuf::from(path)),
            },
            Probe::DropboxInfo(segments) => {
                let info = self.home_join(segments)?;
                read_dropbox_info(&info)
            }
        }
    }

    fn home_join(&self, segments: &[&str]) -> Option<PathBuf> {
        let home = self.home.as_ref()?;
        Some(segments.iter().fold(home.clone(), |acc, s| acc.join(s)))
    }
}

/// Reads the configured Dropbox folder, preferring the personal account.
fn read_dropbox_info(path: &Path) -> Option<PathBuf> {
    let contents = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<DropboxInfo>(&contents) {
        Ok(info) => info
            .personal
            .and_then(|a| a.path)
            .or_else(|| info.business.and_then(|a| a.path)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to parse Dropbox info.json");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_every_cloud_provider_has_a_strategy() {
        for provider in ProviderType::ALL {
            let has = strategy_for(provider).is_some();
            assert_eq!(has, provider != ProviderType::Local, "{provider}");
        }
    }

    #[test]
    fn test_nothing_detected_in_empty_home() {
        let home = TempDir::new().unwrap();
        let detector = Detector::new(home.path());
        assert!(detector.detect_root(ProviderType::OneDrive).is_none());
        assert!(detector.detect_root(ProviderType::Dropbox).is_none());
        assert!(detector.detect_root(ProviderType::Local).is_none());
    }

    #[test]
    fn test_detects_home_folder() {
        let home = TempDir::new().unwrap();
        std::fs::create_dir(home.path().join("OneDrive - Personal")).unwrap();

        let detector = Detector::new(home.path());
        assert_eq!(
            detector.detect_root(ProviderType::OneDrive),
            Some(home.path().join("OneDrive - Personal"))
        );
    }

    #[test]
    fn test_env_probe_respects_priority() {
        let home = TempDir::new().unwrap();
        let custom = TempDir::new().unwrap();
        std::fs::create_dir(home.path().join("Google Drive")).unwrap();

        // GOOGLE_DRIVE_PATH is probed before ~/Google Drive
        let detector = Detector::new(home.path())
            .with_env("GOOGLE_DRIVE_PATH", custom.path().to_string_lossy());
        assert_eq!(
            detector.detect_root(ProviderType::GoogleDrive),
            Some(custom.path().to_path_buf())
        );
    }

    #[test]
    fn test_env_probe_ignores_missing_directory() {
        let home = TempDir::new().unwrap();
        let detector = Detector::new(home.path()).with_env("OneDrive", "/definitely/not/here");
        assert!(detector.detect_root(ProviderType::OneDrive).is_none());
    }

    #[test]
    fn test_dropbox_info_json() {
        let home = TempDir::new().unwrap();
        let business = TempDir::new().unwrap();
        let info_dir = home.path().join(".dropbox");
        std::fs::create_dir(&info_dir).unwrap();
        let info = serde_json::json!({
            "business": { "path": business.path() }
        });
        std::fs::write(info_dir.join("info.json"), info.to_string()).unwrap();

        let detector = Detector::new(home.path());
        assert_eq!(
            detector.detect_root(ProviderType::Dropbox),
            Some(business.path().to_path_buf())
        );
    }

    #[test]
    fn test_icloud_is_macos_only() {
        let home = TempDir::new().unwrap();
        let icloud = home
            .path()
            .join("Library")
            .join("Mobile Documents")
            .join("com~apple~CloudDocs");
        std::fs::create_dir_all(&icloud).unwrap();

        let linux = Detector::new(home.path()).with_os("linux");
        assert!(linux.detect_root(ProviderType::ICloud).is_none());

        let macos = Detector::new(home.path()).with_os("macos");
        assert_eq!(macos.detect_root(ProviderType::ICloud), Some(icloud));
    }
}
