use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tether_store::{BlobBackend, FsBlobBackend, InMemoryBlobBackend};
use tether_supervisor::{BackoffConfig, SupervisorConfig};
use tether_sync::SyncOptions;
use tether_types::{ContainerId, RemoteBlobRef, DEFAULT_BLOB_NAME};

/// Where session blobs are kept.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    /// A local or mounted directory, one subdirectory per container.
    Filesystem { root: PathBuf },
    /// Process-local; nothing survives the process.
    Memory,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Filesystem {
            root: PathBuf::from("remote"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherConfig {
    pub credentials_dir: PathBuf,
    /// Staging area for restores; must share a filesystem with `credentials_dir`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
    pub container: String,
    pub blob_name: String,
    pub store: StoreConfig,
    pub final_sync_timeout_secs: u64,
    pub backoff: BackoffConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pairing_attempts: Option<u32>,
}

impl Default for TetherConfig {
    fn default() -> Self {
        Self {
            credentials_dir: PathBuf::from("auth_info"),
            scratch_dir: None,
            container: "tether-session".into(),
            blob_name: DEFAULT_BLOB_NAME.into(),
            store: StoreConfig::default(),
            final_sync_timeout_secs: 30,
            backoff: BackoffConfig::default(),
            max_pairing_attempts: None,
        }
    }
}

impl TetherConfig {
    /// Load `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text).with_context(|| format!("invalid config {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file; using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("cannot read config {}", path.display())),
        }
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn with_overrides(mut self, container: Option<String>, credentials_dir: Option<PathBuf>) -> Self {
        if let Some(container) = container {
            self.container = container;
        }
        if let Some(dir) = credentials_dir {
            self.credentials_dir = dir;
        }
        self
    }

    pub fn blob_ref(&self) -> anyhow::Result<RemoteBlobRef> {
        let container = ContainerId::new(&self.container)?;
        Ok(RemoteBlobRef::new(container, &self.blob_name)?)
    }

    pub fn sync_options(&self) -> anyhow::Result<SyncOptions> {
        Ok(SyncOptions::new(self.blob_ref()?)
            .with_final_sync_timeout(Duration::from_secs(self.final_sync_timeout_secs)))
    }

    /// Reconnect and pairing settings for embedding a
    /// [`tether_supervisor::ConnectionSupervisor`].
    pub fn supervisor_config(&self) -> anyhow::Result<SupervisorConfig> {
        let config = SupervisorConfig {
            backoff: self.backoff.clone(),
            max_pairing_attempts: self.max_pairing_attempts,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every section, so a bad file fails before any command runs.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.sync_options()?;
        self.supervisor_config()?;
        if self.final_sync_timeout_secs == 0 {
            anyhow::bail!("final_sync_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn blob_backend(&self) -> Arc<dyn BlobBackend> {
        match &self.store {
            StoreConfig::Filesystem { root } => Arc::new(FsBlobBackend::new(root)),
            StoreConfig::Memory => Arc::new(InMemoryBlobBackend::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = TetherConfig::default();
        assert_eq!(c.blob_name, "session.pack");
        assert_eq!(c.final_sync_timeout_secs, 30);
        assert_eq!(c.sync_options().unwrap().final_sync_timeout, Duration::from_secs(30));
        assert!(c.supervisor_config().unwrap().max_pairing_attempts.is_none());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn invalid_reconnect_settings_are_reported() {
        let c = TetherConfig::parse(
            r#"
            max_pairing_attempts = 0

            [backoff]
            initial_ms = 100
            "#,
        )
        .unwrap();
        let err = c.validate().unwrap_err().to_string();
        assert!(err.contains("max_pairing_attempts"), "{err}");

        let c = TetherConfig::parse("[backoff]\ninitial_ms = 0\n").unwrap();
        assert!(c.validate().is_err());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let c = TetherConfig::parse(
            r#"
            container = "prod-bot"
            max_pairing_attempts = 5

            [store]
            kind = "filesystem"
            root = "/mnt/drive/tether"

            [backoff]
            initial_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(c.container, "prod-bot");
        assert_eq!(c.max_pairing_attempts, Some(5));
        assert_eq!(
            c.store,
            StoreConfig::Filesystem {
                root: PathBuf::from("/mnt/drive/tether")
            }
        );
        assert_eq!(c.backoff.initial_ms, 250);
        assert_eq!(c.backoff.max_ms, BackoffConfig::default().max_ms);
        assert_eq!(c.credentials_dir, PathBuf::from("auth_info"));
    }

    #[test]
    fn memory_store() {
        let c = TetherConfig::parse("[store]\nkind = \"memory\"\n").unwrap();
        assert_eq!(c.store, StoreConfig::Memory);
    }

    #[test]
    fn toml_roundtrip() {
        let c = TetherConfig {
            scratch_dir: Some(PathBuf::from("/tmp/tether")),
            ..TetherConfig::default()
        };
        let text = c.to_toml().unwrap();
        assert_eq!(TetherConfig::parse(&text).unwrap(), c);
    }

    #[test]
    fn overrides_win() {
        let c = TetherConfig::default().with_overrides(Some("other".into()), Some("/data/auth".into()));
        assert_eq!(c.container, "other");
        assert_eq!(c.credentials_dir, PathBuf::from("/data/auth"));
        assert_eq!(c.blob_ref().unwrap().to_string(), "other/session.pack");
    }

    #[test]
    fn invalid_container_is_rejected() {
        let c = TetherConfig::default().with_overrides(Some("../etc".into()), None);
        assert!(c.blob_ref().is_err());
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let c = TetherConfig::load(&dir.path().join("tether.toml")).unwrap();
        assert_eq!(c, TetherConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tether.toml");
        std::fs::write(&path, "container = [").unwrap();
        assert!(TetherConfig::load(&path).is_err());
    }
}
