//! Shared state for CLI commands: configuration, runtime and the store file.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use clima_runtime::{ClimaRuntime, ReportStore, RuntimeConfig, StoreSnapshot};

/// Load the runtime configuration, or the defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    let Some(path) = path else {
        return Ok(RuntimeConfig::default());
    };

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: RuntimeConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid config file {}", path.display()))?;
    Ok(config)
}

pub fn read_snapshot(path: &Path) -> Result<Option<StoreSnapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read store file {}", path.display()))?;
    let snapshot = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse store file {}", path.display()))?;
    Ok(Some(snapshot))
}

pub fn write_snapshot(path: &Path, snapshot: &StoreSnapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json)
        .with_context(|| format!("Failed to write store file {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace store file {}", path.display()))?;
    Ok(())
}

pub struct CliContext {
    pub runtime: ClimaRuntime,
    pub json: bool,
    store_path: Option<PathBuf>,
}

impl CliContext {
    pub async fn new(config: Option<&Path>, store_path: Option<PathBuf>, json: bool) -> Result<Self> {
        let config = load_config(config)?;
        let store = ReportStore::from_config(&config.store);

        if let Some(path) = &store_path {
            if let Some(snapshot) = read_snapshot(path)? {
                let loaded = store.import(snapshot).await;
                tracing::debug!(loaded, path = %path.display(), "Store loaded");
            }
        }

        let runtime = ClimaRuntime::builder()
            .config(config)
            .store(store)
            .build()
            .context("Failed to initialize the clima runtime")?;

        Ok(Self {
            runtime,
            json,
            store_path,
        })
    }

    /// Write the store back to the store file, if one was given.
    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.store_path else {
            return Ok(());
        };
        let snapshot = self.runtime.reports().export_snapshot().await;
        write_snapshot(path, &snapshot)?;
        tracing::debug!(reports = snapshot.reports.len(), path = %path.display(), "Store saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_missing_config_means_defaults() {
        assert_eq!(load_config(None).unwrap(), RuntimeConfig::default());
    }

    #[test]
    fn test_config_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clima.yaml");
        std::fs::write(
            &path,
            "step_delay: 0s\nretry:\n  chat:\n    max_retries: 2\n    initial_delay: 1s\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.step_delay, Duration::ZERO);
        assert_eq!(config.retry.chat.max_retries, 2);
        assert_eq!(config.retry.plan, RuntimeConfig::default().retry.plan);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clima.yaml");
        std::fs::write(&path, "retry:\n  plan:\n    max_retries: 0\n").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Invalid config file"));
    }

    #[tokio::test]
    async fn test_snapshot_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        assert!(read_snapshot(&path).unwrap().is_none());

        let snapshot = ReportStore::default().export().await;
        write_snapshot(&path, &snapshot).unwrap();
        assert_eq!(read_snapshot(&path).unwrap(), Some(snapshot));
    }
}
