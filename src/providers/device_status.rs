use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::DeviceStatusProvider;
use crate::status::DeviceStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum AdminState {
    Active,
    #[serde(alias = "deactive")]
    Deactivated,
}

/// Device status read from a YAML map of `screen-id: active|deactivated`.
///
/// Screens that are not listed, or a file that does not exist yet, count as
/// active. A file that exists but cannot be read or parsed is an error.
#[derive(Debug, Clone)]
pub struct FileDeviceStatusProvider {
    path: PathBuf,
}

impl FileDeviceStatusProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<HashMap<String, AdminState>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no device status file; all screens active");
                return Ok(HashMap::new());
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read device status at {}", self.path.display())
                });
            }
        };
        if raw.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse device status at {}", self.path.display()))
    }
}

#[async_trait]
impl DeviceStatusProvider for FileDeviceStatusProvider {
    async fn status(&self, screen_id: &str) -> Result<DeviceStatus> {
        let states = self.load().await?;
        Ok(match states.get(screen_id) {
            Some(AdminState::Deactivated) => DeviceStatus::DEACTIVATED,
            Some(AdminState::Active) | None => DeviceStatus::ACTIVE,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_states_and_defaults_to_active() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.yaml");
        let provider = FileDeviceStatusProvider::new(&path);

        assert_eq!(provider.status("S1").await.unwrap(), DeviceStatus::ACTIVE);

        std::fs::write(&path, "S1: deactive\nS2: active\n").unwrap();
        assert_eq!(provider.status("S1").await.unwrap(), DeviceStatus::DEACTIVATED);
        assert_eq!(provider.status("S2").await.unwrap(), DeviceStatus::ACTIVE);
        assert_eq!(provider.status("S3").await.unwrap(), DeviceStatus::ACTIVE);
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.yaml");
        std::fs::write(&path, "S1: sideways\n").unwrap();
        let provider = FileDeviceStatusProvider::new(&path);
        assert!(provider.status("S1").await.is_err());
    }
}
