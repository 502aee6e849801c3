use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use content_model::{Catalog, ContentItem, ContentResolution};
use tracing::debug;

use super::ContentProvider;

/// Content provider backed by a YAML catalog.
///
/// The file is re-read on every call so operators can edit it while screens are
/// running; the next tick picks the change up.
#[derive(Debug, Clone)]
pub struct CatalogContentProvider {
    path: PathBuf,
    now_override: Option<DateTime<Utc>>,
}

impl CatalogContentProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            now_override: None,
        }
    }

    /// Freeze the clock used for schedule windows (dry runs and tests).
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now_override = Some(now);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Catalog> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read catalog at {}", self.path.display()))?;
        let catalog: Catalog = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse catalog at {}", self.path.display()))?;
        catalog
            .validate()
            .with_context(|| format!("invalid catalog at {}", self.path.display()))?;
        Ok(catalog)
    }

    pub async fn items_for(&self, screen_id: &str) -> Result<Vec<ContentItem>> {
        Ok(self.load().await?.items_for(screen_id))
    }

    fn now(&self) -> DateTime<Utc> {
        self.now_override.unwrap_or_else(Utc::now)
    }
}

#[async_trait]
impl ContentProvider for CatalogContentProvider {
    async fn resolve(&self, screen_id: &str) -> Result<Option<ContentResolution>> {
        let catalog = self.load().await?;
        let resolution = catalog.resolve(screen_id, self.now());
        debug!(
            screen_id,
            kind = ?resolution.as_ref().map(ContentResolution::kind),
            "catalog resolved"
        );
        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    #[tokio::test]
    async fn resolves_from_file_and_sees_edits() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
items:
  - {{ id: 1, screen-id: S1, type: url, source: "https://example.com/a", duration-minutes: 5, schedule-kind: default }}
"#
        )
        .unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().unwrap();
        let provider = CatalogContentProvider::new(file.path()).with_now(now);

        let first = provider.resolve("S1").await.unwrap();
        assert!(matches!(first, Some(ContentResolution::DefaultPool(_))));

        std::fs::write(
            file.path(),
            r#"
items:
  - { id: 2, screen-id: S1, type: url, source: "https://example.com/live", duration-minutes: 5, schedule-kind: live }
"#,
        )
        .unwrap();
        match provider.resolve("S1").await.unwrap() {
            Some(ContentResolution::Single(item)) => assert_eq!(item.id, 2),
            other => panic!("unexpected resolution {other:?}"),
        }
        assert!(provider.resolve("S2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CatalogContentProvider::new(dir.path().join("absent.yaml"));
        let err = provider.resolve("S1").await.unwrap_err();
        assert!(format!("{err:#}").contains("failed to read catalog"));
    }
}
