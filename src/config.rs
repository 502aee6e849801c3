use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::platform::display_surface::DisplayCommandPlan;
use crate::tasks::screen::NoticePages;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Screens started at launch.
    pub screens: Vec<ScreenConfig>,
    /// Tick interval for screens that do not set their own.
    #[serde(with = "humantime_serde")]
    pub default_refresh_interval: Duration,
    /// YAML content catalog shared by all screens.
    pub catalog_path: PathBuf,
    /// YAML map of `screen-id: active|deactive`. Missing file means all active.
    pub device_status_path: PathBuf,
    pub connectivity: ConnectivityOptions,
    pub display: DisplayOptions,
    /// Shown while the device cannot reach the internet.
    pub offline_page: String,
    /// Shown while the screen is administratively deactivated.
    pub deactivated_page: String,
    /// Optional deterministic seed for Default pool draws.
    pub selection_seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ScreenConfig {
    pub screen_id: String,
    #[serde(default, with = "humantime_serde")]
    pub refresh_interval: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ConnectivityOptions {
    pub url: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DisplayOptions {
    /// Renderer argv; `@URL@` is replaced by the URL to show.
    pub command: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub teardown_timeout: Duration,
}

impl Configuration {
    const fn default_refresh_interval() -> Duration {
        Duration::from_secs(60)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        serde_yaml::from_str(&s)
            .with_context(|| format!("failed to parse config at {}", path.display()))
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.default_refresh_interval.is_zero(),
            "default-refresh-interval must be greater than zero"
        );
        ensure!(
            !self.catalog_path.as_os_str().is_empty(),
            "catalog-path must be set"
        );

        let mut seen = HashSet::new();
        for screen in &self.screens {
            ensure!(
                !screen.screen_id.trim().is_empty(),
                "screens entries need a screen-id"
            );
            ensure!(
                seen.insert(screen.screen_id.as_str()),
                "screen {} is listed more than once",
                screen.screen_id
            );
            if let Some(interval) = screen.refresh_interval {
                ensure!(
                    !interval.is_zero(),
                    "screen {} refresh-interval must be greater than zero",
                    screen.screen_id
                );
            }
        }

        self.connectivity
            .validate()
            .context("invalid connectivity configuration")?;
        self.display
            .validate()
            .context("invalid display configuration")?;
        ensure!(!self.offline_page.trim().is_empty(), "offline-page must not be blank");
        ensure!(
            !self.deactivated_page.trim().is_empty(),
            "deactivated-page must not be blank"
        );
        Ok(self)
    }

    pub fn refresh_interval_for(&self, screen: &ScreenConfig) -> Duration {
        screen
            .refresh_interval
            .unwrap_or(self.default_refresh_interval)
    }

    pub fn notice_pages(&self) -> NoticePages {
        NoticePages {
            offline: self.offline_page.clone(),
            deactivated: self.deactivated_page.clone(),
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        let notices = NoticePages::default();
        Self {
            screens: Vec::new(),
            default_refresh_interval: Self::default_refresh_interval(),
            catalog_path: PathBuf::from("/var/lib/signage/catalog.yaml"),
            device_status_path: PathBuf::from("/var/lib/signage/device-status.yaml"),
            connectivity: ConnectivityOptions::default(),
            display: DisplayOptions::default(),
            offline_page: notices.offline,
            deactivated_page: notices.deactivated,
            selection_seed: None,
        }
    }
}

impl ConnectivityOptions {
    fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.url)
            .with_context(|| format!("connectivity.url {} is not a valid URL", self.url))?;
        ensure!(
            matches!(url.scheme(), "http" | "https"),
            "connectivity.url must use http or https"
        );
        ensure!(
            !self.timeout.is_zero(),
            "connectivity.timeout must be greater than zero"
        );
        Ok(())
    }
}

impl Default for ConnectivityOptions {
    fn default() -> Self {
        Self {
            url: "https://www.google.com".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl DisplayOptions {
    fn validate(&self) -> Result<()> {
        let program = self.command.first().map(|s| s.trim()).unwrap_or_default();
        ensure!(!program.is_empty(), "display.command must name a program");
        Ok(())
    }

    pub fn plan(&self) -> DisplayCommandPlan {
        DisplayCommandPlan {
            command: self.command.clone(),
            teardown_timeout: self.teardown_timeout,
        }
    }
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            command: vec![
                "chromium".to_string(),
                "--kiosk".to_string(),
                "--noerrdialogs".to_string(),
                "--autoplay-policy=no-user-gesture-required".to_string(),
                "@URL@".to_string(),
            ],
            teardown_timeout: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<Configuration> {
        serde_yaml::from_str::<Configuration>(yaml)?.validated()
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg = parse(
            r#"
catalog-path: /tmp/catalog.yaml
screens:
  - screen-id: lobby
  - screen-id: cafe
    refresh-interval: 30s
"#,
        )
        .unwrap();
        assert_eq!(cfg.screens.len(), 2);
        assert_eq!(cfg.refresh_interval_for(&cfg.screens[0]), Duration::from_secs(60));
        assert_eq!(cfg.refresh_interval_for(&cfg.screens[1]), Duration::from_secs(30));
        assert_eq!(cfg.connectivity.url, "https://www.google.com");
        assert_eq!(cfg.connectivity.timeout, Duration::from_secs(5));
        assert_eq!(cfg.display.command[0], "chromium");
        assert!(cfg.selection_seed.is_none());
    }

    #[test]
    fn overrides_are_honoured() {
        let cfg = parse(
            r#"
catalog-path: /srv/catalog.yaml
default-refresh-interval: 2m
connectivity:
  url: http://connectivity.local/ping
  timeout: 1500ms
display:
  command: [mpv, --fs, "@URL@"]
  teardown-timeout: 3s
offline-page: file:///srv/offline.html
selection-seed: 42
"#,
        )
        .unwrap();
        assert_eq!(cfg.default_refresh_interval, Duration::from_secs(120));
        assert_eq!(cfg.connectivity.timeout, Duration::from_millis(1500));
        assert_eq!(cfg.display.plan().teardown_timeout, Duration::from_secs(3));
        assert_eq!(cfg.notice_pages().offline, "file:///srv/offline.html");
        assert_eq!(cfg.selection_seed, Some(42));
    }

    #[test]
    fn rejects_invalid_values() {
        let duplicate = parse(
            r#"
screens:
  - screen-id: lobby
  - screen-id: lobby
"#,
        );
        assert!(duplicate.is_err());

        let zero = parse(
            r#"
screens:
  - screen-id: lobby
    refresh-interval: 0s
"#,
        );
        assert!(zero.is_err());

        let no_program = parse("display:\n  command: []\n");
        assert!(no_program.is_err());

        let bad_probe = parse("connectivity:\n  url: ftp://example.com\n");
        assert!(bad_probe.is_err());
    }
}
