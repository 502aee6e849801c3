use std::fmt;
use std::time::Duration;

/// Classification a screen ends a tick in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenState {
    Deactivated,
    Offline,
    Online,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerStatus {
    Stopped,
    Running,
    Error,
}

impl SchedulerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SchedulerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    pub status: SchedulerStatus,
    pub refresh_interval: Duration,
    pub is_running: bool,
}

impl StatusReport {
    /// Interval reported for screens the registry has never seen.
    pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

    pub fn stopped(refresh_interval: Duration) -> Self {
        Self {
            status: SchedulerStatus::Stopped,
            refresh_interval,
            is_running: false,
        }
    }
}

impl Default for StatusReport {
    fn default() -> Self {
        Self::stopped(Self::DEFAULT_REFRESH_INTERVAL)
    }
}

/// Administrative state reported by a device status provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus {
    pub is_active: bool,
}

impl DeviceStatus {
    pub const ACTIVE: Self = Self { is_active: true };
    pub const DEACTIVATED: Self = Self { is_active: false };
}
