//! Collaborators the screen scheduler consumes or drives.
//!
//! The scheduler treats every call as one unit of work per tick: timeouts and
//! retries, if any, belong to the implementation behind the trait.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use content_model::ContentResolution;

use crate::error::SchedulerError;
use crate::status::DeviceStatus;

pub mod catalog;
pub mod connectivity;
pub mod device_status;

pub use catalog::CatalogContentProvider;
pub use connectivity::HttpConnectivityProbe;
pub use device_status::FileDeviceStatusProvider;

/// Reports whether the device can currently reach the internet.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Never fails; a network failure is the `false` signal.
    async fn is_reachable(&self) -> bool;
}

/// Reports whether a screen is administratively active.
#[async_trait]
pub trait DeviceStatusProvider: Send + Sync {
    async fn status(&self, screen_id: &str) -> Result<DeviceStatus>;
}

/// Resolves the best-fit content for a screen. `Ok(None)` means no content.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    async fn resolve(&self, screen_id: &str) -> Result<Option<ContentResolution>>;
}

/// Full-screen output. `show` returns only after the previous content has been
/// torn down and the new URL handed to the renderer.
#[async_trait]
pub trait DisplaySurface: Send + Sync {
    async fn show(&self, url: &str) -> Result<()>;
}

/// The full set of collaborators every screen scheduler is built from.
#[derive(Clone)]
pub struct Collaborators {
    pub connectivity: Arc<dyn ConnectivityProbe>,
    pub device_status: Arc<dyn DeviceStatusProvider>,
    pub content: Arc<dyn ContentProvider>,
    pub display: Arc<dyn DisplaySurface>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Partially wired collaborators; `build` fails with a configuration error
/// naming the first missing piece.
#[derive(Clone, Default)]
pub struct CollaboratorSet {
    pub connectivity: Option<Arc<dyn ConnectivityProbe>>,
    pub device_status: Option<Arc<dyn DeviceStatusProvider>>,
    pub content: Option<Arc<dyn ContentProvider>>,
    pub display: Option<Arc<dyn DisplaySurface>>,
}

impl CollaboratorSet {
    pub fn build(&self) -> Result<Collaborators, SchedulerError> {
        Ok(Collaborators {
            connectivity: self
                .connectivity
                .clone()
                .ok_or(SchedulerError::MissingProvider("connectivity probe"))?,
            device_status: self
                .device_status
                .clone()
                .ok_or(SchedulerError::MissingProvider("device status provider"))?,
            content: self
                .content
                .clone()
                .ok_or(SchedulerError::MissingProvider("content provider"))?,
            display: self
                .display
                .clone()
                .ok_or(SchedulerError::MissingProvider("display surface"))?,
        })
    }
}
