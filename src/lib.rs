pub mod config;
pub mod error;
pub mod providers;
pub mod selector;
pub mod status;
pub mod platform {
    pub mod display_surface;
}
pub mod tasks {
    pub mod registry;
    pub mod screen;
}

pub use error::{Result, SchedulerError};
pub use status::{DeviceStatus, SchedulerStatus, ScreenState, StatusReport};
pub use tasks::registry::SchedulerRegistry;
pub use tasks::screen::{NoticePages, ScreenScheduler, TickOutcome};
