#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use content_model::{ContentItem, ContentResolution, ContentType, DefaultPool, ScheduleKind};
use rand::SeedableRng;
use rand::rngs::StdRng;
use signage_scheduler::providers::{
    CollaboratorSet, Collaborators, ConnectivityProbe, ContentProvider, DeviceStatusProvider,
    DisplaySurface,
};
use signage_scheduler::tasks::screen::Clock;
use signage_scheduler::{DeviceStatus, NoticePages, ScreenScheduler};

pub const OFFLINE_PAGE: &str = "file:///notices/offline.html";
pub const DEACTIVATED_PAGE: &str = "file:///notices/deactivated.html";

/// Scriptable stand-in for every collaborator of one screen.
pub struct FakeScreen {
    pub active: AtomicBool,
    pub online: AtomicBool,
    pub fail_content: AtomicBool,
    pub fail_display: AtomicBool,
    content: Mutex<Option<ContentResolution>>,
    display_delay: Mutex<Duration>,
    shows: Mutex<Vec<String>>,
    resolves: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeScreen {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            active: AtomicBool::new(true),
            online: AtomicBool::new(true),
            fail_content: AtomicBool::new(false),
            fail_display: AtomicBool::new(false),
            content: Mutex::new(None),
            display_delay: Mutex::new(Duration::ZERO),
            shows: Mutex::new(Vec::new()),
            resolves: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn set_content(&self, resolution: Option<ContentResolution>) {
        *self.content.lock().unwrap() = resolution;
    }

    pub fn set_display_delay(&self, delay: Duration) {
        *self.display_delay.lock().unwrap() = delay;
    }

    pub fn shows(&self) -> Vec<String> {
        self.shows.lock().unwrap().clone()
    }

    pub fn show_count(&self) -> usize {
        self.shows.lock().unwrap().len()
    }

    pub fn resolve_count(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_shows(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            connectivity: self.clone(),
            device_status: self.clone(),
            content: self.clone(),
            display: self.clone(),
        }
    }

    pub fn collaborator_set(self: &Arc<Self>) -> CollaboratorSet {
        CollaboratorSet {
            connectivity: Some(self.clone()),
            device_status: Some(self.clone()),
            content: Some(self.clone()),
            display: Some(self.clone()),
        }
    }

    pub fn scheduler(self: &Arc<Self>, screen_id: &str) -> ScreenScheduler {
        ScreenScheduler::new(
            screen_id,
            self.collaborators(),
            Arc::new(notices()),
            StdRng::seed_from_u64(7),
        )
    }
}

/// Manually advanced clock for expiry checks.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new() -> Self {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().unwrap();
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    pub fn advance(&self, by: ChronoDuration) {
        *self.now.lock().unwrap() += by;
    }

    pub fn clock(&self) -> Clock {
        let now = self.now.clone();
        Arc::new(move || *now.lock().unwrap())
    }
}

#[async_trait]
impl ConnectivityProbe for FakeScreen {
    async fn is_reachable(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceStatusProvider for FakeScreen {
    async fn status(&self, _screen_id: &str) -> Result<DeviceStatus> {
        Ok(DeviceStatus {
            is_active: self.active.load(Ordering::SeqCst),
        })
    }
}

#[async_trait]
impl ContentProvider for FakeScreen {
    async fn resolve(&self, _screen_id: &str) -> Result<Option<ContentResolution>> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        if self.fail_content.load(Ordering::SeqCst) {
            return Err(anyhow!("content backend unavailable"));
        }
        Ok(self.content.lock().unwrap().clone())
    }
}

#[async_trait]
impl DisplaySurface for FakeScreen {
    async fn show(&self, url: &str) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.display_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.fail_display.load(Ordering::SeqCst) {
            return Err(anyhow!("renderer crashed"));
        }
        self.shows.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

pub fn notices() -> NoticePages {
    NoticePages {
        offline: OFFLINE_PAGE.to_string(),
        deactivated: DEACTIVATED_PAGE.to_string(),
    }
}

pub fn item(id: u64, kind: ScheduleKind, duration_minutes: u32) -> ContentItem {
    ContentItem {
        id,
        screen_id: "S1".to_string(),
        content_type: ContentType::Url,
        source: format!("https://signage.example/{id}"),
        duration_minutes,
        schedule_kind: kind,
        start_time: None,
        title: format!("item {id}"),
        actual_start_time: None,
    }
}

pub fn source(id: u64) -> String {
    format!("https://signage.example/{id}")
}

pub fn live(id: u64) -> Option<ContentResolution> {
    Some(ContentResolution::Single(item(id, ScheduleKind::Live, 5)))
}

pub fn default_pool(ids: &[u64], duration_minutes: u32) -> Option<ContentResolution> {
    let items = ids
        .iter()
        .map(|id| item(*id, ScheduleKind::Default, duration_minutes))
        .collect();
    DefaultPool::new(items).map(ContentResolution::DefaultPool)
}

/// Polls `check` until it holds or `within` elapses.
pub async fn eventually(within: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
