use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use content_model::ContentItem;
use futures::future::join_all;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, SchedulerError};
use crate::providers::{CollaboratorSet, Collaborators};
use crate::status::{SchedulerStatus, StatusReport};
use crate::tasks::screen::{NoticePages, ScreenScheduler};

/// Owns at most one running scheduler per screen id.
///
/// Each screen has its own slot lock, so starting or stopping one screen never
/// waits on another. The map lock is only held to look slots up.
pub struct SchedulerRegistry {
    collaborators: CollaboratorSet,
    notices: Arc<NoticePages>,
    selection_seed: Option<u64>,
    slots: Mutex<HashMap<String, Arc<Mutex<Slot>>>>,
}

struct Slot {
    refresh_interval: Duration,
    running: Option<RunningScheduler>,
    /// Set once `cleanup` has dropped the slot from the map.
    retired: bool,
}

struct RunningScheduler {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RunningScheduler {
    fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Slot {
    fn new(refresh_interval: Duration) -> Self {
        Self {
            refresh_interval,
            running: None,
            retired: false,
        }
    }

    fn report(&self) -> StatusReport {
        match &self.running {
            None => StatusReport::stopped(self.refresh_interval),
            Some(running) if running.is_alive() => StatusReport {
                status: SchedulerStatus::Running,
                refresh_interval: self.refresh_interval,
                is_running: true,
            },
            // The loop only exits on its own if the task died.
            Some(_) => StatusReport {
                status: SchedulerStatus::Error,
                refresh_interval: self.refresh_interval,
                is_running: false,
            },
        }
    }

    /// Cancels the loop and waits for it to finish, so no tick of the old
    /// scheduler can reach the display afterwards.
    async fn stop(&mut self, screen_id: &str) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.cancel.cancel();
        match running.handle.await {
            Ok(()) => info!(screen_id, "screen scheduler stopped"),
            Err(err) if err.is_panic() => {
                warn!(screen_id, error = %err, "screen scheduler had panicked")
            }
            Err(err) => debug!(screen_id, error = %err, "screen scheduler task aborted"),
        }
    }
}

impl SchedulerRegistry {
    pub fn new(collaborators: CollaboratorSet) -> Self {
        Self {
            collaborators,
            notices: Arc::new(NoticePages::default()),
            selection_seed: None,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_notices(mut self, notices: NoticePages) -> Self {
        self.notices = Arc::new(notices);
        self
    }

    /// Makes Default pool draws reproducible.
    pub fn with_selection_seed(mut self, seed: Option<u64>) -> Self {
        self.selection_seed = seed;
        self
    }

    /// Starts (or restarts) the scheduler for `screen_id` and returns the item
    /// its first pass selected, if any.
    pub async fn start(
        &self,
        screen_id: &str,
        refresh_interval: Duration,
    ) -> Result<Option<ContentItem>> {
        ensure_interval(refresh_interval)?;
        let collaborators = self.collaborators.build()?;
        let mut slot = self.lock_slot(screen_id, refresh_interval).await;
        Ok(self
            .start_locked(&mut slot, screen_id, refresh_interval, collaborators)
            .await)
    }

    async fn start_locked(
        &self,
        slot: &mut Slot,
        screen_id: &str,
        refresh_interval: Duration,
        collaborators: Collaborators,
    ) -> Option<ContentItem> {
        slot.stop(screen_id).await;
        slot.refresh_interval = refresh_interval;

        let cancel = CancellationToken::new();
        let mut scheduler = ScreenScheduler::new(
            screen_id,
            collaborators,
            Arc::clone(&self.notices),
            self.rng(),
        );
        let initial = scheduler.tick(&cancel).await.into_selected();
        let handle = tokio::spawn(scheduler.run(refresh_interval, cancel.clone()));
        slot.running = Some(RunningScheduler { cancel, handle });

        info!(
            screen_id,
            refresh_interval = %humantime::format_duration(refresh_interval),
            initial_content = ?initial.as_ref().map(|item| item.id),
            "screen scheduler started"
        );
        initial
    }

    /// Stops the scheduler for `screen_id`. Unknown or stopped screens are a
    /// no-op.
    pub async fn stop(&self, screen_id: &str) {
        let slot = self.slots.lock().await.get(screen_id).cloned();
        if let Some(slot) = slot {
            slot.lock().await.stop(screen_id).await;
        }
    }

    pub async fn status(&self, screen_id: &str) -> StatusReport {
        let slot = self.slots.lock().await.get(screen_id).cloned();
        match slot {
            Some(slot) => slot.lock().await.report(),
            None => StatusReport::default(),
        }
    }

    /// Stores a new interval; a running scheduler is restarted so it takes
    /// effect immediately. The restart happens under the same slot lock, so a
    /// concurrent stop or cleanup is never undone.
    pub async fn update_interval(&self, screen_id: &str, refresh_interval: Duration) -> Result<()> {
        ensure_interval(refresh_interval)?;
        let mut slot = self.lock_slot(screen_id, refresh_interval).await;
        slot.refresh_interval = refresh_interval;
        let was_running = slot.running.is_some();
        info!(
            screen_id,
            refresh_interval = %humantime::format_duration(refresh_interval),
            restart = was_running,
            "refresh interval updated"
        );
        if was_running {
            let collaborators = self.collaborators.build()?;
            self.start_locked(&mut slot, screen_id, refresh_interval, collaborators)
                .await;
        }
        Ok(())
    }

    /// Screens with a live scheduler and their refresh intervals, sorted by id.
    pub async fn running(&self) -> Vec<(String, Duration)> {
        let slots: Vec<(String, Arc<Mutex<Slot>>)> = self
            .slots
            .lock()
            .await
            .iter()
            .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
            .collect();

        let mut running = Vec::new();
        for (screen_id, slot) in slots {
            let slot = slot.lock().await;
            if slot.running.as_ref().is_some_and(RunningScheduler::is_alive) {
                running.push((screen_id, slot.refresh_interval));
            }
        }
        running.sort_by(|a, b| a.0.cmp(&b.0));
        running
    }

    /// Stops every scheduler and forgets all screens.
    pub async fn cleanup(&self) {
        let slots: Vec<(String, Arc<Mutex<Slot>>)> = self.slots.lock().await.drain().collect();
        let count = slots.len();
        join_all(slots.into_iter().map(|(screen_id, slot)| async move {
            let mut slot = slot.lock().await;
            slot.stop(&screen_id).await;
            slot.retired = true;
        }))
        .await;
        info!(screens = count, "all screen schedulers cleaned up");
    }

    async fn slot(&self, screen_id: &str, refresh_interval: Duration) -> Arc<Mutex<Slot>> {
        let mut slots = self.slots.lock().await;
        Arc::clone(
            slots
                .entry(screen_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Slot::new(refresh_interval)))),
        )
    }

    /// Locks the live slot for `screen_id`, skipping slots a concurrent
    /// `cleanup` has already retired.
    async fn lock_slot(&self, screen_id: &str, refresh_interval: Duration) -> OwnedMutexGuard<Slot> {
        loop {
            let slot = self.slot(screen_id, refresh_interval).await.lock_owned().await;
            if !slot.retired {
                return slot;
            }
        }
    }

    fn rng(&self) -> StdRng {
        match self.selection_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

fn ensure_interval(refresh_interval: Duration) -> Result<()> {
    if refresh_interval.is_zero() {
        return Err(SchedulerError::InvalidInterval(refresh_interval));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_screen_reports_stopped_defaults() {
        let registry = SchedulerRegistry::new(CollaboratorSet::default());
        let report = registry.status("nowhere").await;
        assert_eq!(report.status, SchedulerStatus::Stopped);
        assert!(!report.is_running);
        assert_eq!(report.refresh_interval, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn configuration_errors_fail_start() {
        let registry = SchedulerRegistry::new(CollaboratorSet::default());
        let err = registry
            .start("S1", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::MissingProvider(_)));
        assert!(err.is_configuration());

        let err = registry.start("S1", Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidInterval(_)));
    }

    #[tokio::test]
    async fn interval_update_on_stopped_screen_is_stored() {
        let registry = SchedulerRegistry::new(CollaboratorSet::default());
        registry
            .update_interval("S1", Duration::from_secs(90))
            .await
            .unwrap();
        let report = registry.status("S1").await;
        assert_eq!(report.status, SchedulerStatus::Stopped);
        assert_eq!(report.refresh_interval, Duration::from_secs(90));
        assert!(registry.update_interval("S1", Duration::ZERO).await.is_err());
    }
}
