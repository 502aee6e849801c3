use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use content_model::ContentItem;
use rand::rngs::StdRng;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::providers::Collaborators;
use crate::selector::{self, Selection};
use crate::status::{DeviceStatus, ScreenState};

/// URLs shown while a screen cannot play content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticePages {
    pub offline: String,
    pub deactivated: String,
}

impl Default for NoticePages {
    fn default() -> Self {
        Self {
            offline: "file:///usr/share/signage/offline.html".to_string(),
            deactivated: "file:///usr/share/signage/deactivated.html".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Notice {
    Deactivated,
    Offline,
}

impl Notice {
    fn state(self) -> ScreenState {
        match self {
            Notice::Deactivated => ScreenState::Deactivated,
            Notice::Offline => ScreenState::Offline,
        }
    }
}

/// Source of "now" for expiry and schedule windows.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Cancellation was observed before the tick could finish.
    Cancelled,
    /// The screen is deactivated or offline. `shown` is true when the notice
    /// page was displayed on this tick.
    Notice { state: ScreenState, shown: bool },
    /// The screen is online. `selected` carries the item the selector chose,
    /// if any; `shown` reports whether the display accepted it.
    Online {
        selected: Option<ContentItem>,
        shown: bool,
    },
}

impl TickOutcome {
    pub fn into_selected(self) -> Option<ContentItem> {
        match self {
            TickOutcome::Online { selected, .. } => selected,
            TickOutcome::Cancelled | TickOutcome::Notice { .. } => None,
        }
    }
}

/// Per-screen state machine. Owns everything it mutates; the registry only
/// holds the cancellation token and join handle of the task running it.
pub struct ScreenScheduler {
    screen_id: String,
    collaborators: Collaborators,
    notices: Arc<NoticePages>,
    rng: StdRng,
    clock: Clock,
    last_state: Option<ScreenState>,
    notice_shown: bool,
    offline_mode: bool,
    current: Option<ContentItem>,
}

impl ScreenScheduler {
    pub fn new(
        screen_id: impl Into<String>,
        collaborators: Collaborators,
        notices: Arc<NoticePages>,
        rng: StdRng,
    ) -> Self {
        Self {
            screen_id: screen_id.into(),
            collaborators,
            notices,
            rng,
            clock: Arc::new(Utc::now),
            last_state: None,
            notice_shown: false,
            offline_mode: false,
            current: None,
        }
    }

    /// Replace the wall clock (tests and dry runs).
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn screen_id(&self) -> &str {
        &self.screen_id
    }

    pub fn current(&self) -> Option<&ContentItem> {
        self.current.as_ref()
    }

    pub fn last_state(&self) -> Option<ScreenState> {
        self.last_state
    }

    pub fn is_offline_mode(&self) -> bool {
        self.offline_mode
    }

    /// Ticks every `interval` until cancelled. The first tick fires one full
    /// interval after the call; ticks never overlap and missed periods are
    /// dropped rather than replayed.
    pub async fn run(mut self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if self.tick(&cancel).await == TickOutcome::Cancelled {
                break;
            }
        }
        debug!(screen_id = %self.screen_id, "screen loop exited");
    }

    pub async fn tick(&mut self, cancel: &CancellationToken) -> TickOutcome {
        let status = match cancel
            .run_until_cancelled(self.collaborators.device_status.status(&self.screen_id))
            .await
        {
            None => return TickOutcome::Cancelled,
            Some(Ok(status)) => status,
            Some(Err(err)) => {
                warn!(
                    screen_id = %self.screen_id,
                    error = ?err,
                    "device status query failed; assuming active"
                );
                DeviceStatus::ACTIVE
            }
        };
        if !status.is_active {
            return self.hold_notice(Notice::Deactivated, cancel).await;
        }

        let reachable = match cancel
            .run_until_cancelled(self.collaborators.connectivity.is_reachable())
            .await
        {
            None => return TickOutcome::Cancelled,
            Some(reachable) => reachable,
        };
        if !reachable {
            self.offline_mode = true;
            return self.hold_notice(Notice::Offline, cancel).await;
        }
        self.offline_mode = false;

        self.tick_online(cancel).await
    }

    /// Enters (or stays in) a notice state. The classification is recorded
    /// even if the notice fails to render; only the notice itself is retried.
    async fn hold_notice(&mut self, notice: Notice, cancel: &CancellationToken) -> TickOutcome {
        let state = notice.state();
        if self.last_state != Some(state) {
            info!(
                screen_id = %self.screen_id,
                from = ?self.last_state,
                state = ?state,
                "screen entered notice state"
            );
            self.last_state = Some(state);
            self.notice_shown = false;
            self.current = None;
        }
        if self.notice_shown {
            debug!(screen_id = %self.screen_id, state = ?state, "state unchanged");
            return TickOutcome::Notice {
                state,
                shown: false,
            };
        }
        if cancel.is_cancelled() {
            return TickOutcome::Cancelled;
        }

        let url = match notice {
            Notice::Deactivated => self.notices.deactivated.as_str(),
            Notice::Offline => self.notices.offline.as_str(),
        };
        match self.collaborators.display.show(url).await {
            Ok(()) => {
                debug!(screen_id = %self.screen_id, state = ?state, url, "notice page shown");
                self.notice_shown = true;
                TickOutcome::Notice { state, shown: true }
            }
            Err(err) => {
                warn!(
                    screen_id = %self.screen_id,
                    state = ?state,
                    error = ?err,
                    "failed to show notice page; retrying next tick"
                );
                TickOutcome::Notice {
                    state,
                    shown: false,
                }
            }
        }
    }

    async fn tick_online(&mut self, cancel: &CancellationToken) -> TickOutcome {
        let force_update = self.last_state != Some(ScreenState::Online);
        if force_update {
            info!(
                screen_id = %self.screen_id,
                from = ?self.last_state,
                "screen online; forcing content update"
            );
        }
        // The force flag belongs to this tick only, even if resolving fails.
        self.last_state = Some(ScreenState::Online);
        self.notice_shown = false;

        let resolution = match cancel
            .run_until_cancelled(self.collaborators.content.resolve(&self.screen_id))
            .await
        {
            None => return TickOutcome::Cancelled,
            Some(Ok(resolution)) => resolution,
            Some(Err(err)) => {
                warn!(
                    screen_id = %self.screen_id,
                    error = ?err,
                    "content resolution failed"
                );
                None
            }
        };

        let now = (self.clock)();
        let (display_url, content) = match selector::select(
            self.current.as_ref(),
            resolution,
            force_update,
            now,
            &mut self.rng,
        ) {
            Selection::Unchanged => {
                debug!(
                    screen_id = %self.screen_id,
                    content_id = ?self.current.as_ref().map(|item| item.id),
                    "content unchanged"
                );
                return TickOutcome::Online {
                    selected: None,
                    shown: false,
                };
            }
            Selection::Update {
                display_url,
                content,
            } => (display_url, content),
        };

        if cancel.is_cancelled() {
            return TickOutcome::Cancelled;
        }
        match self.collaborators.display.show(&display_url).await {
            Ok(()) => {
                info!(
                    screen_id = %self.screen_id,
                    content_id = content.id,
                    kind = %content.schedule_kind,
                    title = %content.title,
                    url = %display_url,
                    "showing content"
                );
                self.current = Some(content.clone());
                TickOutcome::Online {
                    selected: Some(content),
                    shown: true,
                }
            }
            Err(err) => {
                warn!(
                    screen_id = %self.screen_id,
                    content_id = content.id,
                    error = ?err,
                    "display rejected content; retrying next tick"
                );
                TickOutcome::Online {
                    selected: Some(content),
                    shown: false,
                }
            }
        }
    }
}
