use std::collections::HashSet;
use std::fmt;

use anyhow::{Result, anyhow, ensure};
use chrono::{
    DateTime, Duration as ChronoDuration, FixedOffset, LocalResult, NaiveDateTime, TimeZone, Utc,
};
use chrono_tz::Tz;
use serde::Deserialize;
use serde::de::{self, Deserializer};

pub use catalog::{Catalog, CatalogEntry, StartTimeLiteral};
pub use report::{ContentStatistics, ScheduleConflict, find_conflicts, statistics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    Url,
    Image,
    Video,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleKind {
    Live,
    Schedule,
    Default,
}

impl ScheduleKind {
    /// Lower values win when several kinds are eligible at once.
    pub const fn priority(self) -> u8 {
        match self {
            Self::Live => 1,
            Self::Schedule => 2,
            Self::Default => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Schedule => "schedule",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A playable unit as handed out by a content provider.
///
/// Everything except `actual_start_time` is fixed once the provider returns the
/// item. The scheduler stamps `actual_start_time` when it starts playing a
/// Default item so it can tell when the item has played out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub id: u64,
    pub screen_id: String,
    pub content_type: ContentType,
    pub source: String,
    pub duration_minutes: u32,
    pub schedule_kind: ScheduleKind,
    pub start_time: Option<DateTime<Utc>>,
    pub title: String,
    pub actual_start_time: Option<DateTime<Utc>>,
}

impl ContentItem {
    pub fn duration(&self) -> ChronoDuration {
        ChronoDuration::minutes(i64::from(self.duration_minutes))
    }

    /// Half-open `[start, start + duration)` window of a Schedule item.
    pub fn schedule_window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.start_time?;
        Some((start, start + self.duration()))
    }

    /// Live and Default items are always eligible; Schedule items only inside
    /// their window.
    pub fn is_eligible_at(&self, now: DateTime<Utc>) -> bool {
        match self.schedule_kind {
            ScheduleKind::Live | ScheduleKind::Default => true,
            ScheduleKind::Schedule => self
                .schedule_window()
                .is_some_and(|(start, end)| now >= start && now < end),
        }
    }

    /// True once a stamped item has been on screen for at least its duration.
    pub fn has_played_out(&self, now: DateTime<Utc>) -> bool {
        match self.actual_start_time {
            Some(started) => now.signed_duration_since(started) >= self.duration(),
            None => false,
        }
    }

    pub fn is_default(&self) -> bool {
        self.schedule_kind == ScheduleKind::Default
    }
}

/// Non-empty set of Default candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultPool {
    items: Vec<ContentItem>,
}

impl DefaultPool {
    /// Returns `None` for an empty set; "no content" is never an empty pool.
    pub fn new(items: Vec<ContentItem>) -> Option<Self> {
        if items.is_empty() {
            None
        } else {
            Some(Self { items })
        }
    }

    pub fn items(&self) -> &[ContentItem] {
        &self.items
    }

    pub fn contains(&self, id: u64) -> bool {
        self.items.iter().any(|item| item.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Result of one provider query. Absence of content is `Option::None` at the
/// call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentResolution {
    Single(ContentItem),
    DefaultPool(DefaultPool),
}

impl ContentResolution {
    /// Ranks eligible items Live > in-window Schedule > Default, newest start
    /// time first within a kind. A non-Default winner is returned alone,
    /// otherwise every Default item forms the pool.
    pub fn rank<I>(items: I, now: DateTime<Utc>) -> Option<Self>
    where
        I: IntoIterator<Item = ContentItem>,
    {
        let mut eligible: Vec<ContentItem> = items
            .into_iter()
            .filter(|item| item.is_eligible_at(now))
            .collect();
        eligible.sort_by(|a, b| {
            a.schedule_kind
                .priority()
                .cmp(&b.schedule_kind.priority())
                .then_with(|| b.start_time.cmp(&a.start_time))
        });

        let top = eligible.first()?;
        if !top.is_default() {
            return eligible.into_iter().next().map(Self::Single);
        }
        let defaults = eligible.into_iter().filter(ContentItem::is_default).collect();
        DefaultPool::new(defaults).map(Self::DefaultPool)
    }

    pub fn kind(&self) -> ScheduleKind {
        match self {
            Self::Single(item) => item.schedule_kind,
            Self::DefaultPool(_) => ScheduleKind::Default,
        }
    }
}

mod catalog {
    use super::*;

    /// On-disk content catalog shared by every screen of a site.
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub struct Catalog {
        #[serde(default = "Catalog::default_timezone")]
        pub timezone: Tz,
        #[serde(default)]
        pub items: Vec<CatalogEntry>,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub struct CatalogEntry {
        pub id: u64,
        pub screen_id: String,
        #[serde(rename = "type")]
        pub content_type: ContentType,
        pub source: String,
        pub duration_minutes: u32,
        pub schedule_kind: ScheduleKind,
        #[serde(default)]
        pub start_time: Option<StartTimeLiteral>,
        #[serde(default)]
        pub title: String,
    }

    /// Either an absolute RFC 3339 instant or a wall-clock time in the catalog
    /// timezone.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum StartTimeLiteral {
        Absolute(DateTime<FixedOffset>),
        Local(NaiveDateTime),
    }

    impl StartTimeLiteral {
        pub fn resolve(&self, tz: Tz) -> Option<DateTime<Utc>> {
            match self {
                Self::Absolute(instant) => Some(instant.with_timezone(&Utc)),
                Self::Local(naive) => resolve_local_datetime(tz, *naive),
            }
        }
    }

    impl<'de> Deserialize<'de> for StartTimeLiteral {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: Deserializer<'de>,
        {
            let raw = String::deserialize(deserializer)?;
            let trimmed = raw.trim();
            if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
                return Ok(Self::Absolute(instant));
            }
            for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
                if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
                    return Ok(Self::Local(parsed));
                }
            }
            Err(de::Error::custom(format!(
                "invalid start-time literal '{raw}'"
            )))
        }
    }

    impl Catalog {
        fn default_timezone() -> Tz {
            Tz::UTC
        }

        pub fn validate(&self) -> Result<()> {
            let mut seen = HashSet::new();
            for entry in &self.items {
                let label = format!("items[{}:{}]", entry.screen_id, entry.id);
                ensure!(
                    !entry.screen_id.trim().is_empty(),
                    "{label}.screen-id must not be blank"
                );
                ensure!(
                    !entry.source.trim().is_empty(),
                    "{label}.source must not be blank"
                );
                ensure!(
                    entry.duration_minutes > 0,
                    "{label}.duration-minutes must be greater than zero"
                );
                if entry.schedule_kind == ScheduleKind::Schedule {
                    let start = entry
                        .start_time
                        .ok_or_else(|| anyhow!("{label}.start-time is required for schedule items"))?;
                    ensure!(
                        start.resolve(self.timezone).is_some(),
                        "{label}.start-time cannot be resolved in {}",
                        self.timezone
                    );
                }
                ensure!(
                    seen.insert((entry.screen_id.as_str(), entry.id)),
                    "{label} is defined more than once"
                );
            }
            Ok(())
        }

        pub fn items_for(&self, screen_id: &str) -> Vec<ContentItem> {
            self.items
                .iter()
                .filter(|entry| entry.screen_id == screen_id)
                .map(|entry| entry.to_item(self.timezone))
                .collect()
        }

        pub fn resolve(&self, screen_id: &str, now: DateTime<Utc>) -> Option<ContentResolution> {
            ContentResolution::rank(self.items_for(screen_id), now)
        }
    }

    impl CatalogEntry {
        fn to_item(&self, tz: Tz) -> ContentItem {
            ContentItem {
                id: self.id,
                screen_id: self.screen_id.clone(),
                content_type: self.content_type,
                source: self.source.clone(),
                duration_minutes: self.duration_minutes,
                schedule_kind: self.schedule_kind,
                start_time: self.start_time.and_then(|literal| literal.resolve(tz)),
                title: self.title.clone(),
                actual_start_time: None,
            }
        }
    }

    /// Wall-clock times inside a DST gap move forward to the first valid
    /// minute; repeated hours resolve to the earlier instant.
    fn resolve_local_datetime(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        let mut candidate = naive;
        for _ in 0..=180 {
            match tz.from_local_datetime(&candidate) {
                LocalResult::Single(dt) => return Some(dt.with_timezone(&Utc)),
                LocalResult::Ambiguous(earliest, _) => return Some(earliest.with_timezone(&Utc)),
                LocalResult::None => candidate += ChronoDuration::minutes(1),
            }
        }
        None
    }
}

mod report {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ScheduleConflict {
        pub id: u64,
        pub title: String,
        pub start: DateTime<Utc>,
        pub end: DateTime<Utc>,
    }

    /// Schedule items whose window overlaps `[start, start + duration)`.
    pub fn find_conflicts(
        items: &[ContentItem],
        start: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Vec<ScheduleConflict> {
        let end = start + ChronoDuration::minutes(i64::from(duration_minutes));
        items
            .iter()
            .filter(|item| item.schedule_kind == ScheduleKind::Schedule)
            .filter_map(|item| {
                let (item_start, item_end) = item.schedule_window()?;
                (start < item_end && item_start < end).then(|| ScheduleConflict {
                    id: item.id,
                    title: item.title.clone(),
                    start: item_start,
                    end: item_end,
                })
            })
            .collect()
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct ContentStatistics {
        pub total: usize,
        pub live: usize,
        pub scheduled: usize,
        pub default: usize,
        pub upcoming_scheduled: usize,
    }

    pub fn statistics(items: &[ContentItem], now: DateTime<Utc>) -> ContentStatistics {
        let mut stats = ContentStatistics::default();
        for item in items {
            stats.total += 1;
            match item.schedule_kind {
                ScheduleKind::Live => stats.live += 1,
                ScheduleKind::Default => stats.default += 1,
                ScheduleKind::Schedule => {
                    stats.scheduled += 1;
                    if item.start_time.is_some_and(|start| start > now) {
                        stats.upcoming_scheduled += 1;
                    }
                }
            }
        }
        stats
    }
}
