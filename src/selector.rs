//! Decides what a screen should show next.
//!
//! Rules:
//! - A single Live/Schedule item replaces the current content when forced, when
//!   nothing is playing, or when its id differs. Equal ids never re-show.
//! - A Default pool is re-drawn when forced, when nothing is playing, when the
//!   current item is not a Default item or left the pool, or once the current
//!   item has played for its full duration. Draws are uniform and restamp
//!   `actual_start_time`.
//! - Schedule items outside their window are never selected.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use content_model::{ContentItem, ContentResolution, ContentType, DefaultPool};
use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Unchanged,
    Update {
        display_url: String,
        content: ContentItem,
    },
}

impl Selection {
    fn show(content: ContentItem) -> Self {
        Self::Update {
            display_url: display_url(&content),
            content,
        }
    }
}

pub fn select<R: Rng + ?Sized>(
    previous: Option<&ContentItem>,
    resolution: Option<ContentResolution>,
    force_update: bool,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Selection {
    match resolution {
        None => Selection::Unchanged,
        Some(ContentResolution::Single(item)) if item.is_default() => {
            match DefaultPool::new(vec![item]) {
                Some(pool) => select_from_pool(previous, &pool, force_update, now, rng),
                None => Selection::Unchanged,
            }
        }
        Some(ContentResolution::Single(item)) => {
            if !item.is_eligible_at(now) {
                debug!(
                    content_id = item.id,
                    start_time = ?item.start_time,
                    "ignoring schedule item outside its window"
                );
                return Selection::Unchanged;
            }
            let due = force_update || previous.is_none_or(|prev| prev.id != item.id);
            if due {
                Selection::show(item)
            } else {
                Selection::Unchanged
            }
        }
        Some(ContentResolution::DefaultPool(pool)) => {
            select_from_pool(previous, &pool, force_update, now, rng)
        }
    }
}

fn select_from_pool<R: Rng + ?Sized>(
    previous: Option<&ContentItem>,
    pool: &DefaultPool,
    force_update: bool,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Selection {
    let candidates: Vec<&ContentItem> = pool
        .items()
        .iter()
        .filter(|item| item.is_default())
        .collect();
    if candidates.is_empty() {
        return Selection::Unchanged;
    }

    let due = force_update
        || match previous {
            None => true,
            Some(prev) => {
                !prev.is_default()
                    || !candidates.iter().any(|item| item.id == prev.id)
                    || prev.has_played_out(now)
            }
        };
    if !due {
        return Selection::Unchanged;
    }

    match candidates.choose(rng) {
        Some(chosen) => {
            let mut content = (*chosen).clone();
            content.actual_start_time = Some(now);
            Selection::show(content)
        }
        None => Selection::Unchanged,
    }
}

/// URL handed to the display surface for `item`.
pub fn display_url(item: &ContentItem) -> String {
    match item.content_type {
        ContentType::Url => with_autoplay(&item.source),
        ContentType::Image | ContentType::Video => item.source.clone(),
    }
}

/// Appends the autoplay/mute parameters an embedded player needs to start on
/// an unattended screen. Unrecognised or unparsable URLs pass through.
pub fn with_autoplay(source: &str) -> String {
    let Ok(mut url) = Url::parse(source) else {
        return source.to_string();
    };
    let Some(required) = autoplay_params(&url) else {
        return source.to_string();
    };

    let present: HashSet<String> = url.query_pairs().map(|(key, _)| key.into_owned()).collect();
    let missing: Vec<String> = required
        .iter()
        .filter(|(key, _)| !present.contains(*key))
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    if missing.is_empty() {
        return source.to_string();
    }

    let query = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{}", missing.join("&")),
        _ => missing.join("&"),
    };
    url.set_query(Some(&query));
    url.into()
}

const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "youtube-nocookie.com",
    "www.youtube-nocookie.com",
];

fn autoplay_params(url: &Url) -> Option<&'static [(&'static str, &'static str)]> {
    let host = url.host_str()?;
    let path = url.path();
    if YOUTUBE_HOSTS.contains(&host) && path.starts_with("/embed/") {
        return Some(&[("autoplay", "1"), ("mute", "1")]);
    }
    if host == "player.vimeo.com" && path.starts_with("/video/") {
        return Some(&[("autoplay", "1"), ("muted", "1")]);
    }
    None
}
