use chrono::{DateTime, Utc};

use crate::api::models::{Conversation, FriendProfile};

pub const UNAVAILABLE: &str = "Unavailable";

/// Width of the name/status column for a given viewport width.
pub fn text_width(viewport_width: i32) -> i32 {
    if viewport_width >= 550 {
        300
    } else if viewport_width >= 350 {
        120
    } else {
        80
    }
}

/// Last applied column width, so width observers only relayout when the
/// tier actually changes.
#[derive(Debug, Default)]
pub struct ColumnWidth {
    current: Option<i32>,
}

impl ColumnWidth {
    /// Returns the new column width when `viewport_width` crosses into a
    /// different tier, `None` when it stays in the current one.
    pub fn observe(&mut self, viewport_width: i32) -> Option<i32> {
        let column = text_width(viewport_width);
        if self.current == Some(column) {
            return None;
        }
        self.current = Some(column);
        Some(column)
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 { format!("1 {} ago", unit) } else { format!("{} {}s ago", n, unit) }
}

/// Relative "last seen" label. Timestamps in the future read as "just now".
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds();
    match secs {
        s if s < 45 => "just now".to_string(),
        s if s < 3_600 => plural((s / 60).max(1), "minute"),
        s if s < 86_400 => plural(s / 3_600, "hour"),
        s if s < 7 * 86_400 => plural(s / 86_400, "day"),
        s if s < 30 * 86_400 => plural(s / (7 * 86_400), "week"),
        s if s < 365 * 86_400 => plural(s / (30 * 86_400), "month"),
        s => plural(s / (365 * 86_400), "year"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderContent {
    Loading,
    Direct {
        avatar_url: Option<String>,
        primary: String,
        secondary: String,
    },
    Group {
        photo_url: Option<String>,
        name: String,
        members: String,
    },
}

impl HeaderContent {
    pub fn direct(friend: Option<&FriendProfile>, loading: bool, now: DateTime<Utc>) -> Self {
        if loading {
            return HeaderContent::Loading;
        }
        match friend {
            Some(f) => HeaderContent::Direct {
                avatar_url: f.photo_url.clone(),
                primary: f.email.clone(),
                secondary: f
                    .last_seen
                    .map(|seen| time_ago(seen, now))
                    .unwrap_or_else(|| UNAVAILABLE.to_string()),
            },
            None => HeaderContent::Direct {
                avatar_url: None,
                primary: UNAVAILABLE.to_string(),
                secondary: UNAVAILABLE.to_string(),
            },
        }
    }

    pub fn group(conv: &Conversation, me: &str) -> Self {
        HeaderContent::Group {
            photo_url: conv.photo_url.clone(),
            name: conv.title(me),
            members: conv.participants.join(", "),
        }
    }
}
