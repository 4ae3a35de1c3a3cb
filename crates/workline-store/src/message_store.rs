//! Date-partitioned, display-ordered message collection.
//!
//! The chat UI renders with day-separator headers and an inverted scroll, so
//! the store pre-aggregates what the view needs: one [`DayGroup`] per
//! calendar day, groups sorted newest-day-first, messages inside a group
//! sorted newest-first.
//!
//! Arrival order of events is *not* assumed to match `created_at` order
//! (redelivery, retries and network reordering are expected), so every merge
//! operation re-sorts instead of appending at the end.  All operations are
//! pure and local; a lookup miss on [`MessageStore::replace`] or
//! [`MessageStore::remove_message`] is a silent no-op, not an error.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use workline_shared::{MessageId, MessageStatus};

use crate::models::Message;

/// One calendar day's worth of messages, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DayGroup {
    /// Calendar day key, computed from `created_at` shifted by the store's
    /// timezone offset.
    pub day: NaiveDate,
    /// Messages of that day, sorted descending by `created_at`.
    pub messages: Vec<Message>,
}

/// Per-conversation ordered message collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageStore {
    /// Fixed UTC offset (minutes) applied when computing the calendar day.
    /// Day grouping is local-day granularity, not UTC-exact.
    #[serde(default)]
    tz_offset_minutes: i32,
    /// Date groups, sorted descending by day.  Exactly one group per
    /// distinct calendar day; empty groups are pruned.
    #[serde(default)]
    groups: Vec<DayGroup>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose day grouping uses the given UTC offset.
    pub fn with_tz_offset(tz_offset_minutes: i32) -> Self {
        Self {
            tz_offset_minutes,
            groups: Vec::new(),
        }
    }

    /// Calendar day of a timestamp under this store's timezone offset.
    pub fn day_of(&self, at: DateTime<Utc>) -> NaiveDate {
        (at + Duration::minutes(i64::from(self.tz_offset_minutes))).date_naive()
    }

    // ------------------------------------------------------------------
    // Merge operations
    // ------------------------------------------------------------------

    /// Insert a genuinely new message into its day group.
    ///
    /// Locates or creates the group for the message's calendar day, inserts,
    /// and restores the descending sort within the group and across groups.
    pub fn append(&mut self, message: Message) {
        let day = self.day_of(message.created_at);
        match self.groups.iter_mut().find(|g| g.day == day) {
            Some(group) => group.messages.push(message),
            None => self.groups.push(DayGroup {
                day,
                messages: vec![message],
            }),
        }
        self.resort(day);
    }

    /// Insert-or-update by id: the idempotent merge primitive.
    ///
    /// If a message with the same id already exists in the day group, it is
    /// replaced in place; otherwise the message is appended and the group
    /// re-sorted.  Applying the same message twice is a no-op the second
    /// time, which is what makes redelivered events safe to consume.
    pub fn upsert(&mut self, message: Message) {
        let day = self.day_of(message.created_at);
        match self.groups.iter_mut().find(|g| g.day == day) {
            Some(group) => {
                match group.messages.iter_mut().find(|m| m.id == message.id) {
                    Some(existing) => *existing = message,
                    None => group.messages.push(message),
                }
            }
            None => self.groups.push(DayGroup {
                day,
                messages: vec![message],
            }),
        }
        self.resort(day);
    }

    /// Overwrite the message with id `local_id` by `replacement`.
    ///
    /// The search spans the whole store, not just the suspected day: a
    /// locally stamped pending message and its server confirmation could
    /// straddle a day boundary.  The replacement's day is recomputed, so the
    /// entry moves to the correct group when the server timestamp differs.
    /// A lookup miss is a silent no-op.
    pub fn replace(&mut self, local_id: &MessageId, replacement: Message) {
        if !self.remove_message(local_id) {
            debug!(message_id = %local_id, "replace target not found, skipping");
            return;
        }
        self.upsert(replacement);
    }

    /// Remove a message by id from whichever group holds it, pruning the
    /// group if it is left empty.  Returns whether anything was removed.
    pub fn remove_message(&mut self, id: &MessageId) -> bool {
        for group in &mut self.groups {
            if let Some(pos) = group.messages.iter().position(|m| m.id == *id) {
                group.messages.remove(pos);
                self.groups.retain(|g| !g.messages.is_empty());
                return true;
            }
        }
        false
    }

    /// Set the lifecycle status of a message in place (no id change).
    /// A lookup miss is a silent no-op.  Returns whether anything changed.
    pub fn set_status(&mut self, id: &MessageId, status: MessageStatus) -> bool {
        for group in &mut self.groups {
            if let Some(message) = group.messages.iter_mut().find(|m| m.id == *id) {
                message.status = status;
                return true;
            }
        }
        debug!(message_id = %id, "set_status target not found, skipping");
        false
    }

    /// Rebuild the day grouping under a new timezone offset.
    ///
    /// Needed when a server-fetched store (grouped at UTC) is adopted by a
    /// client configured for a different local offset.
    pub fn rebase_tz_offset(&mut self, tz_offset_minutes: i32) {
        if self.tz_offset_minutes == tz_offset_minutes {
            return;
        }
        let mut rebuilt = MessageStore::with_tz_offset(tz_offset_minutes);
        for group in self.groups.drain(..) {
            for message in group.messages {
                rebuilt.upsert(message);
            }
        }
        *self = rebuilt;
    }

    /// Merge a page of REST-fetched history.
    ///
    /// History pages can overlap messages that already arrived over the push
    /// channel, so each item goes through [`MessageStore::upsert`].
    pub fn merge_history_page(&mut self, page: Vec<Message>) {
        for message in page {
            self.upsert(message);
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// The date groups in display order (newest day first).
    pub fn groups(&self) -> &[DayGroup] {
        &self.groups
    }

    /// Iterate all messages, newest first.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &Message> {
        self.groups.iter().flat_map(|g| g.messages.iter())
    }

    /// Look up a message by id anywhere in the store.
    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.iter_newest_first().find(|m| m.id == *id)
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.get(id).is_some()
    }

    /// Total number of messages across all groups.
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.messages.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Restore the descending sort for the touched group and the group list.
    fn resort(&mut self, day: NaiveDate) {
        if let Some(group) = self.groups.iter_mut().find(|g| g.day == day) {
            group
                .messages
                .sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
        self.groups.sort_by(|a, b| b.day.cmp(&a.day));
    }
}
