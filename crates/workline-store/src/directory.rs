//! The set of conversations known to the client, keyed by chat id.
//!
//! All mutation of conversation state funnels through the operations here
//! and on [`MessageStore`](crate::MessageStore); callers never reach into the
//! nested collections directly.  Each operation is a single synchronous step,
//! which is what makes the reconciliation engine's idempotence and ordering
//! properties hold without locks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use workline_shared::{ChatId, ParticipantId};

use crate::models::{Block, Chat, GroupPatch, Mute};

/// Ordered collection of conversations.
///
/// The order is the server's list order: page 1 replaces the whole set,
/// later pages append.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversationDirectory {
    chats: Vec<Chat>,
}

impl ConversationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    pub fn chat(&self, id: &ChatId) -> Option<&Chat> {
        self.chats.iter().find(|c| c.id == *id)
    }

    pub fn chat_mut(&mut self, id: &ChatId) -> Option<&mut Chat> {
        self.chats.iter_mut().find(|c| c.id == *id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chat> {
        self.chats.iter()
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    // ------------------------------------------------------------------
    // Merge operations
    // ------------------------------------------------------------------

    /// Insert a conversation if its id is unseen; otherwise do nothing.
    ///
    /// A thin "new chat" push payload must not clobber richer local state
    /// such as accumulated messages.  Returns whether an insert happened.
    pub fn upsert_chat(&mut self, chat: Chat) -> bool {
        if self.chat(&chat.id).is_some() {
            debug!(chat_id = %chat.id, "chat already known, keeping local copy");
            return false;
        }
        self.chats.push(chat);
        true
    }

    /// Merge a REST-sourced page of conversations.
    ///
    /// Page 1 replaces the entire set; later pages append, deduplicating by
    /// id with last-write-wins for overlapping ids.
    pub fn apply_page(&mut self, page: u32, items: Vec<Chat>) {
        if page <= 1 {
            self.chats = items;
            return;
        }
        for item in items {
            match self.chats.iter_mut().find(|c| c.id == item.id) {
                Some(existing) => *existing = item,
                None => self.chats.push(item),
            }
        }
    }

    /// Shallow-merge a group-metadata patch into an existing conversation.
    ///
    /// The conversation's message store is never touched.  A miss on the
    /// chat id is a silent no-op.
    pub fn merge_chat_patch(&mut self, id: &ChatId, patch: &GroupPatch) {
        match self.chat_mut(id) {
            Some(chat) => match chat.group.as_mut() {
                Some(group) => group.apply(patch),
                None => debug!(chat_id = %id, "patch for chat without group metadata, skipping"),
            },
            None => debug!(chat_id = %id, "patch for unknown chat, skipping"),
        }
    }

    /// Remove a conversation entirely (the only flow that drops local
    /// messages).  Returns whether anything was removed.
    pub fn remove_chat(&mut self, id: &ChatId) -> bool {
        let before = self.chats.len();
        self.chats.retain(|c| c.id != *id);
        self.chats.len() != before
    }

    // ------------------------------------------------------------------
    // Block / mute records
    // ------------------------------------------------------------------

    /// Record a block against a participant.  Idempotent: an already-active
    /// block is left as is.
    pub fn block(&mut self, chat_id: &ChatId, target: &ParticipantId, at: DateTime<Utc>) {
        if let Some(chat) = self.chat_mut(chat_id) {
            if chat
                .blocks
                .iter()
                .any(|b| b.chat_user_id == *target && b.is_active())
            {
                return;
            }
            chat.blocks.push(Block {
                chat_user_id: target.clone(),
                created_at: at,
                deleted_at: None,
            });
        }
    }

    /// Soft-delete every active block against a participant.
    pub fn unblock(&mut self, chat_id: &ChatId, target: &ParticipantId, at: DateTime<Utc>) {
        if let Some(chat) = self.chat_mut(chat_id) {
            for block in chat
                .blocks
                .iter_mut()
                .filter(|b| b.chat_user_id == *target && b.is_active())
            {
                block.deleted_at = Some(at);
            }
        }
    }

    /// Record a time-bounded mute for a participant, superseding any active
    /// mute record for the same participant.
    pub fn mute(&mut self, chat_id: &ChatId, target: &ParticipantId, muted_till: DateTime<Utc>) {
        if let Some(chat) = self.chat_mut(chat_id) {
            match chat
                .mutes
                .iter_mut()
                .find(|m| m.chat_user_id == *target && m.deleted_at.is_none())
            {
                Some(existing) => existing.muted_till = muted_till,
                None => chat.mutes.push(Mute {
                    chat_user_id: target.clone(),
                    muted_till,
                    deleted_at: None,
                }),
            }
        }
    }

    /// Soft-delete every undeleted mute record for a participant.
    pub fn unmute(&mut self, chat_id: &ChatId, target: &ParticipantId, at: DateTime<Utc>) {
        if let Some(chat) = self.chat_mut(chat_id) {
            for mute in chat
                .mutes
                .iter_mut()
                .filter(|m| m.chat_user_id == *target && m.deleted_at.is_none())
            {
                mute.deleted_at = Some(at);
            }
        }
    }
}
