//! Domain model structs mirrored from the server into the local store.
//!
//! Every struct derives `Serialize` and `Deserialize` so the whole directory
//! can be persisted wholesale and handed to the UI layer as-is.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use workline_shared::{
    AccountId, ChatId, ChatKind, MessageId, MessageKind, MessageStatus, ParticipantId, Role,
};

use crate::message_store::MessageStore;

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A conversation: a two-party private thread or an N-party group.
///
/// Owns its [`MessageStore`] together with the conversation-scoped block and
/// mute records.  Blocks and mutes are soft-delete records, never hard
/// removals, so that unblock/unmute stays reversible.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chat {
    /// Server-issued conversation id.
    pub id: ChatId,
    /// Private (exactly two participants) or group (one or more, with roles).
    pub kind: ChatKind,
    /// Membership records, including participants who have since left.
    pub participants: Vec<Participant>,
    /// Group metadata, present iff `kind == Group`.
    pub group: Option<GroupInfo>,
    /// Date-partitioned message history.
    #[serde(default)]
    pub messages: MessageStore,
    /// Participants blocked by the local actor in this conversation.
    #[serde(default)]
    pub blocks: Vec<Block>,
    /// Time-bounded mutes applied by the local actor.
    #[serde(default)]
    pub mutes: Vec<Mute>,
    /// When the conversation was created server-side.
    pub created_at: DateTime<Utc>,
}

impl Chat {
    /// The active (non-left) participant record for an account, if any.
    ///
    /// At most one active participant per account id exists per conversation.
    pub fn active_participant(&self, account: &AccountId) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.account_id == *account && p.left_at.is_none())
    }

    /// Look up a participant record by its conversation-scoped id.
    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == *id)
    }
}

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// A conversation-scoped membership record, distinct from the account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    /// Participant-scoped id (not the account id).
    pub id: ParticipantId,
    /// The underlying account this participant belongs to.
    pub account_id: AccountId,
    /// Profile name shown as the sender label in group chats.
    pub display_name: Option<String>,
    /// Profile picture URL.
    pub avatar_url: Option<String>,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
    /// Set when the participant leaves; a left participant is inactive.
    pub left_at: Option<DateTime<Utc>>,
    /// Weak reference to the last message this participant has read.
    /// Stores an id only, resolved by lookup, never owned.
    pub last_read_message_id: Option<MessageId>,
}

// ---------------------------------------------------------------------------
// Group metadata
// ---------------------------------------------------------------------------

/// Display metadata for a group conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GroupInfo {
    pub name: String,
    pub description: Option<String>,
    pub icon_url: Option<String>,
}

/// Partial update for [`GroupInfo`].  `Some` fields are applied, `None`
/// fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GroupPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon_url: Option<String>,
}

impl GroupInfo {
    /// Shallow-merge a patch into this metadata.
    pub fn apply(&mut self, patch: &GroupPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(icon_url) = &patch.icon_url {
            self.icon_url = Some(icon_url.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Client-generated for the optimistic copy, replaced in place by the
    /// server-issued id once the create call resolves.
    pub id: MessageId,
    pub chat_id: ChatId,
    /// Participant id of the sender.
    pub sender_id: ParticipantId,
    pub kind: MessageKind,
    /// Text payload.  Non-text messages may carry a caption here.
    pub text: Option<String>,
    /// Durable URL of the attachment, set once the upload completes.
    pub file_url: Option<String>,
    /// Local file reference for a not-yet-uploaded attachment.
    /// Client-only; never sent to the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_file: Option<LocalFile>,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    /// Per-recipient delivery/seen tracking, keyed by recipient account.
    #[serde(default)]
    pub statuses: HashMap<AccountId, UserStatus>,
}

/// Reference to a file picked on the device, pending upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalFile {
    pub path: String,
    pub file_name: String,
}

/// Per-message, per-recipient delivery and seen tracking.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserStatus {
    pub received_at: Option<DateTime<Utc>>,
    pub seen_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Block / Mute
// ---------------------------------------------------------------------------

/// Conversation-scoped block record.
///
/// An undeleted record means the participant is blocked by the local actor in
/// that conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub chat_user_id: ParticipantId,
    pub created_at: DateTime<Utc>,
    /// Soft-delete marker set on unblock.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Block {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Conversation-scoped, time-bounded mute record.
///
/// "Currently muted" is derived from `muted_till` at evaluation time, never
/// stored as a flag, so no background timer is needed to unset it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mute {
    pub chat_user_id: ParticipantId,
    pub muted_till: DateTime<Utc>,
    /// Soft-delete marker set on explicit unmute.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Mute {
    /// Whether this record mutes its participant at the given instant.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.deleted_at.is_none() && self.muted_till > now
    }
}
