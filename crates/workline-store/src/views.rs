//! Pure read-side projections over conversation state.
//!
//! Stateless query functions recomputed on demand from a
//! [`Chat`](crate::Chat) snapshot.  Nothing here owns or caches state; the
//! host UI layer decides what to memoize.

use chrono::{DateTime, Utc};

use workline_shared::{AccountId, ChatKind, ParticipantId};

use crate::models::{Chat, Message, Participant};

/// The most recent message of a conversation, if any.
pub fn last_message_of(chat: &Chat) -> Option<&Message> {
    chat.messages.iter_newest_first().next()
}

/// Number of messages not yet seen by the given account.
///
/// Counts messages whose sender is someone else and whose per-recipient
/// status for the account lacks a `seen_at`.
pub fn unread_count_of(chat: &Chat, account: &AccountId) -> usize {
    let own_participant = chat.active_participant(account).map(|p| p.id.clone());
    chat.messages
        .iter_newest_first()
        .filter(|m| Some(&m.sender_id) != own_participant.as_ref())
        .filter(|m| {
            m.statuses
                .get(account)
                .and_then(|s| s.seen_at)
                .is_none()
        })
        .count()
}

/// Whether every non-sender participant has seen the message.
///
/// Drives the third state of the sent/delivered/seen tick icon.
pub fn is_seen_by_all(message: &Message, recipients: &[&Participant]) -> bool {
    recipients.iter().all(|p| {
        message
            .statuses
            .get(&p.account_id)
            .and_then(|s| s.seen_at)
            .is_some()
    })
}

/// Whether every non-sender participant has received the message.
///
/// The middle state of the tick icon.
pub fn received_by_all(message: &Message, recipients: &[&Participant]) -> bool {
    recipients.iter().all(|p| {
        message
            .statuses
            .get(&p.account_id)
            .and_then(|s| s.received_at)
            .is_some()
    })
}

/// Sender label for a message: the sender's profile name in group chats,
/// nothing in private chats (the caller shows no label there).
pub fn sender_display<'a>(message: &Message, chat: &'a Chat) -> Option<&'a str> {
    if chat.kind != ChatKind::Group {
        return None;
    }
    chat.participant(&message.sender_id)
        .and_then(|p| p.display_name.as_deref())
}

/// Whether the participant is blocked by the local actor in this
/// conversation (an active, undeleted block record exists).
pub fn is_blocked(chat: &Chat, participant: &ParticipantId) -> bool {
    chat.blocks
        .iter()
        .any(|b| b.chat_user_id == *participant && b.is_active())
}

/// Whether the participant is currently muted: an undeleted mute record
/// exists with `muted_till` strictly after `now`.  Derived at evaluation
/// time, never stored.
pub fn is_muted(chat: &Chat, participant: &ParticipantId, now: DateTime<Utc>) -> bool {
    chat.mutes
        .iter()
        .any(|m| m.chat_user_id == *participant && m.is_active(now))
}
