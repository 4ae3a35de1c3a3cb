//! Whole-directory snapshot persistence.
//!
//! The directory is persisted wholesale as JSON and rehydrated on app start;
//! there is no per-record schema.  Encryption of the snapshot file is the
//! host's concern.

use std::fs;
use std::path::Path;

use tracing::info;

use crate::directory::ConversationDirectory;
use crate::error::Result;

/// Write the whole directory to a snapshot file, replacing any previous one.
pub fn save_to(directory: &ConversationDirectory, path: &Path) -> Result<()> {
    let bytes = serde_json::to_vec(directory)?;
    fs::write(path, bytes)?;
    info!(path = %path.display(), chats = directory.len(), "directory snapshot saved");
    Ok(())
}

/// Rehydrate a directory from a snapshot file.
pub fn load_from(path: &Path) -> Result<ConversationDirectory> {
    let bytes = fs::read(path)?;
    let directory: ConversationDirectory = serde_json::from_slice(&bytes)?;
    info!(path = %path.display(), chats = directory.len(), "directory snapshot loaded");
    Ok(directory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use workline_shared::{
        AccountId, ChatId, ChatKind, MessageId, MessageKind, MessageStatus, ParticipantId, Role,
    };

    use crate::models::{Chat, Message, Participant};

    #[test]
    fn snapshot_round_trip() {
        let at = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let mut dir = ConversationDirectory::new();
        let mut chat = Chat {
            id: ChatId::new("c1"),
            kind: ChatKind::Private,
            participants: vec![Participant {
                id: ParticipantId::new("p1"),
                account_id: AccountId::new("u1"),
                display_name: None,
                avatar_url: None,
                role: Role::Member,
                joined_at: at,
                left_at: None,
                last_read_message_id: None,
            }],
            group: None,
            messages: Default::default(),
            blocks: Vec::new(),
            mutes: Vec::new(),
            created_at: at,
        };
        chat.messages.append(Message {
            id: MessageId::new("m1"),
            chat_id: ChatId::new("c1"),
            sender_id: ParticipantId::new("p1"),
            kind: MessageKind::Text,
            text: Some("hello".into()),
            file_url: None,
            local_file: None,
            status: MessageStatus::Sent,
            created_at: at,
            statuses: Default::default(),
        });
        dir.upsert_chat(chat);

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("directory.json");

        save_to(&dir, &path).expect("should save");
        let restored = load_from(&path).expect("should load");
        assert_eq!(restored, dir);
    }
}
