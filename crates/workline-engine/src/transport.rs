//! Transport adapter boundary with a tokio mpsc command/event pattern.
//!
//! The live bidirectional channel to the server is abstracted behind a pair
//! of typed channels: the engine sends [`TransportCommand`]s through a
//! [`TransportHandle`] and consumes [`ChatEvent`]s from a receiver.  The
//! adapter implementation (socket client, reconnect/backoff policy) lives
//! outside this crate; dropping the handle and receiver tears the
//! subscription down, so no listener outlives its owner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use workline_shared::{AccountId, ChatId, MessageId};
use workline_store::models::{Chat, GroupPatch, Message};

use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Inbound events
// ---------------------------------------------------------------------------

/// Events pushed by the server over the live channel.
///
/// Delivery is at-least-once: the same logical event may arrive more than
/// once, and arrival order is not guaranteed to match `created_at` order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ChatEvent {
    /// A conversation was created or the local actor was added to one.
    ChatCreated { chat: Chat },

    /// A new message was posted to a conversation.
    MessagePushed { message: Message },

    /// A recipient acknowledged receipt; the payload carries the message
    /// with its updated per-recipient statuses.
    MessageReceived { message: Message },

    /// A recipient saw the message; payload as above.
    MessageSeen { message: Message },

    /// Group metadata was edited.
    GroupEdited { chat_id: ChatId, patch: GroupPatch },
}

impl ChatEvent {
    /// Serialize to a JSON wire frame.
    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from a JSON wire frame.
    pub fn from_bytes(data: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

// ---------------------------------------------------------------------------
// Outbound commands
// ---------------------------------------------------------------------------

/// Commands sent *into* the transport adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum TransportCommand {
    /// Subscribe to a conversation's event room.
    JoinRoom { chat_id: ChatId },

    /// Acknowledge receipt of a message on behalf of the local account.
    AckReceived {
        chat_id: ChatId,
        message_id: MessageId,
        by: AccountId,
        at: DateTime<Utc>,
    },

    /// Tear down the connection.
    Disconnect,
}

/// Engine-side handle for sending commands to the adapter.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    cmd_tx: mpsc::Sender<TransportCommand>,
}

impl TransportHandle {
    pub async fn join_room(&self, chat_id: ChatId) -> Result<()> {
        self.send(TransportCommand::JoinRoom { chat_id }).await
    }

    pub async fn ack_received(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        by: AccountId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.send(TransportCommand::AckReceived {
            chat_id,
            message_id,
            by,
            at,
        })
        .await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.send(TransportCommand::Disconnect).await
    }

    async fn send(&self, command: TransportCommand) -> Result<()> {
        self.cmd_tx
            .send(command)
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }
}

/// The adapter-side ends of the channel pair.
#[derive(Debug)]
pub struct AdapterEnd {
    /// Commands emitted by the engine, to be forwarded to the server.
    pub commands: mpsc::Receiver<TransportCommand>,
    /// Sender for events received from the server.
    pub events: mpsc::Sender<ChatEvent>,
}

/// Create the paired channels wiring an engine to a transport adapter.
///
/// Returns `(handle, event_rx, adapter_end)`: the handle and event receiver
/// go to the engine, the adapter end to the concrete channel implementation
/// (or a test harness).
pub fn channel(capacity: usize) -> (TransportHandle, mpsc::Receiver<ChatEvent>, AdapterEnd) {
    let (cmd_tx, cmd_rx) = mpsc::channel(capacity);
    let (event_tx, event_rx) = mpsc::channel(capacity);
    (
        TransportHandle { cmd_tx },
        event_rx,
        AdapterEnd {
            commands: cmd_rx,
            events: event_tx,
        },
    )
}
