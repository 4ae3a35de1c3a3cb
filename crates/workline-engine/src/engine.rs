//! The reconciliation engine.
//!
//! One `SyncEngine` serves one signed-in account.  It owns the shared
//! [`ConversationDirectory`] handle, consumes inbound [`ChatEvent`]s, and
//! drives the per-message send lifecycle:
//!
//! ```text
//! DRAFT --stage--> PENDING --flush--> SENT
//!                     |                 ^
//!                     +----> FAILED ----+ (retry re-enters flush)
//! ```
//!
//! Execution is cooperative and run-to-completion: every merge into the
//! directory is a single synchronous step under the lock, while the send
//! pipeline suspends at the upload and create calls.  Between those
//! suspension points arbitrary inbound events may interleave, which is why
//! every merge is keyed by stable identity and idempotent.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use workline_shared::{
    AccountId, ChatId, ChatKind, MessageId, MessageKind, MessageStatus, ParticipantId,
};
use workline_store::models::{Chat, GroupPatch, LocalFile, Message};
use workline_store::{snapshot, views, ConversationDirectory};

use crate::api::{ChatApi, NewMessage};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::notify::{NotificationId, NotificationScheduler};
use crate::transport::{self, AdapterEnd, ChatEvent, TransportHandle};
use crate::upload::FileUploader;

/// Spawn a reconciliation engine with its transport channel pair.
///
/// Rehydrates the directory from `snapshot_path` when a snapshot exists,
/// wires the engine to a fresh channel pair, and runs the event loop in a
/// background tokio task.
///
/// Returns `(engine, adapter_end, loop_task)`: the adapter end goes to the
/// concrete channel implementation; dropping it stops the loop.
pub fn spawn_engine(
    me: AccountId,
    config: EngineConfig,
    api: Arc<dyn ChatApi>,
    uploader: Arc<dyn FileUploader>,
    notifier: Arc<dyn NotificationScheduler>,
    snapshot_path: Option<&Path>,
) -> anyhow::Result<(Arc<SyncEngine>, AdapterEnd, JoinHandle<()>)> {
    let directory = match snapshot_path {
        Some(path) if path.exists() => snapshot::load_from(path)?,
        _ => ConversationDirectory::new(),
    };

    let (handle, events, adapter) = transport::channel(config.channel_capacity);
    let engine = Arc::new(SyncEngine::with_directory(
        me, config, directory, api, uploader, notifier, handle,
    ));

    let runner = Arc::clone(&engine);
    let task = tokio::spawn(async move { runner.run(events).await });

    Ok((engine, adapter, task))
}

/// Book-keeping that is not part of the persisted conversation state.
#[derive(Default)]
struct SideState {
    /// Dispatched-notification ledger: at most one notification per distinct
    /// message id, plus the owning chat for tap routing.
    notified: HashMap<MessageId, (NotificationId, ChatId)>,
    /// Local ids with an active PENDING -> SENT pipeline.
    in_flight: HashSet<MessageId>,
    /// Local ids retracted while a confirmation may still be in flight.
    retracted: HashSet<MessageId>,
}

/// The client-side reconciliation engine.
pub struct SyncEngine {
    me: AccountId,
    config: EngineConfig,
    directory: Arc<Mutex<ConversationDirectory>>,
    api: Arc<dyn ChatApi>,
    uploader: Arc<dyn FileUploader>,
    notifier: Arc<dyn NotificationScheduler>,
    transport: TransportHandle,
    side: Mutex<SideState>,
}

impl SyncEngine {
    pub fn new(
        me: AccountId,
        config: EngineConfig,
        api: Arc<dyn ChatApi>,
        uploader: Arc<dyn FileUploader>,
        notifier: Arc<dyn NotificationScheduler>,
        transport: TransportHandle,
    ) -> Self {
        Self::with_directory(
            me,
            config,
            ConversationDirectory::new(),
            api,
            uploader,
            notifier,
            transport,
        )
    }

    /// Build an engine around a rehydrated directory snapshot.
    pub fn with_directory(
        me: AccountId,
        config: EngineConfig,
        directory: ConversationDirectory,
        api: Arc<dyn ChatApi>,
        uploader: Arc<dyn FileUploader>,
        notifier: Arc<dyn NotificationScheduler>,
        transport: TransportHandle,
    ) -> Self {
        Self {
            me,
            config,
            directory: Arc::new(Mutex::new(directory)),
            api,
            uploader,
            notifier,
            transport,
            side: Mutex::new(SideState::default()),
        }
    }

    /// Shared handle to the conversation state, for the presentation layer.
    pub fn directory(&self) -> Arc<Mutex<ConversationDirectory>> {
        Arc::clone(&self.directory)
    }

    // ------------------------------------------------------------------
    // Inbound event dispatch
    // ------------------------------------------------------------------

    /// Consume inbound events until the adapter closes the channel.
    ///
    /// Disconnects are not fatal: the adapter owns reconnection, and
    /// idempotent merges make double-delivery around a reconnect harmless.
    pub async fn run(&self, mut events: mpsc::Receiver<ChatEvent>) {
        info!(account = %self.me, "sync engine started");
        while let Some(event) = events.recv().await {
            self.apply_event(event).await;
        }
        info!("transport event channel closed, sync engine stopped");
    }

    /// Apply a single inbound event to the directory.
    pub async fn apply_event(&self, event: ChatEvent) {
        match event {
            ChatEvent::ChatCreated { chat } => self.on_chat_created(chat).await,
            ChatEvent::MessagePushed { message } => self.on_message_pushed(message).await,
            ChatEvent::MessageReceived { message } | ChatEvent::MessageSeen { message } => {
                self.on_status_update(message).await
            }
            ChatEvent::GroupEdited { chat_id, patch } => {
                self.directory.lock().await.merge_chat_patch(&chat_id, &patch);
            }
        }
    }

    async fn on_chat_created(&self, mut chat: Chat) {
        chat.messages.rebase_tz_offset(self.config.tz_offset_minutes);
        let chat_id = chat.id.clone();
        let inserted = self.directory.lock().await.upsert_chat(chat);
        if inserted {
            info!(chat_id = %chat_id, "new chat added");
            if let Err(e) = self.transport.join_room(chat_id).await {
                warn!(error = %e, "could not join chat room");
            }
        }
    }

    async fn on_message_pushed(&self, message: Message) {
        let chat_id = message.chat_id.clone();
        let message_id = message.id.clone();

        // Merge under the lock; everything after works on the outcome.
        let merged = {
            let mut dir = self.directory.lock().await;
            let Some(chat) = dir.chat_mut(&chat_id) else {
                warn!(chat_id = %chat_id, "message for unknown chat, dropping");
                return;
            };
            // Hard content filter: a blocked sender's message must never
            // enter the local store.
            if chat.kind == ChatKind::Private && views::is_blocked(chat, &message.sender_id) {
                debug!(chat_id = %chat_id, message_id = %message_id, "message from blocked sender suppressed");
                return;
            }
            let own_participant = chat.active_participant(&self.me).map(|p| p.id.clone());
            let from_me = own_participant.as_ref() == Some(&message.sender_id);
            let muted = views::is_muted(chat, &message.sender_id, Utc::now());
            let (title, body) = notification_content(chat, &message);
            chat.messages.upsert(message);
            MergedPush {
                from_me,
                muted,
                title,
                body,
            }
        };

        if merged.from_me {
            return;
        }

        if self.config.notifications_enabled && !merged.muted {
            let mut side = self.side.lock().await;
            // Redelivered pushes must not notify twice.
            if !side.notified.contains_key(&message_id) {
                let notification = self.notifier.schedule(&merged.title, &merged.body);
                side.notified
                    .insert(message_id.clone(), (notification, chat_id.clone()));
            }
        }

        // Tell the server (and thereby the sender) we received it.
        if let Err(e) = self
            .transport
            .ack_received(chat_id, message_id, self.me.clone(), Utc::now())
            .await
        {
            debug!(error = %e, "could not emit received ack");
        }
    }

    async fn on_status_update(&self, message: Message) {
        let mut dir = self.directory.lock().await;
        match dir.chat_mut(&message.chat_id) {
            Some(chat) => chat.messages.upsert(message),
            None => debug!(chat_id = %message.chat_id, "status update for unknown chat, skipping"),
        }
    }

    // ------------------------------------------------------------------
    // Outbound send pipeline
    // ------------------------------------------------------------------

    /// Stage an optimistic text message (DRAFT -> PENDING).
    pub async fn stage_text(&self, chat_id: &ChatId, text: &str) -> Result<MessageId> {
        self.stage(chat_id, MessageKind::Text, Some(text.to_string()), None)
            .await
    }

    /// Stage an optimistic attachment message.  The file reference is stored
    /// inline on the pending entry; the upload happens in [`Self::flush`].
    pub async fn stage_attachment(
        &self,
        chat_id: &ChatId,
        kind: MessageKind,
        file: LocalFile,
        caption: Option<String>,
    ) -> Result<MessageId> {
        self.stage(chat_id, kind, caption, Some(file)).await
    }

    async fn stage(
        &self,
        chat_id: &ChatId,
        kind: MessageKind,
        text: Option<String>,
        local_file: Option<LocalFile>,
    ) -> Result<MessageId> {
        let mut dir = self.directory.lock().await;
        let chat = dir
            .chat_mut(chat_id)
            .ok_or_else(|| EngineError::UnknownChat(chat_id.clone()))?;
        let sender_id = chat
            .active_participant(&self.me)
            .map(|p| p.id.clone())
            .ok_or_else(|| EngineError::NotAParticipant(chat_id.clone()))?;

        let id = MessageId::local();
        chat.messages.append(Message {
            id: id.clone(),
            chat_id: chat_id.clone(),
            sender_id,
            kind,
            text,
            file_url: None,
            local_file,
            status: MessageStatus::Pending,
            created_at: Utc::now(),
            statuses: HashMap::new(),
        });
        debug!(chat_id = %chat_id, message_id = %id, "message staged");
        Ok(id)
    }

    /// Drive a staged (or failed) message through upload-then-create
    /// (PENDING -> SENT | FAILED).
    ///
    /// Returns the final status, or `None` when the message is no longer in
    /// the store (confirmed concurrently, or retracted).  Collaborator
    /// failures never propagate as errors; they become `Failed` state on the
    /// message.  A second concurrent call for the same id is a no-op.
    pub async fn flush(&self, chat_id: &ChatId, local_id: &MessageId) -> Option<MessageStatus> {
        let already_flushing = {
            let mut side = self.side.lock().await;
            !side.in_flight.insert(local_id.clone())
        };
        if already_flushing {
            debug!(message_id = %local_id, "send already in flight");
            return self.status_of(chat_id, local_id).await;
        }

        // Snapshot the pending entry, resetting a failed one for retry.
        let snapshot = {
            let mut dir = self.directory.lock().await;
            let Some(chat) = dir.chat_mut(chat_id) else {
                self.clear_in_flight(local_id).await;
                return None;
            };
            match chat.messages.get(local_id).cloned() {
                Some(m) if m.status == MessageStatus::Sent => {
                    self.clear_in_flight(local_id).await;
                    return Some(MessageStatus::Sent);
                }
                Some(m) => {
                    chat.messages.set_status(local_id, MessageStatus::Pending);
                    m
                }
                None => {
                    debug!(message_id = %local_id, "flush target gone, skipping");
                    self.clear_in_flight(local_id).await;
                    return None;
                }
            }
        };

        // Step 1: resolve the attachment URL, uploading if necessary.
        let file_url = match (&snapshot.file_url, &snapshot.local_file) {
            (Some(url), _) => Some(url.clone()),
            (None, Some(file)) => {
                match self
                    .uploader
                    .upload(
                        file,
                        snapshot.kind,
                        Some(&self.config.upload_folder),
                        Some(&file.file_name),
                    )
                    .await
                {
                    Ok(uploaded) => Some(uploaded.url),
                    Err(e) => {
                        warn!(message_id = %local_id, error = %e, "attachment upload failed");
                        return self.mark_failed(chat_id, local_id).await;
                    }
                }
            }
            (None, None) => None,
        };

        // Remember the resolved URL so a retry after a later failure does
        // not upload again.
        if let Some(url) = &file_url {
            let mut dir = self.directory.lock().await;
            if let Some(chat) = dir.chat_mut(chat_id) {
                if let Some(mut updated) = chat.messages.get(local_id).cloned() {
                    updated.file_url = Some(url.clone());
                    updated.local_file = None;
                    chat.messages.upsert(updated);
                }
            }
        }

        // Step 2: create the message server-side.
        let request = NewMessage {
            chat_id: chat_id.clone(),
            sender_id: snapshot.sender_id.clone(),
            kind: snapshot.kind,
            text: snapshot.text.clone(),
            file_url,
        };
        match self.api.create_message(request).await {
            Err(e) => {
                warn!(message_id = %local_id, error = %e, "create message failed");
                self.mark_failed(chat_id, local_id).await
            }
            Ok(server_message) => {
                let mut dir = self.directory.lock().await;
                let mut side = self.side.lock().await;
                side.in_flight.remove(local_id);
                if side.retracted.contains(local_id) {
                    // The user deleted the message while the confirmation was
                    // in flight; do not resurrect it.
                    debug!(message_id = %local_id, "confirmation for retracted message dropped");
                    return None;
                }
                match dir.chat_mut(chat_id) {
                    Some(chat) => {
                        let server_id = server_message.id.clone();
                        chat.messages.replace(local_id, server_message);
                        info!(chat_id = %chat_id, local_id = %local_id, server_id = %server_id, "message confirmed");
                        Some(MessageStatus::Sent)
                    }
                    None => None,
                }
            }
        }
    }

    /// Re-attempt a failed send, reusing the same local id.
    pub async fn retry(&self, chat_id: &ChatId, local_id: &MessageId) -> Option<MessageStatus> {
        self.flush(chat_id, local_id).await
    }

    /// Stage and flush a text message in one step.
    pub async fn send_text(&self, chat_id: &ChatId, text: &str) -> Result<MessageId> {
        let id = self.stage_text(chat_id, text).await?;
        self.flush(chat_id, &id).await;
        Ok(id)
    }

    /// Stage and flush an attachment message in one step.
    pub async fn send_attachment(
        &self,
        chat_id: &ChatId,
        kind: MessageKind,
        file: LocalFile,
        caption: Option<String>,
    ) -> Result<MessageId> {
        let id = self.stage_attachment(chat_id, kind, file, caption).await?;
        self.flush(chat_id, &id).await;
        Ok(id)
    }

    /// Remove a message locally and tombstone its id.
    ///
    /// A server confirmation arriving later for a retracted local id is
    /// dropped; retraction wins the race.
    pub async fn retract(&self, chat_id: &ChatId, message_id: &MessageId) {
        {
            let mut dir = self.directory.lock().await;
            if let Some(chat) = dir.chat_mut(chat_id) {
                chat.messages.remove_message(message_id);
            }
        }
        let mut side = self.side.lock().await;
        side.retracted.insert(message_id.clone());
        if let Some((notification, _)) = side.notified.remove(message_id) {
            self.notifier.dismiss(&notification);
        }
    }

    async fn mark_failed(&self, chat_id: &ChatId, local_id: &MessageId) -> Option<MessageStatus> {
        let updated = {
            let mut dir = self.directory.lock().await;
            dir.chat_mut(chat_id)
                .map(|c| c.messages.set_status(local_id, MessageStatus::Failed))
                .unwrap_or(false)
        };
        self.clear_in_flight(local_id).await;
        updated.then_some(MessageStatus::Failed)
    }

    async fn clear_in_flight(&self, local_id: &MessageId) {
        self.side.lock().await.in_flight.remove(local_id);
    }

    async fn status_of(&self, chat_id: &ChatId, message_id: &MessageId) -> Option<MessageStatus> {
        self.directory
            .lock()
            .await
            .chat(chat_id)?
            .messages
            .get(message_id)
            .map(|m| m.status)
    }

    // ------------------------------------------------------------------
    // REST-backed user actions
    // ------------------------------------------------------------------

    /// Fetch and merge a page of the conversation list.
    pub async fn load_chats(&self, page: u32, search: Option<&str>) -> Result<()> {
        let mut items = self
            .api
            .list_chats(page, self.config.page_size, search)
            .await?;
        for chat in &mut items {
            chat.messages.rebase_tz_offset(self.config.tz_offset_minutes);
        }
        let ids: Vec<ChatId> = items.iter().map(|c| c.id.clone()).collect();
        self.directory.lock().await.apply_page(page, items);
        for id in ids {
            if let Err(e) = self.transport.join_room(id).await {
                debug!(error = %e, "could not join chat room");
            }
        }
        Ok(())
    }

    /// Fetch and merge a page of a conversation's message history.
    pub async fn load_history(&self, chat_id: &ChatId, page: u32) -> Result<()> {
        let messages = self
            .api
            .list_messages(chat_id, page, self.config.page_size)
            .await?;
        let mut dir = self.directory.lock().await;
        let chat = dir
            .chat_mut(chat_id)
            .ok_or_else(|| EngineError::UnknownChat(chat_id.clone()))?;
        chat.messages.merge_history_page(messages);
        Ok(())
    }

    /// Create a conversation server-side and mirror it locally.
    pub async fn create_chat(
        &self,
        accounts: &[AccountId],
        kind: ChatKind,
        group_name: Option<&str>,
    ) -> Result<ChatId> {
        let mut chat = self.api.create_chat(accounts, kind, group_name).await?;
        chat.messages.rebase_tz_offset(self.config.tz_offset_minutes);
        let id = chat.id.clone();
        self.directory.lock().await.upsert_chat(chat);
        if let Err(e) = self.transport.join_room(id.clone()).await {
            warn!(error = %e, "could not join chat room");
        }
        Ok(id)
    }

    /// Edit group metadata server-side, then patch the local copy.
    pub async fn edit_group(&self, chat_id: &ChatId, patch: GroupPatch) -> Result<()> {
        self.api.edit_group(chat_id, &patch).await?;
        self.directory.lock().await.merge_chat_patch(chat_id, &patch);
        Ok(())
    }

    /// Block a participant server-side, then mirror the record locally.
    pub async fn block(&self, chat_id: &ChatId, target: &ParticipantId) -> Result<()> {
        self.api.block_participant(chat_id, target).await?;
        self.directory.lock().await.block(chat_id, target, Utc::now());
        Ok(())
    }

    pub async fn unblock(
        &self,
        chat_id: &ChatId,
        target: &ParticipantId,
    ) -> Result<()> {
        self.api.unblock_participant(chat_id, target).await?;
        self.directory.lock().await.unblock(chat_id, target, Utc::now());
        Ok(())
    }

    /// Mute a participant until the given instant.
    pub async fn mute(
        &self,
        chat_id: &ChatId,
        target: &ParticipantId,
        muted_till: DateTime<Utc>,
    ) -> Result<()> {
        self.api.mute_participant(chat_id, target, muted_till).await?;
        self.directory.lock().await.mute(chat_id, target, muted_till);
        Ok(())
    }

    pub async fn unmute(
        &self,
        chat_id: &ChatId,
        target: &ParticipantId,
    ) -> Result<()> {
        self.api.unmute_participant(chat_id, target).await?;
        self.directory.lock().await.unmute(chat_id, target, Utc::now());
        Ok(())
    }

    /// Delete a conversation server-side, drop it locally, and dismiss any
    /// of its outstanding notifications.
    pub async fn delete_chat(&self, chat_id: &ChatId) -> Result<()> {
        self.api.delete_chat(chat_id).await?;
        self.directory.lock().await.remove_chat(chat_id);

        let mut side = self.side.lock().await;
        let stale: Vec<MessageId> = side
            .notified
            .iter()
            .filter(|(_, (_, owner))| owner == chat_id)
            .map(|(id, _)| id.clone())
            .collect();
        for message_id in stale {
            if let Some((notification, _)) = side.notified.remove(&message_id) {
                self.notifier.dismiss(&notification);
            }
        }
        Ok(())
    }

    /// Route a notification tap back to its conversation.
    pub async fn chat_for_notification(&self, id: &NotificationId) -> Option<ChatId> {
        self.side
            .lock()
            .await
            .notified
            .values()
            .find(|(notification, _)| notification == id)
            .map(|(_, chat_id)| chat_id.clone())
    }
}

struct MergedPush {
    from_me: bool,
    muted: bool,
    title: String,
    body: String,
}

/// Title and body for a new-message notification.
fn notification_content(chat: &Chat, message: &Message) -> (String, String) {
    let sender = chat
        .participant(&message.sender_id)
        .and_then(|p| p.display_name.clone());
    let title = chat
        .group
        .as_ref()
        .map(|g| g.name.clone())
        .or(sender)
        .unwrap_or_else(|| "New message".to_string());
    let body = message.text.clone().unwrap_or_else(|| {
        match message.kind {
            MessageKind::Image => "Sent a photo",
            MessageKind::Video => "Sent a video",
            MessageKind::File => "Sent a file",
            MessageKind::Text => "New message",
        }
        .to_string()
    });
    (title, body)
}
