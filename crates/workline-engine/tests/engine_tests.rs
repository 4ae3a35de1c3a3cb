//! End-to-end scenarios for the reconciliation engine, driven through fake
//! collaborators:
//!
//! - `FakeApi` replays scripted responses for create-message and list calls.
//! - `RecordingNotifier` records every scheduled/dismissed notification.
//! - The transport adapter end is an in-process channel pair, so tests can
//!   inspect emitted commands and inject inbound events.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use workline_engine::transport::{self, AdapterEnd, ChatEvent, TransportCommand};
use workline_engine::{
    ApiError, ChatApi, EngineConfig, FileUploader, NewMessage, NotificationId,
    NotificationScheduler, SyncEngine, UploadError, UploadedFile,
};
use workline_shared::{
    AccountId, ChatId, ChatKind, MessageId, MessageKind, MessageStatus, ParticipantId, Role,
};
use workline_store::models::{Chat, GroupInfo, GroupPatch, LocalFile, Message, Participant};
use workline_store::{views, ConversationDirectory};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const ME: &str = "acc-me";
const OTHER: &str = "acc-other";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
}

fn participant(id: &str, account: &str, name: &str) -> Participant {
    Participant {
        id: ParticipantId::new(id),
        account_id: AccountId::new(account),
        display_name: Some(name.to_string()),
        avatar_url: None,
        role: Role::Member,
        joined_at: now(),
        left_at: None,
        last_read_message_id: None,
    }
}

fn private_chat(id: &str) -> Chat {
    Chat {
        id: ChatId::new(id),
        kind: ChatKind::Private,
        participants: vec![
            participant("p-me", ME, "Me"),
            participant("p-other", OTHER, "Sam"),
        ],
        group: None,
        messages: Default::default(),
        blocks: Vec::new(),
        mutes: Vec::new(),
        created_at: now(),
    }
}

fn group_chat(id: &str, name: &str) -> Chat {
    Chat {
        group: Some(GroupInfo {
            name: name.to_string(),
            description: None,
            icon_url: None,
        }),
        kind: ChatKind::Group,
        ..private_chat(id)
    }
}

fn inbound_message(id: &str, chat: &str, sender: &str, text: &str) -> Message {
    Message {
        id: MessageId::new(id),
        chat_id: ChatId::new(chat),
        sender_id: ParticipantId::new(sender),
        kind: MessageKind::Text,
        text: Some(text.to_string()),
        file_url: None,
        local_file: None,
        status: MessageStatus::Sent,
        created_at: now(),
        statuses: Default::default(),
    }
}

// ---------------------------------------------------------------------------
// Fake collaborators
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeApi {
    create_responses: Mutex<VecDeque<Result<Message, ApiError>>>,
    create_calls: AtomicUsize,
    chat_pages: Mutex<VecDeque<Vec<Chat>>>,
}

impl FakeApi {
    fn script_create(&self, response: Result<Message, ApiError>) {
        self.create_responses.lock().unwrap().push_back(response);
    }

    fn script_chat_page(&self, page: Vec<Chat>) {
        self.chat_pages.lock().unwrap().push_back(page);
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn list_chats(
        &self,
        _page: u32,
        _page_size: u32,
        _search: Option<&str>,
    ) -> Result<Vec<Chat>, ApiError> {
        Ok(self.chat_pages.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn list_messages(
        &self,
        _chat_id: &ChatId,
        _page: u32,
        _page_size: u32,
    ) -> Result<Vec<Message>, ApiError> {
        Ok(Vec::new())
    }

    async fn create_message(&self, _message: NewMessage) -> Result<Message, ApiError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.create_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Network("unscripted create".into())))
    }

    async fn create_chat(
        &self,
        _accounts: &[AccountId],
        _kind: ChatKind,
        _group_name: Option<&str>,
    ) -> Result<Chat, ApiError> {
        Err(ApiError::Rejected("unscripted".into()))
    }

    async fn edit_group(&self, _chat_id: &ChatId, _patch: &GroupPatch) -> Result<(), ApiError> {
        Ok(())
    }

    async fn block_participant(
        &self,
        _chat_id: &ChatId,
        _target: &ParticipantId,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    async fn unblock_participant(
        &self,
        _chat_id: &ChatId,
        _target: &ParticipantId,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    async fn mute_participant(
        &self,
        _chat_id: &ChatId,
        _target: &ParticipantId,
        _muted_till: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    async fn unmute_participant(
        &self,
        _chat_id: &ChatId,
        _target: &ParticipantId,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    async fn delete_chat(&self, _chat_id: &ChatId) -> Result<(), ApiError> {
        Ok(())
    }
}

struct NullUploader;

#[async_trait]
impl FileUploader for NullUploader {
    async fn upload(
        &self,
        file: &LocalFile,
        _kind: MessageKind,
        _folder: Option<&str>,
        _file_name: Option<&str>,
    ) -> Result<UploadedFile, UploadError> {
        Ok(UploadedFile {
            url: format!("https://files.example/{}", file.file_name),
        })
    }
}

struct FailingUploader;

#[async_trait]
impl FileUploader for FailingUploader {
    async fn upload(
        &self,
        _file: &LocalFile,
        _kind: MessageKind,
        _folder: Option<&str>,
        _file_name: Option<&str>,
    ) -> Result<UploadedFile, UploadError> {
        Err(UploadError::Failed("disk on fire".into()))
    }
}

#[derive(Default)]
struct RecordingNotifier {
    scheduled: Mutex<Vec<(String, String)>>,
    dismissed: Mutex<Vec<NotificationId>>,
}

impl RecordingNotifier {
    fn scheduled_count(&self) -> usize {
        self.scheduled.lock().unwrap().len()
    }
}

impl NotificationScheduler for RecordingNotifier {
    fn schedule(&self, title: &str, body: &str) -> NotificationId {
        self.scheduled
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
        NotificationId::generate()
    }

    fn dismiss(&self, id: &NotificationId) {
        self.dismissed.lock().unwrap().push(id.clone());
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    engine: SyncEngine,
    api: Arc<FakeApi>,
    notifier: Arc<RecordingNotifier>,
    adapter: AdapterEnd,
}

fn harness_with(uploader: Arc<dyn FileUploader>, chats: Vec<Chat>) -> Harness {
    let api = Arc::new(FakeApi::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let (handle, _events, adapter) = transport::channel(16);

    let mut directory = ConversationDirectory::new();
    for chat in chats {
        directory.upsert_chat(chat);
    }

    let engine = SyncEngine::with_directory(
        AccountId::new(ME),
        EngineConfig::default(),
        directory,
        api.clone(),
        uploader,
        notifier.clone(),
        handle,
    );
    Harness {
        engine,
        api,
        notifier,
        adapter,
    }
}

fn harness(chats: Vec<Chat>) -> Harness {
    harness_with(Arc::new(NullUploader), chats)
}

impl Harness {
    async fn message_count(&self, chat: &str) -> usize {
        let dir = self.engine.directory();
        let dir = dir.lock().await;
        dir.chat(&ChatId::new(chat)).map(|c| c.messages.len()).unwrap_or(0)
    }

    async fn message(&self, chat: &str, id: &str) -> Option<Message> {
        let dir = self.engine.directory();
        let dir = dir.lock().await;
        dir.chat(&ChatId::new(chat))
            .and_then(|c| c.messages.get(&MessageId::new(id)).cloned())
    }

    fn drained_commands(&mut self) -> Vec<TransportCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = self.adapter.commands.try_recv() {
            commands.push(command);
        }
        commands
    }
}

// ---------------------------------------------------------------------------
// Send pipeline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn optimistic_send_confirms_server_id() {
    let h = harness(vec![private_chat("C123")]);
    let chat = ChatId::new("C123");

    let local_id = h.engine.stage_text(&chat, "hello").await.unwrap();

    // Optimistic state: one pending entry with the local id.
    let staged = h.message("C123", &local_id.0).await.unwrap();
    assert_eq!(staged.status, MessageStatus::Pending);
    assert_eq!(staged.text.as_deref(), Some("hello"));
    assert_eq!(h.message_count("C123").await, 1);

    h.api.script_create(Ok(inbound_message("srv-1", "C123", "p-me", "hello")));
    let status = h.engine.flush(&chat, &local_id).await;
    assert_eq!(status, Some(MessageStatus::Sent));

    // Exactly one message, now with the server id; no pending entries left.
    assert_eq!(h.message_count("C123").await, 1);
    assert!(h.message("C123", "srv-1").await.is_some());
    assert!(h.message("C123", &local_id.0).await.is_none());
}

#[tokio::test]
async fn failed_create_marks_failed_then_retry_reuses_local_id() {
    let h = harness(vec![private_chat("C123")]);
    let chat = ChatId::new("C123");

    h.api.script_create(Err(ApiError::Network("timeout".into())));
    let local_id = h.engine.stage_text(&chat, "flaky").await.unwrap();
    let status = h.engine.flush(&chat, &local_id).await;
    assert_eq!(status, Some(MessageStatus::Failed));
    assert_eq!(
        h.message("C123", &local_id.0).await.unwrap().status,
        MessageStatus::Failed
    );

    // Retry re-enters the pipeline with the same local id.
    h.api.script_create(Ok(inbound_message("srv-9", "C123", "p-me", "flaky")));
    let status = h.engine.retry(&chat, &local_id).await;
    assert_eq!(status, Some(MessageStatus::Sent));
    assert_eq!(h.message_count("C123").await, 1);
    assert!(h.message("C123", "srv-9").await.is_some());
    assert_eq!(h.api.create_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn upload_failure_scopes_to_the_one_message() {
    let h = harness_with(Arc::new(FailingUploader), vec![private_chat("C123")]);
    let chat = ChatId::new("C123");

    // A healthy message already in the store must be unaffected.
    h.engine
        .apply_event(ChatEvent::MessagePushed {
            message: inbound_message("srv-0", "C123", "p-other", "earlier"),
        })
        .await;

    let local_id = h
        .engine
        .stage_attachment(
            &chat,
            MessageKind::Image,
            LocalFile {
                path: "/tmp/cv.png".into(),
                file_name: "cv.png".into(),
            },
            None,
        )
        .await
        .unwrap();

    let status = h.engine.flush(&chat, &local_id).await;
    assert_eq!(status, Some(MessageStatus::Failed));

    let failed = h.message("C123", &local_id.0).await.unwrap();
    assert_eq!(failed.status, MessageStatus::Failed);
    assert!(failed.file_url.is_none());
    // The rest of the store is intact.
    assert_eq!(h.message_count("C123").await, 2);
    assert!(h.message("C123", "srv-0").await.is_some());
    // create-message was never reached.
    assert_eq!(h.api.create_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn attachment_send_uploads_then_creates() {
    let h = harness(vec![private_chat("C123")]);
    let chat = ChatId::new("C123");

    let local_id = h
        .engine
        .stage_attachment(
            &chat,
            MessageKind::File,
            LocalFile {
                path: "/tmp/resume.pdf".into(),
                file_name: "resume.pdf".into(),
            },
            Some("my resume".into()),
        )
        .await
        .unwrap();

    let mut confirmed = inbound_message("srv-2", "C123", "p-me", "my resume");
    confirmed.kind = MessageKind::File;
    confirmed.file_url = Some("https://files.example/resume.pdf".into());
    h.api.script_create(Ok(confirmed));

    let status = h.engine.flush(&chat, &local_id).await;
    assert_eq!(status, Some(MessageStatus::Sent));

    let sent = h.message("C123", "srv-2").await.unwrap();
    assert_eq!(sent.file_url.as_deref(), Some("https://files.example/resume.pdf"));
    assert!(sent.local_file.is_none());
}

#[tokio::test]
async fn retract_wins_race_with_late_confirmation() {
    let h = harness(vec![private_chat("C123")]);
    let chat = ChatId::new("C123");

    let local_id = h.engine.stage_text(&chat, "oops").await.unwrap();
    // User deletes the message before the create call resolves.
    h.engine.retract(&chat, &local_id).await;
    assert_eq!(h.message_count("C123").await, 0);

    // The late confirmation must not resurrect it.
    h.api.script_create(Ok(inbound_message("srv-3", "C123", "p-me", "oops")));
    let status = h.engine.flush(&chat, &local_id).await;
    assert_eq!(status, None);
    assert_eq!(h.message_count("C123").await, 0);
}

// ---------------------------------------------------------------------------
// Inbound events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn redelivered_push_stores_and_notifies_once() {
    let mut h = harness(vec![private_chat("C123")]);
    let push = ChatEvent::MessagePushed {
        message: inbound_message("srv-7", "C123", "p-other", "ping"),
    };

    h.engine.apply_event(push.clone()).await;
    h.engine.apply_event(push).await;

    assert_eq!(h.message_count("C123").await, 1);
    assert_eq!(h.notifier.scheduled_count(), 1);

    // Receipt was acknowledged back through the adapter.
    let acks = h
        .drained_commands()
        .into_iter()
        .filter(|c| matches!(c, TransportCommand::AckReceived { .. }))
        .count();
    assert!(acks >= 1);
}

#[tokio::test]
async fn blocked_sender_never_enters_store() {
    let mut chat = private_chat("C123");
    chat.blocks.push(workline_store::models::Block {
        chat_user_id: ParticipantId::new("p-other"),
        created_at: now(),
        deleted_at: None,
    });
    let mut h = harness(vec![chat]);

    h.engine
        .apply_event(ChatEvent::MessagePushed {
            message: inbound_message("srv-8", "C123", "p-other", "you there?"),
        })
        .await;

    // Absent, not merely unprocessed: no message, no notification, no ack.
    assert_eq!(h.message_count("C123").await, 0);
    assert_eq!(h.notifier.scheduled_count(), 0);
    assert!(h.drained_commands().is_empty());
}

#[tokio::test]
async fn muted_sender_merges_without_notification() {
    let mut chat = private_chat("C123");
    chat.mutes.push(workline_store::models::Mute {
        chat_user_id: ParticipantId::new("p-other"),
        muted_till: Utc::now() + Duration::hours(1),
        deleted_at: None,
    });
    let h = harness(vec![chat]);

    h.engine
        .apply_event(ChatEvent::MessagePushed {
            message: inbound_message("srv-11", "C123", "p-other", "psst"),
        })
        .await;

    assert_eq!(h.message_count("C123").await, 1);
    assert_eq!(h.notifier.scheduled_count(), 0);
}

#[tokio::test]
async fn own_echo_neither_notifies_nor_acks() {
    let mut h = harness(vec![private_chat("C123")]);

    h.engine
        .apply_event(ChatEvent::MessagePushed {
            message: inbound_message("srv-12", "C123", "p-me", "sent elsewhere"),
        })
        .await;

    assert_eq!(h.message_count("C123").await, 1);
    assert_eq!(h.notifier.scheduled_count(), 0);
    assert!(h.drained_commands().is_empty());
}

#[tokio::test]
async fn seen_ack_updates_recipient_status() {
    let h = harness(vec![private_chat("C123")]);

    h.engine
        .apply_event(ChatEvent::MessagePushed {
            message: inbound_message("srv-13", "C123", "p-me", "hello"),
        })
        .await;

    let mut seen = inbound_message("srv-13", "C123", "p-me", "hello");
    seen.statuses.insert(
        AccountId::new(OTHER),
        workline_store::models::UserStatus {
            received_at: Some(now()),
            seen_at: Some(now()),
        },
    );
    h.engine
        .apply_event(ChatEvent::MessageSeen { message: seen })
        .await;

    assert_eq!(h.message_count("C123").await, 1);
    let message = h.message("C123", "srv-13").await.unwrap();
    let status = message.statuses.get(&AccountId::new(OTHER)).unwrap();
    assert!(status.seen_at.is_some());
}

#[tokio::test]
async fn chat_created_event_adds_and_joins_room() {
    let mut h = harness(Vec::new());

    h.engine
        .apply_event(ChatEvent::ChatCreated {
            chat: group_chat("G1", "design team"),
        })
        .await;
    // Redelivery is a no-op.
    h.engine
        .apply_event(ChatEvent::ChatCreated {
            chat: group_chat("G1", "design team"),
        })
        .await;

    let dir = h.engine.directory();
    assert_eq!(dir.lock().await.len(), 1);

    let joins = h
        .drained_commands()
        .into_iter()
        .filter(|c| matches!(c, TransportCommand::JoinRoom { .. }))
        .count();
    assert_eq!(joins, 1);
}

#[tokio::test]
async fn group_edited_event_patches_metadata_only() {
    let h = harness(vec![group_chat("G1", "old name")]);

    h.engine
        .apply_event(ChatEvent::MessagePushed {
            message: inbound_message("srv-14", "G1", "p-other", "hi all"),
        })
        .await;
    h.engine
        .apply_event(ChatEvent::GroupEdited {
            chat_id: ChatId::new("G1"),
            patch: GroupPatch {
                name: Some("new name".into()),
                ..Default::default()
            },
        })
        .await;

    let dir = h.engine.directory();
    let dir = dir.lock().await;
    let chat = dir.chat(&ChatId::new("G1")).unwrap();
    assert_eq!(chat.group.as_ref().unwrap().name, "new name");
    assert_eq!(chat.messages.len(), 1);
}

// ---------------------------------------------------------------------------
// Pagination and user actions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn chat_pages_merge_without_duplicates() {
    let h = harness(Vec::new());
    h.api.script_chat_page(vec![private_chat("A"), private_chat("B")]);
    h.api.script_chat_page(vec![private_chat("B"), private_chat("C")]);

    h.engine.load_chats(1, None).await.unwrap();
    h.engine.load_chats(2, None).await.unwrap();

    let dir = h.engine.directory();
    let dir = dir.lock().await;
    let ids: Vec<_> = dir.iter().map(|c| c.id.0.clone()).collect();
    assert_eq!(ids, ["A", "B", "C"]);
}

#[tokio::test]
async fn block_action_mirrors_locally_and_suppresses() {
    let h = harness(vec![private_chat("C123")]);
    let chat_id = ChatId::new("C123");
    let target = ParticipantId::new("p-other");

    h.engine.block(&chat_id, &target).await.unwrap();

    {
        let dir = h.engine.directory();
        let dir = dir.lock().await;
        assert!(views::is_blocked(dir.chat(&chat_id).unwrap(), &target));
    }

    h.engine
        .apply_event(ChatEvent::MessagePushed {
            message: inbound_message("srv-15", "C123", "p-other", "hello?"),
        })
        .await;
    assert_eq!(h.message_count("C123").await, 0);

    // Unblock reopens the inbound path.
    h.engine.unblock(&chat_id, &target).await.unwrap();
    h.engine
        .apply_event(ChatEvent::MessagePushed {
            message: inbound_message("srv-16", "C123", "p-other", "hello again"),
        })
        .await;
    assert_eq!(h.message_count("C123").await, 1);
}

#[tokio::test]
async fn spawned_engine_consumes_adapter_events() {
    let api: Arc<dyn ChatApi> = Arc::new(FakeApi::default());
    let (engine, adapter, task) = workline_engine::spawn_engine(
        AccountId::new(ME),
        EngineConfig::default(),
        api,
        Arc::new(NullUploader),
        Arc::new(RecordingNotifier::default()),
        None,
    )
    .unwrap();

    adapter
        .events
        .send(ChatEvent::ChatCreated {
            chat: private_chat("C9"),
        })
        .await
        .unwrap();

    for _ in 0..50 {
        if engine.directory().lock().await.len() == 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(engine.directory().lock().await.len(), 1);

    // Dropping the adapter end closes the event channel and stops the loop.
    drop(adapter);
    task.await.unwrap();
}

#[tokio::test]
async fn delete_chat_drops_state_and_dismisses_notifications() {
    let h = harness(vec![private_chat("C123")]);

    h.engine
        .apply_event(ChatEvent::MessagePushed {
            message: inbound_message("srv-17", "C123", "p-other", "ping"),
        })
        .await;
    assert_eq!(h.notifier.scheduled_count(), 1);

    h.engine.delete_chat(&ChatId::new("C123")).await.unwrap();

    let dir = h.engine.directory();
    assert!(dir.lock().await.is_empty());
    assert_eq!(h.notifier.dismissed.lock().unwrap().len(), 1);
}
