//! The `chat.*` request service and the ingestion consumer.

use crate::fanout::FanoutRouter;
use crate::store::{ChatStore, StoreError};
use courier_bus::responder::{serve_events, serve_requests};
use courier_bus::{BusError, MessageBus, Subject, SubjectSpace, subjects};
use courier_core::chat::{
    AddMemberRequest, ChatDetailsRequest, ChatRecord, ChatView, CreateDmRequest,
    CreateGroupRequest, MessagesReply, MessagesRequest, MyChatsReply, MyChatsRequest,
    RemoveMemberRequest, UpdateChatRequest,
};
use courier_core::codec::JsonCodec;
use courier_core::envelope::IncomingMessage;
use courier_core::ids::{ChatId, UserId};
use courier_profiles::ProfileResolver;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Default page size for `chat.messages.get`.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Domain rejections for chat operations. The display text is exactly what
/// callers receive in the `{error}` envelope.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The acting user is not a member of the chat.
    #[error("not a member of this chat")]
    NotAMember,
    /// Renames and membership changes only apply to group chats.
    #[error("direct chats cannot be modified")]
    NotAGroup,
    /// Storage-level failure, including unknown chats.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Answers the `chat.*` request subjects and consumes the ingestion stream.
///
/// Cloning is cheap; every clone shares the same store, resolver, and
/// fanout router.
#[derive(Clone)]
pub struct ChatService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    store: Arc<dyn ChatStore>,
    resolver: ProfileResolver,
    fanout: FanoutRouter,
}

impl ChatService {
    /// Assemble the service over the given transport and store.
    #[must_use]
    pub fn new(
        bus: Arc<dyn MessageBus>,
        store: Arc<dyn ChatStore>,
        resolver: ProfileResolver,
        codec: JsonCodec,
        space: SubjectSpace,
    ) -> Self {
        let fanout = FanoutRouter::new(Arc::clone(&bus), Arc::clone(&store), codec, space);
        Self {
            inner: Arc::new(ServiceInner {
                store,
                resolver,
                fanout,
            }),
        }
    }

    /// Subscribe every `chat.*` request subject plus the ingestion stream,
    /// one sequential worker per subject. Workers run until `cancel` fires.
    pub fn spawn(
        &self,
        bus: &Arc<dyn MessageBus>,
        codec: JsonCodec,
        cancel: &CancellationToken,
    ) -> Vec<JoinHandle<Result<(), BusError>>> {
        let mut workers = vec![
            self.serve(bus, codec, subjects::CHAT_CREATE_GROUP, cancel, Self::create_group),
            self.serve(bus, codec, subjects::CHAT_CREATE_DM, cancel, Self::open_dm),
            self.serve(bus, codec, subjects::CHAT_GET_MYCHATS, cancel, Self::my_chats),
            self.serve(bus, codec, subjects::CHAT_GET_DETAILS, cancel, Self::chat_details),
            self.serve(bus, codec, subjects::CHAT_UPDATE_DETAILS, cancel, Self::update_chat),
            self.serve(bus, codec, subjects::CHAT_ADD_USER, cancel, Self::add_member),
            self.serve(bus, codec, subjects::CHAT_REMOVE_USER, cancel, Self::remove_member),
            self.serve(bus, codec, subjects::CHAT_MESSAGES_GET, cancel, Self::messages),
        ];

        let service = self.clone();
        workers.push(tokio::spawn(serve_events(
            Arc::clone(bus),
            codec,
            Subject::from(subjects::CHAT_MESSAGE_INCOMING),
            cancel.clone(),
            move |incoming: IncomingMessage| {
                let service = service.clone();
                async move { service.inner.fanout.route(incoming).await }
            },
        )));

        info!(workers = workers.len(), "chat service online");
        workers
    }

    fn serve<Req, Resp, Fut>(
        &self,
        bus: &Arc<dyn MessageBus>,
        codec: JsonCodec,
        subject: &str,
        cancel: &CancellationToken,
        handler: fn(Self, Req) -> Fut,
    ) -> JoinHandle<Result<(), BusError>>
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        Fut: Future<Output = Result<Resp, ChatError>> + Send + 'static,
    {
        let service = self.clone();
        tokio::spawn(serve_requests(
            Arc::clone(bus),
            codec,
            Subject::from(subject),
            cancel.clone(),
            move |request: Req| handler(service.clone(), request),
        ))
    }

    // ── Handlers ──
    // Handlers take the service by value so their futures own their state;
    // a clone is an Arc bump.

    async fn create_group(self, request: CreateGroupRequest) -> Result<ChatView, ChatError> {
        let record = self
            .inner
            .store
            .create_group(&request.creator_id, &request.name, &request.member_ids)
            .await?;
        info!(chat = %record.id, creator = %request.creator_id, "group chat created");
        Ok(self.inner.resolver.enrich_chat(record).await)
    }

    async fn open_dm(self, request: CreateDmRequest) -> Result<ChatView, ChatError> {
        let record = self
            .inner
            .store
            .open_dm(&request.user_id_1, &request.user_id_2)
            .await?;
        Ok(self.inner.resolver.enrich_chat(record).await)
    }

    async fn my_chats(self, request: MyChatsRequest) -> Result<MyChatsReply, ChatError> {
        let records = self.inner.store.chats_for(&request.user_id).await?;
        Ok(MyChatsReply {
            chats: self.inner.resolver.enrich_chats(records).await,
        })
    }

    async fn chat_details(self, request: ChatDetailsRequest) -> Result<ChatView, ChatError> {
        let record = self.member_chat(&request.chat_id, &request.user_id).await?;
        Ok(self.inner.resolver.enrich_chat(record).await)
    }

    async fn update_chat(self, request: UpdateChatRequest) -> Result<ChatView, ChatError> {
        let record = self.member_chat(&request.chat_id, &request.user_id).await?;
        require_group(&record)?;
        let renamed = self
            .inner
            .store
            .rename_chat(&request.chat_id, &request.name)
            .await?;
        info!(chat = %request.chat_id, by = %request.user_id, "chat renamed");
        Ok(self.inner.resolver.enrich_chat(renamed).await)
    }

    async fn add_member(self, request: AddMemberRequest) -> Result<ChatView, ChatError> {
        let record = self
            .member_chat(&request.chat_id, &request.added_by_user_id)
            .await?;
        require_group(&record)?;
        let updated = self
            .inner
            .store
            .add_member(&request.chat_id, &request.user_id_to_add)
            .await?;
        info!(
            chat = %request.chat_id,
            added = %request.user_id_to_add,
            by = %request.added_by_user_id,
            "member added"
        );
        Ok(self.inner.resolver.enrich_chat(updated).await)
    }

    async fn remove_member(self, request: RemoveMemberRequest) -> Result<ChatView, ChatError> {
        let record = self
            .member_chat(&request.chat_id, &request.removed_by_user_id)
            .await?;
        require_group(&record)?;
        let updated = self
            .inner
            .store
            .remove_member(&request.chat_id, &request.user_id_to_remove)
            .await?;
        info!(
            chat = %request.chat_id,
            removed = %request.user_id_to_remove,
            by = %request.removed_by_user_id,
            "member removed"
        );
        Ok(self.inner.resolver.enrich_chat(updated).await)
    }

    async fn messages(self, request: MessagesRequest) -> Result<MessagesReply, ChatError> {
        let _ = self.member_chat(&request.chat_id, &request.user_id).await?;
        let limit = request.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        let records = self
            .inner
            .store
            .recent_messages(&request.chat_id, limit)
            .await?;
        Ok(MessagesReply {
            messages: self.inner.resolver.enrich_messages(records).await,
        })
    }

    /// Load a chat and require the acting user to be a member.
    async fn member_chat(
        &self,
        chat_id: &ChatId,
        user_id: &UserId,
    ) -> Result<ChatRecord, ChatError> {
        let record = self.inner.store.chat(chat_id).await?;
        if record.member_ids.contains(user_id) {
            Ok(record)
        } else {
            Err(ChatError::NotAMember)
        }
    }
}

fn require_group(record: &ChatRecord) -> Result<(), ChatError> {
    if record.is_group {
        Ok(())
    } else {
        Err(ChatError::NotAGroup)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
