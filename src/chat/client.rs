//! 聊天客户端
//!
//! 所有状态修改都经过 `&mut self` 串行执行。网络请求在后台任务中进行，
//! 完成后以 [`CoreEvent`] 的形式回到事件通道，由 [`ChatClient::pump`] 等方法逐个应用。

use crate::chat::conversation::listener::{ChatListener, EmptyChatListener, Notice};
use crate::chat::conversation::models::{Conversation, ConversationRecord};
use crate::chat::error::{ChatError, ChatResult};
use crate::chat::gateway::RemoteGateway;
use crate::chat::message::models::{validate_attachment, Attachment, Message};
use crate::chat::pagination::{ListLoad, ListTicket, MessageLoad, PaginationController};
use crate::chat::reconcile::{DeletePlan, SyncReconciler};
use crate::chat::send::{ComposeRestore, SendCoordinator, SendOutcome, SendPhase, SendSettings, SendTicket};
use crate::chat::snapshot::{SnapshotStore, SnapshotWriter};
use crate::chat::store::LocalCacheStore;
use crate::chat::types::{ConversationKind, ConversationResponse, GenerateResponse, MessageResponse, Page};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// 默认模型
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
/// 生成失败时展示的固定文案
pub const DEFAULT_AI_ERROR_MESSAGE: &str = "抱歉，AI 服务暂时不可用，请稍后重试。";

/// 客户端配置
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub model: String,
    pub conversation_kind: ConversationKind,
    pub page_size: u32,
    /// 快照写入的静默期
    pub persist_debounce: Duration,
    pub max_message_length: usize,
    pub title_word_limit: usize,
    pub db_url: String,
    pub ai_error_message: String,
}

impl ClientConfig {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            model: DEFAULT_MODEL.to_string(),
            conversation_kind: ConversationKind::Chat,
            page_size: 10,
            persist_debounce: Duration::from_millis(500),
            max_message_length: 4000,
            title_word_limit: 5,
            db_url: "sqlite://chatbox.db?mode=rwc".to_string(),
            ai_error_message: DEFAULT_AI_ERROR_MESSAGE.to_string(),
        }
    }

    fn send_settings(&self) -> SendSettings {
        SendSettings {
            model: self.model.clone(),
            max_message_length: self.max_message_length,
            title_word_limit: self.title_word_limit,
            ai_error_message: self.ai_error_message.clone(),
            response_mime_type: "text/plain".to_string(),
        }
    }
}

/// 输入框内容（文本 + 附件）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeBuffer {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl ComposeBuffer {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachments.is_empty()
    }
}

/// 后台任务完成事件
#[derive(Debug)]
pub enum CoreEvent {
    ConversationsLoaded {
        ticket: ListTicket,
        result: ChatResult<Page<ConversationResponse>>,
        /// 刷新失败时读取到的本地快照
        fallback: Option<Vec<ConversationRecord>>,
    },
    MessagesLoaded {
        conversation_id: String,
        load: MessageLoad,
        result: ChatResult<Page<MessageResponse>>,
    },
    GenerateFinished {
        attempt: u64,
        result: ChatResult<GenerateResponse>,
    },
    RenameFinished {
        conversation_id: String,
        title: String,
        result: ChatResult<()>,
    },
    DeleteFinished {
        conversation_id: String,
        result: ChatResult<()>,
    },
}

pub struct ChatClient {
    config: ClientConfig,
    user_id: String,
    gateway: Arc<dyn RemoteGateway>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    listener: Arc<dyn ChatListener>,

    store: LocalCacheStore,
    pagination: PaginationController,
    send: SendCoordinator,
    compose: ComposeBuffer,
    /// 远端删除进行中的会话
    deleting: HashSet<String>,

    events_tx: mpsc::UnboundedSender<CoreEvent>,
    events_rx: mpsc::UnboundedReceiver<CoreEvent>,
    /// 已启动但尚未处理完成事件的后台任务数
    in_flight: usize,
}

impl ChatClient {
    pub fn new(config: ClientConfig, gateway: Arc<dyn RemoteGateway>, user_id: impl Into<String>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            pagination: PaginationController::new(config.page_size),
            send: SendCoordinator::new(config.send_settings()),
            config,
            user_id: user_id.into(),
            gateway,
            snapshots: None,
            listener: Arc::new(EmptyChatListener),
            store: LocalCacheStore::new(),
            compose: ComposeBuffer::default(),
            deleting: HashSet::new(),
            events_tx,
            events_rx,
            in_flight: 0,
        }
    }

    /// 开启本地快照（启动后台写入任务，需要在 tokio 运行时中调用）
    pub fn with_snapshot_store(mut self, snapshots: Arc<dyn SnapshotStore>) -> Self {
        let writer = SnapshotWriter::spawn(snapshots.clone(), self.config.persist_debounce);
        self.store.attach_writer(writer);
        self.snapshots = Some(snapshots);
        self
    }

    pub fn set_listener(&mut self, listener: Arc<dyn ChatListener>) {
        self.listener = listener;
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    // ---------------------------------------------------------------------
    // 读取接口
    // ---------------------------------------------------------------------

    pub fn store(&self) -> &LocalCacheStore {
        &self.store
    }

    pub fn conversations(&self) -> &[Conversation] {
        self.store.conversations()
    }

    pub fn conversation(&self, local_id: &str) -> Option<&Conversation> {
        self.store.conversation(local_id)
    }

    pub fn selected_conversation(&self) -> Option<&Conversation> {
        self.store.selected_conversation()
    }

    pub fn selected_messages(&self) -> &[Message] {
        self.store
            .selected_conversation()
            .map(|c| c.messages.as_slice())
            .unwrap_or_default()
    }

    pub fn compose(&self) -> &ComposeBuffer {
        &self.compose
    }

    pub fn is_sending(&self) -> bool {
        self.send.is_sending()
    }

    pub fn sending_conversation_id(&self) -> Option<&str> {
        self.send.sending_conversation_id()
    }

    pub fn send_phase(&self) -> SendPhase {
        if self.send.is_sending() {
            SendPhase::Submitting
        } else if !self.compose.is_empty() {
            SendPhase::Composing
        } else {
            SendPhase::Idle
        }
    }

    pub fn has_more_conversations(&self) -> bool {
        self.pagination.has_more_conversations()
    }

    pub fn is_loading_conversations(&self) -> bool {
        self.pagination.is_loading_conversations()
    }

    pub fn is_loading_more_conversations(&self) -> bool {
        self.pagination.is_loading_more_conversations()
    }

    pub fn is_loading_messages(&self, conversation_id: &str) -> bool {
        self.pagination.is_loading_messages(conversation_id)
    }

    pub fn is_loading_older_messages(&self, conversation_id: &str) -> bool {
        self.pagination.is_loading_older_messages(conversation_id)
    }

    pub fn has_more_messages(&self, conversation_id: &str) -> bool {
        self.store
            .conversation(conversation_id)
            .and_then(|c| c.message_cursor)
            .is_some_and(|c| c.has_more())
    }

    pub fn load_more_messages_error(&self) -> Option<&str> {
        self.pagination.load_more_messages_error()
    }

    // ---------------------------------------------------------------------
    // 会话
    // ---------------------------------------------------------------------

    /// 新建会话；已有草稿时直接选中它
    pub fn create_conversation(&mut self) -> String {
        if let Some(draft) = self.store.draft() {
            let id = draft.local_id.clone();
            debug!("[Client] 复用已有草稿会话 {}", id);
            self.store.select(Some(&id));
            self.listener.on_conversations_changed();
            return id;
        }

        let draft = Conversation::draft(self.user_id.clone(), self.config.conversation_kind);
        let id = draft.local_id.clone();
        self.store.upsert_conversation(draft);
        self.store.select(Some(&id));
        info!("[Client] 🆕 新建草稿会话 {}", id);
        self.listener.on_conversations_changed();
        id
    }

    /// 选中会话；首次选中未加载过消息的已确认会话时加载第 1 页
    pub fn select_conversation(&mut self, local_id: &str) -> bool {
        if !self.store.select(Some(local_id)) {
            return false;
        }
        self.listener.on_conversations_changed();

        let Some(conv) = self.store.conversation(local_id) else {
            return true;
        };
        if conv.is_optimistic || !conv.messages.is_empty() {
            return true;
        }
        let (remote_id, cursor) = match conv.remote_id() {
            Some(id) => (id.to_string(), conv.message_cursor),
            None => return true,
        };
        if let Some(page) = self.pagination.begin_messages(local_id, MessageLoad::Initial, cursor) {
            self.spawn_message_load(local_id.to_string(), remote_id, page, MessageLoad::Initial);
        }
        true
    }

    /// 刷新会话列表（第 1 页），之前未完成的列表加载结果会被丢弃
    pub fn refresh_conversations(&mut self) {
        let ticket = self.pagination.begin_refresh();
        let gateway = self.gateway.clone();
        let snapshots = self.snapshots.clone();
        let kind = self.config.conversation_kind;
        let page_size = self.pagination.page_size();

        self.spawn_task(async move {
            let result = gateway.list_conversations(kind, ticket.page, page_size).await;
            let fallback = match (&result, snapshots) {
                (Err(_), Some(snapshots)) => match snapshots.load_snapshot().await {
                    Ok(records) => Some(records),
                    Err(e) => {
                        error!("[Client] 读取本地快照失败: {:#}", e);
                        None
                    }
                },
                _ => None,
            };
            CoreEvent::ConversationsLoaded {
                ticket,
                result,
                fallback,
            }
        });
    }

    /// 加载下一页会话；没有更多、或已在加载中时返回 false
    pub fn load_more_conversations(&mut self) -> bool {
        let Some(ticket) = self.pagination.begin_load_more_conversations() else {
            return false;
        };
        let gateway = self.gateway.clone();
        let kind = self.config.conversation_kind;
        let page_size = self.pagination.page_size();
        self.spawn_task(async move {
            let result = gateway.list_conversations(kind, ticket.page, page_size).await;
            CoreEvent::ConversationsLoaded {
                ticket,
                result,
                fallback: None,
            }
        });
        true
    }

    /// 加载更早的消息；没有更多、或已在加载中时返回 false
    pub fn load_more_messages(&mut self, local_id: &str) -> bool {
        let Some(conv) = self.store.conversation(local_id) else {
            return false;
        };
        let Some(remote_id) = conv.remote_id().map(str::to_string) else {
            return false;
        };
        let cursor = conv.message_cursor;
        match self.pagination.begin_messages(local_id, MessageLoad::Older, cursor) {
            Some(page) => {
                self.spawn_message_load(local_id.to_string(), remote_id, page, MessageLoad::Older);
                true
            }
            None => false,
        }
    }

    fn spawn_message_load(&mut self, local_id: String, remote_id: String, page: u32, load: MessageLoad) {
        let gateway = self.gateway.clone();
        let page_size = self.pagination.page_size();
        self.spawn_task(async move {
            let result = gateway.list_messages(&remote_id, page, page_size).await;
            CoreEvent::MessagesLoaded {
                conversation_id: local_id,
                load,
                result,
            }
        });
    }

    /// 重命名：草稿只改本地；已确认会话先调用远端接口，成功后再修改本地标题
    pub fn rename_conversation(&mut self, local_id: &str, title: &str) -> ChatResult<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ChatError::Validation("标题不能为空".to_string()));
        }
        let conv = self
            .store
            .conversation(local_id)
            .ok_or_else(|| ChatError::NotFound(local_id.to_string()))?;

        match conv.remote_id().map(str::to_string) {
            Some(remote_id) if !conv.is_optimistic => {
                let gateway = self.gateway.clone();
                let (conversation_id, title) = (local_id.to_string(), title.to_string());
                self.spawn_task(async move {
                    let result = gateway.rename_conversation(&remote_id, &title).await;
                    CoreEvent::RenameFinished {
                        conversation_id,
                        title,
                        result,
                    }
                });
            }
            _ => {
                self.store.set_title(local_id, title);
                self.listener.on_conversations_changed();
            }
        }
        Ok(())
    }

    /// 删除：草稿只删本地；已确认会话在远端成功后才删除本地记录
    pub fn delete_conversation(&mut self, local_id: &str) -> ChatResult<()> {
        match SyncReconciler::plan_delete(&self.store, local_id) {
            DeletePlan::Unknown => Err(ChatError::NotFound(local_id.to_string())),
            DeletePlan::LocalOnly => {
                self.remove_local(local_id);
                Ok(())
            }
            DeletePlan::Remote { server_id } => {
                if !self.deleting.insert(local_id.to_string()) {
                    debug!("[Client] 会话 {} 正在删除中", local_id);
                    return Ok(());
                }
                let gateway = self.gateway.clone();
                let conversation_id = local_id.to_string();
                self.spawn_task(async move {
                    let result = gateway.delete_conversation(&server_id).await;
                    CoreEvent::DeleteFinished {
                        conversation_id,
                        result,
                    }
                });
                Ok(())
            }
        }
    }

    fn remove_local(&mut self, local_id: &str) {
        if self.send.sending_conversation_id() == Some(local_id) {
            self.send.abandon();
            self.listener.on_sending_changed(None);
        }
        self.store.remove_conversation(local_id);
        self.pagination.forget(local_id);
        self.listener.on_conversations_changed();
    }

    /// 清空全部会话（退出登录）
    pub fn clear_all_conversations(&mut self) {
        let was_sending = self.send.is_sending();
        self.send.abandon();
        self.store.clear();
        self.pagination.reset();
        self.deleting.clear();
        self.compose = ComposeBuffer::default();
        info!("[Client] 已清空全部会话");
        if was_sending {
            self.listener.on_sending_changed(None);
        }
        self.listener.on_compose_changed();
        self.listener.on_conversations_changed();
    }

    /// 从本地快照恢复会话列表
    pub async fn restore_from_snapshot(&mut self) -> ChatResult<usize> {
        let Some(snapshots) = self.snapshots.clone() else {
            return Ok(0);
        };
        let records = snapshots.load_snapshot().await?;
        let count = records.len();
        SyncReconciler::restore_snapshot(&mut self.store, records);
        self.listener.on_conversations_changed();
        Ok(count)
    }

    // ---------------------------------------------------------------------
    // 发送
    // ---------------------------------------------------------------------

    /// 发送消息到指定会话
    pub fn submit(&mut self, local_id: &str, content: &str, attachments: Vec<Attachment>) -> ChatResult<()> {
        let ticket = self
            .send
            .submit(&mut self.store, local_id, content, attachments);
        self.dispatch(ticket)
    }

    /// 发送输入框中的内容；没有选中会话时先新建草稿
    pub fn submit_compose(&mut self) -> ChatResult<()> {
        let local_id = match self.store.selected_id() {
            Some(id) => id.to_string(),
            None if self.send.is_sending() => return self.dispatch(Err(ChatError::SendInProgress)),
            None => self.create_conversation(),
        };

        let ComposeBuffer { text, attachments } = self.compose.clone();
        self.submit(&local_id, &text, attachments)?;
        self.compose = ComposeBuffer::default();
        self.listener.on_compose_changed();
        Ok(())
    }

    /// 重试失败的助手消息
    pub fn retry(&mut self, local_id: &str, errored_message_id: &str) -> ChatResult<()> {
        let ticket = self.send.retry(&mut self.store, local_id, errored_message_id);
        self.dispatch(ticket)
    }

    /// 取消正在进行的发送；没有发送时返回 false
    pub fn cancel_send(&mut self) -> bool {
        match self.send.cancel(&mut self.store) {
            Some(outcome) => {
                self.apply_outcome(outcome);
                true
            }
            None => false,
        }
    }

    fn dispatch(&mut self, ticket: ChatResult<SendTicket>) -> ChatResult<()> {
        let ticket = match ticket {
            Ok(ticket) => ticket,
            Err(e) => {
                match &e {
                    ChatError::SendInProgress => {
                        let sending = self.send.sending_conversation_id().unwrap_or_default().to_string();
                        self.listener.on_notice(&Notice::PleaseWait {
                            sending_conversation_id: sending,
                        });
                    }
                    ChatError::Validation(reason) => {
                        self.listener.on_notice(&Notice::InvalidInput {
                            reason: reason.clone(),
                        });
                    }
                    _ => warn!("[Client] 发送请求被拒绝: {}", e),
                }
                return Err(e);
            }
        };

        let SendTicket {
            conversation_id,
            attempt,
            request,
            cancel,
        } = ticket;
        let gateway = self.gateway.clone();
        self.spawn_task(async move {
            let result = gateway.generate(request, cancel).await;
            CoreEvent::GenerateFinished { attempt, result }
        });

        self.listener.on_conversations_changed();
        self.listener.on_messages_changed(&conversation_id);
        self.listener.on_sending_changed(Some(&conversation_id));
        Ok(())
    }

    fn apply_outcome(&mut self, outcome: SendOutcome) {
        match outcome {
            SendOutcome::Stale => {}
            SendOutcome::Resolved {
                conversation_id,
                promoted_to,
            } => {
                if promoted_to.is_some() {
                    self.listener.on_conversations_changed();
                }
                self.listener.on_messages_changed(&conversation_id);
                self.listener.on_sending_changed(None);
            }
            SendOutcome::Failed { conversation_id, .. } => {
                self.listener.on_messages_changed(&conversation_id);
                self.listener.on_sending_changed(None);
            }
            SendOutcome::Canceled {
                conversation_id,
                restore,
            } => {
                self.listener.on_conversations_changed();
                self.listener.on_messages_changed(&conversation_id);
                self.listener.on_sending_changed(None);
                if let Some(ComposeRestore { content, attachments }) = restore {
                    self.compose = ComposeBuffer {
                        text: content,
                        attachments,
                    };
                    self.listener.on_compose_changed();
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // 输入框
    // ---------------------------------------------------------------------

    pub fn set_compose_text(&mut self, text: impl Into<String>) {
        self.compose.text = text.into();
        self.listener.on_compose_changed();
    }

    /// 添加附件，返回被接受的数量；视频会被拒绝并提示
    pub fn attach_files(&mut self, files: Vec<Attachment>) -> usize {
        let mut accepted = 0;
        for file in files {
            match validate_attachment(&file) {
                Ok(()) => {
                    self.compose.attachments.push(file);
                    accepted += 1;
                }
                Err(e) => {
                    warn!("[Client] 附件被拒绝: {}", e);
                    self.listener
                        .on_notice(&Notice::AttachmentRejected { name: file.name });
                }
            }
        }
        if accepted > 0 {
            self.listener.on_compose_changed();
        }
        accepted
    }

    pub fn remove_attachment(&mut self, attachment_id: &str) -> bool {
        let before = self.compose.attachments.len();
        self.compose.attachments.retain(|a| a.id != attachment_id);
        let removed = self.compose.attachments.len() != before;
        if removed {
            self.listener.on_compose_changed();
        }
        removed
    }

    pub fn clear_attachments(&mut self) {
        self.compose.attachments.clear();
        self.listener.on_compose_changed();
    }

    // ---------------------------------------------------------------------
    // 事件循环
    // ---------------------------------------------------------------------

    fn spawn_task<F>(&mut self, fut: F)
    where
        F: Future<Output = CoreEvent> + Send + 'static,
    {
        self.in_flight += 1;
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let event = fut.await;
            if tx.send(event).is_err() {
                debug!("[Client] 客户端已释放，丢弃后台任务结果");
            }
        });
    }

    /// 尚未处理的后台任务数
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// 等待下一个完成事件；没有进行中的任务时返回 `None`
    pub async fn next_event(&mut self) -> Option<CoreEvent> {
        if self.in_flight == 0 {
            return None;
        }
        self.events_rx.recv().await
    }

    /// 处理所有已到达的事件，不等待
    pub fn try_pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// 等待并处理事件，直到没有进行中的任务
    pub async fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.next_event().await {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// 应用一个完成事件
    pub fn handle_event(&mut self, event: CoreEvent) {
        self.in_flight = self.in_flight.saturating_sub(1);
        match event {
            CoreEvent::ConversationsLoaded {
                ticket,
                result,
                fallback,
            } => self.on_conversations_loaded(ticket, result, fallback),
            CoreEvent::MessagesLoaded {
                conversation_id,
                load,
                result,
            } => self.on_messages_loaded(&conversation_id, load, result),
            CoreEvent::GenerateFinished { attempt, result } => {
                let outcome = self.send.resolve(&mut self.store, attempt, result);
                self.apply_outcome(outcome);
            }
            CoreEvent::RenameFinished {
                conversation_id,
                title,
                result,
            } => match result {
                Ok(()) => {
                    if self.store.set_title(&conversation_id, &title) {
                        self.listener.on_conversations_changed();
                    }
                }
                Err(e) => {
                    error!("[Client] 重命名会话 {} 失败: {}", conversation_id, e);
                    self.listener.on_notice(&Notice::RenameFailed {
                        conversation_id,
                        reason: e.to_string(),
                    });
                }
            },
            CoreEvent::DeleteFinished {
                conversation_id,
                result,
            } => {
                self.deleting.remove(&conversation_id);
                match result {
                    Ok(()) => self.remove_local(&conversation_id),
                    Err(e) => {
                        error!("[Client] 删除会话 {} 失败: {}", conversation_id, e);
                        self.listener.on_notice(&Notice::DeleteFailed {
                            conversation_id,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
    }

    fn on_conversations_loaded(
        &mut self,
        ticket: ListTicket,
        result: ChatResult<Page<ConversationResponse>>,
        fallback: Option<Vec<ConversationRecord>>,
    ) {
        let pagination = result.as_ref().ok().and_then(|p| p.pagination);
        if !self.pagination.finish_conversations(&ticket, pagination) {
            return;
        }

        match (result, ticket.load) {
            (Ok(page), ListLoad::Refresh) => {
                let mut keep: Vec<String> = Vec::new();
                keep.extend(self.store.selected_id().map(str::to_string));
                keep.extend(self.send.sending_conversation_id().map(str::to_string));
                let keep: Vec<&str> = keep.iter().map(String::as_str).collect();
                SyncReconciler::merge_first_page(&mut self.store, page.items, &keep);
                self.listener.on_conversations_changed();
            }
            (Ok(page), ListLoad::More) => {
                SyncReconciler::append_page(&mut self.store, page.items);
                self.listener.on_conversations_changed();
            }
            (Err(e), load) => {
                error!("[Client] 会话列表加载失败: {}", e);
                if let (ListLoad::Refresh, Some(records)) = (load, fallback) {
                    SyncReconciler::restore_snapshot(&mut self.store, records);
                    self.listener.on_conversations_changed();
                }
                self.listener.on_notice(&Notice::LoadConversationsFailed {
                    reason: e.to_string(),
                });
            }
        }
    }

    fn on_messages_loaded(
        &mut self,
        conversation_id: &str,
        load: MessageLoad,
        result: ChatResult<Page<MessageResponse>>,
    ) {
        self.pagination
            .finish_messages(conversation_id, load, result.is_err());
        match result {
            Ok(page) => {
                let messages = page.items.into_iter().map(Message::from).collect();
                self.store
                    .merge_message_page(conversation_id, messages, page.pagination);
                self.listener.on_messages_changed(conversation_id);
            }
            Err(e) => {
                error!("[Client] 会话 {} 消息加载失败: {}", conversation_id, e);
                self.listener.on_notice(&Notice::LoadMessagesFailed {
                    conversation_id: conversation_id.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    /// 停止客户端：放弃进行中的发送并把未写入的快照落盘
    pub async fn shutdown(mut self) {
        self.send.abandon();
        if let Some(writer) = self.store.take_writer() {
            writer.shutdown().await;
        }
        info!("[Client] 客户端已关闭");
    }
}
