//! 测试用的内存实现：快照存储、远端接口与监听器

use crate::chat::conversation::listener::{ChatListener, Notice};
use crate::chat::conversation::models::ConversationRecord;
use crate::chat::error::{ChatError, ChatResult};
use crate::chat::gateway::RemoteGateway;
use crate::chat::snapshot::SnapshotStore;
use crate::chat::types::{
    ConversationKind, ConversationResponse, GenerateRequest, GenerateResponse, MessageResponse,
    MessageRole, Page, Pagination,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

static INIT_LOGGER: Once = Once::new();

pub fn init_test_logger() {
    INIT_LOGGER.call_once(|| {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::EnvFilter;

        // 测试中打开当前 crate 和 sqlx 的 debug，关闭底层 HTTP 客户端的噪音
        let filter_layer =
            EnvFilter::new("info,chatbox_core=debug,sqlx=debug,hyper_util::client=info,reqwest=info");

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_target(false)
            .with_test_writer();

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
    });
}

pub fn conversation_response(id: &str, title: &str) -> ConversationResponse {
    ConversationResponse {
        id: id.to_string(),
        user_id: "u1".into(),
        conversation_type: ConversationKind::Chat,
        title: title.to_string(),
        document_id: None,
        message_count: 2,
        created_at: "2025-01-01T00:00:00Z".into(),
        updated_at: "2025-01-01T00:00:00Z".into(),
    }
}

pub fn message_response(conversation_id: &str, sequence: i64) -> MessageResponse {
    MessageResponse {
        id: format!("{}-m{}", conversation_id, sequence),
        conversation_id: conversation_id.to_string(),
        sequence,
        role: if sequence % 2 == 1 {
            MessageRole::User
        } else {
            MessageRole::Assistant
        },
        content: format!("message #{}", sequence),
        model: None,
        token_in: None,
        token_out: None,
        created_at: "2025-01-01T00:00:00Z".into(),
    }
}

pub fn generate_ok(data: &str, conversation_id: &str) -> GenerateResponse {
    GenerateResponse {
        code: 200,
        status: "success".into(),
        data: data.to_string(),
        conversation_id: Some(conversation_id.to_string()),
        error: None,
        detail: None,
    }
}

pub fn page_of<T>(items: Vec<T>, page: u32, total_pages: u32) -> Page<T> {
    let page_size = items.len().max(1) as u32;
    Page {
        items,
        pagination: Some(Pagination {
            page,
            page_size,
            total_items: (page_size * total_pages) as u64,
            total_pages,
        }),
    }
}

/// 内存快照存储
#[derive(Default)]
pub struct MemorySnapshotStore {
    records: Mutex<Vec<ConversationRecord>>,
    saves: AtomicUsize,
}

impl MemorySnapshotStore {
    pub fn with_records(records: Vec<ConversationRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn saved(&self) -> Vec<ConversationRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save_snapshot(&self, records: &[ConversationRecord]) -> anyhow::Result<()> {
        *self.records.lock().unwrap() = records.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_snapshot(&self) -> anyhow::Result<Vec<ConversationRecord>> {
        Ok(self.records.lock().unwrap().clone())
    }
}

/// 可编排的远端接口
///
/// 未预置的响应返回空页 / 成功。设置 `gate` 后生成请求会阻塞到 `release_generate`；
/// `honour_cancel` 为假时模拟不理会取消信号的传输层。
pub struct MockGateway {
    conversation_pages: Mutex<VecDeque<ChatResult<Page<ConversationResponse>>>>,
    message_pages: Mutex<VecDeque<ChatResult<Page<MessageResponse>>>>,
    generate_replies: Mutex<VecDeque<ChatResult<GenerateResponse>>>,
    rename_replies: Mutex<VecDeque<ChatResult<()>>>,
    delete_replies: Mutex<VecDeque<ChatResult<()>>>,
    gate: Option<Arc<Notify>>,
    honour_cancel: bool,

    pub list_conversation_calls: AtomicUsize,
    pub list_message_calls: AtomicUsize,
    /// 每次消息分页请求的 (会话 ID, 页码)
    pub message_requests: Mutex<Vec<(String, u32)>>,
    pub generate_requests: Mutex<Vec<GenerateRequest>>,
    pub renamed: Mutex<Vec<(String, String)>>,
    pub deleted: Mutex<Vec<String>>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self {
            conversation_pages: Mutex::new(VecDeque::new()),
            message_pages: Mutex::new(VecDeque::new()),
            generate_replies: Mutex::new(VecDeque::new()),
            rename_replies: Mutex::new(VecDeque::new()),
            delete_replies: Mutex::new(VecDeque::new()),
            gate: None,
            honour_cancel: true,
            list_conversation_calls: AtomicUsize::new(0),
            list_message_calls: AtomicUsize::new(0),
            message_requests: Mutex::new(Vec::new()),
            generate_requests: Mutex::new(Vec::new()),
            renamed: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }
}

impl MockGateway {
    /// 生成请求需要手动放行
    pub fn gated(honour_cancel: bool) -> Self {
        Self {
            gate: Some(Arc::new(Notify::new())),
            honour_cancel,
            ..Self::default()
        }
    }

    pub fn release_generate(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn push_conversations(&self, reply: ChatResult<Page<ConversationResponse>>) {
        self.conversation_pages.lock().unwrap().push_back(reply);
    }

    pub fn push_messages(&self, reply: ChatResult<Page<MessageResponse>>) {
        self.message_pages.lock().unwrap().push_back(reply);
    }

    pub fn push_generate(&self, reply: ChatResult<GenerateResponse>) {
        self.generate_replies.lock().unwrap().push_back(reply);
    }

    pub fn push_rename(&self, reply: ChatResult<()>) {
        self.rename_replies.lock().unwrap().push_back(reply);
    }

    pub fn push_delete(&self, reply: ChatResult<()>) {
        self.delete_replies.lock().unwrap().push_back(reply);
    }

    pub fn generate_count(&self) -> usize {
        self.generate_requests.lock().unwrap().len()
    }

    /// 某个会话请求过的消息页
    pub fn message_pages_for(&self, conversation_id: &str) -> Vec<u32> {
        self.message_requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == conversation_id)
            .map(|(_, page)| *page)
            .collect()
    }

    pub fn last_generate(&self) -> Option<GenerateRequest> {
        self.generate_requests.lock().unwrap().last().cloned()
    }
}

fn empty_page<T>() -> Page<T> {
    Page {
        items: Vec::new(),
        pagination: None,
    }
}

#[async_trait]
impl RemoteGateway for MockGateway {
    async fn list_conversations(
        &self,
        _kind: ConversationKind,
        _page: u32,
        _page_size: u32,
    ) -> ChatResult<Page<ConversationResponse>> {
        self.list_conversation_calls.fetch_add(1, Ordering::SeqCst);
        self.conversation_pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(empty_page()))
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        page: u32,
        _page_size: u32,
    ) -> ChatResult<Page<MessageResponse>> {
        self.list_message_calls.fetch_add(1, Ordering::SeqCst);
        self.message_requests
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), page));
        self.message_pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(empty_page()))
    }

    async fn generate(
        &self,
        request: GenerateRequest,
        cancel: CancellationToken,
    ) -> ChatResult<GenerateResponse> {
        let conversation_id = request
            .conversation_id
            .clone()
            .unwrap_or_else(|| "srv-new".to_string());
        self.generate_requests.lock().unwrap().push(request);

        if let Some(gate) = &self.gate {
            if self.honour_cancel {
                tokio::select! {
                    _ = gate.notified() => {}
                    _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                }
            } else {
                gate.notified().await;
            }
        }

        self.generate_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(generate_ok("AI reply", &conversation_id)))
    }

    async fn rename_conversation(&self, conversation_id: &str, title: &str) -> ChatResult<()> {
        self.renamed
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), title.to_string()));
        self.rename_replies.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn delete_conversation(&self, conversation_id: &str) -> ChatResult<()> {
        self.deleted.lock().unwrap().push(conversation_id.to_string());
        self.delete_replies.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

/// 记录所有回调的监听器
#[derive(Default)]
pub struct RecordingListener {
    pub notices: Mutex<Vec<Notice>>,
    pub sending: Mutex<Vec<Option<String>>>,
    pub conversation_changes: AtomicUsize,
    pub message_changes: AtomicUsize,
    pub compose_changes: AtomicUsize,
}

impl RecordingListener {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl ChatListener for RecordingListener {
    fn on_conversations_changed(&self) {
        self.conversation_changes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_messages_changed(&self, _conversation_id: &str) {
        self.message_changes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_sending_changed(&self, sending_conversation_id: Option<&str>) {
        self.sending
            .lock()
            .unwrap()
            .push(sending_conversation_id.map(str::to_string));
    }

    fn on_compose_changed(&self) {
        self.compose_changes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_notice(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}
