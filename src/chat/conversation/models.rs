//! 会话本地模型定义

use crate::chat::message::models::{Message, MessageRecord};
use crate::chat::serialization::{format_timestamp, generate_local_id, parse_timestamp};
use crate::chat::types::{ConversationKind, ConversationResponse, Pagination};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 新建草稿会话的默认标题
pub const DRAFT_TITLE: &str = "New Chat";

/// 本地会话
///
/// `local_id` 在创建时分配且永不改变；服务器确认后只补充 `server_id`。
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub local_id: String,
    pub server_id: Option<String>,
    pub user_id: String,
    pub kind: ConversationKind,
    pub title: String,
    pub document_id: Option<String>,
    pub message_count: u64,
    /// 已加载的消息，按显示顺序排列
    pub messages: Vec<Message>,
    /// 首页加载前为空
    pub message_cursor: Option<Pagination>,
    /// 草稿标记，服务器确认后清除
    pub is_optimistic: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// 创建本地草稿会话
    pub fn draft(user_id: impl Into<String>, kind: ConversationKind) -> Self {
        let now = Utc::now();
        Self {
            local_id: generate_local_id("temp"),
            server_id: None,
            user_id: user_id.into(),
            kind,
            title: DRAFT_TITLE.to_string(),
            document_id: None,
            message_count: 0,
            messages: Vec::new(),
            message_cursor: None,
            is_optimistic: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// 调用远端接口时使用的 ID
    pub fn remote_id(&self) -> Option<&str> {
        self.server_id.as_deref()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn pending_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.is_pending())
    }

    /// 用服务器快照刷新元数据，保留本地身份、已加载的消息和游标
    pub fn apply_server_fields(&mut self, resp: &ConversationResponse) {
        self.server_id = Some(resp.id.clone());
        self.user_id = resp.user_id.clone();
        self.kind = resp.conversation_type;
        self.title = resp.title.clone();
        self.document_id = resp.document_id.clone();
        self.message_count = resp.message_count.max(self.messages.len() as u64);
        self.is_optimistic = false;
        self.created_at = parse_timestamp(&resp.created_at);
        self.updated_at = parse_timestamp(&resp.updated_at);
    }

    /// 转为可持久化记录，占位消息不会写入
    pub fn to_record(&self) -> ConversationRecord {
        ConversationRecord {
            local_id: self.local_id.clone(),
            server_id: self.server_id.clone(),
            user_id: self.user_id.clone(),
            kind: self.kind,
            title: self.title.clone(),
            document_id: self.document_id.clone(),
            message_count: self.message_count,
            message_cursor: self.message_cursor,
            created_at: format_timestamp(&self.created_at),
            updated_at: format_timestamp(&self.updated_at),
            messages: self
                .messages
                .iter()
                .filter(|m| !m.is_pending())
                .map(Message::to_record)
                .collect(),
        }
    }

    /// 从持久化记录恢复（重新解析时间）
    pub fn from_record(record: ConversationRecord) -> Self {
        Self {
            local_id: record.local_id,
            is_optimistic: record.server_id.is_none(),
            server_id: record.server_id,
            user_id: record.user_id,
            kind: record.kind,
            title: record.title,
            document_id: record.document_id,
            message_count: record.message_count,
            message_cursor: record.message_cursor,
            created_at: parse_timestamp(&record.created_at),
            updated_at: parse_timestamp(&record.updated_at),
            messages: record.messages.into_iter().map(Message::from_record).collect(),
        }
    }
}

impl From<ConversationResponse> for Conversation {
    fn from(resp: ConversationResponse) -> Self {
        Self {
            local_id: resp.id.clone(),
            server_id: Some(resp.id),
            user_id: resp.user_id,
            kind: resp.conversation_type,
            title: resp.title,
            document_id: resp.document_id,
            message_count: resp.message_count,
            messages: Vec::new(),
            message_cursor: None,
            is_optimistic: false,
            created_at: parse_timestamp(&resp.created_at),
            updated_at: parse_timestamp(&resp.updated_at),
        }
    }
}

/// 可持久化的会话记录（时间为 ISO 字符串）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub local_id: String,
    pub server_id: Option<String>,
    pub user_id: String,
    pub kind: ConversationKind,
    pub title: String,
    pub document_id: Option<String>,
    pub message_count: u64,
    pub message_cursor: Option<Pagination>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
}
