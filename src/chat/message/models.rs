//! 消息本地模型定义

use crate::chat::error::{ChatError, ChatResult};
use crate::chat::serialization::{decode_data_url, format_timestamp, generate_local_id, parse_timestamp};
use crate::chat::types::{MessageResponse, MessageRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// 消息状态，任意时刻恰好处于其中之一
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// 助手占位消息，等待响应；从不持久化
    Pending,
    Delivered,
    Errored,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Errored => "errored",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(MessageStatus::Pending),
            "delivered" => Some(MessageStatus::Delivered),
            "errored" => Some(MessageStatus::Errored),
            _ => None,
        }
    }
}

/// 附件内容来源（对核心而言是不透明的）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttachmentSource {
    /// `data:<mime>;base64,...`
    DataUrl(String),
    /// 服务器或本地文件 URL
    Url(String),
}

/// 文件附件描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub source: AttachmentSource,
}

impl Attachment {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, size: u64, source: AttachmentSource) -> Self {
        Self {
            id: generate_local_id("file"),
            name: name.into(),
            mime_type: mime_type.into(),
            size,
            source,
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video/")
    }

    /// 内联内容的字节（仅 data URL 可直接取得）
    pub fn inline_bytes(&self) -> Option<Vec<u8>> {
        match &self.source {
            AttachmentSource::DataUrl(url) => decode_data_url(url).map(|(_, bytes)| bytes),
            AttachmentSource::Url(_) => None,
        }
    }
}

/// 校验附件是否可以发送（视频不支持）
pub fn validate_attachment(attachment: &Attachment) -> ChatResult<()> {
    if attachment.is_video() {
        return Err(ChatError::Validation(format!(
            "不支持视频附件: {}",
            attachment.name
        )));
    }
    Ok(())
}

/// 校验待发送内容
pub fn validate_content(content: &str, attachments: &[Attachment], max_len: usize) -> ChatResult<()> {
    if content.trim().is_empty() && attachments.is_empty() {
        return Err(ChatError::Validation("消息内容为空".to_string()));
    }
    let len = content.chars().count();
    if len > max_len {
        return Err(ChatError::Validation(format!(
            "消息过长: {} 字符（上限 {}）",
            len, max_len
        )));
    }
    attachments.iter().try_for_each(validate_attachment)
}

/// 将字节数格式化为易读字符串
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}

/// 本地消息
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// 稳定的界面 key
    pub local_id: String,
    pub server_id: Option<String>,
    /// 服务器确认后的排序键
    pub sequence: Option<i64>,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    pub attachments: Vec<Attachment>,
    pub model: Option<String>,
    pub token_in: Option<u64>,
    pub token_out: Option<u64>,
    /// 本地追加顺序，由 store 分配
    pub(crate) local_order: u64,
}

impl Message {
    fn local(role: MessageRole, content: String, status: MessageStatus) -> Self {
        Self {
            local_id: generate_local_id("msg"),
            server_id: None,
            sequence: None,
            role,
            content,
            timestamp: Utc::now(),
            status,
            attachments: Vec::new(),
            model: None,
            token_in: None,
            token_out: None,
            local_order: 0,
        }
    }

    /// 乐观的用户消息
    pub fn user(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        let mut msg = Self::local(MessageRole::User, content.into(), MessageStatus::Delivered);
        msg.attachments = attachments;
        msg
    }

    /// 助手占位消息
    pub fn placeholder() -> Self {
        Self::local(MessageRole::Assistant, String::new(), MessageStatus::Pending)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::local(MessageRole::Assistant, content.into(), MessageStatus::Delivered)
    }

    pub fn errored(content: impl Into<String>) -> Self {
        Self::local(MessageRole::Assistant, content.into(), MessageStatus::Errored)
    }

    pub fn is_pending(&self) -> bool {
        self.status == MessageStatus::Pending
    }

    pub fn is_errored(&self) -> bool {
        self.status == MessageStatus::Errored
    }

    /// 去重 key：有服务器 ID 时用服务器 ID，否则用本地 ID
    pub(crate) fn identity(&self) -> &str {
        self.server_id.as_deref().unwrap_or(&self.local_id)
    }

    pub fn to_record(&self) -> MessageRecord {
        MessageRecord {
            local_id: self.local_id.clone(),
            server_id: self.server_id.clone(),
            sequence: self.sequence,
            role: self.role,
            content: self.content.clone(),
            status: self.status,
            timestamp: format_timestamp(&self.timestamp),
            attachments: self.attachments.clone(),
            model: self.model.clone(),
            token_in: self.token_in,
            token_out: self.token_out,
        }
    }

    pub fn from_record(record: MessageRecord) -> Self {
        Self {
            local_id: record.local_id,
            server_id: record.server_id,
            sequence: record.sequence,
            role: record.role,
            content: record.content,
            timestamp: parse_timestamp(&record.timestamp),
            status: record.status,
            attachments: record.attachments,
            model: record.model,
            token_in: record.token_in,
            token_out: record.token_out,
            local_order: 0,
        }
    }
}

impl From<MessageResponse> for Message {
    fn from(resp: MessageResponse) -> Self {
        Self {
            local_id: resp.id.clone(),
            server_id: Some(resp.id),
            sequence: Some(resp.sequence),
            role: resp.role,
            content: resp.content,
            timestamp: parse_timestamp(&resp.created_at),
            status: MessageStatus::Delivered,
            attachments: Vec::new(),
            model: resp.model,
            token_in: resp.token_in,
            token_out: resp.token_out,
            local_order: 0,
        }
    }
}

/// 显示顺序：有序号的按序号升序；无序号的排在所有有序号消息之后，按时间再按本地追加顺序
pub(crate) fn display_order(a: &Message, b: &Message) -> Ordering {
    match (a.sequence, b.sequence) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.local_order.cmp(&b.local_order)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a
            .timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.local_order.cmp(&b.local_order)),
    }
}

/// 可持久化的消息记录（时间为 ISO 字符串）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub local_id: String,
    pub server_id: Option<String>,
    pub sequence: Option<i64>,
    pub role: MessageRole,
    pub content: String,
    pub status: MessageStatus,
    pub timestamp: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub model: Option<String>,
    pub token_in: Option<u64>,
    pub token_out: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::serialization::encode_data_url;

    fn sequenced(seq: i64) -> Message {
        let mut m = Message::assistant(format!("#{}", seq));
        m.sequence = Some(seq);
        m
    }

    #[test]
    fn unsequenced_messages_sort_after_sequenced() {
        let mut pending = Message::user("later", vec![]);
        pending.local_order = 1;
        let mut msgs = vec![pending, sequenced(7), sequenced(2)];
        msgs.sort_by(display_order);
        let seqs: Vec<_> = msgs.iter().map(|m| m.sequence).collect();
        assert_eq!(seqs, vec![Some(2), Some(7), None]);
    }

    #[test]
    fn video_attachments_are_rejected() {
        let video = Attachment::new("clip.mp4", "video/mp4", 10, AttachmentSource::Url("file:///clip.mp4".into()));
        assert!(matches!(validate_attachment(&video), Err(ChatError::Validation(_))));

        let image = Attachment::new(
            "a.png",
            "image/png",
            3,
            AttachmentSource::DataUrl(encode_data_url("image/png", b"abc")),
        );
        assert!(image.is_image());
        assert_eq!(image.inline_bytes().unwrap(), b"abc");
        assert!(validate_content("", &[image], 10).is_ok());
    }

    #[test]
    fn content_validation() {
        assert!(validate_content("   ", &[], 4000).is_err());
        assert!(validate_content("hello", &[], 4).is_err());
        assert!(validate_content("hello", &[], 5).is_ok());
    }

    #[test]
    fn file_sizes_are_human_readable() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5 MB");
    }

    #[test]
    fn server_messages_are_delivered_and_keyed_by_server_id() {
        let msg = Message::from(MessageResponse {
            id: "m1".into(),
            conversation_id: "c1".into(),
            sequence: 3,
            role: MessageRole::Assistant,
            content: "hi".into(),
            model: Some("gemini".into()),
            token_in: None,
            token_out: Some(12),
            created_at: "2025-01-01T00:00:00Z".into(),
        });
        assert_eq!(msg.identity(), "m1");
        assert_eq!(msg.status, MessageStatus::Delivered);
        assert_eq!(Message::from_record(msg.to_record()), msg);
    }
}
