use crate::chat::error::{ChatError, ChatResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// 生成接口成功时的业务码
pub const GENERATE_OK_CODE: i64 = 200;

/// 会话类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConversationKind {
    #[default]
    #[serde(rename = "chatbot")]
    Chat,
    #[serde(rename = "document")]
    Document,
    #[serde(rename = "test")]
    Test,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKind::Chat => "chatbot",
            ConversationKind::Document => "document",
            ConversationKind::Test => "test",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "chatbot" => Some(ConversationKind::Chat),
            "document" => Some(ConversationKind::Document),
            "test" => Some(ConversationKind::Test),
            _ => None,
        }
    }
}

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

/// 分页游标（服务器返回的分页信息）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl Pagination {
    /// 是否还有下一页
    pub fn has_more(&self) -> bool {
        self.page < self.total_pages
    }
}

/// 统一的 API 响应包装结构体（success、data、message、pagination）
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

/// 一页数据
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Option<Pagination>,
}

/// 服务器返回的会话
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationResponse {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    pub conversation_type: ConversationKind,
    pub title: String,
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub message_count: u64,
    pub created_at: String,
    pub updated_at: String,
}

/// 服务器返回的消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub conversation_id: String,
    pub sequence: i64,
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub token_in: Option<u64>,
    #[serde(default)]
    pub token_out: Option<u64>,
    pub created_at: String,
}

/// 生成请求参数
///
/// 已存在的会话携带 `conversation_id`；新会话携带 `conversation_title`，由服务器分配 ID。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub contents: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<bool>,
    pub response_mime_type: String,
    pub conversation_type: ConversationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
}

/// 生成接口响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub code: i64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl GenerateResponse {
    pub fn is_success(&self) -> bool {
        self.code == GENERATE_OK_CODE
    }
}

/// 通用 HTTP 响应处理函数：直接反序列化为统一的响应结构体
///
/// HTTP 状态非 2xx 或 `success == false` 时返回 `ServerRejection`
pub async fn handle_http_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> ChatResult<ApiResponse<T>> {
    let status = response.status();

    // body 只能读取一次
    let body_bytes = response.bytes().await?;
    let body_str = String::from_utf8_lossy(&body_bytes);
    debug!("[HTTP] {}响应 Body: {}", operation_name, body_str);

    if !status.is_success() {
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 响应: {}",
            operation_name, status, body_str
        );
        return Err(ChatError::ServerRejection(format!(
            "HTTP 错误 {}: {}",
            status, body_str
        )));
    }

    let api_resp = parse_api_response::<T>(&body_bytes, operation_name)?;
    info!("[HTTP] {}请求成功，HTTP状态: {}", operation_name, status);
    Ok(api_resp)
}

/// 从原始 body 解析统一响应并检查 `success`
pub fn parse_api_response<T: serde::de::DeserializeOwned>(
    body: &[u8],
    operation_name: &str,
) -> ChatResult<ApiResponse<T>> {
    let api_resp: ApiResponse<T> = serde_json::from_slice(body).map_err(|e| {
        error!("[HTTP] {}反序列化失败: {:?}", operation_name, e);
        ChatError::from(e)
    })?;

    if !api_resp.success {
        let msg = api_resp
            .message
            .clone()
            .unwrap_or_else(|| "未知错误".to_string());
        error!("[HTTP] {}服务器错误: {}", operation_name, msg);
        return Err(ChatError::ServerRejection(msg));
    }

    Ok(api_resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_list_envelope_parses() {
        let body = br#"{
            "success": true,
            "message": null,
            "data": [{
                "_id": "c1",
                "user_id": "u1",
                "conversation_type": "chatbot",
                "title": "Hello",
                "document_id": null,
                "message_count": 4,
                "created_at": "2025-01-01T00:00:00Z",
                "updated_at": "2025-01-02T00:00:00Z"
            }],
            "pagination": {"page": 1, "page_size": 10, "total_items": 11, "total_pages": 2}
        }"#;
        let resp = parse_api_response::<Vec<ConversationResponse>>(body, "会话列表").unwrap();
        let data = resp.data.unwrap();
        assert_eq!(data[0].id, "c1");
        assert_eq!(data[0].conversation_type, ConversationKind::Chat);
        let pagination = resp.pagination.unwrap();
        assert!(pagination.has_more());
        assert_eq!(pagination.total_pages, 2);
    }

    #[test]
    fn unsuccessful_envelope_is_server_rejection() {
        let body = br#"{"success": false, "data": null, "message": "token expired"}"#;
        let err = parse_api_response::<Vec<ConversationResponse>>(body, "会话列表").unwrap_err();
        assert!(matches!(err, ChatError::ServerRejection(ref m) if m == "token expired"));
    }

    #[test]
    fn generate_request_omits_absent_identity() {
        let req = GenerateRequest {
            model: "gemini-2.5-flash".into(),
            contents: "hi".into(),
            thinking: None,
            response_mime_type: "text/plain".into(),
            conversation_type: ConversationKind::Chat,
            conversation_id: None,
            conversation_title: Some("hi".into()),
            document_id: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["conversation_type"], "chatbot");
        assert_eq!(json["conversation_title"], "hi");
        assert!(json.get("conversation_id").is_none());
    }
}
