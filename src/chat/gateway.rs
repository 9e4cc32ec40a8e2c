//! 远端接口抽象
//!
//! 核心只依赖这个 trait；HTTP 实现见 [`crate::chat::api::HttpGateway`]，测试中使用内存实现。

use crate::chat::error::ChatResult;
use crate::chat::types::{ConversationKind, ConversationResponse, GenerateRequest, GenerateResponse, MessageResponse, Page};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// 分页获取会话列表（页码从 1 开始）
    async fn list_conversations(
        &self,
        kind: ConversationKind,
        page: u32,
        page_size: u32,
    ) -> ChatResult<Page<ConversationResponse>>;

    /// 分页获取会话消息
    async fn list_messages(
        &self,
        conversation_id: &str,
        page: u32,
        page_size: u32,
    ) -> ChatResult<Page<MessageResponse>>;

    /// 发起一次生成请求
    ///
    /// `cancel` 被触发后应尽快返回 `ChatError::Cancelled`。
    async fn generate(
        &self,
        request: GenerateRequest,
        cancel: CancellationToken,
    ) -> ChatResult<GenerateResponse>;

    async fn rename_conversation(&self, conversation_id: &str, title: &str) -> ChatResult<()>;

    async fn delete_conversation(&self, conversation_id: &str) -> ChatResult<()>;
}
