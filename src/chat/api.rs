//! 聊天 HTTP API 客户端
//!
//! 负责所有会话、消息与生成相关的 HTTP 请求

use crate::chat::auth::AuthSession;
use crate::chat::error::{ChatError, ChatResult};
use crate::chat::gateway::RemoteGateway;
use crate::chat::types::{
    handle_http_response, ConversationKind, ConversationResponse, GenerateRequest,
    GenerateResponse, MessageResponse, Page,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

/// 基于 reqwest 的远端接口实现
pub struct HttpGateway {
    client: reqwest::Client,
    api_base_url: String,
    session: AuthSession,
}

impl HttpGateway {
    pub fn new(api_base_url: impl Into<String>, session: AuthSession) -> Self {
        Self::with_client(reqwest::Client::new(), api_base_url, session)
    }

    pub fn with_client(client: reqwest::Client, api_base_url: impl Into<String>, session: AuthSession) -> Self {
        Self {
            client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            session,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }

    /// 附加认证与操作 ID 头
    fn prepare(&self, builder: reqwest::RequestBuilder, tag: &str) -> reqwest::RequestBuilder {
        let operation_id = Uuid::new_v4().to_string();
        debug!("[ChatAPI/{}]   操作ID: {}", tag, operation_id);
        let builder = builder
            .header("Content-Type", "application/json")
            .header("operationID", operation_id);
        match self.session.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn fetch_page<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        operation: &str,
    ) -> ChatResult<Page<T>> {
        let response = builder.send().await?;
        let resp = handle_http_response::<Vec<T>>(response, operation).await?;
        Ok(Page {
            items: resp.data.unwrap_or_default(),
            pagination: resp.pagination,
        })
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn list_conversations(
        &self,
        kind: ConversationKind,
        page: u32,
        page_size: u32,
    ) -> ChatResult<Page<ConversationResponse>> {
        let url = self.url("/conversations");
        info!("[ChatAPI/List] 📡 请求会话列表，第 {} 页", page);
        debug!("[ChatAPI/List]   请求URL: {}", url);

        let builder = self.prepare(self.client.get(&url), "List").query(&[
            ("conversation_type", kind.as_str().to_string()),
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
        ]);
        let result = self.fetch_page(builder, "会话列表").await?;
        info!("[ChatAPI/List] 📥 收到 {} 个会话", result.items.len());
        Ok(result)
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        page: u32,
        page_size: u32,
    ) -> ChatResult<Page<MessageResponse>> {
        let url = self.url(&format!("/conversations/{}/messages", conversation_id));
        info!(
            "[ChatAPI/Msg] 📡 请求会话 {} 的消息，第 {} 页",
            conversation_id, page
        );

        let builder = self
            .prepare(self.client.get(&url), "Msg")
            .query(&[("page", page), ("page_size", page_size)]);
        let result = self.fetch_page(builder, "消息列表").await?;
        info!("[ChatAPI/Msg] 📥 收到 {} 条消息", result.items.len());
        Ok(result)
    }

    async fn generate(
        &self,
        request: GenerateRequest,
        cancel: CancellationToken,
    ) -> ChatResult<GenerateResponse> {
        let url = self.url("/generate");
        info!(
            "[ChatAPI/Gen] 📤 发起生成请求，会话: {:?}",
            request.conversation_id
        );

        let send = self.prepare(self.client.post(&url), "Gen").json(&request).send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("[ChatAPI/Gen] 生成请求已取消");
                return Err(ChatError::Cancelled);
            }
            response = send => response?,
        };

        let status = response.status();
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            body = response.bytes() => body?,
        };
        debug!("[ChatAPI/Gen] 响应 Body: {}", String::from_utf8_lossy(&body));

        // 业务失败时服务器也可能返回非 2xx，但 body 仍是生成响应结构
        match serde_json::from_slice::<GenerateResponse>(&body) {
            Ok(resp) => {
                if !resp.is_success() {
                    error!(
                        "[ChatAPI/Gen] 生成失败，HTTP状态: {}, code: {}, status: {}",
                        status, resp.code, resp.status
                    );
                }
                Ok(resp)
            }
            Err(e) if !status.is_success() => {
                error!("[ChatAPI/Gen] 生成请求失败，HTTP状态: {}", status);
                Err(ChatError::ServerRejection(format!(
                    "HTTP 错误 {}: {}",
                    status, e
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn rename_conversation(&self, conversation_id: &str, title: &str) -> ChatResult<()> {
        let url = self.url(&format!("/conversations/{}", conversation_id));
        info!("[ChatAPI/Rename] ✏️ 重命名会话 {} -> {}", conversation_id, title);

        let response = self
            .prepare(self.client.put(&url), "Rename")
            .json(&serde_json::json!({ "title": title }))
            .send()
            .await?;
        handle_http_response::<serde_json::Value>(response, "重命名会话").await?;
        Ok(())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> ChatResult<()> {
        let url = self.url(&format!("/conversations/{}", conversation_id));
        info!("[ChatAPI/Delete] 🗑 删除会话 {}", conversation_id);

        let response = self
            .prepare(self.client.delete(&url), "Delete")
            .send()
            .await?;
        handle_http_response::<serde_json::Value>(response, "删除会话").await?;
        Ok(())
    }
}
