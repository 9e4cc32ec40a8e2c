//! 登录与认证会话
//!
//! 进程内唯一的认证状态，通过 `set`/`clear` 显式修改，注入到 HTTP 网关中使用。

use crate::chat::error::{ChatError, ChatResult};
use crate::chat::types::handle_http_response;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// 最短密码长度
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPayload {
    pub user: User,
    pub token: String,
}

/// 认证会话（可克隆，共享同一份状态）
#[derive(Debug, Clone, Default)]
pub struct AuthSession {
    inner: Arc<RwLock<Option<AuthPayload>>>,
}

impl AuthSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, payload: AuthPayload) {
        info!("[Auth] 设置登录用户 {}", payload.user.email);
        match self.inner.write() {
            Ok(mut guard) => *guard = Some(payload),
            Err(poisoned) => *poisoned.into_inner() = Some(payload),
        }
    }

    pub fn clear(&self) {
        info!("[Auth] 清除登录状态");
        match self.inner.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Option<AuthPayload>) -> T) -> T {
        match self.inner.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.read(|p| p.as_ref().map(|p| p.token.clone()))
    }

    pub fn user(&self) -> Option<User> {
        self.read(|p| p.as_ref().map(|p| p.user.clone()))
    }

}

/// 校验登录表单
pub fn validate_credentials(email: &str, password: &str) -> ChatResult<()> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ChatError::Validation("邮箱格式不正确".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ChatError::Validation(format!(
            "密码至少 {} 位",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// 登录并返回用户与 token
pub async fn login_async(api_base_url: &str, email: &str, password: &str) -> ChatResult<AuthPayload> {
    use uuid::Uuid;

    validate_credentials(email, password)?;

    let client = reqwest::Client::new();
    let operation_id = Uuid::new_v4().to_string();
    let url = format!("{}/auth/login", api_base_url.trim_end_matches('/'));

    info!("[Auth] 🔐 正在登录...");
    debug!("[Auth]   URL: {}", url);
    debug!("[Auth]   邮箱: {}", email);
    debug!("[Auth]   OperationID: {}", operation_id);

    let response = client
        .post(&url)
        .header("Content-Type", "application/json")
        .header("operationID", &operation_id)
        .json(&LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        })
        .send()
        .await?;

    let resp = handle_http_response::<AuthPayload>(response, "登录").await?;
    match resp.data {
        Some(payload) => {
            info!("[Auth] ✅ 登录成功，用户: {}", payload.user.id);
            Ok(payload)
        }
        None => {
            warn!("[Auth] 登录响应缺少 data 字段");
            Err(ChatError::ServerRejection("登录响应缺少用户信息".to_string()))
        }
    }
}
