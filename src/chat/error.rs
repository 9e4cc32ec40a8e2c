//! 核心错误类型
//!
//! 取消（`Cancelled`）与失败严格区分：取消是正常结果，不会在界面上产生错误提示。

use thiserror::Error;

/// 聊天核心错误
#[derive(Error, Debug)]
pub enum ChatError {
    /// 传输层失败（连接、超时等）
    #[error("网络请求失败: {0}")]
    Network(String),

    /// 服务器返回了非成功的响应
    #[error("服务器拒绝请求: {0}")]
    ServerRejection(String),

    /// 用户主动取消
    #[error("请求已取消")]
    Cancelled,

    /// 引用了本地未知的 ID（视为无害的空操作）
    #[error("未找到: {0}")]
    NotFound(String),

    /// 输入校验失败（空内容、附件类型被拒绝等）
    #[error("校验失败: {0}")]
    Validation(String),

    /// 另一条消息仍在发送中（全局单发送约束）
    #[error("另一条消息正在发送，请稍候")]
    SendInProgress,

    /// 本地持久化失败
    #[error("本地存储错误: {0}")]
    Storage(String),
}

impl ChatError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ChatError::Cancelled)
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::ServerRejection(format!("响应格式错误: {}", e))
    }
}

impl From<anyhow::Error> for ChatError {
    fn from(e: anyhow::Error) -> Self {
        ChatError::Storage(format!("{:#}", e))
    }
}

/// 核心结果类型
pub type ChatResult<T> = std::result::Result<T, ChatError>;
