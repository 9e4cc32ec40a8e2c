//! 界面层监听器回调接口
//!
//! 回调在核心的串行事件处理中同步触发，实现方不应阻塞。

/// 面向用户的短暂提示
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// 已有消息在发送中，请稍候
    PleaseWait { sending_conversation_id: String },
    /// 会话列表加载失败（可重试）
    LoadConversationsFailed { reason: String },
    /// 消息分页加载失败（可重试）
    LoadMessagesFailed { conversation_id: String, reason: String },
    DeleteFailed { conversation_id: String, reason: String },
    RenameFailed { conversation_id: String, reason: String },
    /// 附件被拒绝（例如视频）
    AttachmentRejected { name: String },
    /// 输入内容校验失败
    InvalidInput { reason: String },
}

/// 界面监听器
pub trait ChatListener: Send + Sync {
    /// 会话列表（顺序、标题、身份）变更
    fn on_conversations_changed(&self);

    /// 某个会话的消息列表变更
    fn on_messages_changed(&self, conversation_id: &str);

    /// 全局发送状态变更，`None` 表示空闲
    fn on_sending_changed(&self, sending_conversation_id: Option<&str>);

    /// 输入框内容被恢复或清空
    fn on_compose_changed(&self);

    fn on_notice(&self, notice: &Notice);
}

/// 空实现（默认监听器）
pub struct EmptyChatListener;

impl ChatListener for EmptyChatListener {
    fn on_conversations_changed(&self) {}
    fn on_messages_changed(&self, _conversation_id: &str) {}
    fn on_sending_changed(&self, _sending_conversation_id: Option<&str>) {}
    fn on_compose_changed(&self) {}
    fn on_notice(&self, _notice: &Notice) {}
}
