//! 发送协调器
//!
//! 负责 "提交 → 等待 → 成功/失败/取消" 的状态机，全局同时最多一个发送会话。
//! 每次尝试带一个单调递增的代号，结果到达时代号不是当前值就直接丢弃。

use crate::chat::conversation::models::DRAFT_TITLE;
use crate::chat::error::{ChatError, ChatResult};
use crate::chat::message::models::{validate_content, Attachment, Message};
use crate::chat::reconcile::SyncReconciler;
use crate::chat::store::LocalCacheStore;
use crate::chat::types::{GenerateRequest, GenerateResponse, MessageRole};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 发送阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPhase {
    Idle,
    /// 输入框中有待发送内容
    Composing,
    Submitting,
}

/// 发送参数
#[derive(Debug, Clone)]
pub struct SendSettings {
    pub model: String,
    pub max_message_length: usize,
    pub title_word_limit: usize,
    /// 失败时展示的固定文案
    pub ai_error_message: String,
    pub response_mime_type: String,
}

/// 取消后需要恢复到输入框的内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeRestore {
    pub content: String,
    pub attachments: Vec<Attachment>,
}

/// 进行中的发送会话（不持久化）
#[derive(Debug)]
struct SendSession {
    conversation_id: String,
    attempt: u64,
    cancel: CancellationToken,
    original_content: String,
    original_attachments: Vec<Attachment>,
    /// 本次尝试自己追加的用户消息；重试沿用已有消息时为 None
    user_message_id: Option<String>,
    placeholder_id: String,
    /// 草稿在发送前的标题，取消时恢复
    previous_title: Option<String>,
}

/// 已受理的发送，由调用方交给远端接口执行
#[derive(Debug, Clone)]
pub struct SendTicket {
    pub conversation_id: String,
    pub attempt: u64,
    pub request: GenerateRequest,
    pub cancel: CancellationToken,
}

/// 一次尝试的结局
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Resolved {
        conversation_id: String,
        /// 草稿被确认时的服务器 ID
        promoted_to: Option<String>,
    },
    Failed {
        conversation_id: String,
        reason: String,
    },
    Canceled {
        conversation_id: String,
        /// 用户消息被撤回时才需要恢复输入框
        restore: Option<ComposeRestore>,
    },
    /// 代号已过期，结果被丢弃
    Stale,
}

/// 取前 `limit` 个单词作为标题，被截断时追加省略号
pub fn derive_title(content: &str, limit: usize) -> String {
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.is_empty() {
        return DRAFT_TITLE.to_string();
    }
    let mut title = words.iter().take(limit).copied().collect::<Vec<_>>().join(" ");
    if words.len() > limit {
        title.push_str("...");
    }
    title
}

pub struct SendCoordinator {
    settings: SendSettings,
    session: Option<SendSession>,
    /// 当前有效的代号
    generation: u64,
}

impl SendCoordinator {
    pub fn new(settings: SendSettings) -> Self {
        Self {
            settings,
            session: None,
            generation: 0,
        }
    }

    pub fn is_sending(&self) -> bool {
        self.session.is_some()
    }

    /// 全局正在发送的会话
    pub fn sending_conversation_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.conversation_id.as_str())
    }

    /// 提交一条新消息
    ///
    /// 被拒绝时不修改任何状态。
    pub fn submit(
        &mut self,
        store: &mut LocalCacheStore,
        conversation_id: &str,
        content: &str,
        attachments: Vec<Attachment>,
    ) -> ChatResult<SendTicket> {
        self.admit(store, conversation_id, content, &attachments)?;
        let user = Message::user(content, attachments.clone());
        let user_message_id = store
            .append_message(conversation_id, user)
            .ok_or_else(|| ChatError::NotFound(conversation_id.to_string()))?;
        Ok(self.start(store, conversation_id, content, attachments, Some(user_message_id)))
    }

    /// 重试一条失败的助手消息：删除它，并用其前面最近的用户消息重新走发送流程
    ///
    /// 失败消息位于末尾且紧跟在该用户消息之后时沿用原用户消息；
    /// 否则把用户内容作为新消息追加到末尾，让回复跟在对应的提问后面。
    pub fn retry(
        &mut self,
        store: &mut LocalCacheStore,
        conversation_id: &str,
        errored_message_id: &str,
    ) -> ChatResult<SendTicket> {
        let conv = store
            .conversation(conversation_id)
            .ok_or_else(|| ChatError::NotFound(conversation_id.to_string()))?;
        let index = conv
            .messages
            .iter()
            .position(|m| m.local_id == errored_message_id)
            .ok_or_else(|| ChatError::NotFound(errored_message_id.to_string()))?;
        if !conv.messages[index].is_errored() {
            return Err(ChatError::Validation("只能重试失败的消息".to_string()));
        }
        let user_index = conv.messages[..index]
            .iter()
            .rposition(|m| m.role == MessageRole::User)
            .ok_or_else(|| ChatError::NotFound(format!("{} 之前的用户消息", errored_message_id)))?;
        let user = &conv.messages[user_index];
        let reuse = user_index + 1 == index && index + 1 == conv.messages.len();
        let (user_id, content, attachments) =
            (user.local_id.clone(), user.content.clone(), user.attachments.clone());

        self.admit(store, conversation_id, &content, &attachments)?;
        store.remove_message(conversation_id, errored_message_id);
        let user_message_id = if reuse {
            info!("[Send] 🔁 重试消息，会话={}，沿用用户消息={}", conversation_id, user_id);
            None
        } else {
            let appended = store
                .append_message(conversation_id, Message::user(content.clone(), attachments.clone()))
                .ok_or_else(|| ChatError::NotFound(conversation_id.to_string()))?;
            info!("[Send] 🔁 重试消息，会话={}，重新追加用户消息={}", conversation_id, appended);
            Some(appended)
        };
        Ok(self.start(store, conversation_id, &content, attachments, user_message_id))
    }

    fn admit(
        &self,
        store: &LocalCacheStore,
        conversation_id: &str,
        content: &str,
        attachments: &[Attachment],
    ) -> ChatResult<()> {
        if let Some(session) = &self.session {
            warn!(
                "[Send] 会话 {} 正在发送，拒绝新的发送请求",
                session.conversation_id
            );
            return Err(ChatError::SendInProgress);
        }
        validate_content(content, attachments, self.settings.max_message_length)?;
        if store.conversation(conversation_id).is_none() {
            return Err(ChatError::NotFound(conversation_id.to_string()));
        }
        Ok(())
    }

    /// 已受理：追加占位消息、处理草稿标题、生成请求
    fn start(
        &mut self,
        store: &mut LocalCacheStore,
        conversation_id: &str,
        content: &str,
        attachments: Vec<Attachment>,
        user_message_id: Option<String>,
    ) -> SendTicket {
        let mut previous_title = None;
        if let Some(conv) = store.conversation(conversation_id) {
            if conv.is_optimistic {
                previous_title = Some(conv.title.clone());
                let title = derive_title(content, self.settings.title_word_limit);
                debug!("[Send] 草稿会话 {} 标题设为 {:?}", conversation_id, title);
                store.set_title(conversation_id, &title);
            }
        }

        let placeholder_id = store
            .append_message(conversation_id, Message::placeholder())
            .unwrap_or_default();

        let (remote_id, title, kind, document_id) = match store.conversation(conversation_id) {
            Some(conv) => (
                conv.remote_id().map(str::to_string),
                conv.title.clone(),
                conv.kind,
                conv.document_id.clone(),
            ),
            None => (None, DRAFT_TITLE.to_string(), Default::default(), None),
        };
        let request = GenerateRequest {
            model: self.settings.model.clone(),
            contents: content.to_string(),
            thinking: None,
            response_mime_type: self.settings.response_mime_type.clone(),
            conversation_type: kind,
            conversation_title: if remote_id.is_none() { Some(title) } else { None },
            conversation_id: remote_id,
            document_id,
        };

        self.generation += 1;
        let cancel = CancellationToken::new();
        self.session = Some(SendSession {
            conversation_id: conversation_id.to_string(),
            attempt: self.generation,
            cancel: cancel.clone(),
            original_content: content.to_string(),
            original_attachments: attachments,
            user_message_id,
            placeholder_id,
            previous_title,
        });
        info!(
            "[Send] 📤 开始发送，会话={}，代号={}",
            conversation_id, self.generation
        );

        SendTicket {
            conversation_id: conversation_id.to_string(),
            attempt: self.generation,
            request,
            cancel,
        }
    }

    /// 用户取消：立即回滚本地状态，之后到达的结果都会被丢弃
    pub fn cancel(&mut self, store: &mut LocalCacheStore) -> Option<SendOutcome> {
        let session = self.session.take()?;
        session.cancel.cancel();
        self.generation += 1;
        info!(
            "[Send] ⏹ 取消发送，会话={}，代号={}",
            session.conversation_id, session.attempt
        );
        Some(Self::roll_back(store, session))
    }

    /// 放弃当前发送但不修改缓存（清空全部会话时）
    pub fn abandon(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
            self.generation += 1;
            debug!("[Send] 放弃发送，会话={}", session.conversation_id);
        }
    }

    /// 远端结果到达
    pub fn resolve(
        &mut self,
        store: &mut LocalCacheStore,
        attempt: u64,
        result: ChatResult<GenerateResponse>,
    ) -> SendOutcome {
        let current = self
            .session
            .as_ref()
            .is_some_and(|s| s.attempt == attempt && attempt == self.generation);
        if !current {
            debug!(
                "[Send] 丢弃过期的发送结果，代号={} 当前={}",
                attempt, self.generation
            );
            return SendOutcome::Stale;
        }
        let Some(session) = self.session.take() else {
            return SendOutcome::Stale;
        };

        match result {
            Ok(resp) if resp.is_success() => self.apply_success(store, session, resp),
            Ok(resp) => {
                let reason = resp
                    .error
                    .as_ref()
                    .or(resp.detail.as_ref())
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| format!("code={} status={}", resp.code, resp.status));
                self.apply_failure(store, session, reason)
            }
            // 传输层自行报告取消（没有经过 cancel()），按取消处理
            Err(ChatError::Cancelled) => {
                self.generation += 1;
                Self::roll_back(store, session)
            }
            Err(e) => self.apply_failure(store, session, e.to_string()),
        }
    }

    fn apply_success(
        &self,
        store: &mut LocalCacheStore,
        session: SendSession,
        resp: GenerateResponse,
    ) -> SendOutcome {
        let conversation_id = session.conversation_id;
        store.remove_message(&conversation_id, &session.placeholder_id);
        let mut reply = Message::assistant(resp.data);
        reply.model = Some(self.settings.model.clone());
        store.append_message(&conversation_id, reply);

        let mut promoted_to = None;
        let is_draft = store
            .conversation(&conversation_id)
            .is_some_and(|c| c.is_optimistic);
        if is_draft {
            match resp.conversation_id {
                Some(server_id) if !server_id.is_empty() => {
                    if SyncReconciler::promote_draft(store, &conversation_id, &server_id) {
                        promoted_to = Some(server_id);
                    }
                }
                _ => warn!(
                    "[Send] 草稿会话 {} 发送成功但服务器未返回会话 ID",
                    conversation_id
                ),
            }
        }
        info!("[Send] ✅ 发送成功，会话={}", conversation_id);
        SendOutcome::Resolved {
            conversation_id,
            promoted_to,
        }
    }

    fn apply_failure(&self, store: &mut LocalCacheStore, session: SendSession, reason: String) -> SendOutcome {
        error!(
            "[Send] 发送失败，会话={}，原因: {}",
            session.conversation_id, reason
        );
        let conversation_id = session.conversation_id;
        store.remove_message(&conversation_id, &session.placeholder_id);
        store.append_message(
            &conversation_id,
            Message::errored(self.settings.ai_error_message.clone()),
        );
        SendOutcome::Failed {
            conversation_id,
            reason,
        }
    }

    fn roll_back(store: &mut LocalCacheStore, session: SendSession) -> SendOutcome {
        let conversation_id = session.conversation_id;
        store.remove_message(&conversation_id, &session.placeholder_id);
        // 只撤回本次尝试追加的内容
        let restore = session.user_message_id.map(|user_message_id| {
            store.remove_message(&conversation_id, &user_message_id);
            ComposeRestore {
                content: session.original_content,
                attachments: session.original_attachments,
            }
        });
        if let Some(title) = session.previous_title {
            store.set_title(&conversation_id, &title);
        }
        SendOutcome::Canceled {
            conversation_id,
            restore,
        }
    }
}
