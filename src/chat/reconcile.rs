//! 同步协调器：合并服务器会话列表与本地草稿，处理草稿确认与删除策略

use crate::chat::conversation::models::{Conversation, ConversationRecord};
use crate::chat::store::LocalCacheStore;
use crate::chat::types::ConversationResponse;
use tracing::{debug, info};

/// 删除方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletePlan {
    /// 草稿：只删本地
    LocalOnly,
    /// 已确认：先调用远端接口，成功后再删本地
    Remote { server_id: String },
    /// 本地不存在
    Unknown,
}

pub struct SyncReconciler;

impl SyncReconciler {
    /// 用第 1 页替换会话列表
    ///
    /// 草稿保持在最前且不会被覆盖；已加载的消息和游标按服务器 ID 保留。
    /// `keep` 中的本地会话（当前选中、正在发送）即使不在这一页中也保留。
    pub fn merge_first_page(store: &mut LocalCacheStore, fetched: Vec<ConversationResponse>, keep: &[&str]) {
        let mut merged: Vec<Conversation> = Vec::with_capacity(fetched.len() + 1);
        if let Some(draft) = store.draft() {
            merged.push(draft.clone());
        }

        for resp in &fetched {
            let conv = match store.find_by_server_id(&resp.id) {
                Some(existing) if !existing.is_optimistic => {
                    let mut conv = existing.clone();
                    conv.apply_server_fields(resp);
                    conv
                }
                _ => Conversation::from(resp.clone()),
            };
            if !merged.iter().any(|c| c.local_id == conv.local_id) {
                merged.push(conv);
            }
        }

        for id in keep {
            if merged.iter().any(|c| c.local_id == *id) {
                continue;
            }
            if let Some(conv) = store.conversation(id) {
                debug!("[Reconcile] 保留不在第一页中的本地会话 {}", id);
                merged.push(conv.clone());
            }
        }

        info!(
            "[Reconcile] 会话列表已刷新：服务器 {} 条，合并后 {} 条",
            fetched.len(),
            merged.len()
        );
        store.replace_conversations(merged);
    }

    /// 追加下一页（排在现有会话之后），已存在的按服务器 ID 更新
    pub fn append_page(store: &mut LocalCacheStore, fetched: Vec<ConversationResponse>) {
        let mut merged = store.conversations().to_vec();
        let mut appended = 0usize;
        for resp in fetched {
            match merged
                .iter_mut()
                .find(|c| c.server_id.as_deref() == Some(resp.id.as_str()))
            {
                Some(existing) => existing.apply_server_fields(&resp),
                None => {
                    merged.push(Conversation::from(resp));
                    appended += 1;
                }
            }
        }
        debug!("[Reconcile] 追加会话页，新增 {} 条", appended);
        store.replace_conversations(merged);
    }

    /// 离线回退：用本地快照补全会话列表
    ///
    /// 内存中的会话全部保留（快照因防抖可能落后于内存），
    /// 只追加快照里内存中没有的会话；草稿保持在最前。
    pub fn restore_snapshot(store: &mut LocalCacheStore, records: Vec<ConversationRecord>) {
        let mut merged: Vec<Conversation> = Vec::with_capacity(store.conversations().len() + records.len());
        if let Some(draft) = store.draft() {
            merged.push(draft.clone());
        }
        merged.extend(store.conversations().iter().filter(|c| !c.is_optimistic).cloned());

        let mut restored = 0;
        for record in records {
            let Some(server_id) = record.server_id.as_deref() else {
                continue;
            };
            let known = merged
                .iter()
                .any(|c| c.local_id == record.local_id || c.remote_id() == Some(server_id));
            if !known {
                merged.push(Conversation::from_record(record));
                restored += 1;
            }
        }
        info!(
            "[Reconcile] 从本地快照恢复 {} 个会话，当前共 {} 个",
            restored,
            merged.len()
        );
        store.replace_conversations(merged);
    }

    /// 草稿被服务器确认
    pub fn promote_draft(store: &mut LocalCacheStore, local_id: &str, server_id: &str) -> bool {
        store.reidentify_conversation(local_id, server_id)
    }

    pub fn plan_delete(store: &LocalCacheStore, local_id: &str) -> DeletePlan {
        match store.conversation(local_id) {
            None => DeletePlan::Unknown,
            Some(conv) => match conv.remote_id() {
                Some(server_id) if !conv.is_optimistic => DeletePlan::Remote {
                    server_id: server_id.to_string(),
                },
                _ => DeletePlan::LocalOnly,
            },
        }
    }
}
