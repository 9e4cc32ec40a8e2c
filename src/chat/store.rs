//! 本地缓存（会话与已加载的消息页）
//!
//! 所有组件都通过这里读写状态。对未知会话 ID 的操作一律为空操作，
//! 因为会话可能已被并发删除。

use crate::chat::conversation::models::{Conversation, ConversationRecord};
use crate::chat::message::models::{display_order, Message};
use crate::chat::snapshot::SnapshotWriter;
use crate::chat::types::Pagination;
use tracing::{debug, info, warn};

/// 本地缓存
#[derive(Default)]
pub struct LocalCacheStore {
    /// 显示顺序：草稿在最前，其余按服务器顺序
    conversations: Vec<Conversation>,
    selected: Option<String>,
    /// 本地追加顺序计数器（单调递增）
    next_local_order: u64,
    writer: Option<SnapshotWriter>,
}

impl LocalCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 带防抖写入器的缓存
    pub fn with_writer(writer: SnapshotWriter) -> Self {
        Self {
            writer: Some(writer),
            ..Self::default()
        }
    }

    /// 挂载写入器并立即发布一次当前快照
    pub fn attach_writer(&mut self, writer: SnapshotWriter) {
        self.writer = Some(writer);
        if !self.conversations.is_empty() {
            self.persist();
        }
    }

    /// 取出写入器（用于关闭时落盘）
    pub fn take_writer(&mut self) -> Option<SnapshotWriter> {
        self.writer.take()
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn conversation(&self, local_id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.local_id == local_id)
    }

    fn conversation_mut(&mut self, local_id: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.local_id == local_id)
    }

    pub fn find_by_server_id(&self, server_id: &str) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|c| c.server_id.as_deref() == Some(server_id))
    }

    /// 当前草稿（最多一个）
    pub fn draft(&self) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.is_optimistic)
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected_conversation(&self) -> Option<&Conversation> {
        self.selected.as_deref().and_then(|id| self.conversation(id))
    }

    /// 选中会话，ID 未知时不做任何修改
    pub fn select(&mut self, local_id: Option<&str>) -> bool {
        match local_id {
            Some(id) if self.conversation(id).is_none() => {
                debug!("[Store] 选中未知会话 {}，忽略", id);
                false
            }
            Some(id) => {
                self.selected = Some(id.to_string());
                true
            }
            None => {
                self.selected = None;
                true
            }
        }
    }

    /// 按 `local_id` 插入或替换会话
    ///
    /// 新草稿放在最前；已有草稿时拒绝插入第二个草稿。
    pub fn upsert_conversation(&mut self, conv: Conversation) -> bool {
        if let Some(existing) = self.conversation_mut(&conv.local_id) {
            *existing = conv;
        } else if conv.is_optimistic {
            if let Some(draft) = self.draft() {
                warn!(
                    "[Store] 已存在草稿会话 {}，拒绝插入新草稿 {}",
                    draft.local_id, conv.local_id
                );
                return false;
            }
            self.conversations.insert(0, conv);
        } else {
            self.conversations.push(conv);
        }
        self.persist();
        true
    }

    /// 用新的列表替换会话（由同步协调器计算好顺序）
    pub(crate) fn replace_conversations(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
        if let Some(selected) = self.selected.clone() {
            if self.conversation(&selected).is_none() {
                debug!("[Store] 选中的会话 {} 已不在列表中，清除选中", selected);
                self.selected = None;
            }
        }
        self.persist();
    }

    /// 删除会话；若删除的是选中会话，则选中剩余的第一个
    pub fn remove_conversation(&mut self, local_id: &str) -> Option<Conversation> {
        let index = self.conversations.iter().position(|c| c.local_id == local_id)?;
        let removed = self.conversations.remove(index);
        if self.selected.as_deref() == Some(local_id) {
            self.selected = self.conversations.first().map(|c| c.local_id.clone());
        }
        info!("[Store] 删除本地会话 {}", local_id);
        self.persist();
        Some(removed)
    }

    /// 合并一页消息：按身份去重并重新排序，幂等
    pub fn merge_message_page(
        &mut self,
        conversation_id: &str,
        messages: Vec<Message>,
        pagination: Option<Pagination>,
    ) {
        let mut next_order = self.next_local_order;
        let Some(conv) = self.conversation_mut(conversation_id) else {
            debug!("[Store] 合并消息页：会话 {} 不存在，忽略", conversation_id);
            return;
        };

        let incoming = messages.len();
        let mut inserted = 0usize;
        for mut msg in messages {
            if let Some(existing) = conv
                .messages
                .iter_mut()
                .find(|m| m.identity() == msg.identity())
            {
                msg.local_id = existing.local_id.clone();
                msg.local_order = existing.local_order;
                *existing = msg;
            } else {
                next_order += 1;
                msg.local_order = next_order;
                conv.messages.push(msg);
                inserted += 1;
            }
        }
        conv.messages.sort_by(display_order);

        if let Some(p) = pagination {
            // 游标只前进不后退，总数以最新一页为准
            conv.message_cursor = Some(match conv.message_cursor {
                Some(cur) if cur.page > p.page => Pagination {
                    total_items: p.total_items,
                    total_pages: p.total_pages,
                    ..cur
                },
                _ => p,
            });
            conv.message_count = conv.message_count.max(p.total_items);
        }
        let delivered = conv.messages.iter().filter(|m| !m.is_pending()).count() as u64;
        conv.message_count = conv.message_count.max(delivered);
        conv.touch();

        debug!(
            "[Store] 会话 {} 合并消息页：收到 {} 条，新增 {} 条，当前 {} 条",
            conversation_id,
            incoming,
            inserted,
            conv.messages.len()
        );
        self.next_local_order = next_order;
        self.persist();
    }

    /// 追加一条本地消息（乐观用户消息或占位消息），返回其 `local_id`
    pub fn append_message(&mut self, conversation_id: &str, mut message: Message) -> Option<String> {
        let order = self.next_local_order + 1;
        let conv = self.conversation_mut(conversation_id)?;
        if message.is_pending() && conv.pending_message().is_some() {
            warn!("[Store] 会话 {} 已有占位消息，拒绝追加", conversation_id);
            return None;
        }

        message.local_order = order;
        let local_id = message.local_id.clone();
        if !message.is_pending() {
            conv.message_count += 1;
        }
        conv.messages.push(message);
        conv.touch();
        self.next_local_order = order;
        self.persist();
        Some(local_id)
    }

    /// 移除一条消息
    pub fn remove_message(&mut self, conversation_id: &str, local_id: &str) -> Option<Message> {
        let conv = self.conversation_mut(conversation_id)?;
        let index = conv.messages.iter().position(|m| m.local_id == local_id)?;
        let removed = conv.messages.remove(index);
        if !removed.is_pending() {
            conv.message_count = conv.message_count.saturating_sub(1);
        }
        conv.touch();
        self.persist();
        Some(removed)
    }

    /// 仅修改本地标题
    pub fn set_title(&mut self, conversation_id: &str, title: &str) -> bool {
        let Some(conv) = self.conversation_mut(conversation_id) else {
            return false;
        };
        conv.title = title.to_string();
        conv.touch();
        self.persist();
        true
    }

    /// 草稿提升为已确认会话
    ///
    /// 选中状态以 `local_id` 为 key，身份提升后选中自然保持；
    /// 若列表中已有同一服务器 ID 的记录（刷新先于提升到达），合并为一条。
    pub fn reidentify_conversation(&mut self, local_id: &str, server_id: &str) -> bool {
        if self.conversation(local_id).is_none() {
            debug!("[Store] 身份提升：会话 {} 不存在，忽略", local_id);
            return false;
        }

        let duplicate = self
            .conversations
            .iter()
            .position(|c| c.local_id != local_id && c.server_id.as_deref() == Some(server_id));
        if let Some(index) = duplicate {
            let dup = self.conversations.remove(index);
            info!(
                "[Store] 身份提升时发现重复记录 {}（server_id={}），已合并",
                dup.local_id, server_id
            );
            if self.selected.as_deref() == Some(dup.local_id.as_str()) {
                self.selected = Some(local_id.to_string());
            }
        }

        if let Some(conv) = self.conversation_mut(local_id) {
            conv.server_id = Some(server_id.to_string());
            conv.is_optimistic = false;
            conv.touch();
        }
        info!("[Store] ✅ 草稿 {} 已确认，server_id={}", local_id, server_id);
        self.persist();
        true
    }

    /// 清空全部会话与选中状态
    pub fn clear(&mut self) {
        self.conversations.clear();
        self.selected = None;
        self.persist();
    }

    /// 非草稿会话的持久化记录
    pub fn snapshot_records(&self) -> Vec<ConversationRecord> {
        self.conversations
            .iter()
            .filter(|c| !c.is_optimistic)
            .map(Conversation::to_record)
            .collect()
    }

    fn persist(&self) {
        if let Some(writer) = &self.writer {
            writer.schedule(self.snapshot_records());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::models::MessageStatus;
    use crate::chat::mock::{conversation_response, message_response, MemorySnapshotStore};
    use crate::chat::types::{ConversationKind, MessageRole};
    use std::sync::Arc;
    use std::time::Duration;

    fn store_with(id: &str) -> LocalCacheStore {
        let mut store = LocalCacheStore::new();
        store.upsert_conversation(Conversation::from(conversation_response(id, "t")));
        store
    }

    fn page(seqs: &[i64]) -> Vec<Message> {
        seqs.iter()
            .map(|s| Message::from(message_response("c1", *s)))
            .collect()
    }

    fn pagination(page: u32, total_pages: u32) -> Pagination {
        Pagination {
            page,
            page_size: 2,
            total_items: (total_pages * 2) as u64,
            total_pages,
        }
    }

    fn sequences(store: &LocalCacheStore, id: &str) -> Vec<Option<i64>> {
        store
            .conversation(id)
            .unwrap()
            .messages
            .iter()
            .map(|m| m.sequence)
            .collect()
    }

    #[test]
    fn merging_the_same_page_twice_is_idempotent() {
        let mut store = store_with("c1");
        store.merge_message_page("c1", page(&[4, 3]), Some(pagination(1, 2)));
        let once = store.conversation("c1").unwrap().messages.clone();

        store.merge_message_page("c1", page(&[4, 3]), Some(pagination(1, 2)));
        let twice = &store.conversation("c1").unwrap().messages;
        assert_eq!(&once, twice);
        assert_eq!(twice.len(), 2);
    }

    #[test]
    fn out_of_order_pages_end_up_sorted() {
        let mut store = store_with("c1");
        store.merge_message_page("c1", page(&[6, 5]), Some(pagination(1, 3)));
        store.merge_message_page("c1", page(&[2, 1]), Some(pagination(3, 3)));
        store.merge_message_page("c1", page(&[4, 3]), Some(pagination(2, 3)));

        assert_eq!(
            sequences(&store, "c1"),
            (1..=6).map(Some).collect::<Vec<_>>()
        );
        // 游标不会因为较早的页晚到而后退
        assert_eq!(store.conversation("c1").unwrap().message_cursor.unwrap().page, 3);
    }

    #[test]
    fn local_messages_sort_after_sequenced_ones() {
        let mut store = store_with("c1");
        store.append_message("c1", Message::user("hi", vec![]));
        store.merge_message_page("c1", page(&[2, 1]), Some(pagination(1, 1)));

        let msgs = &store.conversation("c1").unwrap().messages;
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[2].content, "hi");
        assert_eq!(msgs[2].sequence, None);
    }

    #[test]
    fn operations_on_unknown_conversations_are_noops() {
        let mut store = store_with("c1");
        store.merge_message_page("missing", page(&[1]), None);
        assert!(store.append_message("missing", Message::placeholder()).is_none());
        assert!(store.remove_message("missing", "m").is_none());
        assert!(!store.reidentify_conversation("missing", "srv"));
        assert!(!store.set_title("missing", "x"));
        assert_eq!(store.conversations().len(), 1);
    }

    #[test]
    fn only_one_draft_and_one_pending_message() {
        let mut store = LocalCacheStore::new();
        let first = Conversation::draft("u1", ConversationKind::Chat);
        let first_id = first.local_id.clone();
        assert!(store.upsert_conversation(first));
        assert!(!store.upsert_conversation(Conversation::draft("u1", ConversationKind::Chat)));
        assert_eq!(store.conversations().len(), 1);

        assert!(store.append_message(&first_id, Message::placeholder()).is_some());
        assert!(store.append_message(&first_id, Message::placeholder()).is_none());
    }

    #[test]
    fn reidentify_keeps_local_id_and_selection() {
        let mut store = store_with("c1");
        let draft = Conversation::draft("u1", ConversationKind::Chat);
        let draft_id = draft.local_id.clone();
        store.upsert_conversation(draft);
        store.select(Some(&draft_id));

        assert!(store.reidentify_conversation(&draft_id, "srv-9"));
        let conv = store.selected_conversation().unwrap();
        assert_eq!(conv.local_id, draft_id);
        assert_eq!(conv.remote_id(), Some("srv-9"));
        assert!(!conv.is_optimistic);
        assert!(store.draft().is_none());
    }

    #[test]
    fn reidentify_collapses_duplicate_server_record() {
        let mut store = LocalCacheStore::new();
        let draft = Conversation::draft("u1", ConversationKind::Chat);
        let draft_id = draft.local_id.clone();
        store.upsert_conversation(draft);
        store.upsert_conversation(Conversation::from(conversation_response("srv-1", "t")));
        store.select(Some("srv-1"));

        store.reidentify_conversation(&draft_id, "srv-1");
        assert_eq!(store.conversations().len(), 1);
        assert_eq!(store.selected_id(), Some(draft_id.as_str()));
    }

    #[test]
    fn removing_selected_conversation_selects_first_remaining() {
        let mut store = store_with("c1");
        store.upsert_conversation(Conversation::from(conversation_response("c2", "t")));
        store.select(Some("c1"));
        store.remove_conversation("c1");
        assert_eq!(store.selected_id(), Some("c2"));
    }

    #[test]
    fn message_count_ignores_placeholders() {
        let mut store = store_with("c1");
        let before = store.conversation("c1").unwrap().message_count;
        let user = store.append_message("c1", Message::user("hi", vec![])).unwrap();
        let pending = store.append_message("c1", Message::placeholder()).unwrap();
        assert_eq!(store.conversation("c1").unwrap().message_count, before + 1);

        let removed = store.remove_message("c1", &pending).unwrap();
        assert_eq!(removed.status, MessageStatus::Pending);
        store.remove_message("c1", &user);
        assert_eq!(store.conversation("c1").unwrap().message_count, before);
        assert_eq!(removed.role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn write_through_skips_drafts_and_placeholders() {
        let snapshots = Arc::new(MemorySnapshotStore::default());
        let writer = SnapshotWriter::spawn(snapshots.clone(), Duration::from_millis(10));
        let mut store = LocalCacheStore::with_writer(writer);

        store.upsert_conversation(Conversation::from(conversation_response("c1", "t")));
        store.upsert_conversation(Conversation::draft("u1", ConversationKind::Chat));
        store.append_message("c1", Message::user("hi", vec![]));
        store.append_message("c1", Message::placeholder());

        store.take_writer().unwrap().shutdown().await;
        let saved = snapshots.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].local_id, "c1");
        assert_eq!(saved[0].messages.len(), 1);
    }
}
