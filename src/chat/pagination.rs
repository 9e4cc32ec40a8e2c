//! 分页控制器
//!
//! 只负责游标与加载中标记（守卫），网络请求由客户端发起，结果带着凭据回到这里确认。
//! 会话列表与每个会话的消息列表各自独立计数。

use crate::chat::types::Pagination;
use std::collections::HashSet;
use tracing::debug;

/// 会话列表加载类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListLoad {
    /// 首次加载或刷新（第 1 页）
    Refresh,
    /// 加载下一页
    More,
}

/// 一次会话列表加载的凭据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListTicket {
    pub epoch: u64,
    pub load: ListLoad,
    pub page: u32,
}

/// 消息分页加载类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLoad {
    /// 首次选中时加载第 1 页
    Initial,
    /// 向前加载更早的消息
    Older,
}

#[derive(Debug)]
pub struct PaginationController {
    page_size: u32,
    conversation_cursor: Option<Pagination>,
    /// 刷新会使之前所有未完成的列表加载失效
    epoch: u64,
    refreshing: bool,
    loading_more_conversations: bool,
    loading_messages: HashSet<String>,
    loading_older_messages: HashSet<String>,
    load_more_messages_error: Option<String>,
}

impl PaginationController {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            conversation_cursor: None,
            epoch: 0,
            refreshing: false,
            loading_more_conversations: false,
            loading_messages: HashSet::new(),
            loading_older_messages: HashSet::new(),
            load_more_messages_error: None,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn conversation_cursor(&self) -> Option<Pagination> {
        self.conversation_cursor
    }

    pub fn has_more_conversations(&self) -> bool {
        self.conversation_cursor.is_some_and(|c| c.has_more())
    }

    pub fn is_loading_conversations(&self) -> bool {
        self.refreshing
    }

    pub fn is_loading_more_conversations(&self) -> bool {
        self.loading_more_conversations
    }

    pub fn is_loading_messages(&self, conversation_id: &str) -> bool {
        self.loading_messages.contains(conversation_id)
    }

    pub fn is_loading_older_messages(&self, conversation_id: &str) -> bool {
        self.loading_older_messages.contains(conversation_id)
    }

    /// 最近一次消息分页加载失败的会话
    pub fn load_more_messages_error(&self) -> Option<&str> {
        self.load_more_messages_error.as_deref()
    }

    /// 开始刷新：总是允许，之前未完成的加载结果将被丢弃
    pub fn begin_refresh(&mut self) -> ListTicket {
        self.epoch += 1;
        self.refreshing = true;
        self.loading_more_conversations = false;
        debug!("[Page] 开始刷新会话列表，epoch={}", self.epoch);
        ListTicket {
            epoch: self.epoch,
            load: ListLoad::Refresh,
            page: 1,
        }
    }

    /// 尝试开始加载下一页会话；守卫不通过时返回 `None`
    pub fn begin_load_more_conversations(&mut self) -> Option<ListTicket> {
        if self.refreshing || self.loading_more_conversations {
            debug!("[Page] 会话列表正在加载，忽略重复请求");
            return None;
        }
        let cursor = self.conversation_cursor?;
        if !cursor.has_more() {
            debug!(
                "[Page] 会话列表已到最后一页 ({}/{})",
                cursor.page, cursor.total_pages
            );
            return None;
        }
        self.loading_more_conversations = true;
        Some(ListTicket {
            epoch: self.epoch,
            load: ListLoad::More,
            page: cursor.page + 1,
        })
    }

    /// 凭据是否仍然有效
    pub fn is_current(&self, ticket: &ListTicket) -> bool {
        ticket.epoch == self.epoch
    }

    /// 结束一次会话列表加载，返回结果是否应当应用
    ///
    /// 成功时 `pagination` 为新游标；失败时传 `None`，游标保持不变。
    pub fn finish_conversations(&mut self, ticket: &ListTicket, pagination: Option<Pagination>) -> bool {
        if !self.is_current(ticket) {
            debug!(
                "[Page] 丢弃过期的会话列表结果，epoch={} 当前={}",
                ticket.epoch, self.epoch
            );
            return false;
        }
        match ticket.load {
            ListLoad::Refresh => self.refreshing = false,
            ListLoad::More => self.loading_more_conversations = false,
        }
        if let Some(p) = pagination {
            self.conversation_cursor = Some(p);
        }
        true
    }

    /// 尝试开始加载某个会话的消息
    ///
    /// `cursor` 为该会话当前的消息游标。首次加载要求没有游标；加载更早的消息要求游标还有下一页。
    pub fn begin_messages(
        &mut self,
        conversation_id: &str,
        load: MessageLoad,
        cursor: Option<Pagination>,
    ) -> Option<u32> {
        if self.is_loading_messages(conversation_id) || self.is_loading_older_messages(conversation_id) {
            debug!("[Page] 会话 {} 的消息正在加载，忽略重复请求", conversation_id);
            return None;
        }
        let page = match (load, cursor) {
            (MessageLoad::Initial, None) => 1,
            (MessageLoad::Initial, Some(_)) => return None,
            (MessageLoad::Older, Some(c)) if c.has_more() => c.page + 1,
            (MessageLoad::Older, _) => return None,
        };

        let set = match load {
            MessageLoad::Initial => &mut self.loading_messages,
            MessageLoad::Older => &mut self.loading_older_messages,
        };
        set.insert(conversation_id.to_string());
        if self.load_more_messages_error.as_deref() == Some(conversation_id) {
            self.load_more_messages_error = None;
        }
        Some(page)
    }

    /// 结束一次消息加载；失败时记录错误以便界面提供重试
    pub fn finish_messages(&mut self, conversation_id: &str, load: MessageLoad, failed: bool) {
        match load {
            MessageLoad::Initial => self.loading_messages.remove(conversation_id),
            MessageLoad::Older => self.loading_older_messages.remove(conversation_id),
        };
        if failed {
            self.load_more_messages_error = Some(conversation_id.to_string());
        }
    }

    /// 会话被删除后清理相关状态
    pub fn forget(&mut self, conversation_id: &str) {
        self.loading_messages.remove(conversation_id);
        self.loading_older_messages.remove(conversation_id);
        if self.load_more_messages_error.as_deref() == Some(conversation_id) {
            self.load_more_messages_error = None;
        }
    }

    /// 重置全部状态（清空会话时）
    pub fn reset(&mut self) {
        let epoch = self.epoch + 1;
        *self = Self::new(self.page_size);
        self.epoch = epoch;
    }
}
