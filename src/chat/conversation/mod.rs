//! 会话模块
//!
//! 本地会话模型、快照 DAO 与界面监听器

pub mod dao;
pub mod listener;
pub mod models;

// 重新导出主要类型
pub use dao::{ConversationDao, SqliteSnapshotStore};
pub use listener::{ChatListener, EmptyChatListener, Notice};
pub use models::{Conversation, ConversationRecord, DRAFT_TITLE};
