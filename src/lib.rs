pub mod chat;

// 重新导出常用类型和函数，方便外部使用
pub use chat::{
    api::HttpGateway,
    client::{ChatClient, ClientConfig},
    conversation::{ChatListener, Conversation, Notice, SqliteSnapshotStore},
    error::{ChatError, ChatResult},
    login_async,
    message::{Attachment, Message, MessageStatus},
};
