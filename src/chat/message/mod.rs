//! 消息模块
//!
//! 本地消息模型、附件与消息 DAO

pub mod dao;
pub mod models;

// 重新导出主要类型和函数
pub use dao::MessageDao;
pub use models::{
    format_file_size, validate_attachment, validate_content, Attachment, AttachmentSource, Message,
    MessageRecord, MessageStatus,
};
