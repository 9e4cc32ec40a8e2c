//! 会话数据访问层（DAO）
//!
//! 负责本地会话快照的数据库操作，将数据访问逻辑与业务逻辑分离。

use crate::chat::conversation::models::ConversationRecord;
use crate::chat::message::dao::MessageDao;
use crate::chat::snapshot::SnapshotStore;
use crate::chat::types::{ConversationKind, Pagination};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite, SqliteConnection};
use tracing::{debug, info};

/// 会话 DAO（基于 sqlx）
pub struct ConversationDao {
    db: Pool<Sqlite>,
}

impl ConversationDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// 使用共享连接初始化数据库表结构（静态方法）
    pub async fn init_db_with_connection(db: &Pool<Sqlite>) -> Result<()> {
        info!("[ConvDAO/DB] 初始化会话数据库表结构");

        let sql = r#"
            CREATE TABLE IF NOT EXISTS local_conversations (
                local_id          TEXT PRIMARY KEY,
                server_id         TEXT,
                user_id           TEXT NOT NULL DEFAULT '',
                conversation_type TEXT NOT NULL,
                title             TEXT NOT NULL DEFAULT '',
                document_id       TEXT,
                message_count     INTEGER NOT NULL DEFAULT 0,
                message_cursor    TEXT,
                created_at        TEXT NOT NULL,
                updated_at        TEXT NOT NULL,
                position          INTEGER NOT NULL
            )
        "#;
        sqlx::query(sql)
            .execute(db)
            .await
            .context("创建会话表失败")?;

        info!("[ConvDAO/DB] 数据库表初始化完成");
        Ok(())
    }

    pub async fn delete_all(conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query("DELETE FROM local_conversations")
            .execute(conn)
            .await
            .context("清空会话表失败")?;
        Ok(())
    }

    pub async fn insert_conversation(
        conn: &mut SqliteConnection,
        record: &ConversationRecord,
        position: usize,
    ) -> Result<()> {
        let cursor = record
            .message_cursor
            .map(|c| serde_json::to_string(&c))
            .transpose()
            .context("序列化分页游标失败")?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO local_conversations (
                local_id, server_id, user_id, conversation_type, title, document_id,
                message_count, message_cursor, created_at, updated_at, position
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.local_id)
        .bind(&record.server_id)
        .bind(&record.user_id)
        .bind(record.kind.as_str())
        .bind(&record.title)
        .bind(&record.document_id)
        .bind(record.message_count as i64)
        .bind(cursor)
        .bind(&record.created_at)
        .bind(&record.updated_at)
        .bind(position as i64)
        .execute(conn)
        .await
        .with_context(|| format!("写入会话失败: {}", record.local_id))?;
        Ok(())
    }

    /// 读取全部会话（不含消息），按保存顺序
    pub async fn get_all_conversations(&self) -> Result<Vec<ConversationRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT local_id, server_id, user_id, conversation_type, title, document_id,
                   message_count, message_cursor, created_at, updated_at
            FROM local_conversations
            ORDER BY position ASC
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("查询会话列表失败")?;

        rows.iter().map(Self::record_from_row).collect()
    }

    fn record_from_row(row: &SqliteRow) -> Result<ConversationRecord> {
        let kind: String = row.try_get("conversation_type")?;
        let cursor: Option<String> = row.try_get("message_cursor")?;
        let message_count: i64 = row.try_get("message_count")?;
        let message_cursor: Option<Pagination> = cursor
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .context("解析分页游标失败")?;

        Ok(ConversationRecord {
            local_id: row.try_get("local_id")?,
            server_id: row.try_get("server_id")?,
            user_id: row.try_get("user_id")?,
            kind: ConversationKind::parse(&kind).ok_or_else(|| anyhow!("未知的会话类型: {}", kind))?,
            title: row.try_get("title")?,
            document_id: row.try_get("document_id")?,
            message_count: message_count.max(0) as u64,
            message_cursor,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            messages: Vec::new(),
        })
    }
}

/// 基于 SQLite 的快照存储
pub struct SqliteSnapshotStore {
    db: Pool<Sqlite>,
    conversations: ConversationDao,
    messages: MessageDao,
}

impl SqliteSnapshotStore {
    /// 连接池需已通过 [`crate::chat::db::create_sqlite_pool`] 初始化表结构
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self {
            conversations: ConversationDao::new(db.clone()),
            messages: MessageDao::new(db.clone()),
            db,
        }
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn save_snapshot(&self, records: &[ConversationRecord]) -> Result<()> {
        let mut tx = self.db.begin().await.context("开启事务失败")?;

        MessageDao::delete_all(&mut tx).await?;
        ConversationDao::delete_all(&mut tx).await?;
        for (position, record) in records.iter().enumerate() {
            // 草稿不落盘
            if record.server_id.is_none() {
                continue;
            }
            ConversationDao::insert_conversation(&mut tx, record, position).await?;
            MessageDao::insert_messages(&mut tx, &record.local_id, &record.messages).await?;
        }

        tx.commit().await.context("提交事务失败")?;
        debug!("[SnapshotDAO] 快照已保存，会话数: {}", records.len());
        Ok(())
    }

    async fn load_snapshot(&self) -> Result<Vec<ConversationRecord>> {
        let mut records = self.conversations.get_all_conversations().await?;
        for record in records.iter_mut() {
            record.messages = self.messages.get_messages(&record.local_id).await?;
        }
        info!("[SnapshotDAO] 读取快照，会话数: {}", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::conversation::models::Conversation;
    use crate::chat::db::create_sqlite_pool;
    use crate::chat::message::models::{Attachment, AttachmentSource, Message};
    use crate::chat::mock::{conversation_response, init_test_logger, message_response};

    async fn store() -> SqliteSnapshotStore {
        init_test_logger();
        let pool = create_sqlite_pool("sqlite::memory:").await.unwrap();
        SqliteSnapshotStore::new(pool)
    }

    fn confirmed(id: &str) -> Conversation {
        let mut conv = Conversation::from(conversation_response(id, id));
        conv.message_cursor = Some(Pagination {
            page: 1,
            page_size: 10,
            total_items: 2,
            total_pages: 1,
        });
        conv.messages.push(Message::from(message_response(id, 1)));
        let mut user = Message::user(
            "with file",
            vec![Attachment::new("a.png", "image/png", 3, AttachmentSource::Url("file:///a.png".into()))],
        );
        user.token_in = Some(12);
        conv.messages.push(user);
        conv.messages.push(Message::placeholder());
        conv
    }

    #[tokio::test]
    async fn snapshot_round_trips_in_order() {
        let store = store().await;
        let records = vec![confirmed("b").to_record(), confirmed("a").to_record()];
        store.save_snapshot(&records).await.unwrap();

        let loaded = store.load_snapshot().await.unwrap();
        assert_eq!(loaded, records);
        assert_eq!(loaded[0].local_id, "b");
        assert_eq!(loaded[0].messages.len(), 2);
        assert_eq!(loaded[0].messages[1].attachments[0].name, "a.png");
    }

    #[tokio::test]
    async fn save_replaces_previous_snapshot_and_skips_drafts() {
        let store = store().await;
        store
            .save_snapshot(&[confirmed("a").to_record(), confirmed("b").to_record()])
            .await
            .unwrap();

        let draft = Conversation::draft("u1", ConversationKind::Chat).to_record();
        store
            .save_snapshot(&[draft, confirmed("c").to_record()])
            .await
            .unwrap();

        let loaded = store.load_snapshot().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].local_id, "c");
    }
}
