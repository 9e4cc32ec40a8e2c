//! 消息数据访问层（DAO）
//!
//! 负责本地消息快照的读写，写入总是在会话快照的事务中进行

use crate::chat::message::models::{MessageRecord, MessageStatus};
use crate::chat::types::MessageRole;
use anyhow::{anyhow, Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite, SqliteConnection};
use tracing::{debug, info};

/// 消息 DAO（基于 sqlx）
pub struct MessageDao {
    db: Pool<Sqlite>,
}

impl MessageDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// 使用共享连接初始化数据库表结构（静态方法）
    pub async fn init_db_with_connection(db: &Pool<Sqlite>) -> Result<()> {
        info!("[MsgDAO/DB] 初始化消息数据库表结构");

        let sql = r#"
            CREATE TABLE IF NOT EXISTS local_messages (
                conversation_local_id TEXT NOT NULL,
                local_id              TEXT NOT NULL,
                server_id             TEXT,
                sequence              INTEGER,
                role                  TEXT NOT NULL,
                content               TEXT NOT NULL DEFAULT '',
                status                TEXT NOT NULL,
                timestamp             TEXT NOT NULL,
                attachments           TEXT NOT NULL DEFAULT '[]',
                model                 TEXT,
                token_in              INTEGER,
                token_out             INTEGER,
                position              INTEGER NOT NULL,
                PRIMARY KEY (conversation_local_id, local_id)
            )
        "#;
        sqlx::query(sql)
            .execute(db)
            .await
            .context("创建消息表失败")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_local_messages_position ON local_messages(conversation_local_id, position)",
        )
        .execute(db)
        .await
        .context("创建消息索引失败")?;
        Ok(())
    }

    /// 删除全部消息
    pub async fn delete_all(conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query("DELETE FROM local_messages")
            .execute(conn)
            .await
            .context("清空消息表失败")?;
        Ok(())
    }

    /// 按顺序写入一个会话的消息
    pub async fn insert_messages(
        conn: &mut SqliteConnection,
        conversation_local_id: &str,
        records: &[MessageRecord],
    ) -> Result<()> {
        for (position, record) in records.iter().enumerate() {
            if record.status == MessageStatus::Pending {
                continue;
            }
            let attachments =
                serde_json::to_string(&record.attachments).context("序列化附件失败")?;
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO local_messages (
                    conversation_local_id, local_id, server_id, sequence, role, content,
                    status, timestamp, attachments, model, token_in, token_out, position
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(conversation_local_id)
            .bind(&record.local_id)
            .bind(&record.server_id)
            .bind(record.sequence)
            .bind(record.role.as_str())
            .bind(&record.content)
            .bind(record.status.as_str())
            .bind(&record.timestamp)
            .bind(attachments)
            .bind(&record.model)
            .bind(record.token_in.map(|v| v as i64))
            .bind(record.token_out.map(|v| v as i64))
            .bind(position as i64)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("写入消息失败: {}", record.local_id))?;
        }
        debug!(
            "[MsgDAO] 会话 {} 写入 {} 条消息",
            conversation_local_id,
            records.len()
        );
        Ok(())
    }

    /// 读取一个会话的全部消息（按写入顺序）
    pub async fn get_messages(&self, conversation_local_id: &str) -> Result<Vec<MessageRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT local_id, server_id, sequence, role, content, status, timestamp,
                   attachments, model, token_in, token_out
            FROM local_messages
            WHERE conversation_local_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(conversation_local_id)
        .fetch_all(&self.db)
        .await
        .context("查询消息失败")?;

        rows.iter().map(Self::record_from_row).collect()
    }

    fn record_from_row(row: &SqliteRow) -> Result<MessageRecord> {
        let role: String = row.try_get("role")?;
        let status: String = row.try_get("status")?;
        let attachments: String = row.try_get("attachments")?;
        let token_in: Option<i64> = row.try_get("token_in")?;
        let token_out: Option<i64> = row.try_get("token_out")?;

        Ok(MessageRecord {
            local_id: row.try_get("local_id")?,
            server_id: row.try_get("server_id")?,
            sequence: row.try_get("sequence")?,
            role: MessageRole::parse(&role).ok_or_else(|| anyhow!("未知的消息角色: {}", role))?,
            content: row.try_get("content")?,
            status: MessageStatus::parse(&status)
                .ok_or_else(|| anyhow!("未知的消息状态: {}", status))?,
            timestamp: row.try_get("timestamp")?,
            attachments: serde_json::from_str(&attachments).context("解析附件失败")?,
            model: row.try_get("model")?,
            token_in: token_in.map(|v| v as u64),
            token_out: token_out.map(|v| v as u64),
        })
    }
}
