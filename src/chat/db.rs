//! SQLite 数据库工具：统一创建连接池并初始化表结构

use crate::chat::conversation::dao::ConversationDao;
use crate::chat::message::dao::MessageDao;
use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use tracing::info;

/// 创建 SQLite 连接池并确保所有表存在
pub async fn create_sqlite_pool(db_url: &str) -> Result<Pool<Sqlite>> {
    // 内存库每个连接都是独立的数据库，只能用一个连接
    let max_connections = if db_url.contains(":memory:") { 1 } else { 5 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(db_url)
        .await
        .with_context(|| format!("连接数据库失败: {}", db_url))?;

    ConversationDao::init_db_with_connection(&pool).await?;
    MessageDao::init_db_with_connection(&pool).await?;
    info!("[DB] 数据库已就绪: {}", db_url);
    Ok(pool)
}
