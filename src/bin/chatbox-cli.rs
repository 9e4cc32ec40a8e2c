//! Chatbox CLI 客户端（测试版）
//!
//! 非交互式 CLI：登录、同步会话列表，可选地发送一条消息并打印回复

use anyhow::{Context, Result};
use chatbox_core::chat::auth::AuthSession;
use chatbox_core::chat::conversation::Notice;
use chatbox_core::chat::db::create_sqlite_pool;
use chatbox_core::{login_async, ChatClient, ChatListener, ClientConfig, HttpGateway, MessageStatus, SqliteSnapshotStore};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Chatbox CLI 客户端
#[derive(Parser, Debug)]
#[command(name = "chatbox-cli")]
#[command(about = "Chatbox CLI 客户端 - 用于测试会话同步与消息发送", long_about = None)]
struct Args {
    /// API 根地址
    #[arg(long, default_value = "http://localhost:8000/api")]
    api_base_url: String,

    /// 登录邮箱
    #[arg(short, long)]
    email: String,

    /// 登录密码
    #[arg(short, long)]
    password: String,

    /// 本地快照数据库
    #[arg(long, default_value = "sqlite://chatbox.db?mode=rwc")]
    db_url: String,

    /// 发送到新会话的消息（不指定则只同步会话列表）
    #[arg(short, long)]
    message: Option<String>,

    /// 日志级别（默认: info,chatbox_core=debug）
    #[arg(long, default_value = "info,chatbox_core=debug")]
    log_level: String,
}

/// 初始化日志（同时输出到 stdout 和文件）
fn init_logger(log_level: &str) {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .expect("无法创建日志文件 debug.log");

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    // 文件不需要颜色
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("[CLI] 📝 日志已同时输出到控制台和文件: debug.log");
}

/// 把回调输出到日志
struct CliListener;

impl ChatListener for CliListener {
    fn on_conversations_changed(&self) {
        info!("[CLI/Conversation] 🔄 会话列表变更");
    }

    fn on_messages_changed(&self, conversation_id: &str) {
        info!("[CLI/Message] 💬 会话 {} 消息变更", conversation_id);
    }

    fn on_sending_changed(&self, sending_conversation_id: Option<&str>) {
        match sending_conversation_id {
            Some(id) => info!("[CLI/Send] 📤 正在发送: {}", id),
            None => info!("[CLI/Send] 发送结束"),
        }
    }

    fn on_compose_changed(&self) {}

    fn on_notice(&self, notice: &Notice) {
        warn!("[CLI/Notice] ⚠️ {:?}", notice);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level);

    info!("[CLI] 🚀 Chatbox CLI 客户端（测试模式）");

    let payload = login_async(&args.api_base_url, &args.email, &args.password)
        .await
        .context("登录失败")?;
    let session = AuthSession::new();
    session.set(payload);
    let user = session.user().context("登录后未拿到用户信息")?;
    info!(
        "[CLI] 👤 已登录: {} ({})",
        user.name.as_deref().unwrap_or(&user.email),
        user.id
    );

    let mut config = ClientConfig::new(args.api_base_url.clone());
    config.db_url = args.db_url.clone();

    let pool = create_sqlite_pool(&config.db_url).await?;
    let gateway = Arc::new(HttpGateway::new(config.api_base_url.clone(), session.clone()));
    let mut client = ChatClient::new(config, gateway, user.id)
        .with_snapshot_store(Arc::new(SqliteSnapshotStore::new(pool)));
    client.set_listener(Arc::new(CliListener));

    match client.restore_from_snapshot().await {
        Ok(count) => info!("[CLI] 📂 从本地快照恢复 {} 个会话", count),
        Err(e) => warn!("[CLI] 读取本地快照失败: {}", e),
    }

    client.refresh_conversations();
    client.pump().await;

    for conv in client.conversations() {
        info!(
            "[CLI] 📋 {} | {} | {} 条消息",
            conv.remote_id().unwrap_or(&conv.local_id),
            conv.title,
            conv.message_count
        );
    }

    if let Some(message) = args.message {
        let local_id = client.create_conversation();
        match client.submit(&local_id, &message, Vec::new()) {
            Ok(()) => {
                client.pump().await;
                for msg in client.selected_messages() {
                    match msg.status {
                        MessageStatus::Errored => error!("[CLI] ❌ {}: {}", msg.role.as_str(), msg.content),
                        _ => info!("[CLI] {}: {}", msg.role.as_str(), msg.content),
                    }
                }
            }
            Err(e) => error!("[CLI] 发送失败: {}", e),
        }
    }

    client.shutdown().await;
    session.clear();
    info!("[CLI] 👋 退出");
    Ok(())
}
