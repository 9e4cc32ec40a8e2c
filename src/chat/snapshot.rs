//! 本地快照持久化
//!
//! store 每次变更都会发布最新快照；写入任务在静默期结束后只写最后一个版本。

use crate::chat::conversation::models::ConversationRecord;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// 持久化助手接口
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// 整体替换已保存的快照
    async fn save_snapshot(&self, records: &[ConversationRecord]) -> Result<()>;

    /// 读取快照，顺序与保存时一致
    async fn load_snapshot(&self) -> Result<Vec<ConversationRecord>>;
}

type SnapshotSlot = Option<Arc<Vec<ConversationRecord>>>;

/// 防抖写入器
pub struct SnapshotWriter {
    tx: watch::Sender<SnapshotSlot>,
    handle: JoinHandle<()>,
}

impl SnapshotWriter {
    /// 启动后台写入任务（需要在 tokio 运行时中调用）
    pub fn spawn(store: Arc<dyn SnapshotStore>, debounce: Duration) -> Self {
        let (tx, rx) = watch::channel(None);
        let handle = tokio::spawn(run_writer(rx, store, debounce));
        Self { tx, handle }
    }

    /// 发布最新快照
    pub fn schedule(&self, records: Vec<ConversationRecord>) {
        debug!("[Snapshot] 计划写入快照，会话数: {}", records.len());
        self.tx.send_replace(Some(Arc::new(records)));
    }

    /// 停止写入任务，未写入的快照会先落盘
    pub async fn shutdown(self) {
        let SnapshotWriter { tx, handle } = self;
        drop(tx);
        if let Err(e) = handle.await {
            error!("[Snapshot] 写入任务异常退出: {}", e);
        }
    }
}

async fn run_writer(
    mut rx: watch::Receiver<SnapshotSlot>,
    store: Arc<dyn SnapshotStore>,
    debounce: Duration,
) {
    while rx.changed().await.is_ok() {
        // 静默期内的新变更会重新计时
        loop {
            tokio::select! {
                _ = tokio::time::sleep(debounce) => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        let latest = rx.borrow_and_update().clone();
        if let Some(records) = latest {
            match store.save_snapshot(&records).await {
                Ok(()) => info!("[Snapshot] ✅ 快照已写入，会话数: {}", records.len()),
                Err(e) => error!("[Snapshot] 快照写入失败: {:#}", e),
            }
        }
    }
    debug!("[Snapshot] 写入任务结束");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::mock::MemorySnapshotStore;
    use crate::chat::types::ConversationKind;

    fn record(id: &str) -> ConversationRecord {
        ConversationRecord {
            local_id: id.into(),
            server_id: Some(id.into()),
            user_id: "u1".into(),
            kind: ConversationKind::Chat,
            title: id.into(),
            document_id: None,
            message_count: 0,
            message_cursor: None,
            created_at: "2025-01-01T00:00:00.000Z".into(),
            updated_at: "2025-01-01T00:00:00.000Z".into(),
            messages: vec![],
        }
    }

    #[tokio::test]
    async fn bursts_collapse_into_one_write_of_the_latest_snapshot() {
        let store = Arc::new(MemorySnapshotStore::default());
        let writer = SnapshotWriter::spawn(store.clone(), Duration::from_millis(30));

        writer.schedule(vec![record("a")]);
        writer.schedule(vec![record("a"), record("b")]);
        writer.schedule(vec![record("a"), record("b"), record("c")]);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.saved().len(), 3);

        writer.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_flushes_pending_snapshot() {
        let store = Arc::new(MemorySnapshotStore::default());
        let writer = SnapshotWriter::spawn(store.clone(), Duration::from_secs(60));

        writer.schedule(vec![record("a")]);
        writer.shutdown().await;

        assert_eq!(store.save_count(), 1);
        assert_eq!(store.saved()[0].local_id, "a");
    }
}
