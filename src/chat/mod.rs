pub mod api;
pub mod auth;
pub mod client;
pub mod conversation;
pub mod db;
pub mod error;
pub mod gateway;
pub mod message;
pub mod pagination;
pub mod reconcile;
pub mod send;
pub mod serialization;
pub mod snapshot;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

// 重新导出认证相关函数
pub use auth::{login_async, validate_credentials, AuthSession};

// 重新导出核心组件
pub use client::{ChatClient, ClientConfig, ComposeBuffer, CoreEvent};
pub use error::{ChatError, ChatResult};
pub use gateway::RemoteGateway;
pub use pagination::PaginationController;
pub use reconcile::SyncReconciler;
pub use send::{SendCoordinator, SendOutcome, SendPhase};
pub use snapshot::{SnapshotStore, SnapshotWriter};
pub use store::LocalCacheStore;
